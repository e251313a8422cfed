//! Geographic utilities: great-circle distance, planar lookup distance,
//! unit constants, and track bounds.
//!
//! Every distance in the crate is derived from [`haversine_km`]; every
//! km/mile and m/ft conversion goes through the constants below so the
//! whole pipeline agrees on units.

use geo::{BoundingRect, Coord, LineString};
use serde::{Deserialize, Serialize};

use crate::GeoPoint;

/// Mean Earth radius used by the haversine formula, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers in one statute mile. The single km/mile constant of the crate.
pub const KM_PER_MILE: f64 = 1.60934;

/// Feet in one meter.
pub const FEET_PER_METER: f64 = 3.28084;

/// Great-circle distance between two points in kilometers (haversine).
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use track_sync::GeoPoint;
/// use track_sync::geo_utils::haversine_km;
///
/// let t = Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap();
/// let a = GeoPoint::new(44.8765, -91.9207, t);
/// assert_eq!(haversine_km(&a, &a), 0.0);
/// ```
pub fn haversine_km(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    haversine_km_raw(p1.latitude, p1.longitude, p2.latitude, p2.longitude)
}

/// Haversine on raw degrees, in kilometers.
///
/// Not `geo::Haversine`: that uses the 6371.0088 km mean radius, and every
/// distance here is defined against 6371 km.
pub fn haversine_km_raw(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Convert kilometers to miles.
#[inline]
pub fn km_to_miles(km: f64) -> f64 {
    km / KM_PER_MILE
}

/// Convert miles to kilometers.
#[inline]
pub fn miles_to_km(miles: f64) -> f64 {
    miles * KM_PER_MILE
}

/// Convert meters to feet.
#[inline]
pub fn meters_to_feet(meters: f64) -> f64 {
    meters * FEET_PER_METER
}

/// Squared planar distance in degree space between a map position and a
/// trackpoint. Only meaningful for ranking nearby candidates.
pub fn planar_distance_sq(lat: f64, lon: f64, point: &GeoPoint) -> f64 {
    let dlat = point.latitude - lat;
    let dlon = point.longitude - lon;
    dlat * dlat + dlon * dlon
}

/// Bounding box of a track, used to fit the map viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl TrackBounds {
    /// Compute bounds from trackpoints. Returns `None` for an empty track.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        let line: LineString<f64> = points
            .iter()
            .map(|p| Coord {
                x: p.longitude,
                y: p.latitude,
            })
            .collect();
        let rect = line.bounding_rect()?;

        Some(Self {
            min_lat: rect.min().y,
            max_lat: rect.max().y,
            min_lng: rect.min().x,
            max_lng: rect.max().x,
        })
    }

    /// Center of the bounds as (lat, lng).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}
