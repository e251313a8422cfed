//! GeoJSON point payload normalization.
//!
//! The loading layer hands over already-parsed feature collections. This
//! module turns the point collection into [`GeoPoint`]s, dropping points
//! that cannot be placed on the track (no coordinates or no usable time).

use chrono::{DateTime, Utc};
use log::warn;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::GeoPoint;

/// Both payloads of a route, fetched together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePayload {
    /// Line geometry, rendered as-is by the map
    pub line: serde_json::Value,
    pub points: PointCollection,
}

/// A GeoJSON FeatureCollection of trackpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointCollection {
    #[serde(rename = "type", default)]
    pub collection_type: Option<String>,
    #[serde(default)]
    pub features: Vec<PointFeature>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointFeature {
    #[serde(default)]
    pub geometry: Option<PointGeometry>,
    #[serde(default)]
    pub properties: PointProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointGeometry {
    /// [lon, lat] (GeoJSON order), possibly with a trailing altitude
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointProperties {
    #[serde(default)]
    pub ele: Option<f64>,
    #[serde(default)]
    pub time: Option<String>,
    /// GPX TrackPointExtension XML fragment (heart rate lives here)
    #[serde(rename = "gpxtpx_TrackPointExtension", default)]
    pub track_point_extension: Option<String>,
}

impl PointCollection {
    /// Parse a point collection from a JSON value, checking the top-level shape.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let collection: PointCollection = serde_json::from_value(value)?;
        match collection.collection_type.as_deref() {
            Some("FeatureCollection") | None => Ok(collection),
            Some(other) => Err(TrackError::MalformedPayload {
                message: format!("expected FeatureCollection, got '{}'", other),
            }),
        }
    }
}

/// Convert a point feature to a trackpoint.
///
/// Returns `None` when the feature has no usable position or time.
pub fn point_from_feature(feature: &PointFeature) -> Option<GeoPoint> {
    let coords = &feature.geometry.as_ref()?.coordinates;
    if coords.len() < 2 {
        return None;
    }
    let (lon, lat) = (coords[0], coords[1]);

    let time = feature.properties.time.as_deref()?;
    let timestamp = DateTime::parse_from_rfc3339(time)
        .ok()?
        .with_timezone(&Utc);

    let point = GeoPoint {
        latitude: lat,
        longitude: lon,
        elevation_m: feature.properties.ele.filter(|e| e.is_finite()),
        timestamp,
        heart_rate_bpm: feature
            .properties
            .track_point_extension
            .as_deref()
            .and_then(|xml| extension_value(xml, "hr")),
        cumulative_distance_mi: None,
    };

    point.is_valid().then_some(point)
}

/// Normalize every feature, dropping the ones that cannot be placed.
pub fn normalize_points(collection: &PointCollection) -> Vec<GeoPoint> {
    let points: Vec<GeoPoint> = collection
        .features
        .iter()
        .filter_map(point_from_feature)
        .collect();

    let dropped = collection.features.len() - points.len();
    if dropped > 0 {
        warn!(
            "[Payload] Dropped {} of {} malformed trackpoints",
            dropped,
            collection.features.len()
        );
    }
    points
}

/// Extract a numeric value from the first `<…:{tag}>N</…:{tag}>` element of
/// an extension fragment. The namespace prefix is ignored and surrounding
/// whitespace is allowed.
pub fn extension_value(xml: &str, tag: &str) -> Option<u16> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == tag.as_bytes() => {
                inside = true;
                text.clear();
            }
            Ok(Event::Text(ref e)) if inside => {
                text.push_str(&e.unescape().ok()?);
            }
            Ok(Event::End(ref e)) if inside && e.local_name().as_ref() == tag.as_bytes() => {
                let raw = text.trim();
                if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                return raw.parse().ok();
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(lon: f64, lat: f64, ele: Option<f64>, time: Option<&str>) -> serde_json::Value {
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [lon, lat] },
            "properties": { "ele": ele, "time": time }
        })
    }

    #[test]
    fn test_extension_value() {
        let xml = "<gpxtpx:TrackPointExtension><gpxtpx:hr>142</gpxtpx:hr><gpxtpx:cad>84</gpxtpx:cad></gpxtpx:TrackPointExtension>";
        assert_eq!(extension_value(xml, "hr"), Some(142));
        assert_eq!(extension_value(xml, "cad"), Some(84));
        assert_eq!(extension_value(xml, "atemp"), None);
        assert_eq!(extension_value("<gpxtpx:hr>abc</gpxtpx:hr>", "hr"), None);
        assert_eq!(extension_value("", "hr"), None);
    }

    #[test]
    fn test_extension_value_tolerates_layout() {
        let nested = "<gpxtpx:TrackPointExtension>\n  <gpxtpx:hr> 142 </gpxtpx:hr>\n</gpxtpx:TrackPointExtension>";
        assert_eq!(extension_value(nested, "hr"), Some(142));
        assert_eq!(extension_value("<ns3:hr unit=\"bpm\">131</ns3:hr>", "hr"), Some(131));
        assert_eq!(extension_value("<hr>99</hr>", "hr"), Some(99));
        // Unclosed or negative values are not heart rates
        assert_eq!(extension_value("<gpxtpx:hr>142", "hr"), None);
        assert_eq!(extension_value("<gpxtpx:hr>-5</gpxtpx:hr>", "hr"), None);
    }

    #[test]
    fn test_normalize_points() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-91.9207, 44.8765] },
                    "properties": {
                        "ele": 245.3,
                        "time": "2024-05-04T14:00:00Z",
                        "gpxtpx_TrackPointExtension": "<gpxtpx:hr>131</gpxtpx:hr>"
                    }
                },
                feature(-91.9200, 44.8770, None, Some("2024-05-04T14:00:05Z")),
                feature(-91.9190, 44.8775, Some(246.0), None),
                feature(-91.9180, 44.8780, Some(246.0), Some("not a time")),
                { "type": "Feature", "geometry": null, "properties": {} }
            ]
        });

        let collection = PointCollection::from_value(value).unwrap();
        let points = normalize_points(&collection);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].latitude, 44.8765);
        assert_eq!(points[0].longitude, -91.9207);
        assert_eq!(points[0].elevation_m, Some(245.3));
        assert_eq!(points[0].heart_rate_bpm, Some(131));
        assert_eq!(points[1].elevation_m, None);
        assert_eq!(points[1].heart_rate_bpm, None);
        assert!(points.iter().all(|p| p.cumulative_distance_mi.is_none()));
    }

    #[test]
    fn test_rejects_wrong_collection_type() {
        let value = json!({ "type": "Feature", "features": [] });
        assert!(matches!(
            PointCollection::from_value(value),
            Err(TrackError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_empty_collection() {
        let collection = PointCollection::from_value(json!({ "type": "FeatureCollection", "features": [] })).unwrap();
        assert!(normalize_points(&collection).is_empty());
    }
}
