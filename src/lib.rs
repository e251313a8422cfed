//! # Track Sync
//!
//! GPS track metrics and synchronized hover cursors for a map and two charts.
//!
//! This library provides:
//! - Cumulative distance annotation and aggregate track metrics
//! - Noise-filtered, time-smoothed pace series
//! - Mile split detection and mile markers
//! - A hover coordinator that keeps a map cursor and two chart highlights
//!   in lock-step while the pointer moves over any of them
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use track_sync::{aggregate, annotate, GeoPoint, TrackSummary};
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap();
//! let points: Vec<GeoPoint> = (0..20)
//!     .map(|i| {
//!         GeoPoint::new(44.8765 + i as f64 * 0.001, -91.9207, start + Duration::seconds(i * 30))
//!             .with_elevation(250.0 + i as f64)
//!     })
//!     .collect();
//!
//! let track = annotate(points);
//! let metrics = aggregate(&track);
//! let summary = TrackSummary::new(metrics.as_ref());
//! println!("{} mi, {} ft, {} /mi", summary.distance, summary.elevation_gain, summary.pace);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackError};

// Geographic utilities (distance, unit constants, bounds)
pub mod geo_utils;
pub use geo_utils::{TrackBounds, FEET_PER_METER, KM_PER_MILE};

// Spatial index for map pointer lookups
pub mod spatial;

// GeoJSON point payload normalization
pub mod payload;
pub use payload::{normalize_points, PointCollection, RoutePayload};

// Cumulative distance annotation
pub mod annotate;
pub use annotate::{annotate, AnnotatedTrack};

// Aggregate metrics (distance, elevation gain, average pace)
pub mod metrics;
pub use metrics::{aggregate, Pace, TrackMetrics, TrackSummary};

// Pace series with noise filter and smoothing
pub mod pace;
pub use pace::{build_pace_series, PaceConfig, PaceSample, PaceSeries};

// Mile split segmentation and map markers
pub mod splits;
pub use splits::{mile_markers, segment_miles, MileMarker, MileSplit};

// Chart series (labels + values) for the elevation and pace charts
pub mod charts;
pub use charts::{elevation_series, pace_chart_series, ChartSeries};

// Hover synchronization across the map and both charts
pub mod sync;
pub use sync::{
    ChartBinding, ChartView, HoverEvent, HoverState, HoverSync, MapView, Popup, SyncConfig,
    SyncOutcome, TooltipModel, ViewId,
};

// Display session: route loading, stale-result rejection, rebuild
pub mod viewer;
pub use viewer::{fetch_route, LoadTicket, RouteSession, RouteSource, RouteViewer};

// ============================================================================
// Core Types
// ============================================================================

/// A normalized GPS trackpoint.
///
/// `cumulative_distance_mi` stays `None` until the point passes through
/// [`annotate`].
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use track_sync::GeoPoint;
///
/// let t = Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap();
/// let point = GeoPoint::new(44.8765, -91.9207, t).with_elevation(245.0);
/// assert!(point.is_valid());
/// assert!(point.cumulative_distance_mi.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters, `None` when the source omitted it
    pub elevation_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub heart_rate_bpm: Option<u16>,
    /// Distance from the start of the track in miles
    pub cumulative_distance_mi: Option<f64>,
}

impl GeoPoint {
    /// Create a new trackpoint without elevation or heart rate.
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            elevation_m: None,
            timestamp,
            heart_rate_bpm: None,
            cumulative_distance_mi: None,
        }
    }

    pub fn with_elevation(mut self, elevation_m: f64) -> Self {
        self.elevation_m = Some(elevation_m);
        self
    }

    pub fn with_heart_rate(mut self, bpm: u16) -> Self {
        self.heart_rate_bpm = Some(bpm);
        self
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Top-level configuration.
///
/// Every field has a default, so partial JSON is accepted:
/// ```
/// use track_sync::TrackConfig;
///
/// let config = TrackConfig::from_json(r#"{"pace": {"window_secs": 5.0}}"#).unwrap();
/// assert_eq!(config.pace.window_secs, 5.0);
/// assert_eq!(config.pace.max_pace_min_per_mi, 20.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub pace: PaceConfig,
    pub sync: SyncConfig,
}

impl TrackConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TrackConfig =
            serde_json::from_str(json).map_err(|e| TrackError::ConfigError {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let pace = &self.pace;
        if !(pace.min_pace_min_per_mi.is_finite() && pace.max_pace_min_per_mi.is_finite()) {
            return Err(TrackError::ConfigError {
                message: "pace bounds must be finite".to_string(),
            });
        }
        if pace.min_pace_min_per_mi >= pace.max_pace_min_per_mi {
            return Err(TrackError::ConfigError {
                message: format!(
                    "pace bounds are empty: {} >= {}",
                    pace.min_pace_min_per_mi, pace.max_pace_min_per_mi
                ),
            });
        }
        if !pace.window_secs.is_finite() || pace.window_secs < 0.0 {
            return Err(TrackError::ConfigError {
                message: format!("smoothing window must be >= 0, got {}", pace.window_secs),
            });
        }
        if !self.sync.label_tolerance_mi.is_finite() || self.sync.label_tolerance_mi <= 0.0 {
            return Err(TrackError::ConfigError {
                message: format!(
                    "label tolerance must be > 0, got {}",
                    self.sync.label_tolerance_mi
                ),
            });
        }
        if self.sync.utc_offset_secs.abs() >= 86_400 {
            return Err(TrackError::ConfigError {
                message: format!("utc offset out of range: {}", self.sync.utc_offset_secs),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
