//! Aggregate track metrics: total distance, elevation gain and average pace.
//!
//! Metrics are recomputed wholesale for each track. A degenerate track
//! (fewer than two points, or no distance covered) has no metrics at all:
//! [`aggregate`] returns `None` and [`TrackSummary`] shows placeholders.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::annotate::AnnotatedTrack;
use crate::geo_utils::{haversine_km, km_to_miles, meters_to_feet};

/// Placeholder shown for an unavailable summary field.
pub const UNAVAILABLE: &str = "--";

/// A pace in minutes per mile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pace {
    pub min_per_mi: f64,
}

impl Pace {
    pub fn from_min_per_mi(min_per_mi: f64) -> Self {
        Self { min_per_mi }
    }

    /// Pace for covering one mile in `seconds`.
    pub fn from_seconds_per_mile(seconds: f64) -> Self {
        Self::from_min_per_mi(seconds / 60.0)
    }

    pub fn whole_minutes(&self) -> u64 {
        self.min_per_mi.floor() as u64
    }

    /// Remainder after the whole minutes, in seconds.
    pub fn residual_seconds(&self) -> f64 {
        (self.min_per_mi - self.min_per_mi.floor()) * 60.0
    }
}

impl fmt::Display for Pace {
    /// `M:SS`, seconds rounded; a rounding that reaches 60 carries.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.min_per_mi.is_finite() || self.min_per_mi < 0.0 {
            return f.write_str(UNAVAILABLE);
        }
        let total_secs = (self.min_per_mi * 60.0).round() as u64;
        write!(f, "{}:{:02}", total_secs / 60, total_secs % 60)
    }
}

/// Aggregate metrics for one track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackMetrics {
    pub total_distance_mi: f64,
    pub total_elevation_gain_ft: f64,
    pub average_pace: Pace,
}

/// Compute aggregate metrics, or `None` when the track is degenerate.
///
/// Total distance is summed here independently of the annotator's running
/// total; the two agree within floating-point tolerance.
pub fn aggregate(track: &AnnotatedTrack) -> Option<TrackMetrics> {
    let points = track.points();
    if points.len() < 2 {
        return None;
    }

    let mut total_km = 0.0;
    let mut gain_m = 0.0;
    for w in points.windows(2) {
        let segment_km = haversine_km(&w[0], &w[1]);
        if segment_km.is_finite() {
            total_km += segment_km;
        }

        if let (Some(prev), Some(curr)) = (w[0].elevation_m, w[1].elevation_m) {
            let delta = curr - prev;
            if delta.is_finite() && delta > 0.0 {
                gain_m += delta;
            }
        }
    }

    let total_distance_mi = km_to_miles(total_km);
    if total_distance_mi <= 0.0 {
        return None;
    }

    let (first, last) = (points.first()?, points.last()?);
    let span_minutes = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 60_000.0;
    let average_pace = Pace::from_min_per_mi(span_minutes / total_distance_mi);
    if !average_pace.min_per_mi.is_finite() {
        return None;
    }

    Some(TrackMetrics {
        total_distance_mi,
        total_elevation_gain_ft: meters_to_feet(gain_m),
        average_pace,
    })
}

/// Display strings for the summary panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    /// Miles, two decimals
    pub distance: String,
    /// Feet, rounded
    pub elevation_gain: String,
    /// `M:SS` per mile
    pub pace: String,
}

impl TrackSummary {
    pub fn new(metrics: Option<&TrackMetrics>) -> Self {
        match metrics {
            Some(m) => Self {
                distance: format!("{:.2}", m.total_distance_mi),
                elevation_gain: format!("{}", m.total_elevation_gain_ft.round() as i64),
                pace: m.average_pace.to_string(),
            },
            None => Self::unavailable(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            distance: UNAVAILABLE.to_string(),
            elevation_gain: UNAVAILABLE.to_string(),
            pace: UNAVAILABLE.to_string(),
        }
    }
}
