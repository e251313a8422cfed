//! Per-segment pace series with noise rejection and time-window smoothing.
//!
//! GPS jitter produces segments with near-zero distance or time whose pace
//! ratio explodes; those are dropped by the bounds in [`PaceConfig`]. The
//! surviving samples are smoothed with a trailing moving average over a
//! fixed time window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotate::AnnotatedTrack;
use crate::geo_utils::{haversine_km, KM_PER_MILE};

/// Configuration for the pace series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceConfig {
    /// Samples at or below this pace are rejected (min/mi).
    /// Default: 3.0
    pub min_pace_min_per_mi: f64,

    /// Samples at or above this pace are rejected (min/mi).
    /// Default: 20.0
    pub max_pace_min_per_mi: f64,

    /// Width of the trailing smoothing window in seconds.
    /// Wider is calmer but slower to react. Default: 15.0
    pub window_secs: f64,
}

impl Default for PaceConfig {
    fn default() -> Self {
        Self {
            min_pace_min_per_mi: 3.0,
            max_pace_min_per_mi: 20.0,
            window_secs: 15.0,
        }
    }
}

impl PaceConfig {
    /// True when `pace` lies strictly inside the accepted bounds.
    pub fn accepts(&self, pace: f64) -> bool {
        pace.is_finite() && pace > self.min_pace_min_per_mi && pace < self.max_pace_min_per_mi
    }
}

/// One pace value, keyed by where the segment ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaceSample {
    /// Cumulative distance at the end of the segment (miles)
    pub cumulative_distance_mi: f64,
    pub pace_min_per_mi: f64,
    /// Timestamp at the end of the segment
    pub timestamp: DateTime<Utc>,
}

/// Raw and smoothed pace, aligned by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaceSeries {
    pub raw: Vec<PaceSample>,
    pub smoothed: Vec<PaceSample>,
}

impl PaceSeries {
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Build the filtered raw series and its smoothed counterpart.
///
/// Indices follow the filtered sample sequence, not the original points.
pub fn build_pace_series(track: &AnnotatedTrack, config: &PaceConfig) -> PaceSeries {
    let points = track.points();

    let raw: Vec<PaceSample> = points
        .windows(2)
        .filter_map(|w| {
            let (prev, curr) = (&w[0], &w[1]);
            let segment_km = haversine_km(prev, curr);
            let elapsed_min =
                (curr.timestamp - prev.timestamp).num_milliseconds() as f64 / 60_000.0;
            let pace = elapsed_min / segment_km * KM_PER_MILE;

            config.accepts(pace).then(|| PaceSample {
                cumulative_distance_mi: curr.cumulative_distance_mi.unwrap_or(0.0),
                pace_min_per_mi: pace,
                timestamp: curr.timestamp,
            })
        })
        .collect();

    let smoothed = smooth(&raw, config.window_secs);
    PaceSeries { raw, smoothed }
}

/// Trailing time-window moving average. The first sample passes through.
pub fn smooth(raw: &[PaceSample], window_secs: f64) -> Vec<PaceSample> {
    let window_ms = (window_secs * 1000.0) as i64;

    raw.iter()
        .enumerate()
        .map(|(i, sample)| {
            if i == 0 {
                return *sample;
            }

            let mut sum = 0.0;
            let mut count = 0usize;
            for prior in raw[..=i].iter().rev() {
                let age_ms = (sample.timestamp - prior.timestamp).num_milliseconds();
                if count > 0 && age_ms > window_ms {
                    break;
                }
                sum += prior.pace_min_per_mi;
                count += 1;
            }

            PaceSample {
                pace_min_per_mi: sum / count as f64,
                ..*sample
            }
        })
        .collect()
}
