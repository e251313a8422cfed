//! Mile split segmentation and per-mile map markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotate::AnnotatedTrack;
use crate::geo_utils::{haversine_km, miles_to_km};
use crate::metrics::Pace;

/// Time taken for one whole mile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MileSplit {
    /// 1-based mile number
    pub mile_number: u32,
    /// Seconds since the previous crossing (or the track start for mile 1)
    pub split_duration_sec: f64,
    /// Index of the trackpoint at which the crossing was detected
    pub point_index: usize,
}

impl MileSplit {
    /// The split expressed as a pace (one mile in `split_duration_sec`).
    pub fn pace(&self) -> Pace {
        Pace::from_seconds_per_mile(self.split_duration_sec)
    }
}

/// A labelled marker placed on the map at a mile crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MileMarker {
    pub mile_number: u32,
    pub latitude: f64,
    pub longitude: f64,
    /// Short label drawn inside the marker
    pub label: String,
    /// Plain text for the marker popup, e.g. `Mile 3: 8:05`
    pub popup_text: String,
}

/// Detect every whole-mile crossing and the time taken for each mile.
///
/// Splits come out in increasing `mile_number`. A segment that covers more
/// than one boundary emits one split per boundary; the extra splits have
/// zero duration since no time elapses between them.
pub fn segment_miles(track: &AnnotatedTrack) -> Vec<MileSplit> {
    let points = track.points();
    let Some(first) = points.first() else {
        return Vec::new();
    };

    let mut splits = Vec::new();
    let mut distance_km = 0.0;
    let mut mile_number: u32 = 1;
    let mut last_crossing: DateTime<Utc> = first.timestamp;

    for (i, w) in points.windows(2).enumerate() {
        let segment_km = haversine_km(&w[0], &w[1]);
        if !segment_km.is_finite() {
            continue;
        }
        distance_km += segment_km;

        let curr = &w[1];
        while distance_km >= miles_to_km(mile_number as f64) {
            let elapsed_ms = (curr.timestamp - last_crossing).num_milliseconds();
            splits.push(MileSplit {
                mile_number,
                split_duration_sec: elapsed_ms as f64 / 1000.0,
                point_index: i + 1,
            });
            last_crossing = curr.timestamp;
            mile_number += 1;
        }
    }

    splits
}

/// Build map markers for the given splits.
pub fn mile_markers(track: &AnnotatedTrack, splits: &[MileSplit]) -> Vec<MileMarker> {
    splits
        .iter()
        .filter_map(|split| {
            let point = track.get(split.point_index)?;
            Some(MileMarker {
                mile_number: split.mile_number,
                latitude: point.latitude,
                longitude: point.longitude,
                label: split.mile_number.to_string(),
                popup_text: format!("Mile {}: {}", split.mile_number, split.pace()),
            })
        })
        .collect()
}
