//! Cumulative distance annotation.
//!
//! [`annotate`] is a pure left-to-right fold: the first point sits at mile 0
//! and every later point adds the haversine distance from its predecessor.

use serde::Serialize;

use crate::geo_utils::{haversine_km, km_to_miles};
use crate::GeoPoint;

/// An ordered track whose points all carry `cumulative_distance_mi`.
///
/// Only [`annotate`] builds one, so the annotation invariant holds for the
/// lifetime of the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedTrack {
    points: Vec<GeoPoint>,
}

impl AnnotatedTrack {
    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&GeoPoint> {
        self.points.get(index)
    }

    /// Cumulative distance of the point at `index`, in miles.
    pub fn distance_at(&self, index: usize) -> Option<f64> {
        self.points.get(index)?.cumulative_distance_mi
    }

    /// Cumulative distance of the last point, 0 for an empty track.
    pub fn total_distance_mi(&self) -> f64 {
        self.points
            .last()
            .and_then(|p| p.cumulative_distance_mi)
            .unwrap_or(0.0)
    }

    /// Index of the point whose cumulative distance is closest to
    /// `distance_mi`. Linear scan; ties resolve to the first occurrence.
    pub fn nearest_by_distance(&self, distance_mi: f64) -> Option<usize> {
        if !distance_mi.is_finite() {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        for (i, p) in self.points.iter().enumerate() {
            let delta = (p.cumulative_distance_mi.unwrap_or(0.0) - distance_mi).abs();
            match best {
                Some((_, best_delta)) if delta >= best_delta => {}
                _ => best = Some((i, delta)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// True when timestamps never go backwards.
    pub fn is_time_sorted(&self) -> bool {
        self.points
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    }

    pub fn into_points(self) -> Vec<GeoPoint> {
        self.points
    }
}

/// Attach cumulative distance (miles) to every point.
///
/// Output length equals input length, the first value is 0 and the series is
/// non-decreasing. Any existing annotation is overwritten, so annotating the
/// same points twice gives identical output.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use track_sync::{annotate, GeoPoint};
///
/// let t = Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap();
/// let track = annotate(vec![
///     GeoPoint::new(44.8765, -91.9207, t),
///     GeoPoint::new(44.8865, -91.9207, t),
/// ]);
/// assert_eq!(track.distance_at(0), Some(0.0));
/// assert!(track.total_distance_mi() > 0.6);
/// ```
pub fn annotate(mut points: Vec<GeoPoint>) -> AnnotatedTrack {
    let mut cumulative = 0.0;
    for i in 0..points.len() {
        if i > 0 {
            let segment_km = haversine_km(&points[i - 1], &points[i]);
            if segment_km.is_finite() {
                cumulative += km_to_miles(segment_km);
            }
        }
        points[i].cumulative_distance_mi = Some(cumulative);
    }
    AnnotatedTrack { points }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn line(n: usize) -> Vec<GeoPoint> {
        let start = Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                GeoPoint::new(
                    44.8765 + i as f64 * 0.0007,
                    -91.9207 + (i % 3) as f64 * 0.0002,
                    start + Duration::seconds(i as i64 * 10),
                )
            })
            .collect()
    }

    #[test]
    fn test_first_point_zero_and_monotonic() {
        let track = annotate(line(25));
        assert_eq!(track.len(), 25);
        assert_eq!(track.distance_at(0), Some(0.0));
        let dists: Vec<f64> = track
            .points()
            .iter()
            .map(|p| p.cumulative_distance_mi.unwrap())
            .collect();
        assert!(dists.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(annotate(Vec::new()).is_empty());
        let single = annotate(line(1));
        assert_eq!(single.len(), 1);
        assert_eq!(single.total_distance_mi(), 0.0);
    }

    #[test]
    fn test_idempotent() {
        let points = line(40);
        let first = annotate(points.clone());
        let second = annotate(points);
        let bits = |t: &AnnotatedTrack| -> Vec<u64> {
            t.points()
                .iter()
                .map(|p| p.cumulative_distance_mi.unwrap().to_bits())
                .collect()
        };
        assert_eq!(bits(&first), bits(&second));

        // Re-annotating annotated points recomputes the same values
        let again = annotate(first.clone().into_points());
        assert_eq!(bits(&first), bits(&again));
    }

    #[test]
    fn test_nearest_by_distance_ties_first() {
        let start = Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap();
        // Repeated position gives a zero-length segment: indices 1 and 2 tie
        let track = annotate(vec![
            GeoPoint::new(44.0, -91.0, start),
            GeoPoint::new(44.01, -91.0, start),
            GeoPoint::new(44.01, -91.0, start),
            GeoPoint::new(44.02, -91.0, start),
        ]);
        let d = track.distance_at(1).unwrap();
        assert_eq!(track.nearest_by_distance(d), Some(1));
        assert_eq!(track.nearest_by_distance(-5.0), Some(0));
        assert_eq!(track.nearest_by_distance(f64::NAN), None);
        assert_eq!(annotate(Vec::new()).nearest_by_distance(1.0), None);
    }

    #[test]
    fn test_time_sorted() {
        let mut points = line(3);
        assert!(annotate(points.clone()).is_time_sorted());
        points.swap(0, 2);
        assert!(!annotate(points).is_time_sorted());
    }
}
