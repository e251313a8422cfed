//! Chart series for the elevation chart and the pace chart.
//!
//! Both charts share a distance x-axis encoded as string labels (miles,
//! two decimals). The hover coordinator maps between charts through these
//! labels, so [`parse_label`] and [`closest_label_within`] live here too.

use serde::{Deserialize, Serialize};

use crate::annotate::AnnotatedTrack;
use crate::geo_utils::meters_to_feet;
use crate::pace::PaceSeries;

/// A `(labels, values)` pair handed to a charting collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    /// Distance along the track in miles, two decimals
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    /// Upper bound for the x-axis, when the chart should be pinned
    pub x_max: Option<f64>,
}

impl ChartSeries {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Format a distance as an x-axis label.
pub fn distance_label(distance_mi: f64) -> String {
    format!("{:.2}", distance_mi)
}

/// Parse an x-axis label back into miles.
pub fn parse_label(label: &str) -> Option<f64> {
    label.trim().parse::<f64>().ok().filter(|d| d.is_finite())
}

/// Index of the label closest to `distance_mi` among those strictly within
/// `tolerance`. Ties resolve to the first occurrence.
pub fn closest_label_within<S: AsRef<str>>(
    labels: &[S],
    distance_mi: f64,
    tolerance: f64,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, label) in labels.iter().enumerate() {
        let Some(value) = parse_label(label.as_ref()) else {
            continue;
        };
        let delta = (value - distance_mi).abs();
        if delta >= tolerance {
            continue;
        }
        match best {
            Some((_, best_delta)) if delta >= best_delta => {}
            _ => best = Some((i, delta)),
        }
    }
    best.map(|(i, _)| i)
}

/// Elevation (ft) against distance, one entry per point after the first.
/// Points without elevation are left out.
pub fn elevation_series(track: &AnnotatedTrack) -> ChartSeries {
    let mut labels = Vec::with_capacity(track.len());
    let mut values = Vec::with_capacity(track.len());

    for point in track.points().iter().skip(1) {
        let Some(elevation_m) = point.elevation_m else {
            continue;
        };
        labels.push(distance_label(point.cumulative_distance_mi.unwrap_or(0.0)));
        values.push(meters_to_feet(elevation_m));
    }

    ChartSeries {
        name: "Elevation (ft)".to_string(),
        labels,
        values,
        x_max: Some(track.total_distance_mi().round()),
    }
}

/// Smoothed pace (min/mi) against distance.
pub fn pace_chart_series(pace: &PaceSeries) -> ChartSeries {
    ChartSeries {
        name: "Pace (min/mi)".to_string(),
        labels: pace
            .raw
            .iter()
            .map(|s| distance_label(s.cumulative_distance_mi))
            .collect(),
        values: pace.smoothed.iter().map(|s| s.pace_min_per_mi).collect(),
        x_max: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pace::{build_pace_series, PaceConfig};
    use crate::{annotate, GeoPoint};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_closest_label_within() {
        let labels = ["0.00", "0.98", "0.99", "1.00", "1.01", "2.00"];
        assert_eq!(closest_label_within(&labels, 1.0, 0.01), Some(3));
        assert_eq!(closest_label_within(&labels, 1.004, 0.01), Some(3));
        assert_eq!(closest_label_within(&labels, 1.5, 0.01), None);
        assert_eq!(closest_label_within(&["x", "2.00"], 2.0, 0.01), Some(1));
        let empty: [&str; 0] = [];
        assert_eq!(closest_label_within(&empty, 1.0, 0.01), None);
    }

    #[test]
    fn test_closest_label_ties_first() {
        let labels = vec!["1.00".to_string(), "1.00".to_string()];
        assert_eq!(closest_label_within(&labels, 1.0, 0.01), Some(0));
    }

    #[test]
    fn test_elevation_series() {
        let start = Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap();
        let track = annotate(vec![
            GeoPoint::new(44.00, -91.0, start).with_elevation(100.0),
            GeoPoint::new(44.01, -91.0, start + Duration::seconds(300)).with_elevation(110.0),
            GeoPoint::new(44.02, -91.0, start + Duration::seconds(600)),
            GeoPoint::new(44.03, -91.0, start + Duration::seconds(900)).with_elevation(90.0),
        ]);
        let series = elevation_series(&track);

        assert_eq!(series.len(), 2);
        assert_eq!(series.labels[0], distance_label(track.distance_at(1).unwrap()));
        assert!((series.values[1] - 90.0 * 3.28084).abs() < 1e-9);
        assert_eq!(series.x_max, Some(track.total_distance_mi().round()));
    }

    #[test]
    fn test_pace_chart_series_aligned() {
        let start = Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap();
        let points = (0..30)
            .map(|i| GeoPoint::new(44.0 + i as f64 * 0.0003, -91.0, start + Duration::seconds(i * 10)))
            .collect();
        let pace = build_pace_series(&annotate(points), &PaceConfig::default());
        let series = pace_chart_series(&pace);

        assert_eq!(series.labels.len(), pace.raw.len());
        assert_eq!(series.values.len(), pace.smoothed.len());
        assert_eq!(series.values[0], pace.raw[0].pace_min_per_mi);
    }
}
