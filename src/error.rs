//! Unified error handling for the track-sync library.
//!
//! Aggregation, smoothing and hover transitions are total and never return
//! errors; this type covers the edges of the crate: payload normalization,
//! configuration, and the route loading lifecycle.

use std::fmt;

/// Unified error type for track-sync operations.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackError {
    /// Track has insufficient points for the requested operation
    InsufficientPoints {
        route_id: String,
        point_count: usize,
        minimum_required: usize,
    },
    /// Payload does not have the expected feature collection shape
    MalformedPayload { message: String },
    /// A load finished after a newer route was requested
    StaleResult { requested: u64, current: u64 },
    /// The loading layer failed to deliver a payload
    Fetch { message: String },
    /// Configuration error
    ConfigError { message: String },
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackError::InsufficientPoints {
                route_id,
                point_count,
                minimum_required,
            } => {
                write!(
                    f,
                    "Route '{}' has {} points, minimum {} required",
                    route_id, point_count, minimum_required
                )
            }
            TrackError::MalformedPayload { message } => {
                write!(f, "Malformed payload: {}", message)
            }
            TrackError::StaleResult { requested, current } => {
                write!(
                    f,
                    "Stale load result for generation {} (current is {})",
                    requested, current
                )
            }
            TrackError::Fetch { message } => {
                write!(f, "Fetch failed: {}", message)
            }
            TrackError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for TrackError {}

impl From<serde_json::Error> for TrackError {
    fn from(err: serde_json::Error) -> Self {
        TrackError::MalformedPayload {
            message: err.to_string(),
        }
    }
}

/// Result type alias for track-sync operations.
pub type Result<T> = std::result::Result<T, TrackError>;

/// Extension trait for converting Option to TrackError.
pub trait OptionExt<T> {
    /// Convert Option to Result with insufficient points error.
    fn ok_or_insufficient_points(
        self,
        route_id: &str,
        point_count: usize,
        minimum: usize,
    ) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_points(
        self,
        route_id: &str,
        point_count: usize,
        minimum: usize,
    ) -> Result<T> {
        self.ok_or_else(|| TrackError::InsufficientPoints {
            route_id: route_id.to_string(),
            point_count,
            minimum_required: minimum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackError::InsufficientPoints {
            route_id: "menomonie".to_string(),
            point_count: 1,
            minimum_required: 2,
        };
        assert!(err.to_string().contains("menomonie"));
        assert!(err.to_string().contains("1 points"));

        let stale = TrackError::StaleResult {
            requested: 3,
            current: 4,
        };
        assert!(stale.to_string().contains("generation 3"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_insufficient_points("test", 0, 2);
        assert!(matches!(
            result,
            Err(TrackError::InsufficientPoints { .. })
        ));

        let some = Some(5).ok_or_insufficient_points("test", 3, 2);
        assert_eq!(some, Ok(5));
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let converted: TrackError = err.into();
        assert!(matches!(converted, TrackError::MalformedPayload { .. }));
    }
}
