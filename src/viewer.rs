//! # Route Viewer
//!
//! The display session for one route at a time. It fetches both payloads
//! of a route, builds every derived view from the points, and re-arms the
//! hover coordinator.
//!
//! Loads are identified by a generation number. Selecting a new route bumps
//! the generation, so a fetch for an earlier selection that resolves late is
//! recognised and discarded instead of replacing the newer route.

use std::rc::Rc;

use log::{debug, info, warn};

use crate::annotate::{annotate, AnnotatedTrack};
use crate::charts::{elevation_series, pace_chart_series, ChartSeries};
use crate::error::{OptionExt, Result, TrackError};
use crate::geo_utils::TrackBounds;
use crate::metrics::{aggregate, TrackMetrics, TrackSummary};
use crate::pace::{build_pace_series, PaceSeries};
use crate::payload::{normalize_points, PointCollection, RoutePayload};
use crate::splits::{mile_markers, segment_miles, MileMarker, MileSplit};
use crate::sync::{HoverSync, MapView};
use crate::TrackConfig;

/// The loading layer: fetches the two payloads of a route.
#[allow(async_fn_in_trait)]
pub trait RouteSource {
    /// Line geometry feature collection
    async fn fetch_line(&self, route_id: &str) -> Result<serde_json::Value>;
    /// Trackpoint feature collection
    async fn fetch_points(&self, route_id: &str) -> Result<serde_json::Value>;
}

/// Fetch both payloads of a route. Completes only when both have arrived;
/// fails as soon as either fails.
pub async fn fetch_route<S: RouteSource>(source: &S, route_id: &str) -> Result<RoutePayload> {
    let (line, points) =
        futures::try_join!(source.fetch_line(route_id), source.fetch_points(route_id))?;

    Ok(RoutePayload {
        line,
        points: PointCollection::from_value(points)?,
    })
}

/// Identifies one load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub route_id: String,
    pub generation: u64,
}

/// Everything derived from one route's points.
#[derive(Debug, Clone)]
pub struct RouteSession {
    pub route_id: String,
    pub generation: u64,
    /// Line geometry, passed through to the map untouched
    pub line: serde_json::Value,
    pub track: Rc<AnnotatedTrack>,
    pub metrics: Option<TrackMetrics>,
    pub summary: TrackSummary,
    pub pace: PaceSeries,
    pub splits: Vec<MileSplit>,
    pub markers: Vec<MileMarker>,
    pub bounds: Option<TrackBounds>,
    pub elevation_chart: ChartSeries,
    pub pace_chart: ChartSeries,
}

impl RouteSession {
    /// Build every derived view from a payload.
    pub fn build(ticket: &LoadTicket, payload: RoutePayload, config: &TrackConfig) -> Self {
        let points = normalize_points(&payload.points);
        let track = annotate(points);
        if !track.is_time_sorted() {
            warn!(
                "[RouteViewer] Route '{}' has out-of-order timestamps; derived pace and splits are unreliable",
                ticket.route_id
            );
        }

        let metrics = aggregate(&track);
        let pace = build_pace_series(&track, &config.pace);
        let splits = segment_miles(&track);
        let markers = mile_markers(&track, &splits);

        Self {
            route_id: ticket.route_id.clone(),
            generation: ticket.generation,
            line: payload.line,
            summary: TrackSummary::new(metrics.as_ref()),
            metrics,
            elevation_chart: elevation_series(&track),
            pace_chart: pace_chart_series(&pace),
            bounds: TrackBounds::from_points(track.points()),
            pace,
            splits,
            markers,
            track: Rc::new(track),
        }
    }

    /// Metrics, or `InsufficientPoints` for callers that cannot show "--".
    pub fn require_metrics(&self) -> Result<&TrackMetrics> {
        self.metrics
            .as_ref()
            .ok_or_insufficient_points(&self.route_id, self.track.len(), 2)
    }
}

/// Owns the live route and the hover coordinator.
pub struct RouteViewer {
    config: TrackConfig,
    sync: Rc<HoverSync>,
    generation: u64,
    session: Option<RouteSession>,
}

impl RouteViewer {
    /// Create a viewer drawing on `map`. Fails on invalid configuration.
    pub fn new(map: Box<dyn MapView>, config: TrackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sync: Rc::new(HoverSync::new(map, config.sync.clone())),
            config,
            generation: 0,
            session: None,
        })
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    /// The coordinator, for wiring chart and map callbacks.
    pub fn sync(&self) -> Rc<HoverSync> {
        Rc::clone(&self.sync)
    }

    pub fn session(&self) -> Option<&RouteSession> {
        self.session.as_ref()
    }

    /// Generation of the most recent load request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start loading `route_id`. Any load still in flight becomes stale.
    pub fn begin_load(&mut self, route_id: &str) -> LoadTicket {
        self.generation += 1;
        debug!(
            "[RouteViewer] Loading route '{}' (generation {})",
            route_id, self.generation
        );
        LoadTicket {
            route_id: route_id.to_string(),
            generation: self.generation,
        }
    }

    fn check_current(&self, ticket: &LoadTicket) -> Result<()> {
        if ticket.generation != self.generation {
            debug!(
                "[RouteViewer] Discarding late result for '{}' (generation {}, current {})",
                ticket.route_id, ticket.generation, self.generation
            );
            return Err(TrackError::StaleResult {
                requested: ticket.generation,
                current: self.generation,
            });
        }
        Ok(())
    }

    /// Apply a finished load. Stale tickets are rejected without touching
    /// the live route.
    pub fn complete_load(&mut self, ticket: &LoadTicket, payload: RoutePayload) -> Result<&RouteSession> {
        self.check_current(ticket)?;

        let session = RouteSession::build(ticket, payload, &self.config);
        self.sync.install_route(
            Rc::clone(&session.track),
            &session.markers,
            session.bounds,
        );

        info!(
            "[RouteViewer] Route '{}' ready: {} points, {} pace samples, {} splits, distance {} mi",
            session.route_id,
            session.track.len(),
            session.pace.len(),
            session.splits.len(),
            session.summary.distance
        );

        Ok(self.session.insert(session))
    }

    /// Record a failed load. The current route is replaced by "no data";
    /// stale failures are rejected like stale results.
    pub fn fail_load(&mut self, ticket: &LoadTicket, error: &TrackError) -> Result<()> {
        self.check_current(ticket)?;
        warn!(
            "[RouteViewer] Route '{}' unavailable: {}",
            ticket.route_id, error
        );
        self.session = None;
        self.sync.clear();
        Ok(())
    }

    /// Fetch and apply a route in one step.
    ///
    /// Returns `Ok(None)` when the fetch failed and the viewer now shows no
    /// data.
    ///
    /// The viewer stays mutably borrowed across the fetch, so no other route
    /// can be selected meanwhile. Callers that let the user switch routes
    /// mid-fetch use [`RouteViewer::begin_load`] and
    /// [`RouteViewer::complete_load`] (or [`RouteViewer::fail_load`]) around
    /// their own [`fetch_route`], which is where late results are rejected.
    pub async fn load_route<S: RouteSource>(
        &mut self,
        source: &S,
        route_id: &str,
    ) -> Result<Option<&RouteSession>> {
        let ticket = self.begin_load(route_id);
        match fetch_route(source, route_id).await {
            Ok(payload) => self.complete_load(&ticket, payload).map(Some),
            Err(err) => {
                self.fail_load(&ticket, &err)?;
                Ok(None)
            }
        }
    }
}
