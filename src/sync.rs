//! # Hover Sync
//!
//! Keeps the map cursor and the highlights on the elevation and pace charts
//! pointing at the same distance along the track while the pointer moves
//! over any of the three views.
//!
//! ## State machine
//!
//! - `Move { view, distance_mi }` → `Active`: the map cursor jumps to the
//!   trackpoint nearest that distance and every chart other than the source
//!   highlights its closest label within tolerance (or clears).
//! - `Leave` → `Idle`: cursor hidden, popup closed, both charts cleared.
//!   Leaving while already idle touches nothing.
//!
//! ## Re-entrancy
//!
//! Setting a highlight on a chart can synchronously fire that chart's own
//! hover callback, which lands back here. A single flag is held for the
//! duration of each transition's side effects; anything arriving while it
//! is held is dropped with [`SyncOutcome::Suppressed`]. The flag is an RAII
//! guard, so it is released on every exit path including unwinding.
//!
//! ## Lifecycle
//!
//! Charts are rebuilt on every route change. [`HoverSync::install_route`]
//! forces `Idle`, detaches and destroys the current charts and bumps the
//! generation; events from bindings of an older generation are dropped with
//! [`SyncOutcome::Stale`].
//!
//! Lifecycle calls hold the same flag as transitions, so callbacks fired
//! while a chart is destroyed are suppressed. A route install or clear
//! requested from inside a callback is queued and applied once the running
//! transition has finished.
//!
//! All state uses `Cell`/`RefCell`: the coordinator lives on a single UI
//! event loop and is shared with chart callbacks through `Rc`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{FixedOffset, Offset, Utc};
use log::{debug, info};
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::annotate::AnnotatedTrack;
use crate::charts::{closest_label_within, parse_label};
use crate::geo_utils::{meters_to_feet, TrackBounds};
use crate::spatial::{build_rtree, nearest_index, IndexedPoint};
use crate::splits::MileMarker;
use crate::GeoPoint;

/// Placeholder for popup values the trackpoint does not carry.
pub const NOT_AVAILABLE: &str = "n/a";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for hover synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum label distance (miles) for a chart highlight match.
    /// Default: 0.01
    pub label_tolerance_mi: f64,

    /// Offset from UTC used to render the popup time of day.
    /// Default: 0
    pub utc_offset_secs: i32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            label_tolerance_mi: 0.01,
            utc_offset_secs: 0,
        }
    }
}

// ============================================================================
// Collaborator seams
// ============================================================================

/// The mapping widget.
pub trait MapView {
    fn set_cursor(&mut self, latitude: f64, longitude: f64);
    fn hide_cursor(&mut self);
    fn show_popup(&mut self, popup: &Popup);
    fn close_popup(&mut self);
    fn add_mile_marker(&mut self, marker: &MileMarker);
    fn clear_mile_markers(&mut self);
    fn fit_bounds(&mut self, bounds: &TrackBounds);
}

/// A charting widget instance.
///
/// Implementations may call back into the coordinator from
/// `set_highlight`/`clear_highlight`; such calls are suppressed.
pub trait ChartView {
    /// x-axis labels, string-encoded miles
    fn labels(&self) -> &[String];
    fn set_highlight(&mut self, index: usize);
    fn clear_highlight(&mut self);
    /// Remove the mouse-leave handler attached to the drawing surface
    fn detach_leave_handler(&mut self);
    /// Tear down the chart instance
    fn destroy(&mut self);
}

// ============================================================================
// Messages
// ============================================================================

/// One of the three synchronized views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewId {
    Map,
    ElevationChart,
    PaceChart,
}

impl ViewId {
    fn chart_slot(self) -> Option<usize> {
        match self {
            ViewId::Map => None,
            ViewId::ElevationChart => Some(0),
            ViewId::PaceChart => Some(1),
        }
    }
}

const CHART_VIEWS: [ViewId; 2] = [ViewId::ElevationChart, ViewId::PaceChart];

/// Pointer event, already resolved to a distance along the track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HoverEvent {
    Move { view: ViewId, distance_mi: f64 },
    Leave { view: ViewId },
}

/// Current hover state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum HoverState {
    #[default]
    Idle,
    Active { distance_mi: f64, source: ViewId },
}

impl HoverState {
    pub fn active_distance_mi(&self) -> Option<f64> {
        match self {
            HoverState::Idle => None,
            HoverState::Active { distance_mi, .. } => Some(*distance_mi),
        }
    }
}

/// What a dispatched event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Side effects were applied
    Applied,
    /// Nothing to do (e.g. leave while idle, no track loaded)
    NoOp,
    /// Dropped because another transition was in progress
    Suppressed,
    /// Dropped because it came from a torn-down chart
    Stale,
}

/// Handle identifying a chart instance of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartBinding {
    pub view: ViewId,
    pub generation: u64,
}

/// Tooltip model delivered to an "external tooltip renderer" callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TooltipModel {
    /// 0 when the tooltip is hidden
    pub opacity: f64,
    /// Indices of the active data points
    pub data_indices: Vec<usize>,
}

// ============================================================================
// Popup
// ============================================================================

/// Cursor popup content as label/value lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Popup {
    pub latitude: f64,
    pub longitude: f64,
    pub lines: Vec<(String, String)>,
}

impl Popup {
    fn for_point(point: &GeoPoint, offset: &FixedOffset, with_distance: bool) -> Self {
        let mut lines = Vec::with_capacity(4);
        if with_distance {
            let distance = point.cumulative_distance_mi.unwrap_or(0.0);
            lines.push(("Distance".to_string(), format!("{:.2} mi", distance)));
        }

        let elevation = point
            .elevation_m
            .map(|m| format!("{:.0} ft", meters_to_feet(m)))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        lines.push(("Elevation".to_string(), elevation));

        let time = point
            .timestamp
            .with_timezone(offset)
            .format("%-I:%M:%S %p")
            .to_string();
        lines.push(("Time".to_string(), time));

        let heart_rate = point
            .heart_rate_bpm
            .map(|bpm| format!("{} bpm", bpm))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        lines.push(("Heart Rate".to_string(), heart_rate));

        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            lines,
        }
    }

    /// Value of the line with the given label.
    pub fn value(&self, label: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    /// Plain text, one `Label: value` per line.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|(label, value)| format!("{}: {}", label, value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// HTML fragment with every label and value escaped.
    pub fn to_html(&self) -> String {
        self.lines
            .iter()
            .map(|(label, value)| {
                format!("<b>{}:</b> {}", escape_html(label), escape_html(value))
            })
            .collect::<Vec<_>>()
            .join("<br>")
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Re-entrancy guard
// ============================================================================

/// Holds the syncing flag for the lifetime of the value.
struct SyncGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.get() {
            return None;
        }
        flag.set(true);
        Some(Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Lifecycle work requested while a transition was running.
enum Deferred {
    Install {
        track: Rc<AnnotatedTrack>,
        markers: Vec<MileMarker>,
        bounds: Option<TrackBounds>,
    },
    Clear,
}

/// The hover coordinator. One instance per display session.
pub struct HoverSync {
    config: SyncConfig,
    offset: FixedOffset,
    syncing: Cell<bool>,
    state: Cell<HoverState>,
    generation: Cell<u64>,
    track: RefCell<Option<Rc<AnnotatedTrack>>>,
    spatial: RefCell<RTree<IndexedPoint>>,
    map: RefCell<Box<dyn MapView>>,
    charts: RefCell<[Option<Box<dyn ChartView>>; 2]>,
    deferred: RefCell<VecDeque<Deferred>>,
}

impl HoverSync {
    pub fn new(map: Box<dyn MapView>, config: SyncConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_secs)
            .unwrap_or_else(|| Utc.fix());
        Self {
            config,
            offset,
            syncing: Cell::new(false),
            state: Cell::new(HoverState::Idle),
            generation: Cell::new(0),
            track: RefCell::new(None),
            spatial: RefCell::new(RTree::new()),
            map: RefCell::new(map),
            charts: RefCell::new([None, None]),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    pub fn state(&self) -> HoverState {
        self.state.get()
    }

    /// True while a transition's side effects are running.
    pub fn is_syncing(&self) -> bool {
        self.syncing.get()
    }

    /// Generation of the currently attached charts.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn track(&self) -> Option<Rc<AnnotatedTrack>> {
        self.track.borrow().clone()
    }

    pub fn has_chart(&self, view: ViewId) -> bool {
        view.chart_slot()
            .is_some_and(|slot| self.charts.borrow()[slot].is_some())
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Run one transition. The single entry point for every view.
    pub fn dispatch(&self, event: HoverEvent) -> SyncOutcome {
        let outcome = {
            let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
                debug!("[HoverSync] Suppressed re-entrant {:?}", event);
                return SyncOutcome::Suppressed;
            };

            match event {
                HoverEvent::Leave { .. } => self.enter_idle(),
                HoverEvent::Move { view, distance_mi } => self.enter_active(view, distance_mi),
            }
        };
        self.run_deferred();
        outcome
    }

    fn enter_idle(&self) -> SyncOutcome {
        if self.state.get() == HoverState::Idle {
            return SyncOutcome::NoOp;
        }
        self.state.set(HoverState::Idle);

        {
            let mut map = self.map.borrow_mut();
            map.hide_cursor();
            map.close_popup();
        }
        for chart in self.charts.borrow_mut().iter_mut().flatten() {
            chart.clear_highlight();
        }
        SyncOutcome::Applied
    }

    fn enter_active(&self, source: ViewId, distance_mi: f64) -> SyncOutcome {
        if !distance_mi.is_finite() {
            return SyncOutcome::NoOp;
        }
        let Some(track) = self.track() else {
            return SyncOutcome::NoOp;
        };
        let Some(index) = track.nearest_by_distance(distance_mi) else {
            return SyncOutcome::NoOp;
        };
        let Some(point) = track.get(index) else {
            return SyncOutcome::NoOp;
        };

        self.state.set(HoverState::Active {
            distance_mi,
            source,
        });

        let popup = Popup::for_point(point, &self.offset, source == ViewId::Map);
        {
            let mut map = self.map.borrow_mut();
            map.set_cursor(point.latitude, point.longitude);
            map.show_popup(&popup);
        }

        let mut charts = self.charts.borrow_mut();
        for (slot, view) in CHART_VIEWS.iter().enumerate() {
            if *view == source {
                continue;
            }
            let Some(chart) = charts[slot].as_mut() else {
                continue;
            };
            let matched =
                closest_label_within(chart.labels(), distance_mi, self.config.label_tolerance_mi);
            match matched {
                Some(i) => chart.set_highlight(i),
                None => chart.clear_highlight(),
            }
        }
        SyncOutcome::Applied
    }

    // ------------------------------------------------------------------------
    // Boundary adapters
    // ------------------------------------------------------------------------

    /// Pointer over `index` of a chart: resolve the label and move there.
    pub fn chart_pointer(&self, binding: ChartBinding, index: usize) -> SyncOutcome {
        if self.syncing.get() {
            debug!("[HoverSync] Suppressed re-entrant pointer on {:?}", binding.view);
            return SyncOutcome::Suppressed;
        }
        if !self.is_live(binding) {
            return self.stale(binding);
        }

        let distance = {
            let charts = self.charts.borrow();
            binding
                .view
                .chart_slot()
                .and_then(|slot| charts[slot].as_ref())
                .and_then(|chart| chart.labels().get(index).and_then(|l| parse_label(l)))
        };

        match distance {
            Some(distance_mi) => self.dispatch(HoverEvent::Move {
                view: binding.view,
                distance_mi,
            }),
            None => SyncOutcome::NoOp,
        }
    }

    /// Pointer left a chart's drawing surface.
    pub fn chart_left(&self, binding: ChartBinding) -> SyncOutcome {
        if self.syncing.get() {
            return SyncOutcome::Suppressed;
        }
        if !self.is_live(binding) {
            return self.stale(binding);
        }
        self.dispatch(HoverEvent::Leave { view: binding.view })
    }

    /// Adapter for charts that report hover through an external tooltip
    /// renderer. A hidden tooltip or one without data points means leave.
    pub fn tooltip_external(&self, binding: ChartBinding, tooltip: &TooltipModel) -> SyncOutcome {
        match tooltip.data_indices.first() {
            Some(&index) if tooltip.opacity > 0.0 => self.chart_pointer(binding, index),
            _ => self.chart_left(binding),
        }
    }

    /// Adapter for charts that report hover through an on-hover event with
    /// the list of active element indices.
    pub fn on_hover(&self, binding: ChartBinding, active: &[usize]) -> SyncOutcome {
        match active.first() {
            Some(&index) => self.chart_pointer(binding, index),
            None => self.chart_left(binding),
        }
    }

    /// Pointer over the map: snap to the nearest trackpoint.
    pub fn map_pointer(&self, latitude: f64, longitude: f64) -> SyncOutcome {
        if self.syncing.get() {
            return SyncOutcome::Suppressed;
        }
        let index = nearest_index(&self.spatial.borrow(), latitude, longitude);
        let distance = index.and_then(|i| self.track().and_then(|t| t.distance_at(i)));

        match distance {
            Some(distance_mi) => self.dispatch(HoverEvent::Move {
                view: ViewId::Map,
                distance_mi,
            }),
            None => SyncOutcome::NoOp,
        }
    }

    /// Pointer left the map (or pressed on it).
    pub fn map_left(&self) -> SyncOutcome {
        self.dispatch(HoverEvent::Leave { view: ViewId::Map })
    }

    fn is_live(&self, binding: ChartBinding) -> bool {
        binding.generation == self.generation.get() && self.has_chart(binding.view)
    }

    fn stale(&self, binding: ChartBinding) -> SyncOutcome {
        debug!(
            "[HoverSync] Dropped event from {:?} generation {} (current {})",
            binding.view,
            binding.generation,
            self.generation.get()
        );
        SyncOutcome::Stale
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Swap in a new route: force idle, tear the charts down, and render the
    /// route's markers and bounds on the map.
    ///
    /// Called from inside a collaborator callback, the install is queued and
    /// runs when the current transition finishes.
    pub fn install_route(
        &self,
        track: Rc<AnnotatedTrack>,
        markers: &[MileMarker],
        bounds: Option<TrackBounds>,
    ) {
        let installed = match SyncGuard::acquire(&self.syncing) {
            Some(_guard) => {
                self.apply_install(track, markers, bounds);
                true
            }
            None => {
                self.defer(Deferred::Install {
                    track,
                    markers: markers.to_vec(),
                    bounds,
                });
                false
            }
        };
        if installed {
            self.run_deferred();
        }
    }

    /// Attach freshly built charts, replacing any current ones.
    ///
    /// Returns `None`, dropping the charts, when called from inside a
    /// collaborator callback.
    pub fn attach_charts(
        &self,
        elevation: Box<dyn ChartView>,
        pace: Box<dyn ChartView>,
    ) -> Option<(ChartBinding, ChartBinding)> {
        let bindings = {
            let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
                debug!("[HoverSync] Rejected chart attach during a transition");
                return None;
            };

            if self.has_chart(ViewId::ElevationChart) || self.has_chart(ViewId::PaceChart) {
                self.enter_idle();
                self.teardown_charts();
            }

            *self.charts.borrow_mut() = [Some(elevation), Some(pace)];
            let generation = self.generation.get();
            (
                ChartBinding {
                    view: ViewId::ElevationChart,
                    generation,
                },
                ChartBinding {
                    view: ViewId::PaceChart,
                    generation,
                },
            )
        };
        self.run_deferred();
        Some(bindings)
    }

    /// Drop everything: no route, no charts, cursor hidden.
    ///
    /// Queued like [`HoverSync::install_route`] when called from a callback.
    pub fn clear(&self) {
        let cleared = match SyncGuard::acquire(&self.syncing) {
            Some(_guard) => {
                self.apply_clear();
                true
            }
            None => {
                self.defer(Deferred::Clear);
                false
            }
        };
        if cleared {
            self.run_deferred();
        }
    }

    /// Number of lifecycle calls waiting for the current transition to end.
    pub fn pending_lifecycle(&self) -> usize {
        self.deferred.borrow().len()
    }

    fn defer(&self, work: Deferred) {
        debug!("[HoverSync] Deferring lifecycle call until the current transition ends");
        self.deferred.borrow_mut().push_back(work);
    }

    fn run_deferred(&self) {
        loop {
            let next = self.deferred.borrow_mut().pop_front();
            let Some(work) = next else {
                return;
            };
            let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
                // The outer transition drains the queue when it ends
                self.deferred.borrow_mut().push_front(work);
                return;
            };
            match work {
                Deferred::Install {
                    track,
                    markers,
                    bounds,
                } => self.apply_install(track, &markers, bounds),
                Deferred::Clear => self.apply_clear(),
            }
        }
    }

    // Callers hold the sync guard.
    fn apply_install(
        &self,
        track: Rc<AnnotatedTrack>,
        markers: &[MileMarker],
        bounds: Option<TrackBounds>,
    ) {
        self.enter_idle();
        self.teardown_charts();

        *self.spatial.borrow_mut() = build_rtree(track.points());
        let point_count = track.len();
        *self.track.borrow_mut() = Some(track);

        {
            let mut map = self.map.borrow_mut();
            map.clear_mile_markers();
            for marker in markers {
                map.add_mile_marker(marker);
            }
            if let Some(bounds) = bounds {
                map.fit_bounds(&bounds);
            }
        }

        info!(
            "[HoverSync] Installed route: {} points, {} mile markers, generation {}",
            point_count,
            markers.len(),
            self.generation.get()
        );
    }

    fn apply_clear(&self) {
        self.enter_idle();
        self.teardown_charts();
        *self.track.borrow_mut() = None;
        *self.spatial.borrow_mut() = RTree::new();
        self.map.borrow_mut().clear_mile_markers();
    }

    /// Take both charts out, bump the generation so bindings handed out
    /// earlier go stale, then detach handlers and destroy the instances.
    /// No borrow is held while the charts run their teardown.
    fn teardown_charts(&self) {
        let detached: Vec<Box<dyn ChartView>> = self
            .charts
            .borrow_mut()
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        self.generation.set(self.generation.get() + 1);

        for mut chart in detached {
            chart.detach_leave_handler();
            chart.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_guard_released_on_drop() {
        let flag = Cell::new(false);
        {
            let guard = SyncGuard::acquire(&flag);
            assert!(guard.is_some());
            assert!(flag.get());
            assert!(SyncGuard::acquire(&flag).is_none());
        }
        assert!(!flag.get());
    }

    #[test]
    fn test_guard_released_on_unwind() {
        let flag = Cell::new(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = SyncGuard::acquire(&flag);
            panic!("collaborator failed");
        }));
        assert!(result.is_err());
        assert!(!flag.get());
    }

    #[test]
    fn test_popup_content() {
        let t = Utc.with_ymd_and_hms(2024, 5, 4, 14, 5, 9).unwrap();
        let mut point = GeoPoint::new(44.8765, -91.9207, t).with_elevation(250.0);
        point.cumulative_distance_mi = Some(1.234);

        let utc = FixedOffset::east_opt(0).unwrap();
        let popup = Popup::for_point(&point, &utc, false);
        assert_eq!(popup.value("Elevation"), Some("820 ft"));
        assert_eq!(popup.value("Time"), Some("2:05:09 PM"));
        assert_eq!(popup.value("Heart Rate"), Some(NOT_AVAILABLE));
        assert_eq!(popup.value("Distance"), None);

        let cdt = FixedOffset::west_opt(5 * 3600).unwrap();
        let popup = Popup::for_point(&point.clone().with_heart_rate(151), &cdt, true);
        assert_eq!(popup.value("Time"), Some("9:05:09 AM"));
        assert_eq!(popup.value("Heart Rate"), Some("151 bpm"));
        assert_eq!(popup.value("Distance"), Some("1.23 mi"));
        assert_eq!(popup.lines[0].0, "Distance");
    }

    #[test]
    fn test_popup_html_escaped() {
        let popup = Popup {
            latitude: 0.0,
            longitude: 0.0,
            lines: vec![("Note".to_string(), "<script>&\"'".to_string())],
        };
        assert_eq!(
            popup.to_html(),
            "<b>Note:</b> &lt;script&gt;&amp;&quot;&#39;"
        );
        assert_eq!(popup.text(), "Note: <script>&\"'");
    }

    #[test]
    fn test_hover_state_distance() {
        assert_eq!(HoverState::Idle.active_distance_mi(), None);
        let active = HoverState::Active {
            distance_mi: 2.0,
            source: ViewId::Map,
        };
        assert_eq!(active.active_distance_mi(), Some(2.0));
    }
}
