//! Recording map and chart collaborators shared by the scenario tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{Duration, TimeZone, Utc};
use track_sync::geo_utils::{haversine_km_raw, KM_PER_MILE};
use track_sync::splits::MileMarker;
use track_sync::{annotate, AnnotatedTrack, ChartView, GeoPoint, MapView, Popup, TrackBounds};

#[derive(Debug, Clone, PartialEq)]
pub enum MapCall {
    SetCursor(f64, f64),
    HideCursor,
    ShowPopup(Popup),
    ClosePopup,
    AddMarker(u32),
    ClearMarkers,
    FitBounds,
}

pub type MapLog = Rc<RefCell<Vec<MapCall>>>;

pub struct RecordingMap {
    pub log: MapLog,
}

impl RecordingMap {
    pub fn new() -> (Self, MapLog) {
        let log: MapLog = Rc::new(RefCell::new(Vec::new()));
        (Self { log: Rc::clone(&log) }, log)
    }
}

impl MapView for RecordingMap {
    fn set_cursor(&mut self, latitude: f64, longitude: f64) {
        self.log.borrow_mut().push(MapCall::SetCursor(latitude, longitude));
    }
    fn hide_cursor(&mut self) {
        self.log.borrow_mut().push(MapCall::HideCursor);
    }
    fn show_popup(&mut self, popup: &Popup) {
        self.log.borrow_mut().push(MapCall::ShowPopup(popup.clone()));
    }
    fn close_popup(&mut self) {
        self.log.borrow_mut().push(MapCall::ClosePopup);
    }
    fn add_mile_marker(&mut self, marker: &MileMarker) {
        self.log.borrow_mut().push(MapCall::AddMarker(marker.mile_number));
    }
    fn clear_mile_markers(&mut self) {
        self.log.borrow_mut().push(MapCall::ClearMarkers);
    }
    fn fit_bounds(&mut self, _bounds: &TrackBounds) {
        self.log.borrow_mut().push(MapCall::FitBounds);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartCall {
    Highlight(usize),
    Clear,
    DetachLeave,
    Destroy,
}

pub type ChartLog = Rc<RefCell<Vec<ChartCall>>>;
pub type HighlightHook = Box<dyn Fn(usize)>;
pub type DestroyHook = Box<dyn Fn()>;

pub struct RecordingChart {
    pub labels: Vec<String>,
    pub log: ChartLog,
    /// Called from inside `set_highlight`, simulating a chart library that
    /// fires its own hover callback when the active element changes
    pub on_highlight: Option<HighlightHook>,
    /// Called from inside `destroy`, like a library that hides its tooltip
    /// through the external renderer on teardown
    pub on_destroy: Option<DestroyHook>,
}

impl RecordingChart {
    pub fn new(labels: &[&str]) -> (Self, ChartLog) {
        let log: ChartLog = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                labels: labels.iter().map(|l| l.to_string()).collect(),
                log: Rc::clone(&log),
                on_highlight: None,
                on_destroy: None,
            },
            log,
        )
    }

    pub fn with_hook(mut self, hook: HighlightHook) -> Self {
        self.on_highlight = Some(hook);
        self
    }

    pub fn with_destroy_hook(mut self, hook: DestroyHook) -> Self {
        self.on_destroy = Some(hook);
        self
    }
}

impl ChartView for RecordingChart {
    fn labels(&self) -> &[String] {
        &self.labels
    }
    fn set_highlight(&mut self, index: usize) {
        self.log.borrow_mut().push(ChartCall::Highlight(index));
        if let Some(hook) = &self.on_highlight {
            hook(index);
        }
    }
    fn clear_highlight(&mut self) {
        self.log.borrow_mut().push(ChartCall::Clear);
    }
    fn detach_leave_handler(&mut self) {
        self.log.borrow_mut().push(ChartCall::DetachLeave);
    }
    fn destroy(&mut self) {
        self.log.borrow_mut().push(ChartCall::Destroy);
        if let Some(hook) = &self.on_destroy {
            hook();
        }
    }
}

/// Track due north along a meridian with points at the given mile marks.
pub fn track_at_miles(miles: &[f64]) -> Rc<AnnotatedTrack> {
    let start = Utc.with_ymd_and_hms(2024, 5, 4, 14, 0, 0).unwrap();
    let km_per_deg = haversine_km_raw(0.0, 0.0, 1.0, 0.0);
    let points = miles
        .iter()
        .enumerate()
        .map(|(i, mi)| {
            GeoPoint::new(44.0 + mi * KM_PER_MILE / km_per_deg, -91.9, start + Duration::seconds(i as i64 * 480))
                .with_elevation(250.0 + i as f64 * 10.0)
        })
        .collect();
    Rc::new(annotate(points))
}
