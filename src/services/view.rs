//! Position views - where refresh results are rendered
//!
//! `PositionView` is the seam between the refresh cycle and whatever shows
//! the position: the terminal dashboard, the headless log, or a test double.

use crate::domain::notification::{Notification, NotificationLevel};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Maximum toasts kept on screen at once
const MAX_TOASTS: usize = 5;

/// A point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Longitude/latitude bounds visible at `zoom` when centred on `center`
///
/// Zoom 2 shows the whole world; each further level halves both spans.
/// The window is shifted, not shrunk, to stay inside the world.
pub fn viewport(center: GeoPoint, zoom: u8) -> ([f64; 2], [f64; 2]) {
    let scale = 2f64.powi(i32::from(zoom.saturating_sub(2)));
    let lon_span = 360.0 / scale;
    let lat_span = 180.0 / scale;
    (
        clamp_window(center.longitude, lon_span, -180.0, 180.0),
        clamp_window(center.latitude, lat_span, -90.0, 90.0),
    )
}

fn clamp_window(center: f64, span: f64, min: f64, max: f64) -> [f64; 2] {
    let half = span / 2.0;
    let lo = (center - half).max(min);
    let hi = (lo + span).min(max);
    [hi - span, hi]
}

/// Everything a view needs to render one successful reading
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub latitude_text: String,
    pub longitude_text: String,
    pub timestamp_text: String,
    /// Marker position; the view also recentres here
    pub marker: GeoPoint,
    pub zoom: u8,
    pub popup: Option<String>,
}

pub trait PositionView: Send + Sync {
    fn set_loading(&self, active: bool);

    /// Move the marker, recentre the map and write the readouts
    fn show_position(&self, update: &PositionUpdate);

    fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub notification: Notification,
    pub shown_at: Instant,
}

/// Map and readout state of the dashboard
#[derive(Debug)]
pub struct DashboardState {
    pub loading: bool,
    pub marker: GeoPoint,
    pub center: GeoPoint,
    pub zoom: u8,
    pub popup: Option<String>,
    pub latitude_text: String,
    pub longitude_text: String,
    pub timestamp_text: String,
    pub toasts: VecDeque<Toast>,
    pub updates: u64,
    pub last_update: Option<Instant>,
    toast_ttl: Duration,
}

impl DashboardState {
    /// Map starts centred on the equator with the marker at 0,0
    pub fn new(zoom: u8, toast_ttl: Duration) -> Self {
        Self {
            loading: false,
            marker: GeoPoint::default(),
            center: GeoPoint::default(),
            zoom,
            popup: None,
            latitude_text: String::new(),
            longitude_text: String::new(),
            timestamp_text: String::new(),
            toasts: VecDeque::new(),
            updates: 0,
            last_update: None,
            toast_ttl,
        }
    }

    fn apply(&mut self, update: &PositionUpdate) {
        self.marker = update.marker;
        self.center = update.marker;
        self.zoom = update.zoom;
        self.popup = update.popup.clone();
        self.latitude_text = update.latitude_text.clone();
        self.longitude_text = update.longitude_text.clone();
        self.timestamp_text = update.timestamp_text.clone();
        self.updates += 1;
        self.last_update = Some(Instant::now());
    }

    fn push_toast(&mut self, notification: Notification) {
        self.toasts.push_back(Toast { notification, shown_at: Instant::now() });
        while self.toasts.len() > MAX_TOASTS {
            self.toasts.pop_front();
        }
    }

    pub fn zoom_in(&mut self, max_zoom: u8) {
        self.zoom = (self.zoom + 1).min(max_zoom);
    }

    pub fn zoom_out(&mut self) {
        self.zoom = self.zoom.saturating_sub(1).max(2);
    }

    /// Drop toasts older than the display duration
    pub fn prune_toasts(&mut self, now: Instant) {
        let ttl = self.toast_ttl;
        self.toasts.retain(|t| now.saturating_duration_since(t.shown_at) < ttl);
    }

    pub fn visible_toasts(&self, now: Instant) -> impl Iterator<Item = &Notification> {
        let ttl = self.toast_ttl;
        self.toasts
            .iter()
            .filter(move |t| now.saturating_duration_since(t.shown_at) < ttl)
            .map(|t| &t.notification)
    }
}

/// Dashboard state shared between the refresh tasks and the UI
#[derive(Debug, Clone)]
pub struct SharedDashboard {
    inner: Arc<Mutex<DashboardState>>,
}

impl SharedDashboard {
    pub fn new(zoom: u8, toast_ttl: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(DashboardState::new(zoom, toast_ttl))) }
    }

    /// Run `f` with the state locked; keep it short
    pub fn with_state<R>(&self, f: impl FnOnce(&mut DashboardState) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().loading
    }

    /// Current (latitude, longitude, timestamp) readouts
    pub fn readouts(&self) -> (String, String, String) {
        let state = self.inner.lock();
        (
            state.latitude_text.clone(),
            state.longitude_text.clone(),
            state.timestamp_text.clone(),
        )
    }

    pub fn marker(&self) -> GeoPoint {
        self.inner.lock().marker
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().toasts.iter().map(|t| t.notification.clone()).collect()
    }
}

impl PositionView for SharedDashboard {
    fn set_loading(&self, active: bool) {
        self.inner.lock().loading = active;
    }

    fn show_position(&self, update: &PositionUpdate) {
        self.inner.lock().apply(update);
    }

    fn notify(&self, notification: Notification) {
        self.inner.lock().push_toast(notification);
    }
}

/// View for headless runs: every render is a log line
#[derive(Debug, Default)]
pub struct LogView;

impl PositionView for LogView {
    fn set_loading(&self, active: bool) {
        debug!(active = %active, "loading");
    }

    fn show_position(&self, update: &PositionUpdate) {
        info!(
            latitude = %update.latitude_text,
            longitude = %update.longitude_text,
            timestamp = %update.timestamp_text,
            zoom = %update.zoom,
            "position"
        );
    }

    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => info!(message = %notification.message, "notification"),
            NotificationLevel::Warning => warn!(message = %notification.message, "notification"),
            NotificationLevel::Error => error!(message = %notification.message, "notification"),
        }
    }
}
