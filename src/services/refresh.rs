//! Location refresh cycle
//!
//! One invocation = fetch → validate → render, or classify and notify on
//! failure. The loading indicator is raised on entry and lowered on exit
//! whatever the outcome. Cycles may overlap; the indicator stays up while any
//! of them is in flight.
//!
//! Each cycle gets an increasing id. With `drop_stale` a completion older than
//! the last rendered cycle is discarded, so a slow early request cannot
//! overwrite a newer position.

use crate::domain::notification::{FailureKind, Notification, NotificationLevel, NotifyStyle};
use crate::domain::position::{DisplayTimezone, PositionReading, TimestampSource};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::position_source::PositionSource;
use crate::services::view::{GeoPoint, PositionUpdate, PositionView};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What started a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Timer,
    Manual,
    Reconnected,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Timer => "timer",
            Trigger::Manual => "manual",
            Trigger::Reconnected => "reconnected",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Rendered(PositionReading),
    Failed(FailureKind),
    /// Fetch succeeded but a newer cycle had already rendered
    Stale,
}

/// How readings are projected into the view
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub subject: String,
    pub zoom: u8,
    pub popup: bool,
    pub timestamp_source: TimestampSource,
    pub timestamp_format: String,
    pub timezone: DisplayTimezone,
    pub notify_style: NotifyStyle,
    pub drop_stale: bool,
}

impl RenderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            subject: config.marker_label().to_string(),
            zoom: config.default_zoom(),
            popup: config.popup(),
            timestamp_source: config.timestamp_source(),
            timestamp_format: config.timestamp_format().to_string(),
            timezone: config.timezone(),
            notify_style: config.notify_style(),
            drop_stale: config.drop_stale(),
        }
    }

    fn build_update(&self, reading: &PositionReading) -> PositionUpdate {
        let latitude_text = reading.latitude.to_string();
        let longitude_text = reading.longitude.to_string();
        let popup = self
            .popup
            .then(|| format!("{} Lat: {}, Lon: {}", self.subject, latitude_text, longitude_text));

        PositionUpdate {
            timestamp_text: reading.format_observed_at(&self.timestamp_format, self.timezone),
            marker: GeoPoint {
                latitude: reading.latitude.degrees(),
                longitude: reading.longitude.degrees(),
            },
            zoom: self.zoom,
            popup,
            latitude_text,
            longitude_text,
        }
    }
}

pub struct RefreshCycle {
    source: Arc<dyn PositionSource>,
    view: Arc<dyn PositionView>,
    metrics: Arc<Metrics>,
    settings: RenderSettings,
    next_cycle_id: AtomicU64,
    /// Id of the most recent cycle that rendered; guards the render step
    last_rendered: Mutex<u64>,
    /// Cycles currently between entry and exit
    in_flight: Mutex<usize>,
}

impl RefreshCycle {
    pub fn new(
        source: Arc<dyn PositionSource>,
        view: Arc<dyn PositionView>,
        metrics: Arc<Metrics>,
        settings: RenderSettings,
    ) -> Self {
        Self {
            source,
            view,
            metrics,
            settings,
            next_cycle_id: AtomicU64::new(1),
            last_rendered: Mutex::new(0),
            in_flight: Mutex::new(0),
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Run one refresh cycle
    pub async fn refresh(&self, trigger: Trigger) -> CycleOutcome {
        let cycle_id = self.next_cycle_id.fetch_add(1, Ordering::SeqCst);
        self.metrics.record_refresh_started();
        let _loading = LoadingGuard::enter(self);

        debug!(cycle_id = %cycle_id, trigger = %trigger.as_str(), source = %self.source.describe(), "refresh_started");

        let start = Instant::now();
        let result = self.source.fetch().await;
        let latency_ms = start.elapsed().as_millis() as u64;
        self.metrics.record_fetch_latency(latency_ms);

        match result {
            Ok(fix) => {
                let reading =
                    PositionReading::from_fix(fix, self.settings.timestamp_source, Utc::now());
                if self.render(cycle_id, &reading) {
                    self.metrics.record_rendered(reading.observed_at.time().timestamp().max(0) as u64);
                    info!(
                        cycle_id = %cycle_id,
                        trigger = %trigger.as_str(),
                        latitude = %reading.latitude,
                        longitude = %reading.longitude,
                        time_source = %reading.observed_at.source(),
                        latency_ms = %latency_ms,
                        "position_rendered"
                    );
                    CycleOutcome::Rendered(reading)
                } else {
                    self.metrics.record_stale_dropped();
                    debug!(cycle_id = %cycle_id, "stale_position_dropped");
                    CycleOutcome::Stale
                }
            }
            Err(e) => {
                let kind = e.kind();
                self.metrics.record_failure(kind);
                warn!(
                    cycle_id = %cycle_id,
                    trigger = %trigger.as_str(),
                    kind = %kind,
                    error = %e,
                    latency_ms = %latency_ms,
                    "refresh_failed"
                );
                self.notify(Notification::for_failure(kind, &self.settings.subject));
                CycleOutcome::Failed(kind)
            }
        }
    }

    /// Render a reading unless a newer cycle already has
    fn render(&self, cycle_id: u64, reading: &PositionReading) -> bool {
        let mut last = self.last_rendered.lock();
        if self.settings.drop_stale && cycle_id < *last {
            return false;
        }
        *last = (*last).max(cycle_id);
        self.view.show_position(&self.settings.build_update(reading));
        true
    }

    /// Show a notification according to the configured style
    pub fn notify(&self, notification: Notification) {
        match self.settings.notify_style {
            NotifyStyle::Toast => self.view.notify(notification),
            NotifyStyle::Log => match notification.level {
                NotificationLevel::Info => info!(message = %notification.message, "notification"),
                NotificationLevel::Warning | NotificationLevel::Error => {
                    warn!(level = %notification.level.as_str(), message = %notification.message, "notification")
                }
            },
        }
    }
}

/// Raises the loading indicator for the lifetime of one cycle
struct LoadingGuard<'a> {
    cycle: &'a RefreshCycle,
}

impl<'a> LoadingGuard<'a> {
    fn enter(cycle: &'a RefreshCycle) -> Self {
        let mut in_flight = cycle.in_flight.lock();
        if *in_flight == 0 {
            cycle.view.set_loading(true);
        }
        *in_flight += 1;
        Self { cycle }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.cycle.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.cycle.view.set_loading(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::PositionError;
    use crate::io::position_source::FetchError;
    use crate::services::test_support::{fix, fix_with_time, RecordingView, ScriptedSource};
    use std::time::Duration;

    fn settings() -> RenderSettings {
        let config = Config::default()
            .with_timestamp(TimestampSource::Server, "%Y-%m-%d %H:%M:%S");
        RenderSettings::from_config(&config)
    }

    fn cycle_with(source: Arc<ScriptedSource>, view: Arc<RecordingView>) -> RefreshCycle {
        RefreshCycle::new(source, view, Arc::new(Metrics::new()), settings())
    }

    #[tokio::test]
    async fn test_success_renders_exact_values() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Duration::ZERO, Ok(fix_with_time("12.34", "-56.78", 1_700_000_000)));
        let view = Arc::new(RecordingView::new());
        let cycle = cycle_with(source, view.clone());

        let outcome = cycle.refresh(Trigger::Manual).await;
        assert!(matches!(outcome, CycleOutcome::Rendered(_)));

        let update = view.last_update().unwrap();
        assert_eq!(update.latitude_text, "12.34");
        assert_eq!(update.longitude_text, "-56.78");
        assert_eq!(update.timestamp_text, "2023-11-14 22:13:20");
        assert_eq!(update.zoom, 2);
        assert_eq!(update.marker, GeoPoint { latitude: 12.34, longitude: -56.78 });
        assert_eq!(update.popup.as_deref(), Some("ISS Lat: 12.34, Lon: -56.78"));
    }

    #[tokio::test]
    async fn test_failure_leaves_view_untouched() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Duration::ZERO, Ok(fix("1.5", "2.5")));
        source.push(Duration::ZERO, Err(FetchError::Status(500)));
        source.push(
            Duration::ZERO,
            Err(FetchError::Malformed(PositionError::MissingField("latitude"))),
        );
        let view = Arc::new(RecordingView::new());
        let cycle = cycle_with(source, view.clone());

        cycle.refresh(Trigger::Startup).await;
        let before = view.last_update().unwrap();

        assert_eq!(
            cycle.refresh(Trigger::Timer).await,
            CycleOutcome::Failed(FailureKind::ServerError(500))
        );
        assert_eq!(
            cycle.refresh(Trigger::Timer).await,
            CycleOutcome::Failed(FailureKind::MalformedResponse)
        );

        assert_eq!(view.updates().len(), 1);
        assert_eq!(view.last_update().unwrap(), before);

        let notifications = view.notifications();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].level, NotificationLevel::Error);
        assert!(notifications[0].message.contains("500"));
        assert_eq!(cycle.metrics().failures_total(), 2);
    }

    #[tokio::test]
    async fn test_loading_indicator_brackets_cycle() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Duration::from_millis(50), Ok(fix("1", "2")));
        source.push(Duration::from_millis(50), Err(FetchError::Timeout));
        let view = Arc::new(RecordingView::new());
        let cycle = Arc::new(cycle_with(source, view.clone()));

        assert!(!view.is_loading());
        let running = tokio::spawn({
            let cycle = cycle.clone();
            async move { cycle.refresh(Trigger::Manual).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(view.is_loading());
        running.await.unwrap();
        assert!(!view.is_loading());

        cycle.refresh(Trigger::Manual).await;
        assert!(!view.is_loading());
        assert_eq!(view.loading_transitions(), vec![true, false, true, false]);
        assert_eq!(cycle.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycles_keep_indicator_up() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Duration::from_millis(300), Ok(fix("1", "1")));
        source.push(Duration::from_millis(100), Ok(fix("2", "2")));
        let view = Arc::new(RecordingView::new());
        let cycle = Arc::new(cycle_with(source, view.clone()));

        let first = tokio::spawn({
            let cycle = cycle.clone();
            async move { cycle.refresh(Trigger::Timer).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = tokio::spawn({
            let cycle = cycle.clone();
            async move { cycle.refresh(Trigger::Manual).await }
        });

        // Second finishes first; first is still running
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(view.is_loading());
        assert_eq!(cycle.in_flight(), 1);

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(view.loading_transitions(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_completion_dropped() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Duration::from_millis(300), Ok(fix("10", "10")));
        source.push(Duration::from_millis(100), Ok(fix("20", "20")));
        let view = Arc::new(RecordingView::new());
        let cycle = Arc::new(cycle_with(source, view.clone()));

        let first = tokio::spawn({
            let cycle = cycle.clone();
            async move { cycle.refresh(Trigger::Timer).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = cycle.refresh(Trigger::Manual).await;

        assert!(matches!(second, CycleOutcome::Rendered(_)));
        assert_eq!(first.await.unwrap(), CycleOutcome::Stale);
        assert_eq!(view.last_update().unwrap().latitude_text, "20");
        assert_eq!(cycle.metrics().stale_dropped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_write_wins_without_stale_drop() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Duration::from_millis(300), Ok(fix("10", "10")));
        source.push(Duration::from_millis(100), Ok(fix("20", "20")));
        let view = Arc::new(RecordingView::new());
        let mut settings = settings();
        settings.drop_stale = false;
        let cycle = Arc::new(RefreshCycle::new(
            source,
            view.clone(),
            Arc::new(Metrics::new()),
            settings,
        ));

        let first = tokio::spawn({
            let cycle = cycle.clone();
            async move { cycle.refresh(Trigger::Timer).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cycle.refresh(Trigger::Manual).await;
        assert!(matches!(first.await.unwrap(), CycleOutcome::Rendered(_)));

        assert_eq!(view.last_update().unwrap().latitude_text, "10");
    }

    #[tokio::test]
    async fn test_log_style_skips_toasts() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Duration::ZERO, Err(FetchError::Timeout));
        let view = Arc::new(RecordingView::new());
        let mut settings = settings();
        settings.notify_style = NotifyStyle::Log;
        let cycle = RefreshCycle::new(source, view.clone(), Arc::new(Metrics::new()), settings);

        assert_eq!(cycle.refresh(Trigger::Timer).await, CycleOutcome::Failed(FailureKind::Timeout));
        assert!(view.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_local_timestamp_source_ignores_server_time() {
        let source = Arc::new(ScriptedSource::new());
        source.push(Duration::ZERO, Ok(fix_with_time("1", "2", 1_000_000_000)));
        let view = Arc::new(RecordingView::new());
        let mut settings = settings();
        settings.timestamp_source = TimestampSource::Local;
        let cycle = RefreshCycle::new(source, view.clone(), Arc::new(Metrics::new()), settings);

        match cycle.refresh(Trigger::Startup).await {
            CycleOutcome::Rendered(reading) => {
                assert_eq!(reading.observed_at.source(), "local");
                assert!(reading.observed_at.time().timestamp() > 1_000_000_000);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
