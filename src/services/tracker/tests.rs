//! Tests for the Tracker trigger loop

use super::*;
use crate::domain::notification::NotificationLevel;
use crate::infra::metrics::Metrics;
use crate::services::refresh::RenderSettings;
use crate::services::test_support::{RecordingView, ScriptedSource};
use tokio::task::JoinHandle;

/// Running tracker plus the handles a test needs to drive it
struct TestTracker {
    source: Arc<ScriptedSource>,
    view: Arc<RecordingView>,
    trigger: TriggerHandle,
    connectivity_tx: mpsc::Sender<Connectivity>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TestTracker {
    async fn stop(self) {
        self.shutdown_tx.send(true).unwrap();
        self.handle.await.unwrap();
    }
}

fn start_tracker(config: Config) -> TestTracker {
    let source = Arc::new(ScriptedSource::new());
    let view = Arc::new(RecordingView::new());
    let cycle = Arc::new(RefreshCycle::new(
        source.clone(),
        view.clone(),
        Arc::new(Metrics::new()),
        RenderSettings::from_config(&config),
    ));

    let (connectivity_tx, connectivity_rx) = mpsc::channel(8);
    let (tracker, trigger) = Tracker::new(&config, cycle);
    let tracker = tracker.with_connectivity(connectivity_rx);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(tracker.run(shutdown_rx));

    TestTracker { source, view, trigger, connectivity_tx, shutdown_tx, handle }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_startup_refreshes_once() {
    let t = start_tracker(Config::default());
    settle().await;
    assert_eq!(t.source.calls(), 1);
    assert_eq!(t.view.updates().len(), 1);
    t.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_timer_refreshes_each_interval() {
    let t = start_tracker(Config::default());
    settle().await;

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(t.source.calls(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(t.source.calls(), 2);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(t.source.calls(), 3);
    t.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_burst_is_debounced() {
    let t = start_tracker(Config::default());
    settle().await;
    assert_eq!(t.source.calls(), 1);

    for _ in 0..5 {
        assert!(t.trigger.request_refresh());
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    // Still inside the window after the last click
    assert_eq!(t.source.calls(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(t.source.calls(), 2);
    t.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_without_debounce() {
    let t = start_tracker(Config::default().with_debounce_ms(0));
    settle().await;

    for _ in 0..3 {
        t.trigger.request_refresh();
        settle().await;
    }
    assert_eq!(t.source.calls(), 4);
    t.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_connection_lost_warns_without_fetch() {
    let t = start_tracker(Config::default());
    settle().await;

    t.connectivity_tx.send(Connectivity::Offline).await.unwrap();
    settle().await;

    assert_eq!(t.source.calls(), 1);
    let notifications = t.view.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Warning);
    t.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_connection_restored_refreshes_once() {
    let t = start_tracker(Config::default());
    settle().await;

    t.connectivity_tx.send(Connectivity::Online).await.unwrap();
    settle().await;

    assert_eq!(t.source.calls(), 2);
    let notifications = t.view.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Info);
    t.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_timer() {
    let t = start_tracker(Config::default());
    settle().await;
    let source = t.source.clone();
    let trigger = t.trigger.clone();
    t.stop().await;

    tokio::time::sleep(Duration::from_secs(900)).await;
    assert_eq!(source.calls(), 1);
    assert!(!trigger.request_refresh());
}
