//! Test doubles for the position source and view

use crate::domain::notification::Notification;
use crate::domain::position::{Coordinate, PositionFix};
use crate::io::position_source::{FetchError, PositionSource};
use crate::services::view::{PositionUpdate, PositionView};
use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn fix(lat: &str, lon: &str) -> PositionFix {
    PositionFix {
        latitude: Coordinate::parse(lat).unwrap(),
        longitude: Coordinate::parse(lon).unwrap(),
        server_time: None,
    }
}

pub fn fix_with_time(lat: &str, lon: &str, unix_secs: i64) -> PositionFix {
    PositionFix { server_time: DateTime::from_timestamp(unix_secs, 0), ..fix(lat, lon) }
}

/// Source that replays scripted results, each after a delay.
/// Once the script runs out it answers with 0,0 immediately.
pub struct ScriptedSource {
    steps: Mutex<VecDeque<(Duration, Result<PositionFix, FetchError>)>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self { steps: Mutex::new(VecDeque::new()), calls: AtomicUsize::new(0) }
    }

    pub fn push(&self, delay: Duration, result: Result<PositionFix, FetchError>) {
        self.steps.lock().push_back((delay, result));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionSource for ScriptedSource {
    async fn fetch(&self) -> Result<PositionFix, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().pop_front();
        match step {
            Some((delay, result)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Ok(fix("0", "0")),
        }
    }

    fn describe(&self) -> &str {
        "scripted"
    }
}

/// View that records every call it receives
#[derive(Default)]
pub struct RecordingView {
    loading: Mutex<Vec<bool>>,
    updates: Mutex<Vec<PositionUpdate>>,
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.lock().last().copied().unwrap_or(false)
    }

    pub fn loading_transitions(&self) -> Vec<bool> {
        self.loading.lock().clone()
    }

    pub fn updates(&self) -> Vec<PositionUpdate> {
        self.updates.lock().clone()
    }

    pub fn last_update(&self) -> Option<PositionUpdate> {
        self.updates.lock().last().cloned()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

impl PositionView for RecordingView {
    fn set_loading(&self, active: bool) {
        self.loading.lock().push(active);
    }

    fn show_position(&self, update: &PositionUpdate) {
        self.updates.lock().push(update.clone());
    }

    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}
