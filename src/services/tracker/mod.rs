//! Refresh scheduling and trigger wiring
//!
//! The Tracker owns every source of refresh requests:
//! - one immediate refresh at startup
//! - the polling timer
//! - manual requests, collapsed by the debouncer
//! - connectivity transitions (restored refreshes, lost only warns)
//!
//! Each refresh runs as its own task so a slow fetch never blocks the loop.
//! There is no mutual exclusion between cycles; see `RefreshCycle` for how
//! overlapping completions are ordered.

#[cfg(test)]
mod tests;

use crate::domain::notification::Notification;
use crate::infra::config::Config;
use crate::io::connectivity::Connectivity;
use crate::services::debounce::Debouncer;
use crate::services::refresh::{RefreshCycle, Trigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Queue depth for manual requests; extra requests inside a debounce window
/// carry no information
const MANUAL_QUEUE_SIZE: usize = 16;

/// Cloneable handle for requesting a manual refresh
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Ask for a refresh. Returns false once the tracker has stopped.
    pub fn request_refresh(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Closed(())) => false,
        }
    }
}

pub struct Tracker {
    cycle: Arc<RefreshCycle>,
    poll_interval: Duration,
    debouncer: Debouncer,
    manual_rx: mpsc::Receiver<()>,
    manual_open: bool,
    connectivity_rx: Option<mpsc::Receiver<Connectivity>>,
}

impl Tracker {
    pub fn new(config: &Config, cycle: Arc<RefreshCycle>) -> (Self, TriggerHandle) {
        let (tx, manual_rx) = mpsc::channel(MANUAL_QUEUE_SIZE);
        let tracker = Self {
            cycle,
            poll_interval: config.poll_interval(),
            debouncer: Debouncer::new(config.debounce_window()),
            manual_rx,
            manual_open: true,
            connectivity_rx: None,
        };
        (tracker, TriggerHandle { tx })
    }

    /// Attach a stream of connectivity transitions
    pub fn with_connectivity(mut self, rx: mpsc::Receiver<Connectivity>) -> Self {
        self.connectivity_rx = Some(rx);
        self
    }

    fn spawn_refresh(&self, tasks: &mut JoinSet<()>, trigger: Trigger) {
        let cycle = self.cycle.clone();
        tasks.spawn(async move {
            cycle.refresh(trigger).await;
        });
    }

    fn handle_connectivity(&self, tasks: &mut JoinSet<()>, state: Connectivity) {
        let subject = &self.cycle.settings().subject;
        match state {
            Connectivity::Online => {
                self.cycle.notify(Notification::connection_restored(subject));
                self.spawn_refresh(tasks, Trigger::Reconnected);
            }
            Connectivity::Offline => {
                self.cycle.notify(Notification::connection_lost());
            }
        }
    }

    /// Run until `shutdown` flips to true; in-flight refreshes are aborted
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();

        info!(
            interval_secs = %self.poll_interval.as_secs(),
            debounce_ms = %self.debouncer_window_ms(),
            "tracker_started"
        );
        self.spawn_refresh(&mut tasks, Trigger::Startup);

        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.spawn_refresh(&mut tasks, Trigger::Timer);
                }
                request = self.manual_rx.recv(), if self.manual_open => {
                    match request {
                        Some(()) => {
                            if self.debouncer.trigger() {
                                self.spawn_refresh(&mut tasks, Trigger::Manual);
                            } else {
                                debug!("manual_refresh_debounced");
                            }
                        }
                        None => self.manual_open = false,
                    }
                }
                _ = self.debouncer.fired() => {
                    self.spawn_refresh(&mut tasks, Trigger::Manual);
                }
                state = recv_connectivity(&mut self.connectivity_rx) => {
                    match state {
                        Some(state) => self.handle_connectivity(&mut tasks, state),
                        None => self.connectivity_rx = None,
                    }
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        if e.is_panic() {
                            error!(error = %e, "refresh_task_panicked");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tasks.abort_all();
        info!("tracker_stopped");
    }

    fn debouncer_window_ms(&self) -> u128 {
        self.debouncer.window().as_millis()
    }
}

async fn recv_connectivity(rx: &mut Option<mpsc::Receiver<Connectivity>>) -> Option<Connectivity> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
