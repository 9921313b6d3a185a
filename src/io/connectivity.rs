//! Connectivity monitor - detects network loss and recovery
//!
//! Periodically opens a TCP connection to the position endpoint's host and
//! reports transitions only. The first probe sets the baseline silently.

use reqwest::Url;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Turns a stream of probe results into transitions
#[derive(Debug, Default)]
pub struct ConnectivityTracker {
    last: Option<Connectivity>,
}

impl ConnectivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a probe result; returns the new state if it changed
    pub fn observe(&mut self, reachable: bool) -> Option<Connectivity> {
        let state = if reachable { Connectivity::Online } else { Connectivity::Offline };
        match self.last.replace(state) {
            None => None,
            Some(previous) if previous == state => None,
            Some(_) => Some(state),
        }
    }

    pub fn current(&self) -> Option<Connectivity> {
        self.last
    }
}

pub struct ConnectivityMonitor {
    target: String,
    probe_interval: Duration,
    probe_timeout: Duration,
}

impl ConnectivityMonitor {
    pub fn new(target: impl Into<String>, probe_interval: Duration, probe_timeout: Duration) -> Self {
        Self { target: target.into(), probe_interval, probe_timeout }
    }

    /// Build a monitor probing the host of an HTTP endpoint
    pub fn for_endpoint(
        endpoint: &str,
        probe_interval: Duration,
        probe_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let target = probe_target(endpoint)?;
        Ok(Self::new(target, probe_interval, probe_timeout))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    async fn probe(&self) -> bool {
        match timeout(self.probe_timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(target_addr = %self.target, error = %e, "connectivity_probe_failed");
                false
            }
            Err(_) => {
                debug!(target_addr = %self.target, "connectivity_probe_timeout");
                false
            }
        }
    }

    /// Probe until shutdown, sending each transition on `tx`
    pub async fn run(self, tx: mpsc::Sender<Connectivity>, mut shutdown: watch::Receiver<bool>) {
        let mut tracker = ConnectivityTracker::new();
        let mut ticker = interval(self.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(target_addr = %self.target, interval_secs = %self.probe_interval.as_secs(), "connectivity_monitor_started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reachable = self.probe().await;
                    if let Some(state) = tracker.observe(reachable) {
                        match state {
                            Connectivity::Online => info!(target_addr = %self.target, "connectivity_restored"),
                            Connectivity::Offline => warn!(target_addr = %self.target, "connectivity_lost"),
                        }
                        if tx.send(state).await.is_err() {
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("connectivity_monitor_stopped");
    }
}

/// Extract `host:port` from an endpoint URL, using the scheme's default port
pub fn probe_target(endpoint: &str) -> anyhow::Result<String> {
    let url = Url::parse(endpoint)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("endpoint has no host: {}", endpoint))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow::anyhow!("endpoint has no port: {}", endpoint))?;
    Ok(format!("{}:{}", host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_is_baseline() {
        let mut tracker = ConnectivityTracker::new();
        assert_eq!(tracker.observe(true), None);
        assert_eq!(tracker.current(), Some(Connectivity::Online));
    }

    #[test]
    fn test_transitions_only() {
        let mut tracker = ConnectivityTracker::new();
        tracker.observe(true);
        assert_eq!(tracker.observe(true), None);
        assert_eq!(tracker.observe(false), Some(Connectivity::Offline));
        assert_eq!(tracker.observe(false), None);
        assert_eq!(tracker.observe(true), Some(Connectivity::Online));
    }

    #[test]
    fn test_probe_target() {
        assert_eq!(
            probe_target("http://api.open-notify.org/iss-now.json").unwrap(),
            "api.open-notify.org:80"
        );
        assert_eq!(
            probe_target("https://api.wheretheiss.at/v1/satellites/25544").unwrap(),
            "api.wheretheiss.at:443"
        );
        assert_eq!(probe_target("http://127.0.0.1:8080/iss").unwrap(), "127.0.0.1:8080");
        assert!(probe_target("not a url").is_err());
    }

    #[tokio::test]
    async fn test_monitor_reports_loss() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let monitor = ConnectivityMonitor::new(
            addr.to_string(),
            Duration::from_millis(20),
            Duration::from_millis(200),
        );
        let (tx, mut rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(tx, shutdown_rx));

        // Let the baseline probe succeed, then take the listener away
        tokio::time::sleep(Duration::from_millis(60)).await;
        drop(listener);

        let state = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(state, Some(Connectivity::Offline));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
