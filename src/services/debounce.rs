//! Trailing-edge debounce for manual refresh requests
//!
//! Each trigger pushes the deadline out by the window; the debouncer fires
//! once the window passes with no further triggers.

use std::time::Duration;
use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    /// Register a trigger. Returns true when it should fire right away,
    /// which only happens with a zero window.
    pub fn trigger(&mut self) -> bool {
        if self.window.is_zero() {
            return true;
        }
        self.deadline = Some(Instant::now() + self.window);
        false
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolve when the pending deadline passes; never resolves when idle.
    /// Cancel-safe: dropping the future keeps the deadline.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_one() {
        let mut debouncer = Debouncer::new(Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..5 {
            assert!(!debouncer.trigger());
            tokio::time::advance(Duration::from_millis(200)).await;
        }
        debouncer.fired().await;

        // Fires one window after the last trigger (4 gaps of 200ms before it)
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1800), "fired early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1810), "fired late: {:?}", elapsed);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_never_fires() {
        let mut debouncer = Debouncer::new(Duration::from_secs(1));
        let result = tokio::time::timeout(Duration::from_secs(10), debouncer.fired()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_window_fires_immediately() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        assert!(debouncer.trigger());
        assert!(!debouncer.is_pending());
    }
}
