// SPDX-License-Identifier: MIT

//! The reconciliation loop's retry backoff: doubling delay from a base,
//! capped, reset after a sustained healthy period so a resource that
//! flaps once doesn't carry a stale long delay into its next failure.

use std::time::Duration;

const BASE: Duration = Duration::from_millis(200);
const FACTOR: u32 = 2;
const CAP: Duration = Duration::from_secs(30);
const HEALTHY_RESET: Duration = Duration::from_secs(60);

/// Tracks the current retry delay for one resource's `CheckApply` loop.
pub struct Backoff {
    current: Duration,
    healthy_since: Option<tokio::time::Instant>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { current: BASE, healthy_since: None }
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// The delay to wait before the next retry, doubling (capped at 30s)
    /// each time this is called after a failure.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * FACTOR).min(CAP);
        self.healthy_since = None;
        delay
    }

    /// Record a successful `CheckApply`. After 60 continuous seconds of
    /// success the delay resets to the base so a later failure doesn't
    /// inherit a stale, long backoff.
    pub fn record_success(&mut self, now: tokio::time::Instant) {
        match self.healthy_since {
            None => self.healthy_since = Some(now),
            Some(since) if now.duration_since(since) >= HEALTHY_RESET => {
                self.current = BASE;
            }
            Some(_) => {}
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let mut b = Backoff::new();
        assert_eq!(b.next_delay(), Duration::from_millis(200));
        assert_eq!(b.next_delay(), Duration::from_millis(400));
        assert_eq!(b.next_delay(), Duration::from_millis(800));
        for _ in 0..10 {
            b.next_delay();
        }
        assert_eq!(b.current_delay(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_success_resets_to_base() {
        let mut b = Backoff::new();
        b.next_delay();
        b.next_delay();
        assert!(b.current_delay() > Duration::from_millis(200));

        let start = tokio::time::Instant::now();
        b.record_success(start);
        tokio::time::advance(Duration::from_secs(61)).await;
        b.record_success(tokio::time::Instant::now());
        assert_eq!(b.current_delay(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn brief_success_does_not_reset() {
        let mut b = Backoff::new();
        b.next_delay();
        b.next_delay();
        let elevated = b.current_delay();

        let start = tokio::time::Instant::now();
        b.record_success(start);
        tokio::time::advance(Duration::from_secs(5)).await;
        b.record_success(tokio::time::Instant::now());
        assert_eq!(b.current_delay(), elevated);
    }
}
