//! Reconnection bookkeeping.
//!
//! Attempt `n` (1-based) runs `min(max_delay, base * 2^n)` after the trigger
//! or the previous failure. Only one retry loop exists at a time: triggers
//! while a loop is active are ignored. The session actor owns the deadline and
//! sleeps on it in its select loop.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Outcome of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Next attempt scheduled.
    Retry { attempt: u32, at: Instant },
    /// Budget spent.
    Exhausted { attempts: u32 },
}

#[derive(Debug)]
pub struct ReconnectController {
    base: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempt: u32,
    active: bool,
    next_attempt_at: Option<Instant>,
}

impl ReconnectController {
    #[must_use]
    pub fn new(base: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
            attempt: 0,
            active: false,
            next_attempt_at: None,
        }
    }

    /// Delay before attempt `attempt`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts made in the current loop.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn next_attempt_at(&self) -> Option<Instant> {
        self.next_attempt_at
    }

    /// Start a retry loop. Returns `false` if one is already active.
    pub fn trigger(&mut self, now: Instant) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.attempt = 0;
        let at = now + self.backoff_delay(1);
        self.next_attempt_at = Some(at);
        debug!(
            target: "roomlink.session.reconnect",
            delay_ms = u64::try_from(self.backoff_delay(1).as_millis()).unwrap_or(u64::MAX),
            "Reconnection scheduled"
        );
        true
    }

    /// Run the pending attempt now.
    pub fn pull_forward(&mut self, now: Instant) {
        if let Some(at) = self.next_attempt_at {
            if at > now {
                debug!(
                    target: "roomlink.session.reconnect",
                    "Store presence back, retrying now"
                );
                self.next_attempt_at = Some(now);
            }
        }
    }

    /// Consume the deadline and return the attempt number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.next_attempt_at = None;
        self.attempt += 1;
        self.attempt
    }

    /// Record a failed attempt.
    pub fn attempt_failed(&mut self, now: Instant) -> RetryDecision {
        if self.attempt >= self.max_attempts {
            self.active = false;
            self.next_attempt_at = None;
            return RetryDecision::Exhausted {
                attempts: self.attempt,
            };
        }
        let next = self.attempt + 1;
        let at = now + self.backoff_delay(next);
        self.next_attempt_at = Some(at);
        RetryDecision::Retry { attempt: next, at }
    }

    /// Reset after a successful attempt.
    pub fn succeeded(&mut self) {
        self.cancel();
    }

    /// Drop any pending attempt and reset the counter.
    pub fn cancel(&mut self) {
        self.active = false;
        self.attempt = 0;
        self.next_attempt_at = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn controller() -> ReconnectController {
        ReconnectController::new(Duration::from_secs(1), Duration::from_secs(30), 5)
    }

    #[test]
    fn test_backoff_delays() {
        let c = controller();
        let delays: Vec<u64> = (1..=5).map(|n| c.backoff_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30]);
        assert_eq!(c.backoff_delay(40), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_until_exhausted() {
        let mut c = controller();
        let mut now = Instant::now();
        assert!(c.trigger(now));
        assert_eq!(c.next_attempt_at(), Some(now + Duration::from_secs(2)));

        for expected in [4, 8, 16, 30] {
            now = c.next_attempt_at().unwrap();
            c.begin_attempt();
            match c.attempt_failed(now) {
                RetryDecision::Retry { at, .. } => {
                    assert_eq!(at - now, Duration::from_secs(expected));
                }
                RetryDecision::Exhausted { .. } => unreachable!(),
            }
        }

        now = c.next_attempt_at().unwrap();
        assert_eq!(c.begin_attempt(), 5);
        assert_eq!(
            c.attempt_failed(now),
            RetryDecision::Exhausted { attempts: 5 }
        );
        assert!(!c.is_active());
        assert_eq!(c.next_attempt_at(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_triggers_coalesce() {
        let mut c = controller();
        let now = Instant::now();
        assert!(c.trigger(now));
        let at = c.next_attempt_at();
        assert!(!c.trigger(now + Duration::from_millis(500)));
        assert_eq!(c.next_attempt_at(), at);
        assert_eq!(c.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_counter() {
        let mut c = controller();
        let now = Instant::now();
        c.trigger(now);
        c.begin_attempt();
        c.attempt_failed(now);
        c.begin_attempt();
        assert_eq!(c.attempts(), 2);

        c.succeeded();
        assert_eq!(c.attempts(), 0);
        assert!(!c.is_active());
        assert!(c.trigger(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_forward() {
        let mut c = controller();
        let now = Instant::now();
        c.trigger(now);
        c.pull_forward(now);
        assert_eq!(c.next_attempt_at(), Some(now));
    }
}
