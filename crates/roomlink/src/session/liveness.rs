//! Staleness detection.
//!
//! Activity is any inbound room event or successful outbound write. Once the
//! room has been quiet for longer than the stale timeout, the session reads
//! the room once and acts on the verdict.

use std::time::Duration;

use tokio::time::Instant;

use super::room::RoomRecord;
use crate::types::RoomStatus;

/// What to do with a stale room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessVerdict {
    /// Room is gone from the store.
    RoomMissing,
    /// The peer marked the room disconnected.
    RemoteHangup,
    /// Room looks healthy; write a probe.
    Probe,
}

#[derive(Debug)]
pub struct LivenessMonitor {
    stale_timeout: Duration,
    last_activity: Instant,
    hangup_reported: bool,
}

impl LivenessMonitor {
    #[must_use]
    pub fn new(stale_timeout: Duration) -> Self {
        Self {
            stale_timeout,
            last_activity: Instant::now(),
            hangup_reported: false,
        }
    }

    /// Record activity.
    pub fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    #[must_use]
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Whether the room has been quiet for longer than the timeout.
    #[must_use]
    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity) > self.stale_timeout
    }

    /// Classify a one-shot read of a stale room.
    #[must_use]
    pub fn assess(record: Option<&RoomRecord>) -> LivenessVerdict {
        match record {
            None => LivenessVerdict::RoomMissing,
            Some(r) if r.status == Some(RoomStatus::Disconnected) => LivenessVerdict::RemoteHangup,
            Some(_) => LivenessVerdict::Probe,
        }
    }

    /// Returns `true` the first time a hangup is reported, `false` after.
    pub fn report_hangup(&mut self) -> bool {
        !std::mem::replace(&mut self.hangup_reported, true)
    }

    #[must_use]
    pub fn hangup_reported(&self) -> bool {
        self.hangup_reported
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::session::room::RoomRecord;

    #[tokio::test(start_paused = true)]
    async fn test_staleness_follows_activity() {
        let mut monitor = LivenessMonitor::new(Duration::from_secs(30));
        let start = Instant::now();
        assert!(!monitor.is_stale(start + Duration::from_secs(30)));
        assert!(monitor.is_stale(start + Duration::from_secs(31)));

        monitor.touch(start + Duration::from_secs(20));
        assert!(!monitor.is_stale(start + Duration::from_secs(45)));
        assert!(monitor.is_stale(start + Duration::from_secs(51)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_never_moves_backwards() {
        let mut monitor = LivenessMonitor::new(Duration::from_secs(30));
        let start = Instant::now();
        monitor.touch(start + Duration::from_secs(10));
        monitor.touch(start);
        assert_eq!(monitor.last_activity(), start + Duration::from_secs(10));
    }

    #[test]
    fn test_assess() {
        assert_eq!(LivenessMonitor::assess(None), LivenessVerdict::RoomMissing);

        let mut record = RoomRecord::fresh(0);
        assert_eq!(LivenessMonitor::assess(Some(&record)), LivenessVerdict::Probe);

        record.status = Some(RoomStatus::Disconnected);
        assert_eq!(
            LivenessMonitor::assess(Some(&record)),
            LivenessVerdict::RemoteHangup
        );
    }

    #[tokio::test]
    async fn test_hangup_reported_once() {
        let mut monitor = LivenessMonitor::new(Duration::from_secs(30));
        assert!(monitor.report_hangup());
        assert!(!monitor.report_hangup());
        assert!(monitor.hangup_reported());
    }
}
