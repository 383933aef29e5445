//! Listener that keeps every session event for later inspection.

use std::sync::Mutex;

use roomlink::media::IceCandidate;
use roomlink::session::{SessionEvent, SessionListener};

/// Records session events in arrival order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &SessionEvent) -> bool {
        self.events.lock().unwrap().contains(event)
    }

    /// Number of events equal to `event`.
    pub fn count(&self, event: &SessionEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == event)
            .count()
    }

    /// Number of events matching `predicate`.
    pub fn count_where(&self, predicate: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| predicate(e))
            .count()
    }

    /// Candidates reported as received, in order.
    pub fn received_candidates(&self) -> Vec<IceCandidate> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::CandidateReceived(candidate) => Some(candidate.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn push(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl SessionListener for RecordingListener {
    fn on_connection_established(&self) {
        self.push(SessionEvent::ConnectionEstablished);
    }

    fn on_offer_received(&self) {
        self.push(SessionEvent::OfferReceived);
    }

    fn on_answer_received(&self) {
        self.push(SessionEvent::AnswerReceived);
    }

    fn on_candidate_received(&self, candidate: &IceCandidate) {
        self.push(SessionEvent::CandidateReceived(candidate.clone()));
    }

    fn on_remote_hangup(&self) {
        self.push(SessionEvent::RemoteHangup);
    }

    fn on_remote_connected(&self) {
        self.push(SessionEvent::RemoteConnected);
    }

    fn on_reconnecting(&self, attempt: u32, max_attempts: u32) {
        self.push(SessionEvent::Reconnecting {
            attempt,
            max_attempts,
        });
    }

    fn on_reconnected(&self) {
        self.push(SessionEvent::Reconnected);
    }

    fn on_connection_failed(&self, reason: &str) {
        self.push(SessionEvent::ConnectionFailed {
            reason: reason.to_string(),
        });
    }
}
