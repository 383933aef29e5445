//! Events reported to the host application.

use tokio::sync::mpsc;

use crate::media::IceCandidate;

/// Receives session events. Every method defaults to a no-op.
///
/// Methods are called from the session actor; implementations must not block.
pub trait SessionListener: Send + Sync + 'static {
    /// Offer/answer exchange completed.
    fn on_connection_established(&self) {}
    /// Remote offer applied.
    fn on_offer_received(&self) {}
    /// Remote answer applied.
    fn on_answer_received(&self) {}
    /// Remote candidate applied.
    fn on_candidate_received(&self, _candidate: &IceCandidate) {}
    /// Peer marked the room disconnected.
    fn on_remote_hangup(&self) {}
    /// Peer's presence flag went up.
    fn on_remote_connected(&self) {}
    fn on_reconnecting(&self, _attempt: u32, _max_attempts: u32) {}
    fn on_reconnected(&self) {}
    /// Negotiation failed or the session gave up reconnecting.
    fn on_connection_failed(&self, _reason: &str) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl SessionListener for NoopListener {}

/// Session event as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectionEstablished,
    OfferReceived,
    AnswerReceived,
    CandidateReceived(IceCandidate),
    RemoteHangup,
    RemoteConnected,
    Reconnecting { attempt: u32, max_attempts: u32 },
    Reconnected,
    ConnectionFailed { reason: String },
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelListener {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: SessionEvent) {
        // Receiver dropped means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl SessionListener for ChannelListener {
    fn on_connection_established(&self) {
        self.emit(SessionEvent::ConnectionEstablished);
    }

    fn on_offer_received(&self) {
        self.emit(SessionEvent::OfferReceived);
    }

    fn on_answer_received(&self) {
        self.emit(SessionEvent::AnswerReceived);
    }

    fn on_candidate_received(&self, candidate: &IceCandidate) {
        self.emit(SessionEvent::CandidateReceived(candidate.clone()));
    }

    fn on_remote_hangup(&self) {
        self.emit(SessionEvent::RemoteHangup);
    }

    fn on_remote_connected(&self) {
        self.emit(SessionEvent::RemoteConnected);
    }

    fn on_reconnecting(&self, attempt: u32, max_attempts: u32) {
        self.emit(SessionEvent::Reconnecting {
            attempt,
            max_attempts,
        });
    }

    fn on_reconnected(&self) {
        self.emit(SessionEvent::Reconnected);
    }

    fn on_connection_failed(&self, reason: &str) {
        self.emit(SessionEvent::ConnectionFailed {
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_listener_forwards_events() {
        let (listener, mut rx) = ChannelListener::new();
        listener.on_reconnecting(2, 5);
        listener.on_connection_failed("gone");
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Reconnecting {
                attempt: 2,
                max_attempts: 5
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::ConnectionFailed {
                reason: "gone".to_string()
            }
        );
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        listener.on_remote_hangup();
    }
}
