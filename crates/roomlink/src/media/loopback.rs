//! Deterministic in-process media engine.
//!
//! Produces synthetic SDP, validates remote descriptions and emits one host
//! candidate after each local description is applied.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{IceCandidate, MediaEngine, MediaError, SdpType, SessionDescription};

/// Loopback media engine.
#[derive(Debug)]
pub struct LoopbackEngine {
    session_id: Uuid,
    ice_servers: Vec<String>,
    state: Mutex<LoopbackState>,
}

#[derive(Debug)]
struct LoopbackState {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    applied_candidates: Vec<IceCandidate>,
    candidate_tx: mpsc::UnboundedSender<IceCandidate>,
    candidate_rx: Option<mpsc::UnboundedReceiver<IceCandidate>>,
    gathered: u32,
    /// SDP session version, bumped for every description.
    version: u64,
}

impl LoopbackEngine {
    #[must_use]
    pub fn new(ice_servers: Vec<String>) -> Self {
        let (candidate_tx, candidate_rx) = mpsc::unbounded_channel();
        Self {
            session_id: Uuid::new_v4(),
            ice_servers,
            state: Mutex::new(LoopbackState {
                local: None,
                remote: None,
                applied_candidates: Vec::new(),
                candidate_tx,
                candidate_rx: Some(candidate_rx),
                gathered: 0,
                version: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn describe(&self, kind: SdpType, version: u64) -> SessionDescription {
        let sdp = format!(
            "v=0\r\no=- {} {} IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=type:{}\r\na=ice-servers:{}\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:0\r\n",
            self.session_id.as_simple(),
            version,
            kind.as_str(),
            self.ice_servers.len(),
        );
        SessionDescription { kind, sdp }
    }

    /// Remote description currently applied.
    #[must_use]
    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.lock().remote.clone()
    }

    /// Local description currently applied.
    #[must_use]
    pub fn local_description(&self) -> Option<SessionDescription> {
        self.lock().local.clone()
    }

    /// Remote candidates applied so far, in order.
    #[must_use]
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.lock().applied_candidates.clone()
    }
}

#[async_trait]
impl MediaEngine for LoopbackEngine {
    async fn create_offer(&self) -> Result<SessionDescription, MediaError> {
        let mut state = self.lock();
        state.version += 1;
        Ok(self.describe(SdpType::Offer, state.version))
    }

    async fn create_answer(&self) -> Result<SessionDescription, MediaError> {
        let mut state = self.lock();
        if !matches!(&state.remote, Some(remote) if remote.kind == SdpType::Offer) {
            return Err(MediaError::InvalidState(
                "no remote offer to answer".to_string(),
            ));
        }
        state.version += 1;
        Ok(self.describe(SdpType::Answer, state.version))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MediaError> {
        let mut state = self.lock();
        state.gathered += 1;
        let candidate = IceCandidate {
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
            candidate: format!(
                "candidate:{} 1 udp 2122260223 127.0.0.1 {} typ host",
                state.gathered,
                50000 + state.gathered
            ),
        };
        debug!(
            target: "roomlink.media.loopback",
            kind = description.kind.as_str(),
            sdp_len = description.sdp.len(),
            "Local description applied"
        );
        state.local = Some(description);
        // Receiver may already be gone; gathering is best-effort.
        let _ = state.candidate_tx.send(candidate);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MediaError> {
        if !description.sdp.starts_with("v=0") {
            return Err(MediaError::InvalidDescription(
                "missing version line".to_string(),
            ));
        }
        debug!(
            target: "roomlink.media.loopback",
            kind = description.kind.as_str(),
            sdp_len = description.sdp.len(),
            "Remote description applied"
        );
        self.lock().remote = Some(description);
        Ok(())
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), MediaError> {
        let mut state = self.lock();
        if state.remote.is_none() {
            return Err(MediaError::InvalidState(
                "candidate before remote description".to_string(),
            ));
        }
        if !candidate.candidate.starts_with("candidate:") {
            return Err(MediaError::InvalidCandidate(
                "missing candidate prefix".to_string(),
            ));
        }
        state.applied_candidates.push(candidate);
        Ok(())
    }

    fn take_candidate_events(&self) -> Option<mpsc::UnboundedReceiver<IceCandidate>> {
        self.lock().candidate_rx.take()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offer_answer_between_two_engines() {
        let caller = LoopbackEngine::new(vec!["stun:stun.l.google.com:19302".to_string()]);
        let callee = LoopbackEngine::new(Vec::new());

        let offer = caller.create_offer().await.unwrap();
        assert_eq!(offer.kind, SdpType::Offer);
        caller.set_local_description(offer.clone()).await.unwrap();

        callee.set_remote_description(offer.clone()).await.unwrap();
        let answer = callee.create_answer().await.unwrap();
        assert_eq!(answer.kind, SdpType::Answer);
        callee.set_local_description(answer.clone()).await.unwrap();
        caller.set_remote_description(answer.clone()).await.unwrap();

        assert_eq!(callee.remote_description(), Some(offer));
        assert_eq!(caller.remote_description(), Some(answer));
    }

    #[tokio::test]
    async fn test_each_offer_is_a_new_session_version() {
        let engine = LoopbackEngine::new(Vec::new());
        let first = engine.create_offer().await.unwrap();
        let second = engine.create_offer().await.unwrap();
        assert_ne!(first.sdp, second.sdp);
        assert!(second.sdp.contains(" 2 IN IP4 "));
    }

    #[tokio::test]
    async fn test_rejects_malformed_remote_description() {
        let engine = LoopbackEngine::new(Vec::new());
        let err = engine
            .set_remote_description(SessionDescription::offer("garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidDescription(_)));
        assert!(engine.remote_description().is_none());
    }

    #[tokio::test]
    async fn test_answer_requires_remote_offer() {
        let engine = LoopbackEngine::new(Vec::new());
        assert!(matches!(
            engine.create_answer().await,
            Err(MediaError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_emits_candidate_after_local_description() {
        let engine = LoopbackEngine::new(Vec::new());
        let mut events = engine.take_candidate_events().unwrap();
        assert!(engine.take_candidate_events().is_none());

        let offer = engine.create_offer().await.unwrap();
        engine.set_local_description(offer).await.unwrap();
        let candidate = events.recv().await.unwrap();
        assert!(candidate.candidate.starts_with("candidate:1 "));
    }

    #[tokio::test]
    async fn test_candidates_require_remote_description() {
        let engine = LoopbackEngine::new(Vec::new());
        let candidate = IceCandidate {
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
            candidate: "candidate:1 1 udp 1 127.0.0.1 5000 typ host".to_string(),
        };
        assert!(engine.add_candidate(candidate.clone()).await.is_err());

        let offer = LoopbackEngine::new(Vec::new()).create_offer().await.unwrap();
        engine.set_remote_description(offer).await.unwrap();
        engine.add_candidate(candidate.clone()).await.unwrap();
        assert_eq!(engine.applied_candidates(), vec![candidate]);
    }
}
