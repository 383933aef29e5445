//! Scriptable media engine for session tests.
//!
//! Records every call and fails selected steps on demand. Local candidates are
//! only produced when a test calls `emit_candidate`.
//!
//! # Example
//!
//! ```rust,ignore
//! use roomlink_test_utils::{EngineCall, EngineStep, MockMediaEngine};
//!
//! let engine = MockMediaEngine::new().failing(EngineStep::SetRemote);
//! // ... drive a session ...
//! assert!(engine.calls().contains(&EngineCall::SetRemote(SdpType::Offer)));
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use roomlink::media::{IceCandidate, MediaEngine, MediaError, SdpType, SessionDescription};
use tokio::sync::mpsc;

/// An engine step that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStep {
    CreateOffer,
    CreateAnswer,
    SetLocal,
    SetRemote,
    AddCandidate,
}

/// A recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpType),
    SetRemote(SdpType),
    /// Candidate string of the applied candidate.
    AddCandidate(String),
}

/// Mock media engine.
#[derive(Debug, Clone)]
pub struct MockMediaEngine {
    inner: Arc<Mutex<MockEngineInner>>,
}

#[derive(Debug)]
struct MockEngineInner {
    calls: Vec<EngineCall>,
    failing: HashSet<EngineStep>,
    descriptions: u32,
    candidate_tx: mpsc::UnboundedSender<IceCandidate>,
    candidate_rx: Option<mpsc::UnboundedReceiver<IceCandidate>>,
}

impl Default for MockMediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaEngine {
    /// Create an engine where every step succeeds.
    #[must_use]
    pub fn new() -> Self {
        let (candidate_tx, candidate_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(MockEngineInner {
                calls: Vec::new(),
                failing: HashSet::new(),
                descriptions: 0,
                candidate_tx,
                candidate_rx: Some(candidate_rx),
            })),
        }
    }

    /// Make `step` fail until `recover` is called.
    #[must_use]
    pub fn failing(self, step: EngineStep) -> Self {
        self.fail(step);
        self
    }

    pub fn fail(&self, step: EngineStep) {
        self.inner.lock().unwrap().failing.insert(step);
    }

    pub fn recover(&self, step: EngineStep) {
        self.inner.lock().unwrap().failing.remove(&step);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Candidate strings passed to `add_candidate`, in order.
    pub fn applied_candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::AddCandidate(candidate) => Some(candidate),
                _ => None,
            })
            .collect()
    }

    /// Hand a locally gathered candidate to the session.
    pub fn emit_candidate(&self, candidate: IceCandidate) {
        let _ = self.inner.lock().unwrap().candidate_tx.send(candidate);
    }

    fn record(&self, call: EngineCall, step: EngineStep) -> Result<(), MediaError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        if inner.failing.contains(&step) {
            return Err(MediaError::InvalidState(format!("injected {step:?} failure")));
        }
        Ok(())
    }

    fn describe(&self, kind: SdpType) -> SessionDescription {
        let mut inner = self.inner.lock().unwrap();
        inner.descriptions += 1;
        SessionDescription {
            kind,
            sdp: format!("v=0\r\ns=mock-{}-{}\r\n", kind.as_str(), inner.descriptions),
        }
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn create_offer(&self) -> Result<SessionDescription, MediaError> {
        self.record(EngineCall::CreateOffer, EngineStep::CreateOffer)?;
        Ok(self.describe(SdpType::Offer))
    }

    async fn create_answer(&self) -> Result<SessionDescription, MediaError> {
        self.record(EngineCall::CreateAnswer, EngineStep::CreateAnswer)?;
        Ok(self.describe(SdpType::Answer))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MediaError> {
        self.record(EngineCall::SetLocal(description.kind), EngineStep::SetLocal)
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MediaError> {
        self.record(EngineCall::SetRemote(description.kind), EngineStep::SetRemote)
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), MediaError> {
        self.record(
            EngineCall::AddCandidate(candidate.candidate),
            EngineStep::AddCandidate,
        )
    }

    fn take_candidate_events(&self) -> Option<mpsc::UnboundedReceiver<IceCandidate>> {
        self.inner.lock().unwrap().candidate_rx.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let engine = MockMediaEngine::new();
        let offer = engine.create_offer().await.unwrap();
        engine.set_local_description(offer.clone()).await.unwrap();
        assert!(offer.sdp.starts_with("v=0"));
        assert_eq!(
            engine.calls(),
            vec![EngineCall::CreateOffer, EngineCall::SetLocal(SdpType::Offer)]
        );
    }

    #[tokio::test]
    async fn test_injected_failure_and_recovery() {
        let engine = MockMediaEngine::new().failing(EngineStep::SetRemote);
        let offer = SessionDescription::offer("v=0\r\n");
        assert!(engine.set_remote_description(offer.clone()).await.is_err());

        engine.recover(EngineStep::SetRemote);
        assert!(engine.set_remote_description(offer).await.is_ok());
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_emitted_candidates_reach_the_stream_once() {
        let engine = MockMediaEngine::new();
        let mut events = engine.take_candidate_events().unwrap();
        assert!(engine.take_candidate_events().is_none());

        engine.emit_candidate(IceCandidate {
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
            candidate: "candidate:9 1 udp 1 10.0.0.1 9 typ host".to_string(),
        });
        assert_eq!(events.recv().await.unwrap().sdp_mline_index, 0);
    }
}
