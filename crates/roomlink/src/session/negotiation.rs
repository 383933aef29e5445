//! Offer/answer phase machine.
//!
//! The initiator walks `Idle → OfferCreated → OfferSent → AwaitingAnswer →
//! AnswerApplied → Connected`; the responder walks `Idle → OfferReceived →
//! AnswerCreated → AnswerSent → Connected`.
//!
//! The negotiator drives the media engine but never writes to the store. It
//! hands descriptions back to the session, which publishes them and reports
//! the write through `offer_sent` / `answer_sent`.
//!
//! Remote candidates that arrive before the remote description are buffered
//! and flushed in arrival order right after it is applied. Every candidate is
//! applied at most once per push id.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::SessionError;
use crate::media::{IceCandidate, MediaEngine, MediaError, SessionDescription};
use crate::observability::{record_negotiation_completed, record_negotiation_failure};
use crate::types::Role;

use super::room::{CandidateRecord, DescriptionRecord};

/// Negotiation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationPhase {
    Idle,
    OfferCreated,
    OfferSent,
    AwaitingAnswer,
    AnswerApplied,
    OfferReceived,
    AnswerCreated,
    AnswerSent,
    Connected,
}

impl NegotiationPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            NegotiationPhase::Idle => "idle",
            NegotiationPhase::OfferCreated => "offer_created",
            NegotiationPhase::OfferSent => "offer_sent",
            NegotiationPhase::AwaitingAnswer => "awaiting_answer",
            NegotiationPhase::AnswerApplied => "answer_applied",
            NegotiationPhase::OfferReceived => "offer_received",
            NegotiationPhase::AnswerCreated => "answer_created",
            NegotiationPhase::AnswerSent => "answer_sent",
            NegotiationPhase::Connected => "connected",
        }
    }
}

impl fmt::Display for NegotiationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of feeding a remote offer or answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionOutcome {
    /// Duplicate, stale, absent or out of phase.
    Ignored,
    /// Remote offer applied; the answer must be published.
    OfferApplied {
        answer: DescriptionRecord,
        flushed: Vec<IceCandidate>,
    },
    /// Remote answer applied; negotiation is complete.
    AnswerApplied { flushed: Vec<IceCandidate> },
}

/// Result of feeding a remote candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// Already applied, own candidate, or undecodable.
    Ignored,
    /// Held until the remote description is set.
    Buffered,
    Applied(IceCandidate),
    /// Rejected by the engine; not retried.
    Failed,
}

/// Sequences one peer's side of the offer/answer exchange.
pub struct Negotiator {
    engine: Arc<dyn MediaEngine>,
    role: Role,
    phase: NegotiationPhase,
    remote_description_set: bool,
    local_offer: Option<DescriptionRecord>,
    last_offer: Option<DescriptionRecord>,
    last_answer: Option<DescriptionRecord>,
    last_rejected: Option<Value>,
    pending: VecDeque<(String, CandidateRecord)>,
    seen_candidates: HashSet<String>,
}

impl Negotiator {
    #[must_use]
    pub fn new(engine: Arc<dyn MediaEngine>, role: Role) -> Self {
        Self {
            engine,
            role,
            phase: NegotiationPhase::Idle,
            remote_description_set: false,
            local_offer: None,
            last_offer: None,
            last_answer: None,
            last_rejected: None,
            pending: VecDeque::new(),
            seen_candidates: HashSet::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> NegotiationPhase {
        self.phase
    }

    /// Candidates waiting for the remote description.
    #[must_use]
    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    fn transition(&mut self, to: NegotiationPhase) {
        debug!(
            target: "roomlink.session.negotiation",
            role = %self.role,
            from = %self.phase,
            to = %to,
            "Negotiation phase change"
        );
        self.phase = to;
    }

    /// Back to `Idle`, dropping buffered candidates.
    pub fn reset(&mut self) {
        self.transition(NegotiationPhase::Idle);
        self.remote_description_set = false;
        self.local_offer = None;
        self.pending.clear();
    }

    fn fail(
        &mut self,
        stage: &'static str,
        rejected: Option<Value>,
        err: MediaError,
    ) -> SessionError {
        record_negotiation_failure(stage);
        warn!(
            target: "roomlink.session.negotiation",
            role = %self.role,
            stage,
            error = %err,
            "Negotiation step failed"
        );
        if rejected.is_some() {
            self.last_rejected = rejected;
        }
        self.reset();
        SessionError::from(err)
    }

    /// Create and apply a local offer, starting a fresh cycle.
    ///
    /// # Errors
    ///
    /// `NegotiationFailure` if called by a responder or the engine fails.
    pub async fn create_offer(&mut self) -> Result<DescriptionRecord, SessionError> {
        if self.role != Role::Initiator {
            return Err(SessionError::NegotiationFailure(
                "only the initiator creates offers".to_string(),
            ));
        }
        if self.phase != NegotiationPhase::Idle {
            info!(
                target: "roomlink.session.negotiation",
                phase = %self.phase,
                "Restarting negotiation"
            );
            self.reset();
        }
        self.last_answer = None;

        let offer = match self.engine.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return Err(self.fail("create_offer", None, e)),
        };
        let record = DescriptionRecord::now(offer.sdp.clone());
        if let Err(e) = self.engine.set_local_description(offer).await {
            return Err(self.fail("set_local", None, e));
        }
        self.local_offer = Some(record.clone());
        self.transition(NegotiationPhase::OfferCreated);
        Ok(record)
    }

    /// The offer reached the store.
    pub fn offer_sent(&mut self, remote_present: bool) {
        if self.phase != NegotiationPhase::OfferCreated {
            return;
        }
        self.transition(NegotiationPhase::OfferSent);
        if remote_present {
            self.transition(NegotiationPhase::AwaitingAnswer);
        }
    }

    /// The responder showed up while the offer is outstanding.
    pub fn remote_joined(&mut self) {
        if self.phase == NegotiationPhase::OfferSent {
            self.transition(NegotiationPhase::AwaitingAnswer);
        }
    }

    /// The answer reached the store. Completes the responder's side.
    ///
    /// Returns `true` when this call completed the negotiation.
    pub fn answer_sent(&mut self) -> bool {
        if self.phase != NegotiationPhase::AnswerCreated {
            return false;
        }
        self.transition(NegotiationPhase::AnswerSent);
        self.complete();
        true
    }

    fn complete(&mut self) {
        self.transition(NegotiationPhase::Connected);
        record_negotiation_completed(self.role.as_str());
        info!(
            target: "roomlink.session.negotiation",
            role = %self.role,
            "Negotiation complete"
        );
    }

    fn is_rejected(&self, raw: &Value) -> bool {
        self.last_rejected.as_ref() == Some(raw)
    }

    /// Decode a description payload.
    ///
    /// A malformed payload never touches the engine, so it leaves the
    /// negotiation where it was. It is remembered so redelivery stays quiet.
    /// Only a negotiator with nothing established reports it as a failure;
    /// a connected one keeps its session and yields `None`.
    fn decode(&mut self, raw: Value) -> Result<Option<DescriptionRecord>, SessionError> {
        match serde_json::from_value::<DescriptionRecord>(raw.clone()) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                record_negotiation_failure("decode");
                warn!(
                    target: "roomlink.session.negotiation",
                    role = %self.role,
                    phase = %self.phase,
                    error = %e,
                    "Malformed description payload"
                );
                self.last_rejected = Some(raw);
                if self.phase == NegotiationPhase::Connected {
                    return Ok(None);
                }
                Err(SessionError::NegotiationFailure(format!(
                    "malformed description: {e}"
                )))
            }
        }
    }

    /// Feed the remote offer (responder).
    ///
    /// # Errors
    ///
    /// `NegotiationFailure` if the payload is malformed outside of an
    /// established session, or the engine rejects it. An engine rejection
    /// puts the negotiator back at `Idle`. Either way the payload is
    /// remembered.
    pub async fn handle_offer(
        &mut self,
        raw: Option<Value>,
    ) -> Result<DescriptionOutcome, SessionError> {
        let Some(raw) = raw else {
            return Ok(DescriptionOutcome::Ignored);
        };
        if self.role != Role::Responder || self.is_rejected(&raw) {
            return Ok(DescriptionOutcome::Ignored);
        }
        let Some(record) = self.decode(raw.clone())? else {
            return Ok(DescriptionOutcome::Ignored);
        };
        if self.last_offer.as_ref() == Some(&record) {
            debug!(
                target: "roomlink.session.negotiation",
                "Ignoring redelivered offer"
            );
            return Ok(DescriptionOutcome::Ignored);
        }
        if self.phase != NegotiationPhase::Idle {
            info!(
                target: "roomlink.session.negotiation",
                phase = %self.phase,
                "New offer, starting fresh cycle"
            );
            self.reset();
        }

        debug!(
            target: "roomlink.session.negotiation",
            sdp_len = record.sdp.len(),
            "Applying remote offer"
        );
        let description = SessionDescription::offer(record.sdp.clone());
        if let Err(e) = self.engine.set_remote_description(description).await {
            return Err(self.fail("set_remote", Some(raw), e));
        }
        let offer_ts = record.timestamp;
        self.last_offer = Some(record);
        self.remote_description_set = true;
        self.transition(NegotiationPhase::OfferReceived);
        let flushed = self.flush_pending().await;

        let answer = match self.engine.create_answer().await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail("create_answer", Some(raw), e)),
        };
        let record = DescriptionRecord {
            answers: Some(offer_ts),
            ..DescriptionRecord::now(answer.sdp.clone())
        };
        if let Err(e) = self.engine.set_local_description(answer).await {
            return Err(self.fail("set_local", Some(raw), e));
        }
        self.transition(NegotiationPhase::AnswerCreated);
        Ok(DescriptionOutcome::OfferApplied {
            answer: record,
            flushed,
        })
    }

    /// Feed the remote answer (initiator).
    ///
    /// # Errors
    ///
    /// `NegotiationFailure` if the payload is malformed or the engine rejects
    /// it. An engine rejection puts the negotiator back at `Idle`. Either way
    /// the payload is remembered.
    pub async fn handle_answer(
        &mut self,
        raw: Option<Value>,
    ) -> Result<DescriptionOutcome, SessionError> {
        let Some(raw) = raw else {
            return Ok(DescriptionOutcome::Ignored);
        };
        if self.role != Role::Initiator || self.is_rejected(&raw) {
            return Ok(DescriptionOutcome::Ignored);
        }
        if !matches!(
            self.phase,
            NegotiationPhase::OfferSent | NegotiationPhase::AwaitingAnswer
        ) {
            debug!(
                target: "roomlink.session.negotiation",
                phase = %self.phase,
                "Ignoring answer outside of an outstanding offer"
            );
            return Ok(DescriptionOutcome::Ignored);
        }
        let Some(record) = self.decode(raw.clone())? else {
            return Ok(DescriptionOutcome::Ignored);
        };
        if self.last_answer.as_ref() == Some(&record) {
            return Ok(DescriptionOutcome::Ignored);
        }
        let offer_ts = self.local_offer.as_ref().map(|offer| offer.timestamp);
        if let (Some(answers), Some(offer_ts)) = (record.answers, offer_ts) {
            if answers != offer_ts {
                debug!(
                    target: "roomlink.session.negotiation",
                    answers,
                    offer_ts,
                    "Ignoring answer to a previous offer"
                );
                return Ok(DescriptionOutcome::Ignored);
            }
        }

        debug!(
            target: "roomlink.session.negotiation",
            sdp_len = record.sdp.len(),
            "Applying remote answer"
        );
        let description = SessionDescription::answer(record.sdp.clone());
        if let Err(e) = self.engine.set_remote_description(description).await {
            return Err(self.fail("set_remote", Some(raw), e));
        }
        self.last_answer = Some(record);
        self.remote_description_set = true;
        self.transition(NegotiationPhase::AnswerApplied);
        let flushed = self.flush_pending().await;
        self.complete();
        Ok(DescriptionOutcome::AnswerApplied { flushed })
    }

    /// Feed a remote candidate keyed by its push id.
    pub async fn handle_candidate(&mut self, key: String, raw: Value) -> CandidateOutcome {
        if self.seen_candidates.contains(&key) {
            return CandidateOutcome::Ignored;
        }
        let record = match serde_json::from_value::<CandidateRecord>(raw) {
            Ok(record) => record,
            Err(e) => {
                record_negotiation_failure("decode");
                warn!(
                    target: "roomlink.session.negotiation",
                    key = %key,
                    error = %e,
                    "Malformed candidate payload"
                );
                self.seen_candidates.insert(key);
                return CandidateOutcome::Ignored;
            }
        };
        if record.sender == self.role {
            self.seen_candidates.insert(key);
            return CandidateOutcome::Ignored;
        }

        self.seen_candidates.insert(key.clone());
        if !self.remote_description_set {
            debug!(
                target: "roomlink.session.negotiation",
                key = %key,
                "Buffering early candidate"
            );
            self.pending.push_back((key, record));
            return CandidateOutcome::Buffered;
        }
        self.apply_candidate(&key, &record).await
    }

    async fn apply_candidate(&self, key: &str, record: &CandidateRecord) -> CandidateOutcome {
        let candidate = record.to_candidate();
        match self.engine.add_candidate(candidate.clone()).await {
            Ok(()) => CandidateOutcome::Applied(candidate),
            Err(e) => {
                record_negotiation_failure("add_candidate");
                warn!(
                    target: "roomlink.session.negotiation",
                    key = %key,
                    error = %e,
                    "Candidate rejected"
                );
                CandidateOutcome::Failed
            }
        }
    }

    async fn flush_pending(&mut self) -> Vec<IceCandidate> {
        let mut applied = Vec::new();
        while let Some((key, record)) = self.pending.pop_front() {
            if let CandidateOutcome::Applied(candidate) = self.apply_candidate(&key, &record).await
            {
                applied.push(candidate);
            }
        }
        if !applied.is_empty() {
            debug!(
                target: "roomlink.session.negotiation",
                count = applied.len(),
                "Flushed buffered candidates"
            );
        }
        applied
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::media::LoopbackEngine;
    use serde_json::json;

    fn candidate_json(n: u32, sender: Role) -> Value {
        json!(CandidateRecord {
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
            candidate: format!("candidate:{n} 1 udp 1 10.0.0.{n} 5000 typ host"),
            timestamp: 0,
            sender,
        })
    }

    fn responder() -> (Negotiator, Arc<LoopbackEngine>) {
        let engine = Arc::new(LoopbackEngine::new(Vec::new()));
        (Negotiator::new(engine.clone(), Role::Responder), engine)
    }

    fn initiator() -> (Negotiator, Arc<LoopbackEngine>) {
        let engine = Arc::new(LoopbackEngine::new(Vec::new()));
        (Negotiator::new(engine.clone(), Role::Initiator), engine)
    }

    fn offer_json(sdp: &str, timestamp: i64) -> Value {
        json!({"sdp": sdp, "timestamp": timestamp})
    }

    #[tokio::test]
    async fn test_initiator_phases() {
        let (mut negotiator, _) = initiator();
        let offer = negotiator.create_offer().await.unwrap();
        assert_eq!(negotiator.phase(), NegotiationPhase::OfferCreated);

        negotiator.offer_sent(false);
        assert_eq!(negotiator.phase(), NegotiationPhase::OfferSent);
        negotiator.remote_joined();
        assert_eq!(negotiator.phase(), NegotiationPhase::AwaitingAnswer);

        let answer = offer_json("v=0 answer", offer.timestamp + 1);
        let outcome = negotiator.handle_answer(Some(answer.clone())).await.unwrap();
        assert_eq!(outcome, DescriptionOutcome::AnswerApplied { flushed: vec![] });
        assert_eq!(negotiator.phase(), NegotiationPhase::Connected);

        // Redelivery is not re-applied.
        let outcome = negotiator.handle_answer(Some(answer)).await.unwrap();
        assert_eq!(outcome, DescriptionOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_responder_phases() {
        let (mut negotiator, engine) = responder();
        let outcome = negotiator
            .handle_offer(Some(offer_json("v=0 offer", 10)))
            .await
            .unwrap();
        assert!(matches!(outcome, DescriptionOutcome::OfferApplied { .. }));
        assert_eq!(negotiator.phase(), NegotiationPhase::AnswerCreated);
        assert!(engine.local_description().is_some());

        assert!(negotiator.answer_sent());
        assert_eq!(negotiator.phase(), NegotiationPhase::Connected);
        assert!(!negotiator.answer_sent());
    }

    #[tokio::test]
    async fn test_redelivered_offer_is_ignored() {
        let (mut negotiator, _) = responder();
        let offer = offer_json("v=0 offer", 10);
        negotiator.handle_offer(Some(offer.clone())).await.unwrap();
        negotiator.answer_sent();

        let outcome = negotiator.handle_offer(Some(offer)).await.unwrap();
        assert_eq!(outcome, DescriptionOutcome::Ignored);
        assert_eq!(negotiator.phase(), NegotiationPhase::Connected);
    }

    #[tokio::test]
    async fn test_new_offer_restarts_cycle() {
        let (mut negotiator, engine) = responder();
        negotiator
            .handle_offer(Some(offer_json("v=0 first", 10)))
            .await
            .unwrap();
        negotiator.answer_sent();

        let outcome = negotiator
            .handle_offer(Some(offer_json("v=0 second", 20)))
            .await
            .unwrap();
        assert!(matches!(outcome, DescriptionOutcome::OfferApplied { .. }));
        assert_eq!(negotiator.phase(), NegotiationPhase::AnswerCreated);
        assert_eq!(engine.remote_description().unwrap().sdp, "v=0 second");
    }

    #[tokio::test]
    async fn test_early_candidates_flush_in_order_exactly_once() {
        let (mut negotiator, engine) = responder();
        for n in 1..=3 {
            let outcome = negotiator
                .handle_candidate(format!("c{n}"), candidate_json(n, Role::Initiator))
                .await;
            assert_eq!(outcome, CandidateOutcome::Buffered);
        }
        // Redelivery while buffered.
        assert_eq!(
            negotiator
                .handle_candidate("c2".to_string(), candidate_json(2, Role::Initiator))
                .await,
            CandidateOutcome::Ignored
        );
        assert_eq!(negotiator.pending_candidates(), 3);

        let outcome = negotiator
            .handle_offer(Some(offer_json("v=0 offer", 10)))
            .await
            .unwrap();
        let DescriptionOutcome::OfferApplied { flushed, .. } = outcome else {
            panic!("expected offer to apply");
        };
        assert_eq!(flushed.len(), 3);
        assert_eq!(negotiator.pending_candidates(), 0);

        let applied: Vec<String> = engine
            .applied_candidates()
            .into_iter()
            .map(|c| c.candidate)
            .collect();
        assert!(applied[0].starts_with("candidate:1 "));
        assert!(applied[1].starts_with("candidate:2 "));
        assert!(applied[2].starts_with("candidate:3 "));

        // Redelivery after application.
        assert_eq!(
            negotiator
                .handle_candidate("c1".to_string(), candidate_json(1, Role::Initiator))
                .await,
            CandidateOutcome::Ignored
        );
        assert_eq!(engine.applied_candidates().len(), 3);
    }

    #[tokio::test]
    async fn test_own_candidates_are_skipped() {
        let (mut negotiator, engine) = responder();
        negotiator
            .handle_offer(Some(offer_json("v=0 offer", 10)))
            .await
            .unwrap();
        let outcome = negotiator
            .handle_candidate("c1".to_string(), candidate_json(1, Role::Responder))
            .await;
        assert_eq!(outcome, CandidateOutcome::Ignored);
        assert!(engine.applied_candidates().is_empty());
    }

    #[tokio::test]
    async fn test_answer_to_a_previous_offer_is_ignored() {
        let (mut negotiator, engine) = initiator();
        let offer = negotiator.create_offer().await.unwrap();
        negotiator.offer_sent(true);

        let previous = json!({
            "sdp": "v=0 old answer",
            "timestamp": offer.timestamp + 5,
            "answers": offer.timestamp - 1,
        });
        let outcome = negotiator.handle_answer(Some(previous)).await.unwrap();
        assert_eq!(outcome, DescriptionOutcome::Ignored);
        assert_eq!(negotiator.phase(), NegotiationPhase::AwaitingAnswer);
        assert!(engine.remote_description().is_none());
    }

    #[tokio::test]
    async fn test_answer_from_a_slow_clock_is_applied() {
        let (mut negotiator, _) = initiator();
        let offer = negotiator.create_offer().await.unwrap();
        negotiator.offer_sent(true);

        // The responder's clock runs two seconds behind.
        let answer = json!({
            "sdp": "v=0 answer",
            "timestamp": offer.timestamp - 2_000,
            "answers": offer.timestamp,
        });
        let outcome = negotiator.handle_answer(Some(answer)).await.unwrap();
        assert_eq!(outcome, DescriptionOutcome::AnswerApplied { flushed: vec![] });
        assert_eq!(negotiator.phase(), NegotiationPhase::Connected);
    }

    #[tokio::test]
    async fn test_answer_names_the_offer_it_answers() {
        let (mut negotiator, _) = responder();
        let outcome = negotiator
            .handle_offer(Some(offer_json("v=0 offer", 10)))
            .await
            .unwrap();
        let DescriptionOutcome::OfferApplied { answer, .. } = outcome else {
            panic!("expected offer to apply");
        };
        assert_eq!(answer.answers, Some(10));
    }

    #[tokio::test]
    async fn test_malformed_offer_keeps_an_established_session() {
        let (mut negotiator, engine) = responder();
        negotiator
            .handle_offer(Some(offer_json("v=0 offer", 10)))
            .await
            .unwrap();
        assert!(negotiator.answer_sent());

        let junk = json!({"sdp": 42});
        assert_eq!(
            negotiator.handle_offer(Some(junk.clone())).await.unwrap(),
            DescriptionOutcome::Ignored
        );
        assert_eq!(negotiator.phase(), NegotiationPhase::Connected);
        assert_eq!(engine.remote_description().unwrap().sdp, "v=0 offer");

        // A fresh offer still starts a new cycle.
        let outcome = negotiator
            .handle_offer(Some(offer_json("v=0 second", 20)))
            .await
            .unwrap();
        assert!(matches!(outcome, DescriptionOutcome::OfferApplied { .. }));
    }

    #[tokio::test]
    async fn test_malformed_answer_leaves_offer_outstanding() {
        let (mut negotiator, _) = initiator();
        let offer = negotiator.create_offer().await.unwrap();
        negotiator.offer_sent(true);

        let junk = json!({"sdp": 42});
        let err = negotiator.handle_answer(Some(junk.clone())).await.unwrap_err();
        assert!(matches!(err, SessionError::NegotiationFailure(_)));
        assert_eq!(negotiator.phase(), NegotiationPhase::AwaitingAnswer);
        assert_eq!(
            negotiator.handle_answer(Some(junk)).await.unwrap(),
            DescriptionOutcome::Ignored
        );

        let answer = offer_json("v=0 answer", offer.timestamp);
        assert!(matches!(
            negotiator.handle_answer(Some(answer)).await.unwrap(),
            DescriptionOutcome::AnswerApplied { .. }
        ));
    }

    #[tokio::test]
    async fn test_rejected_offer_resets_and_is_remembered() {
        let (mut negotiator, engine) = responder();
        let bad = offer_json("garbage", 10);
        let err = negotiator.handle_offer(Some(bad.clone())).await.unwrap_err();
        assert!(matches!(err, SessionError::NegotiationFailure(_)));
        assert_eq!(negotiator.phase(), NegotiationPhase::Idle);

        let outcome = negotiator.handle_offer(Some(bad)).await.unwrap();
        assert_eq!(outcome, DescriptionOutcome::Ignored);
        assert!(engine.remote_description().is_none());

        // Undecodable payloads behave the same.
        let junk = json!({"not": "an offer"});
        assert!(negotiator.handle_offer(Some(junk.clone())).await.is_err());
        assert_eq!(
            negotiator.handle_offer(Some(junk)).await.unwrap(),
            DescriptionOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_absent_description_is_ignored() {
        let (mut negotiator, _) = responder();
        assert_eq!(
            negotiator.handle_offer(None).await.unwrap(),
            DescriptionOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_responder_cannot_offer() {
        let (mut negotiator, _) = responder();
        assert!(negotiator.create_offer().await.is_err());
    }
}
