//! `SignalingSession` - per-room-membership actor.
//!
//! Each `SignalingSession`:
//! - Creates (initiator) or joins (responder) one room
//! - Owns the connection state and publishes it over a `watch` channel
//! - Sequences offer/answer/candidate exchange through the `Negotiator`
//! - Probes a quiet room and reconnects with bounded backoff
//!
//! # Lifecycle
//!
//! 1. Spawned in `Disconnected`; `connect()` moves it through
//!    `ConnectingToStore` to `WatchingRoom`
//! 2. Negotiation moves it through `Negotiating` to `Connected`
//! 3. Store loss moves it to `Reconnecting`; success returns to
//!    `WatchingRoom`, an exhausted budget ends in `Failed`
//! 4. `disconnect()` tears the room down and stops the actor

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::errors::SessionError;
use crate::media::{IceCandidate, MediaEngine};
use crate::observability::{
    record_reconnect_attempt, record_remote_hangup, record_store_error, session_ended,
    session_started,
};
use crate::store::{SignalingStore, ValueStream};
use crate::types::{ConnectionState, Role, RoomCode, RoomStatus};

use super::events::SessionListener;
use super::liveness::{LivenessMonitor, LivenessVerdict};
use super::messages::{Outbound, RoomEvent, SessionMessage, SessionStatus};
use super::negotiation::{CandidateOutcome, DescriptionOutcome, NegotiationPhase, Negotiator};
use super::reconnect::{ReconnectController, RetryDecision};
use super::room::{presence_field, CandidateRecord, RoomSession};

/// Session mailbox capacity.
const SESSION_CHANNEL_BUFFER: usize = 256;

/// Handle to a `SignalingSession`.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    state: watch::Receiver<ConnectionState>,
    cancel_token: CancellationToken,
    room_id: RoomCode,
    role: Role,
    ice_servers: Arc<[String]>,
}

impl SessionHandle {
    #[must_use]
    pub fn room_id(&self) -> &RoomCode {
        &self.room_id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// ICE servers configured for the media engine.
    #[must_use]
    pub fn ice_servers(&self) -> &[String] {
        &self.ice_servers
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }

    /// Create or join the room and start watching it.
    ///
    /// # Errors
    ///
    /// - `RoomNotFound` / `RoomUnavailable` if the room cannot be joined
    /// - `SignalingFailure` if the store is unreachable
    /// - `SessionClosed` if the actor has stopped
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::Connect { respond_to })
            .await?
    }

    /// Snapshot of the session.
    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(|respond_to| SessionMessage::GetStatus { respond_to })
            .await
    }

    /// Relay a locally gathered candidate to the peer.
    pub async fn send_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::SendCandidate {
            candidate,
            respond_to,
        })
        .await?
    }

    /// Start a fresh offer/answer cycle (initiator only).
    pub async fn restart_negotiation(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::RestartNegotiation { respond_to })
            .await?
    }

    /// Write the room status.
    pub async fn set_status(&self, status: RoomStatus) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::SetStatus { status, respond_to })
            .await?
    }

    /// Leave the room and stop the session. Safe from any state, and on a
    /// session that has already stopped.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        match self
            .request(|respond_to| SessionMessage::Disconnect { respond_to })
            .await
        {
            Err(SessionError::SessionClosed) => Ok(()),
            other => other?,
        }
    }

    /// Stop the actor without touching the store.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// The session actor.
pub struct SignalingSession {
    config: Config,
    role: Role,
    room: RoomSession,
    negotiator: Negotiator,
    liveness: LivenessMonitor,
    reconnect: ReconnectController,
    store: Arc<dyn SignalingStore>,
    engine: Arc<dyn MediaEngine>,
    listener: Arc<dyn SessionListener>,
    receiver: mpsc::Receiver<SessionMessage>,
    /// Forwarders hold weak senders so dropped handles still stop the actor.
    mailbox: mpsc::WeakSender<SessionMessage>,
    state: watch::Sender<ConnectionState>,
    cancel_token: CancellationToken,
    /// Parent of every forwarder task.
    forwarders: CancellationToken,
    /// Room watches of the current generation.
    watches: CancellationToken,
    generation: u64,
    replay: VecDeque<RoomEvent>,
    pending_outbound: VecDeque<Outbound>,
    store_connected: bool,
    remote_present: bool,
    auto_offer_done: bool,
}

impl SignalingSession {
    /// Spawn a session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: Config,
        room_id: RoomCode,
        role: Role,
        store: Arc<dyn SignalingStore>,
        engine: Arc<dyn MediaEngine>,
        listener: Arc<dyn SessionListener>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel_token = CancellationToken::new();
        let forwarders = cancel_token.child_token();
        let watches = forwarders.child_token();

        let handle = SessionHandle {
            sender: sender.clone(),
            state: state_rx,
            cancel_token: cancel_token.clone(),
            room_id: room_id.clone(),
            role,
            ice_servers: Arc::from(config.ice_servers.clone()),
        };

        let actor = Self {
            room: RoomSession::new(Arc::clone(&store), &config.rooms_root, room_id, role),
            negotiator: Negotiator::new(Arc::clone(&engine), role),
            liveness: LivenessMonitor::new(config.stale_timeout),
            reconnect: ReconnectController::new(
                config.reconnect_base,
                config.reconnect_max_delay,
                config.max_reconnect_attempts,
            ),
            config,
            role,
            store,
            engine,
            listener,
            receiver,
            mailbox: sender.downgrade(),
            state: state_tx,
            cancel_token,
            forwarders,
            watches,
            generation: 0,
            replay: VecDeque::new(),
            pending_outbound: VecDeque::new(),
            store_connected: false,
            remote_present: false,
            auto_offer_done: false,
        };

        let task_handle = tokio::spawn(actor.run());
        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "roomlink.session",
        fields(room_id = %self.room.room_id(), role = %self.role)
    )]
    async fn run(mut self) {
        session_started();
        debug!(target: "roomlink.session", "Session actor started");

        let period = self.config.liveness_interval;
        let mut liveness_tick = interval_at(Instant::now() + period, period);
        liveness_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let retry_at = self.reconnect.next_attempt_at();
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "roomlink.session", "Session cancelled");
                    self.stop();
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        debug!(target: "roomlink.session", "All handles dropped");
                        self.shutdown().await;
                        break;
                    };
                    if self.handle_message(message).await == Flow::Stop {
                        break;
                    }
                }

                _ = liveness_tick.tick() => {
                    self.on_liveness_tick().await;
                }

                () = wait_until(retry_at) => {
                    self.run_reconnect_attempt().await;
                }
            }
        }

        session_ended();
        debug!(target: "roomlink.session", "Session actor stopped");
    }

    async fn handle_message(&mut self, message: SessionMessage) -> Flow {
        match message {
            SessionMessage::Connect { respond_to } => {
                let result = self.handle_connect().await;
                let _ = respond_to.send(result);
            }
            SessionMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }
            SessionMessage::SendCandidate {
                candidate,
                respond_to,
            } => {
                let result = self.handle_local_candidate(candidate).await;
                let _ = respond_to.send(result);
            }
            SessionMessage::RestartNegotiation { respond_to } => {
                let result = self.handle_restart_negotiation().await;
                let _ = respond_to.send(result);
            }
            SessionMessage::SetStatus { status, respond_to } => {
                let result = self.handle_set_status(status).await;
                let _ = respond_to.send(result);
            }
            SessionMessage::Disconnect { respond_to } => {
                self.shutdown().await;
                let _ = respond_to.send(Ok(()));
                return Flow::Stop;
            }
            SessionMessage::Room { generation, event } => {
                self.handle_room_event(generation, event).await;
            }
            SessionMessage::StorePresence { connected } => {
                self.handle_store_presence(connected).await;
            }
            SessionMessage::LocalCandidate { candidate } => {
                if let Err(e) = self.handle_local_candidate(candidate).await {
                    debug!(
                        target: "roomlink.session",
                        error = %e,
                        "Dropping gathered candidate"
                    );
                }
            }
        }
        Flow::Continue
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(
                target: "roomlink.session",
                room_id = %self.room.room_id(),
                role = %self.role,
                from = %previous,
                to = %state,
                "Connection state change"
            );
        }
    }

    fn state_for_phase(&self) -> ConnectionState {
        match self.negotiator.phase() {
            NegotiationPhase::Idle => ConnectionState::WatchingRoom,
            NegotiationPhase::Connected => ConnectionState::Connected,
            _ => ConnectionState::Negotiating,
        }
    }

    fn not_active(&self) -> SessionError {
        match self.current_state() {
            ConnectionState::Failed => SessionError::ReconnectExhausted {
                attempts: self.reconnect.max_attempts(),
            },
            state => SessionError::SignalingFailure(format!("not in a room (state: {state})")),
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            room_id: self.room.room_id().clone(),
            role: self.role,
            state: self.current_state(),
            phase: self.negotiator.phase(),
            reconnect_attempts: self.reconnect.attempts(),
            pending_candidates: self.negotiator.pending_candidates(),
            pending_outbound: self.pending_outbound.len(),
            buffered_events: self.replay.len(),
            watch_generation: self.generation,
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn handle_connect(&mut self) -> Result<(), SessionError> {
        match self.current_state() {
            ConnectionState::Disconnected => {}
            ConnectionState::Failed => return Err(self.not_active()),
            state => {
                return Err(SessionError::Internal(format!(
                    "connect called while {state}"
                )))
            }
        }

        self.set_state(ConnectionState::ConnectingToStore);
        if let Err(e) = self.room.create().await {
            info!(
                target: "roomlink.session",
                room_id = %self.room.room_id(),
                error = %e,
                "Could not enter room"
            );
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
        if let Err(e) = self.register_watches().await {
            self.watches.cancel();
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
        self.spawn_presence_forwarder();
        self.spawn_candidate_forwarder();

        self.liveness.touch(Instant::now());
        self.set_state(ConnectionState::WatchingRoom);
        if self.store_connected {
            self.maybe_auto_offer().await;
        }
        Ok(())
    }

    async fn handle_local_candidate(&mut self, candidate: IceCandidate) -> Result<(), SessionError> {
        let state = self.current_state();
        if !state.accepts_signals() && state != ConnectionState::Reconnecting {
            return Err(self.not_active());
        }
        let record = CandidateRecord::from_candidate(candidate, self.role);
        self.send_outbound(Outbound::Candidate(record)).await;
        Ok(())
    }

    async fn handle_restart_negotiation(&mut self) -> Result<(), SessionError> {
        if self.role != Role::Initiator {
            return Err(SessionError::NegotiationFailure(
                "only the initiator can restart negotiation".to_string(),
            ));
        }
        if !self.current_state().accepts_signals() {
            return Err(self.not_active());
        }
        self.auto_offer_done = true;
        self.begin_offer().await
    }

    async fn handle_set_status(&mut self, status: RoomStatus) -> Result<(), SessionError> {
        let state = self.current_state();
        if status == RoomStatus::Disconnected {
            // Our own hangup must not come back as a remote one.
            self.liveness.report_hangup();
        }
        if state == ConnectionState::Reconnecting {
            self.pending_outbound.push_back(Outbound::Status(status));
            return Ok(());
        }
        if !state.accepts_signals() {
            return Err(self.not_active());
        }
        self.room.set_status(status).await?;
        self.liveness.touch(Instant::now());
        Ok(())
    }

    /// Best-effort teardown, then stop.
    async fn shutdown(&mut self) {
        let state = self.current_state();
        self.reconnect.cancel();
        self.forwarders.cancel();
        if !matches!(
            state,
            ConnectionState::Failed | ConnectionState::Disconnected
        ) {
            if let Err(e) = self.room.teardown().await {
                warn!(
                    target: "roomlink.session",
                    room_id = %self.room.room_id(),
                    error = %e,
                    "Room teardown failed"
                );
            }
        }
        self.replay.clear();
        self.pending_outbound.clear();
        self.set_state(ConnectionState::Disconnected);
        info!(
            target: "roomlink.session",
            room_id = %self.room.room_id(),
            "Session disconnected"
        );
    }

    fn stop(&mut self) {
        self.reconnect.cancel();
        self.forwarders.cancel();
        self.set_state(ConnectionState::Disconnected);
    }

    // ------------------------------------------------------------------
    // Watches
    // ------------------------------------------------------------------

    async fn watch_field(&self, field: &str) -> Result<ValueStream, SessionError> {
        self.store
            .watch(&self.room.field_path(field))
            .await
            .map_err(|e| {
                record_store_error("watch");
                SessionError::from(e)
            })
    }

    /// Replace the room watches with a new generation.
    async fn register_watches(&mut self) -> Result<(), SessionError> {
        self.watches.cancel();
        self.watches = self.forwarders.child_token();
        self.generation += 1;

        let description_field = match self.role {
            Role::Initiator => "answer",
            Role::Responder => "offer",
        };
        let descriptions = self.watch_field(description_field).await?;
        let candidates = self
            .store
            .watch_child_added(&self.room.field_path("candidates"))
            .await
            .map_err(|e| {
                record_store_error("watch");
                SessionError::from(e)
            })?;
        let status = self.watch_field("status").await?;
        let remote_presence = self.watch_field(presence_field(self.role.peer())).await?;

        match self.role {
            Role::Initiator => self.forward(descriptions, RoomEvent::Answer),
            Role::Responder => self.forward(descriptions, RoomEvent::Offer),
        }
        self.forward(candidates, |(key, value)| RoomEvent::Candidate { key, value });
        self.forward(status, RoomEvent::Status);
        self.forward(remote_presence, RoomEvent::RemotePresence);

        debug!(
            target: "roomlink.session",
            room_id = %self.room.room_id(),
            generation = self.generation,
            "Room watches registered"
        );
        Ok(())
    }

    fn forward<T: Send + 'static>(
        &self,
        mut rx: mpsc::UnboundedReceiver<T>,
        wrap: fn(T) -> RoomEvent,
    ) {
        let mailbox = self.mailbox.clone();
        let token = self.watches.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    item = rx.recv() => {
                        let Some(item) = item else { break };
                        let Some(tx) = mailbox.upgrade() else { break };
                        let message = SessionMessage::Room { generation, event: wrap(item) };
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_presence_forwarder(&mut self) {
        let mut presence = self.store.presence();
        self.store_connected = *presence.borrow_and_update();
        let mailbox = self.mailbox.clone();
        let token = self.forwarders.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    changed = presence.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let connected = *presence.borrow_and_update();
                        let Some(tx) = mailbox.upgrade() else { break };
                        if tx.send(SessionMessage::StorePresence { connected }).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_candidate_forwarder(&self) {
        let Some(mut events) = self.engine.take_candidate_events() else {
            return;
        };
        let mailbox = self.mailbox.clone();
        let token = self.forwarders.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    candidate = events.recv() => {
                        let Some(candidate) = candidate else { break };
                        let Some(tx) = mailbox.upgrade() else { break };
                        if tx.send(SessionMessage::LocalCandidate { candidate }).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Room events
    // ------------------------------------------------------------------

    async fn handle_room_event(&mut self, generation: u64, event: RoomEvent) {
        if generation != self.generation {
            debug!(
                target: "roomlink.session",
                generation,
                current = self.generation,
                kind = event.kind(),
                "Dropping delivery from a replaced watch"
            );
            return;
        }
        self.liveness.touch(Instant::now());

        match self.current_state() {
            ConnectionState::Reconnecting => {
                debug!(
                    target: "roomlink.session",
                    kind = event.kind(),
                    "Buffering room event while reconnecting"
                );
                self.replay.push_back(event);
            }
            state if state.accepts_signals() => self.apply_room_event(event).await,
            state => {
                debug!(
                    target: "roomlink.session",
                    kind = event.kind(),
                    state = %state,
                    "Dropping room event"
                );
            }
        }
    }

    async fn apply_room_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Offer(raw) => {
                let outcome = self.negotiator.handle_offer(raw).await;
                self.on_description_outcome(outcome).await;
            }
            RoomEvent::Answer(raw) => {
                let outcome = self.negotiator.handle_answer(raw).await;
                self.on_description_outcome(outcome).await;
            }
            RoomEvent::Candidate { key, value } => {
                if let CandidateOutcome::Applied(candidate) =
                    self.negotiator.handle_candidate(key, value).await
                {
                    self.listener.on_candidate_received(&candidate);
                }
            }
            RoomEvent::Status(raw) => {
                let status = raw.and_then(|v| serde_json::from_value::<RoomStatus>(v).ok());
                if status == Some(RoomStatus::Disconnected) {
                    self.remote_hangup();
                }
            }
            RoomEvent::RemotePresence(raw) => self.on_remote_presence(raw).await,
        }
    }

    async fn on_description_outcome(&mut self, outcome: Result<DescriptionOutcome, SessionError>) {
        match outcome {
            Ok(DescriptionOutcome::Ignored) => {}
            Ok(DescriptionOutcome::OfferApplied { answer, flushed }) => {
                self.listener.on_offer_received();
                for candidate in &flushed {
                    self.listener.on_candidate_received(candidate);
                }
                self.set_state(ConnectionState::Negotiating);
                self.send_outbound(Outbound::Answer(answer)).await;
            }
            Ok(DescriptionOutcome::AnswerApplied { flushed }) => {
                self.listener.on_answer_received();
                for candidate in &flushed {
                    self.listener.on_candidate_received(candidate);
                }
                self.connection_established();
            }
            Err(e) => self.negotiation_failed(&e),
        }
    }

    async fn on_remote_presence(&mut self, raw: Option<Value>) {
        let present = matches!(raw, Some(Value::Bool(true)));
        if present == self.remote_present {
            return;
        }
        self.remote_present = present;
        if !present {
            debug!(target: "roomlink.session", "Remote presence flag cleared");
            return;
        }

        info!(
            target: "roomlink.session",
            room_id = %self.room.room_id(),
            "Remote peer connected"
        );
        self.listener.on_remote_connected();
        if self.role == Role::Initiator {
            self.negotiator.remote_joined();
            if let Err(e) = self.room.cancel_expiry().await {
                warn!(
                    target: "roomlink.session",
                    error = %e,
                    "Could not cancel room expiry"
                );
            }
        }
    }

    fn remote_hangup(&mut self) {
        if !self.liveness.report_hangup() {
            return;
        }
        info!(
            target: "roomlink.session",
            room_id = %self.room.room_id(),
            "Remote peer hung up"
        );
        record_remote_hangup();
        self.listener.on_remote_hangup();
    }

    fn connection_established(&self) {
        self.set_state(ConnectionState::Connected);
        self.listener.on_connection_established();
    }

    /// Report a failed step. The state follows whatever phase the
    /// negotiator kept: `WatchingRoom` after a reset, unchanged otherwise.
    fn negotiation_failed(&self, err: &SessionError) {
        self.listener.on_connection_failed(&err.to_string());
        if self.current_state().accepts_signals() {
            self.set_state(self.state_for_phase());
        }
    }

    // ------------------------------------------------------------------
    // Negotiation
    // ------------------------------------------------------------------

    async fn handle_store_presence(&mut self, connected: bool) {
        self.store_connected = connected;
        if !connected {
            self.trigger_reconnect("presence_lost");
            return;
        }
        match self.current_state() {
            ConnectionState::Reconnecting => self.reconnect.pull_forward(Instant::now()),
            ConnectionState::WatchingRoom => self.maybe_auto_offer().await,
            _ => {}
        }
    }

    async fn maybe_auto_offer(&mut self) {
        if self.role != Role::Initiator
            || self.auto_offer_done
            || self.negotiator.phase() != NegotiationPhase::Idle
        {
            return;
        }
        self.auto_offer_done = true;
        if let Err(e) = self.begin_offer().await {
            debug!(target: "roomlink.session", error = %e, "Automatic offer failed");
        }
    }

    async fn begin_offer(&mut self) -> Result<(), SessionError> {
        match self.negotiator.create_offer().await {
            Ok(offer) => {
                self.set_state(ConnectionState::Negotiating);
                self.send_outbound(Outbound::Offer(offer)).await;
                Ok(())
            }
            Err(e) => {
                self.negotiation_failed(&e);
                Err(e)
            }
        }
    }

    /// Write `item`, or queue it for the next reconnection.
    async fn send_outbound(&mut self, item: Outbound) {
        let state = self.current_state();
        if state == ConnectionState::Reconnecting {
            debug!(
                target: "roomlink.session",
                kind = item.kind(),
                "Queueing write while reconnecting"
            );
            self.pending_outbound.push_back(item);
            return;
        }
        if !state.accepts_signals() {
            return;
        }

        let result = match &item {
            Outbound::Offer(offer) => self.room.send_offer(offer).await,
            Outbound::Answer(answer) => self.room.send_answer(answer).await,
            Outbound::Candidate(candidate) => self.room.send_candidate(candidate).await.map(|_| ()),
            Outbound::Status(status) => self.room.set_status(*status).await,
        };

        match result {
            Ok(()) => {
                self.liveness.touch(Instant::now());
                match item {
                    Outbound::Offer(_) => self.negotiator.offer_sent(self.remote_present),
                    Outbound::Answer(_) => {
                        if self.negotiator.answer_sent() {
                            self.connection_established();
                        }
                    }
                    Outbound::Candidate(_) | Outbound::Status(_) => {}
                }
            }
            Err(e) => {
                warn!(
                    target: "roomlink.session",
                    kind = item.kind(),
                    error = %e,
                    "Write failed, queued for reconnection"
                );
                self.pending_outbound.push_back(item);
                self.trigger_reconnect("write_failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Liveness and reconnection
    // ------------------------------------------------------------------

    async fn on_liveness_tick(&mut self) {
        if !self.current_state().accepts_signals() {
            return;
        }
        let now = Instant::now();
        if !self.liveness.is_stale(now) {
            return;
        }

        debug!(target: "roomlink.session.liveness", "Room quiet, checking liveness");
        let record = match self.room.read().await {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    target: "roomlink.session.liveness",
                    error = %e,
                    "Liveness read failed"
                );
                self.trigger_reconnect("liveness_read_failed");
                return;
            }
        };

        match LivenessMonitor::assess(record.as_ref()) {
            LivenessVerdict::RoomMissing => {
                warn!(target: "roomlink.session.liveness", "Room is gone");
                self.trigger_reconnect("room_missing");
            }
            LivenessVerdict::RemoteHangup => {
                self.liveness.touch(now);
                self.remote_hangup();
            }
            LivenessVerdict::Probe => match self.room.probe().await {
                Ok(()) => self.liveness.touch(Instant::now()),
                Err(e) => {
                    warn!(
                        target: "roomlink.session.liveness",
                        error = %e,
                        "Liveness probe failed"
                    );
                    self.trigger_reconnect("probe_failed");
                }
            },
        }
    }

    fn trigger_reconnect(&mut self, reason: &'static str) {
        if !self.current_state().accepts_signals() {
            return;
        }
        if !self.reconnect.trigger(Instant::now()) {
            return;
        }
        info!(
            target: "roomlink.session.reconnect",
            room_id = %self.room.room_id(),
            reason,
            "Store connection lost, reconnecting"
        );
        self.set_state(ConnectionState::Reconnecting);
    }

    async fn run_reconnect_attempt(&mut self) {
        if self.current_state() != ConnectionState::Reconnecting {
            self.reconnect.cancel();
            return;
        }
        let attempt = self.reconnect.begin_attempt();
        let max_attempts = self.reconnect.max_attempts();
        info!(
            target: "roomlink.session.reconnect",
            attempt,
            max_attempts,
            "Reconnection attempt"
        );
        self.listener.on_reconnecting(attempt, max_attempts);

        if let Err(e) = self.resume().await {
            warn!(
                target: "roomlink.session.reconnect",
                attempt,
                error = %e,
                "Reconnection attempt failed"
            );
            match self.reconnect.attempt_failed(Instant::now()) {
                RetryDecision::Retry { attempt: next, at } => {
                    record_reconnect_attempt("retry");
                    debug!(
                        target: "roomlink.session.reconnect",
                        next_attempt = next,
                        delay_ms = u64::try_from(
                            at.saturating_duration_since(Instant::now()).as_millis()
                        )
                        .unwrap_or(u64::MAX),
                        "Next reconnection scheduled"
                    );
                }
                RetryDecision::Exhausted { attempts } => {
                    record_reconnect_attempt("exhausted");
                    self.fail_permanently(attempts);
                }
            }
            return;
        }

        record_reconnect_attempt("success");
        self.reconnect.succeeded();
        self.liveness.touch(Instant::now());
        self.set_state(ConnectionState::WatchingRoom);

        if !self.replay.is_empty() {
            debug!(
                target: "roomlink.session.reconnect",
                count = self.replay.len(),
                "Replaying buffered room events"
            );
        }
        while self.current_state().accepts_signals() {
            let Some(event) = self.replay.pop_front() else {
                break;
            };
            self.apply_room_event(event).await;
        }

        let queued = std::mem::take(&mut self.pending_outbound);
        if !queued.is_empty() {
            debug!(
                target: "roomlink.session.reconnect",
                count = queued.len(),
                "Flushing queued writes"
            );
        }
        for item in queued {
            self.send_outbound(item).await;
        }

        // A write above may have lost the store again.
        if !self.current_state().accepts_signals() {
            debug!(
                target: "roomlink.session.reconnect",
                attempt,
                "Store lost again while resuming"
            );
            return;
        }
        info!(
            target: "roomlink.session.reconnect",
            room_id = %self.room.room_id(),
            attempt,
            "Reconnected"
        );
        self.listener.on_reconnected();
        self.set_state(self.state_for_phase());
    }

    /// One reconnection attempt: reopen, re-read, re-watch, re-advertise.
    async fn resume(&mut self) -> Result<(), SessionError> {
        self.store.reconnect().await.map_err(|e| {
            record_store_error("reconnect");
            SessionError::from(e)
        })?;
        if self.room.read().await?.is_none() {
            return Err(SessionError::RoomNotFound(self.room.room_id().to_string()));
        }
        self.register_watches().await?;
        self.room.advertise_presence().await?;
        self.room.register_expiry().await?;
        Ok(())
    }

    fn fail_permanently(&mut self, attempts: u32) {
        let err = SessionError::ReconnectExhausted { attempts };
        warn!(
            target: "roomlink.session.reconnect",
            room_id = %self.room.room_id(),
            attempts,
            "Reconnection budget exhausted"
        );
        self.forwarders.cancel();
        self.reconnect.cancel();
        self.replay.clear();
        self.pending_outbound.clear();
        self.set_state(ConnectionState::Failed);
        self.listener.on_connection_failed(&err.to_string());
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::LoopbackEngine;
    use crate::session::events::{ChannelListener, NoopListener};
    use crate::store::MemoryStore;

    fn spawn_session(
        store: &MemoryStore,
        code: &str,
        role: Role,
    ) -> (SessionHandle, JoinHandle<()>) {
        SignalingSession::spawn(
            Config::default(),
            RoomCode::parse(code).unwrap(),
            role,
            Arc::new(store.client()),
            Arc::new(LoopbackEngine::new(Vec::new())),
            Arc::new(NoopListener),
        )
    }

    #[tokio::test]
    async fn test_spawn_starts_disconnected() {
        let store = MemoryStore::new();
        let (handle, task) = spawn_session(&store, "AB12", Role::Initiator);
        assert_eq!(handle.connection_state(), ConnectionState::Disconnected);
        assert_eq!(handle.ice_servers().len(), 5);

        handle.disconnect().await.unwrap();
        task.await.unwrap();
        // Disconnect on a stopped session is still fine.
        handle.disconnect().await.unwrap();
        assert_eq!(handle.status().await, Err(SessionError::SessionClosed));
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let store = MemoryStore::new();
        let (handle, _task) = spawn_session(&store, "AB12", Role::Initiator);
        handle.connect().await.unwrap();
        assert!(matches!(
            handle.connect().await,
            Err(SessionError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_join_returns_to_disconnected() {
        let store = MemoryStore::new();
        let (handle, _task) = spawn_session(&store, "NOPE", Role::Responder);
        let err = handle.connect().await.unwrap_err();
        assert!(err.is_join_rejection());
        assert_eq!(handle.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_responder_cannot_restart_negotiation() {
        let store = MemoryStore::new();
        let (initiator, _t1) = spawn_session(&store, "AB12", Role::Initiator);
        initiator.connect().await.unwrap();
        let (responder, _t2) = spawn_session(&store, "AB12", Role::Responder);
        responder.connect().await.unwrap();
        assert!(matches!(
            responder.restart_negotiation().await,
            Err(SessionError::NegotiationFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_commands_before_connect_are_rejected() {
        let store = MemoryStore::new();
        let (handle, _task) = spawn_session(&store, "AB12", Role::Initiator);
        assert!(handle.set_status(RoomStatus::Available).await.is_err());
        assert!(handle.restart_negotiation().await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_stops_actor_without_teardown() {
        let store = MemoryStore::new();
        let (handle, task) = spawn_session(&store, "AB12", Role::Initiator);
        handle.connect().await.unwrap();
        handle.cancel();
        task.await.unwrap();
        assert!(handle.is_cancelled());
        assert_eq!(handle.connection_state(), ConnectionState::Disconnected);
        assert!(store.snapshot("rooms/AB12").is_some());
    }

    #[tokio::test]
    async fn test_dropping_handles_tears_down() {
        let store = MemoryStore::new();
        let (listener, _events) = ChannelListener::new();
        let (handle, task) = SignalingSession::spawn(
            Config::default(),
            RoomCode::parse("AB12").unwrap(),
            Role::Initiator,
            Arc::new(store.client()),
            Arc::new(LoopbackEngine::new(Vec::new())),
            Arc::new(listener),
        );
        handle.connect().await.unwrap();
        drop(handle);
        task.await.unwrap();
        assert_eq!(store.snapshot("rooms/AB12"), None);
    }
}
