//! roomlink demo
//!
//! Pairs two in-process endpoints through an in-memory signaling store:
//!
//! 1. Load configuration from environment
//! 2. Open a room as initiator (code from `ROOMLINK_ROOM_CODE` or generated)
//! 3. Join it as responder and wait for both sides to negotiate
//! 4. Hang up the initiator and wait for the responder to notice

#![warn(clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use roomlink::media::LoopbackEngine;
use roomlink::session::{ChannelListener, SessionEvent};
use roomlink::store::MemoryStore;
use roomlink::{Config, Role, RoomCode, RoomStatus, SignalingSession};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for each demo milestone.
const STEP_TIMEOUT: Duration = Duration::from_secs(10);

async fn wait_for(
    events: &mut UnboundedReceiver<SessionEvent>,
    wanted: &SessionEvent,
) -> Result<(), Box<dyn std::error::Error>> {
    let found = tokio::time::timeout(STEP_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            info!(target: "roomlink.demo", ?event, "Session event");
            if &event == wanted {
                return true;
            }
        }
        false
    })
    .await?;
    if found {
        Ok(())
    } else {
        Err(format!("session stopped before {wanted:?}").into())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomlink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting roomlink demo");

    let config = Config::from_env().map_err(|e| {
        warn!(error = %e, "Failed to load configuration");
        e
    })?;

    let room_code = match std::env::var("ROOMLINK_ROOM_CODE") {
        Ok(raw) => RoomCode::parse(raw)?,
        Err(_) => RoomCode::generate(),
    };
    info!(room_id = %room_code, "Using room code");

    let store = MemoryStore::new();

    let (initiator_listener, mut initiator_events) = ChannelListener::new();
    let (initiator, initiator_task) = SignalingSession::spawn(
        config.clone(),
        room_code.clone(),
        Role::Initiator,
        Arc::new(store.client()),
        Arc::new(LoopbackEngine::new(config.ice_servers.clone())),
        Arc::new(initiator_listener),
    );

    let (responder_listener, mut responder_events) = ChannelListener::new();
    let (responder, responder_task) = SignalingSession::spawn(
        config.clone(),
        room_code.clone(),
        Role::Responder,
        Arc::new(store.client()),
        Arc::new(LoopbackEngine::new(config.ice_servers.clone())),
        Arc::new(responder_listener),
    );

    initiator.connect().await?;
    info!(room_id = %room_code, "Room open, share the code with the other endpoint");

    if let Err(e) = responder.connect().await {
        warn!(error = %e, message = %e.client_message(), "Join failed");
        return Err(e.into());
    }

    wait_for(&mut initiator_events, &SessionEvent::ConnectionEstablished).await?;
    wait_for(&mut responder_events, &SessionEvent::ConnectionEstablished).await?;
    info!(
        initiator = %initiator.connection_state(),
        responder = %responder.connection_state(),
        "Both endpoints negotiated"
    );

    initiator.set_status(RoomStatus::Disconnected).await?;
    initiator.disconnect().await?;
    wait_for(&mut responder_events, &SessionEvent::RemoteHangup).await?;

    responder.disconnect().await?;
    initiator_task.await?;
    responder_task.await?;

    info!("roomlink demo finished");
    Ok(())
}
