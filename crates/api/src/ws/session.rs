use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use delivery_events::{Subscription, Teardown};
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Per-session timing.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Interval between Ping frames.
    pub ping_interval: Duration,
    /// Upper bound on a single frame write.
    pub send_timeout: Duration,
}

impl From<&ServerConfig> for SessionConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            send_timeout: config.send_timeout(),
        }
    }
}

/// Relay payloads from `subscription` to the client until the client
/// leaves, a write fails, or `cancel` fires.
///
/// Three tasks cooperate:
///   1. A watcher that tears the subscription down when `cancel` fires.
///      Teardown closes the queue, which ends the delivery loop below.
///   2. A reader draining inbound frames; a Close frame or receive error
///      cancels the session.
///   3. The delivery loop on the current task, which also sends pings.
///
/// Teardown is idempotent, so whichever path gets there first wins and the
/// others are no-ops.
pub async fn run_session(
    socket: WebSocket,
    mut subscription: Subscription,
    cancel: CancellationToken,
    config: SessionConfig,
    request_id: String,
) {
    let subscriber = subscription.id();
    tracing::info!(%subscriber, %request_id, "WebSocket connected");

    let watcher = spawn_watcher(cancel.clone(), subscription.teardown_handle());
    let (mut sink, mut stream) = socket.split();

    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
        reader_cancel.cancel();
    });

    let mut heartbeat = tokio::time::interval(config.ping_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    heartbeat.tick().await;

    let reason = loop {
        let frame = tokio::select! {
            payload = subscription.recv() => match payload {
                Some(payload) => Message::Text(payload.to_string().into()),
                None => break "closed",
            },
            _ = heartbeat.tick() => Message::Ping(Bytes::new()),
        };

        match tokio::time::timeout(config.send_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(%subscriber, error = %e, "WebSocket send failed");
                break "send failed";
            }
            Err(_) => {
                tracing::warn!(%subscriber, "WebSocket send timed out");
                break "send timed out";
            }
        }
    };

    subscription.teardown();
    cancel.cancel();

    let close = async {
        match sink.send(Message::Close(None)).await {
            Ok(()) => sink.close().await,
            Err(e) => Err(e),
        }
    };
    let _ = tokio::time::timeout(config.send_timeout, close).await;
    reader.abort();
    let _ = watcher.await;

    tracing::info!(%subscriber, %request_id, reason, "WebSocket disconnected");
}

fn spawn_watcher(cancel: CancellationToken, teardown: Teardown) -> JoinHandle<()> {
    tokio::spawn(async move {
        cancel.cancelled().await;
        if teardown.teardown() {
            tracing::debug!(subscriber = %teardown.id(), "Session cancelled");
        }
    })
}
