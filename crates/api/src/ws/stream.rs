use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use cranewatch_core::snapshot::Snapshot;
use cranewatch_events::{SnapshotUpdate, Subscription};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;

/// Interval between keep-alive pings on an idle stream.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP handler that upgrades the connection to a snapshot stream.
///
/// The client first receives the current snapshot, then one
/// `iot_data_update` message per commit.
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single stream connection after upgrade.
///
/// The sender task forwards snapshots from the notifier subscription; the
/// receiver task watches for the client closing. Whichever ends first tears
/// down the other.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let subscription = state.notifier.subscribe("ws-stream").await;
    let subscriber_id = subscription.id();
    tracing::info!(subscriber_id = %subscriber_id, "Snapshot stream connected");

    let (sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(forward_snapshots(sink, subscription, state.store.read()));

    let recv_id = subscriber_id;
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(Message::Pong(_)) => {
                    tracing::trace!(subscriber_id = %recv_id, "Pong received");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(subscriber_id = %recv_id, error = %e, "Stream receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.notifier.unsubscribe(subscriber_id).await;
    tracing::info!(subscriber_id = %subscriber_id, "Snapshot stream disconnected");
}

async fn forward_snapshots(
    mut sink: SplitSink<WebSocket, Message>,
    mut subscription: Subscription,
    initial: Arc<Snapshot>,
) {
    if send_update(&mut sink, initial).await.is_err() {
        return;
    }

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            next = subscription.recv() => {
                // `None` means the notifier dropped us (lagging or shutdown).
                let Some(snapshot) = next else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                if send_update(&mut sink, snapshot).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn send_update(
    sink: &mut SplitSink<WebSocket, Message>,
    snapshot: Arc<Snapshot>,
) -> Result<(), axum::Error> {
    let update = SnapshotUpdate::new(snapshot);
    let text = match serde_json::to_string(&update) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(
                error = %e,
                sequence = update.sequence,
                "Failed to serialize snapshot update"
            );
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await
}
