//! WebSocket upgrade, admission checks, and the per-connection event loop.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::signaling::frames::ServerFrame;
use crate::signaling::registry::{ClientHandle, CloseReason, Outbound, OUTBOUND_QUEUE};
use crate::AppState;

/// Close codes used at admission and teardown.
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_ORIGIN_NOT_ALLOWED: u16 = 1008;
pub const CLOSE_OVERLOADED: u16 = 1013;
/// Application range (4000+), matching auth failures elsewhere in the stack.
pub const CLOSE_AUTH_FAILED: u16 = 4004;

pub const REJECT_OVERLOADED: CloseReason = CloseReason {
    code: CLOSE_OVERLOADED,
    reason: "overloaded",
};
pub const REJECT_ORIGIN: CloseReason = CloseReason {
    code: CLOSE_ORIGIN_NOT_ALLOWED,
    reason: "origin-not-allowed",
};
pub const REJECT_AUTH: CloseReason = CloseReason {
    code: CLOSE_AUTH_FAILED,
    reason: "auth-failed",
};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> impl IntoResponse {
    // Admission is decided from the upgrade request; the verdict is
    // delivered as a close frame so clients can observe the reason.
    let rejection = admission_rejection(&state, &params, &headers);
    ws.max_message_size(state.config.max_payload)
        .on_upgrade(move |socket| handle_connection(socket, state, rejection))
}

/// Admission checks, in order: capacity, origin allow-list, shared token.
fn admission_rejection(
    state: &AppState,
    params: &ConnectParams,
    headers: &HeaderMap,
) -> Option<CloseReason> {
    if state.registry.len() >= state.config.max_clients {
        return Some(REJECT_OVERLOADED);
    }
    if let Some(allowed) = &state.config.allowed_origins {
        let origin = headers.get("origin").and_then(|v| v.to_str().ok());
        if !origin.is_some_and(|o| allowed.iter().any(|a| a == o)) {
            return Some(REJECT_ORIGIN);
        }
    }
    if let Some(secret) = &state.config.ws_secret {
        if params.token.as_deref() != Some(secret.as_str()) {
            return Some(REJECT_AUTH);
        }
    }
    None
}

async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    rejection: Option<CloseReason>,
) {
    let (mut ws_tx, ws_rx) = socket.split();

    if let Some(reject) = rejection {
        tracing::debug!(code = reject.code, reason = reject.reason, "connection rejected");
        let _ = send_close(&mut ws_tx, reject).await;
        return;
    }

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let Some(client) = state.registry.admit(out_tx) else {
        // The pre-upgrade capacity check raced with another admit.
        let _ = send_close(&mut ws_tx, REJECT_OVERLOADED).await;
        return;
    };

    // The id frame precedes every other server-originated frame.
    let id_frame = ServerFrame::Id {
        id: client.id.clone(),
    }
    .to_json();
    if ws_tx.send(Message::Text(id_frame.into())).await.is_err() {
        state.registry.remove(&client.id);
        return;
    }

    tracing::info!(client_id = %client.id, "client connected");

    run_connection(&state, &client, ws_tx, ws_rx, out_rx).await;

    state.dispatcher.disconnect(&client);
    tracing::info!(client_id = %client.id, "client disconnected");
}

/// The connection event loop: inbound frames feed the dispatcher, the
/// outbound queue feeds the sink, and a kill signal closes the stream. All
/// writes happen here, so per-client delivery is sequential.
async fn run_connection(
    state: &AppState,
    client: &Arc<ClientHandle>,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut out_rx: mpsc::Receiver<Outbound>,
) {
    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => state.dispatcher.dispatch(client, &text),
                    Some(Ok(Message::Binary(bytes))) => {
                        // Binary frames take the same codec path when they
                        // hold UTF-8; anything else is an opaque room blob.
                        match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => state.dispatcher.dispatch(client, &text),
                            Err(raw) => state.dispatcher.dispatch_binary(client, raw.into_bytes()),
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        client.alive.store(true, Ordering::SeqCst);
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // The WS layer answers pings; inbound traffic still
                        // counts as liveness.
                        client.alive.store(true, Ordering::SeqCst);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(client_id = %client.id, ?e, "ws read error");
                        break;
                    }
                }
            }

            outbound = out_rx.recv() => {
                let result = match outbound {
                    Some(Outbound::Text(json)) => ws_tx.send(Message::Text(json.into())).await,
                    Some(Outbound::Binary(bytes)) => ws_tx.send(Message::Binary(bytes.into())).await,
                    Some(Outbound::Ping) => ws_tx.send(Message::Ping(Vec::new().into())).await,
                    None => break,
                };
                if let Err(e) = result {
                    tracing::debug!(client_id = %client.id, ?e, "ws write error");
                    break;
                }
            }

            _ = client.wait_killed() => {
                if let Some(reason) = client.take_close_reason() {
                    let _ = send_close(&mut ws_tx, reason).await;
                }
                break;
            }
        }
    }
}

async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    close: CloseReason,
) -> Result<(), axum::Error> {
    ws_tx
        .send(Message::Close(Some(CloseFrame {
            code: close.code,
            reason: close.reason.to_string().into(),
        })))
        .await
}
