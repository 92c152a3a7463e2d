//! WebSocket handler for the notification namespace.
//!
//! Each connection becomes a session: it is registered on upgrade, answers
//! `hello` probes point-to-point, forwards broadcast frames, and is removed
//! from the registry on every exit path.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use hcr_protocol::Frame;

use super::registry::SessionId;
use crate::state::AppState;

/// Handle WebSocket upgrade on the namespace path.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Why a session loop ended.
#[derive(Debug, Clone, Copy)]
enum Disconnect {
    ClientClosed,
    TransportError,
    Shutdown,
}

/// Handle an established WebSocket connection.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let (id, mut outbound) = state.registry.register();
    tracing::info!(
        session_id = %id,
        namespace = %state.channel.namespace_path,
        "Session connected"
    );

    let reason = loop {
        tokio::select! {
            () = state.shutdown.cancelled() => break Disconnect::Shutdown,
            // Forward broadcast frames to the client
            Some(frame) = outbound.recv() => {
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!(session_id = %id, error = %err, "Dropping unencodable frame");
                        continue;
                    }
                };
                if let Err(err) = socket.send(Message::Text(text.into())).await {
                    tracing::warn!(session_id = %id, error = %err, "Failed to deliver frame");
                    break Disconnect::TransportError;
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) = handle_text(&mut socket, id, text.as_str()).await {
                            tracing::warn!(session_id = %id, error = %err, "Failed to answer hello");
                            break Disconnect::TransportError;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Disconnect::ClientClosed,
                    // Ping/pong are answered by the transport, binary frames are not part of the protocol
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(session_id = %id, error = %err, "Session transport error");
                        break Disconnect::TransportError;
                    }
                }
            }
        }
    };

    state.registry.remove(id);
    tracing::info!(session_id = %id, ?reason, "Session disconnected");
}

/// Answer an inbound text frame. Only `hello` gets a reply.
async fn handle_text(socket: &mut WebSocket, id: SessionId, text: &str) -> Result<(), axum::Error> {
    match Frame::decode(text) {
        Ok(frame) if frame.is_hello() => {
            tracing::info!(session_id = %id, "Received 'hello', sending 'hello' back");
            let reply = Frame::hello().encode().map_err(axum::Error::new)?;
            socket.send(Message::Text(reply.into())).await
        }
        Ok(frame) => {
            tracing::debug!(session_id = %id, event = %frame.event, "Ignoring unexpected event");
            Ok(())
        }
        Err(err) => {
            tracing::debug!(session_id = %id, error = %err, "Ignoring malformed frame");
            Ok(())
        }
    }
}
