use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use tokio::{
    task::JoinHandle,
    time::{interval, timeout},
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    error::ServiceError,
    services::{game_service, session_events, session_store::SessionStore},
    state::{
        SharedState,
        game::UserId,
        hub::{ConnectionHandle, Registration},
    },
};

/// How long a closing connection may take to flush its queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle the full lifecycle of one realtime session connection.
///
/// The caller is authorized before any event is delivered: an unknown token,
/// an unknown session or a non-participant gets a policy-violation close frame.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    session_id: Uuid,
    token: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    let user_id = match authorize(&state, session_id, token.as_deref()).await {
        Ok(user_id) => user_id,
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "rejecting realtime connection");
            let _ = sender.send(rejection_frame(&err)).await;
            return;
        }
    };

    let Registration { handle, outbound } = state.hub().register(session_id, user_id);
    info!(
        session_id = %session_id,
        user_id = %user_id,
        connection_id = %handle.id,
        "realtime connection opened"
    );

    // Dedicated writer task drains the hub's queue while we await inbound frames.
    let writer_task = tokio::spawn(
        ReceiverStream::new(outbound)
            .map(Ok::<_, axum::Error>)
            .forward(sender),
    );

    let mut keep_alive = interval(state.config().keep_alive());
    // The first tick completes immediately.
    keep_alive.tick().await;

    let mut evicted = false;
    loop {
        tokio::select! {
            _ = handle.evicted() => {
                warn!(connection_id = %handle.id, "connection evicted (outbound queue full or closed)");
                evicted = true;
                break;
            }
            _ = keep_alive.tick() => {
                if !send_keep_alive(&state, &handle) {
                    evicted = true;
                    break;
                }
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    debug!(connection_id = %handle.id, payload = %text.as_str(), "received client message");
                    if !handle_client_message(&state, &handle, user_id, text.as_str()).await {
                        evicted = true;
                        break;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    state.hub().send_raw(&handle, Message::Pong(payload));
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(connection_id = %handle.id, "client closed connection");
                    break;
                }
                Some(Ok(Message::Binary(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Err(err)) => {
                    warn!(connection_id = %handle.id, error = %err, "websocket error");
                    break;
                }
            }
        }
    }

    state.hub().disconnect(&handle);
    let remaining = state.hub().connection_count(session_id);
    info!(
        session_id = %session_id,
        user_id = %user_id,
        remaining,
        "realtime connection closed"
    );
    session_events::broadcast_player_disconnected(&state, session_id, user_id, remaining);

    finalize(writer_task, handle, evicted).await;
}

/// Close frame sent to a connection that failed authorization.
fn rejection_frame(err: &ServiceError) -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::POLICY,
        reason: err.to_string().into(),
    }))
}

/// Queue a `server-ping`. Returns `false` if the connection got evicted.
fn send_keep_alive(state: &SharedState, handle: &ConnectionHandle) -> bool {
    let ping = ServerMessage::ServerPing {
        server_time: session_events::server_time(),
    };
    state.hub().send_to(handle, &ping)
}

async fn authorize(
    state: &SharedState,
    session_id: Uuid,
    token: Option<&str>,
) -> Result<UserId, ServiceError> {
    let token = token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ServiceError::Unauthorized("missing token".into()))?;
    let user_id = state
        .identity()
        .authenticate(token)
        .ok_or_else(|| ServiceError::Unauthorized("unknown token".into()))?;

    let store = state.require_game_store().await?;
    let session = SessionStore::new(store).load(session_id).await?;
    session.require_player(user_id)?;
    Ok(user_id)
}

/// Dispatch one text frame. Returns `false` once the connection is gone.
async fn handle_client_message(
    state: &SharedState,
    handle: &ConnectionHandle,
    user_id: UserId,
    text: &str,
) -> bool {
    let message = match ClientMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(connection_id = %handle.id, error = %err, "failed to parse client message");
            let reply = ServerMessage::error(format!("invalid message: {err}"), "invalid_input");
            return state.hub().send_to(handle, &reply);
        }
    };

    let session_id = handle.session_id;
    let outcome = match message {
        ClientMessage::Ping { id, timestamp } => {
            let pong = ServerMessage::Pong {
                id,
                timestamp,
                server_time: session_events::server_time(),
            };
            return state.hub().send_to(handle, &pong);
        }
        ClientMessage::Answer(request) => {
            game_service::submit_answer(state, user_id, session_id, request)
                .await
                .map(|_| ())
        }
        ClientMessage::Complete => game_service::complete_session(state, user_id, session_id)
            .await
            .map(|_| ()),
    };

    match outcome {
        Ok(()) => true,
        Err(err) => {
            warn!(connection_id = %handle.id, error = %err, "client request failed");
            state
                .hub()
                .send_to(handle, &ServerMessage::error(err.to_string(), err.code()))
        }
    }
}

/// Wind the writer task down before the socket handler returns.
///
/// An evicted connection is not drained: its socket is stalled, so the writer
/// is aborted right away. Otherwise the writer gets [`WRITER_DRAIN_TIMEOUT`]
/// to flush what is queued.
async fn finalize(
    mut writer_task: JoinHandle<Result<(), axum::Error>>,
    handle: ConnectionHandle,
    evicted: bool,
) {
    drop(handle);
    if evicted {
        writer_task.abort();
    }
    match timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task).await {
        Ok(Ok(Err(err))) => debug!(error = %err, "writer task ended with error"),
        Ok(_) => {}
        Err(_) => {
            warn!("writer task did not drain in time, aborting");
            writer_task.abort();
        }
    }
}
