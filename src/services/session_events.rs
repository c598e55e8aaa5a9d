use std::time::SystemTime;

use tracing::debug;

use crate::{
    dao::models::QuestionEntity,
    dto::{
        epoch_millis,
        game::{
            AnswerResultResponse, JoinResponse, LobbyUpdate, QuestionResponse, SessionSnapshot,
            SessionSummary,
        },
        ws::ServerMessage,
    },
    state::{
        SharedState,
        completion::SessionReport,
        game::{GameSession, UserId},
    },
};

/// Announce that the session went active.
pub fn broadcast_session_start(state: &SharedState, session: &GameSession) {
    let event = ServerMessage::SessionStart(SessionSnapshot::from(session));
    send_session_event(state, session, &event);
}

/// Announce a newly joined player to everyone already connected.
pub fn broadcast_player_joined(state: &SharedState, session: &GameSession, user_id: UserId) {
    let JoinResponse { players, .. } = JoinResponse::new(session, false);
    let event = ServerMessage::PlayerJoined {
        session_id: session.id,
        user_id,
        players,
    };
    send_session_event(state, session, &event);
}

/// Push the question at the session's current cursor.
pub fn broadcast_question(state: &SharedState, session: &GameSession, question: &QuestionEntity) {
    let payload = QuestionResponse::new(session, session.current_question_index, question);
    send_session_event(state, session, &ServerMessage::Question(payload));
}

/// Share the outcome of an answer with every connection of the session.
pub fn broadcast_answer_result(
    state: &SharedState,
    session: &GameSession,
    result: AnswerResultResponse,
) {
    send_session_event(state, session, &ServerMessage::AnswerResult(result));
}

/// Announce the end of the session with its summary.
pub fn broadcast_session_complete(state: &SharedState, session: &GameSession, report: &SessionReport) {
    let event = ServerMessage::SessionComplete(SessionSummary::from(report));
    send_session_event(state, session, &event);
}

/// Publish the lobby roster after a ready toggle, pause or resume.
pub fn broadcast_lobby_update(state: &SharedState, session: &GameSession, countdown_ms: Option<u64>) {
    let event = ServerMessage::LobbyUpdate(LobbyUpdate::new(session, countdown_ms));
    send_session_event(state, session, &event);
}

/// Tell the remaining connections that one of them went away.
pub fn broadcast_player_disconnected(
    state: &SharedState,
    session_id: uuid::Uuid,
    user_id: UserId,
    remaining_connections: usize,
) {
    let event = ServerMessage::PlayerDisconnected {
        user_id,
        remaining_connections,
    };
    let delivered = state.hub().broadcast(session_id, &event, None);
    debug!(session_id = %session_id, user_id = %user_id, delivered, "player-disconnected");
}

/// Current server clock as exchanged with clients.
pub fn server_time() -> i64 {
    epoch_millis(SystemTime::now())
}

fn send_session_event(
    state: &SharedState,
    session: &GameSession,
    event: &ServerMessage,
) {
    let delivered = state.hub().broadcast(session.id, event, None);
    debug!(
        session_id = %session.id,
        event = event_name(event),
        delivered,
        "broadcast session event"
    );
}

fn event_name(event: &ServerMessage) -> &'static str {
    match event {
        ServerMessage::SessionStart(_) => "session-start",
        ServerMessage::PlayerJoined { .. } => "player-joined",
        ServerMessage::Question(_) => "question",
        ServerMessage::AnswerResult(_) => "answer-result",
        ServerMessage::SessionComplete(_) => "session-complete",
        ServerMessage::PlayerDisconnected { .. } => "player-disconnected",
        ServerMessage::LobbyUpdate(_) => "lobby-update",
        ServerMessage::ServerPing { .. } => "server-ping",
        ServerMessage::Pong { .. } => "pong",
        ServerMessage::Error { .. } => "error",
    }
}
