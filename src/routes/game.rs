use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::game::{
        AnswerResultResponse, CompletionResponse, JoinResponse, QuestionResponse, ReadyResponse,
        SessionDescriptor, SessionSnapshot, StartQuizRequest, StartTopicRequest, StatusResponse,
        SubmitAnswerRequest,
    },
    error::{AppError, ErrorBody},
    routes::auth::AuthenticatedUser,
    services::{game_service, lobby_service},
    state::SharedState,
};

/// Session creation, gameplay and lobby endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/game/quiz/{quiz_id}/start", post(start_quiz))
        .route("/game/topic/{topic_id}/random", post(start_topic))
        .route("/game/session/{id}", get(get_session))
        .route("/game/session/{id}/question/{index}", get(get_question))
        .route("/game/session/{id}/answer", post(submit_answer))
        .route("/game/session/{id}/complete", post(complete_session))
        .route("/game/session/{id}/join", post(join_session))
        .route("/game/session/{id}/ready", put(toggle_ready))
        .route("/game/session/{id}/pause", post(pause_session))
        .route("/game/session/{id}/resume", post(resume_session))
}

/// Start a session over a published quiz. The caller becomes the host.
#[utoipa::path(
    post,
    path = "/game/quiz/{quiz_id}/start",
    tag = "game",
    params(("quiz_id" = Uuid, Path, description = "Quiz to play")),
    request_body = StartQuizRequest,
    responses(
        (status = 200, description = "Session created", body = SessionDescriptor),
        (status = 400, description = "Quiz not playable", body = ErrorBody),
        (status = 401, description = "Missing or unknown token", body = ErrorBody),
        (status = 404, description = "Quiz not found", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn start_quiz(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(quiz_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<StartQuizRequest>>,
) -> Result<Json<SessionDescriptor>, AppError> {
    let session = game_service::start_quiz_session(&state, user_id, quiz_id, payload).await?;
    Ok(Json(session))
}

/// Start a session over a random sample of a topic's questions.
#[utoipa::path(
    post,
    path = "/game/topic/{topic_id}/random",
    tag = "game",
    params(("topic_id" = Uuid, Path, description = "Topic to draw questions from")),
    request_body = StartTopicRequest,
    responses(
        (status = 200, description = "Session created", body = SessionDescriptor),
        (status = 400, description = "Invalid request or no matching questions", body = ErrorBody),
        (status = 404, description = "Topic not found", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn start_topic(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(topic_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<StartTopicRequest>>,
) -> Result<Json<SessionDescriptor>, AppError> {
    let session = game_service::start_topic_session(&state, user_id, topic_id, payload).await?;
    Ok(Json(session))
}

/// Inspect a session.
#[utoipa::path(
    get,
    path = "/game/session/{id}",
    tag = "game",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session state", body = SessionSnapshot),
        (status = 404, description = "Session not found", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn get_session(
    State(state): State<SharedState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(game_service::session_snapshot(&state, id).await?))
}

/// Fetch a question by 0-based index; only questions up to the current one are visible.
#[utoipa::path(
    get,
    path = "/game/session/{id}/question/{index}",
    tag = "game",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("index" = usize, Path, description = "0-based question index")
    ),
    responses(
        (status = 200, description = "Question", body = QuestionResponse),
        (status = 400, description = "Question not unlocked yet", body = ErrorBody),
        (status = 403, description = "Caller is not a participant", body = ErrorBody),
        (status = 404, description = "Session or question not found", body = ErrorBody),
        (status = 409, description = "Session is not active", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn get_question(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<QuestionResponse>, AppError> {
    Ok(Json(
        game_service::get_question(&state, user_id, id, index).await?,
    ))
}

/// Submit an answer for a question of the session.
#[utoipa::path(
    post,
    path = "/game/session/{id}/answer",
    tag = "game",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer scored", body = AnswerResultResponse),
        (status = 400, description = "Unknown question or answer", body = ErrorBody),
        (status = 403, description = "Caller is not a participant", body = ErrorBody),
        (status = 409, description = "Session not active or no hearts left", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResultResponse>, AppError> {
    Ok(Json(
        game_service::submit_answer(&state, user_id, id, payload).await?,
    ))
}

/// Finish the session and return the caller's summary. Safe to repeat.
#[utoipa::path(
    post,
    path = "/game/session/{id}/complete",
    tag = "game",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session summary", body = CompletionResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorBody),
        (status = 409, description = "Session cannot be completed in its current status", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn complete_session(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionResponse>, AppError> {
    Ok(Json(
        game_service::complete_session(&state, user_id, id).await?,
    ))
}

/// Join a waiting or active session.
#[utoipa::path(
    post,
    path = "/game/session/{id}/join",
    tag = "game",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Joined (or already joined)", body = JoinResponse),
        (status = 400, description = "Session is full", body = ErrorBody),
        (status = 409, description = "Session cannot be joined", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn join_session(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<JoinResponse>, AppError> {
    Ok(Json(game_service::join_session(&state, user_id, id).await?))
}

/// Toggle the caller's ready flag in the lobby.
#[utoipa::path(
    put,
    path = "/game/session/{id}/ready",
    tag = "lobby",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Ready flag toggled", body = ReadyResponse),
        (status = 409, description = "Session is not waiting", body = ErrorBody),
        (status = 501, description = "Lobby disabled", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn toggle_ready(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ReadyResponse>, AppError> {
    Ok(Json(lobby_service::toggle_ready(&state, user_id, id).await?))
}

/// Pause the game or cancel the lobby countdown (host only).
#[utoipa::path(
    post,
    path = "/game/session/{id}/pause",
    tag = "lobby",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session paused", body = StatusResponse),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 409, description = "Session cannot be paused", body = ErrorBody),
        (status = 501, description = "Lobby disabled", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn pause_session(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(lobby_service::pause_session(&state, user_id, id).await?))
}

/// Send a paused session back to the lobby (host only).
#[utoipa::path(
    post,
    path = "/game/session/{id}/resume",
    tag = "lobby",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session back in the lobby", body = StatusResponse),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 409, description = "Session is not paused", body = ErrorBody),
        (status = 501, description = "Lobby disabled", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn resume_session(
    State(state): State<SharedState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(lobby_service::resume_session(&state, user_id, id).await?))
}
