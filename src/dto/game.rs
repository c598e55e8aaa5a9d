use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::QuestionEntity,
    dto::{
        epoch_millis, format_system_time,
        validation::{validate_difficulty, validate_difficulty_bounds, validate_question_count},
    },
    state::{
        completion::{Outcome, PlayerReport, SessionReport},
        game::{GameMode, GameSession, SessionSource, SessionStatus, UserId},
    },
};

/// Body of `POST /game/quiz/{quiz_id}/start`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StartQuizRequest {
    /// `solo`, `comp` or `collab`.
    #[schema(value_type = String, example = "solo")]
    pub mode: GameMode,
}

/// Body of `POST /game/topic/{topic_id}/random`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartTopicRequest {
    /// `solo`, `comp` or `collab`.
    #[schema(value_type = String, example = "comp")]
    pub mode: GameMode,
    /// Number of questions to draw (defaults to the server setting).
    #[serde(default)]
    pub question_count: Option<usize>,
    /// Lowest accepted difficulty (1-5).
    #[serde(default)]
    pub difficulty_min: Option<u8>,
    /// Highest accepted difficulty (1-5).
    #[serde(default)]
    pub difficulty_max: Option<u8>,
}

impl Validate for StartTopicRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(count) = self.question_count
            && let Err(e) = validate_question_count(count)
        {
            errors.add("questionCount", e);
        }

        for (field, value) in [
            ("difficultyMin", self.difficulty_min),
            ("difficultyMax", self.difficulty_max),
        ] {
            if let Some(value) = value
                && let Err(e) = validate_difficulty(value)
            {
                errors.add(field, e);
            }
        }

        if let Err(e) = validate_difficulty_bounds(self.difficulty_min, self.difficulty_max) {
            errors.add("difficultyMin", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Summary returned once a session has been created.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub session_id: Uuid,
    #[schema(value_type = String)]
    pub mode: GameMode,
    pub quiz_id: Option<Uuid>,
    pub topic_id: Option<Uuid>,
    pub total_questions: usize,
    /// Seconds per question, if limited.
    pub time_limit: Option<u32>,
    #[schema(value_type = String)]
    pub status: SessionStatus,
}

impl From<&GameSession> for SessionDescriptor {
    fn from(session: &GameSession) -> Self {
        let (quiz_id, topic_id) = source_ids(session.source);
        Self {
            session_id: session.id,
            mode: session.mode,
            quiz_id,
            topic_id,
            total_questions: session.total_questions(),
            time_limit: session.time_limit_secs,
            status: session.status,
        }
    }
}

fn source_ids(source: SessionSource) -> (Option<Uuid>, Option<Uuid>) {
    match source {
        SessionSource::Quiz { quiz_id } => (Some(quiz_id), None),
        SessionSource::Topic { topic_id } => (None, Some(topic_id)),
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Public projection of a session participant.
pub struct PlayerSummary {
    pub user_id: Uuid,
    pub hearts_left: u8,
    pub score: u32,
    pub ready: bool,
    pub is_host: bool,
}

fn player_summaries(session: &GameSession) -> Vec<PlayerSummary> {
    let host = session.host();
    session
        .players
        .iter()
        .map(|player| PlayerSummary {
            user_id: player.user_id,
            hearts_left: player.hearts_left,
            score: player.score,
            ready: player.ready,
            is_host: Some(player.user_id) == host,
        })
        .collect()
}

/// Full view of a session, used by `GET /game/session/{id}` and `session-start` events.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    #[schema(value_type = String)]
    pub mode: GameMode,
    #[schema(value_type = String)]
    pub status: SessionStatus,
    pub quiz_id: Option<Uuid>,
    pub topic_id: Option<Uuid>,
    pub total_questions: usize,
    pub current_question_index: usize,
    pub time_limit: Option<u32>,
    pub players: Vec<PlayerSummary>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub countdown_started_at: Option<String>,
}

impl From<&GameSession> for SessionSnapshot {
    fn from(session: &GameSession) -> Self {
        let (quiz_id, topic_id) = source_ids(session.source);
        Self {
            session_id: session.id,
            mode: session.mode,
            status: session.status,
            quiz_id,
            topic_id,
            total_questions: session.total_questions(),
            current_question_index: session.current_question_index,
            time_limit: session.time_limit_secs,
            players: player_summaries(session),
            created_at: format_system_time(session.created_at),
            started_at: session.started_at.map(format_system_time),
            ended_at: session.ended_at.map(format_system_time),
            countdown_started_at: session.countdown_started_at.map(format_system_time),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Answer option shown to players (correctness withheld).
pub struct AnswerOption {
    pub id: Uuid,
    pub content: String,
}

/// Question as served to players.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponse {
    pub question_id: Uuid,
    /// 1-based position in the session.
    pub question_number: usize,
    pub total_questions: usize,
    pub content: String,
    pub answers: Vec<AnswerOption>,
    pub time_limit: Option<u32>,
    /// Epoch milliseconds when the question was first shown, if it is the current one.
    pub show_timestamp: Option<i64>,
}

impl QuestionResponse {
    /// Project `question` at `index` of `session`.
    pub fn new(session: &GameSession, index: usize, question: &QuestionEntity) -> Self {
        let show_timestamp = (index == session.current_question_index)
            .then_some(session.question_shown_at)
            .flatten()
            .map(epoch_millis);

        Self {
            question_id: question.id,
            question_number: index + 1,
            total_questions: session.total_questions(),
            content: question.content.clone(),
            answers: question
                .answers
                .iter()
                .map(|answer| AnswerOption {
                    id: answer.id,
                    content: answer.content.clone(),
                })
                .collect(),
            time_limit: session.time_limit_secs,
            show_timestamp,
        }
    }
}

/// Body of `POST /game/session/{id}/answer` and payload of the `answer` realtime event.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub question_id: Uuid,
    pub answer_id: Uuid,
    /// Client epoch milliseconds at which the answer was given.
    pub answered_at: i64,
}

/// Outcome of one answer submission.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResultResponse {
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub is_correct: bool,
    pub correct_answer_id: Option<Uuid>,
    pub points_earned: u32,
    pub response_time_ms: u64,
    pub player_score: u32,
    pub player_hearts: u8,
    pub explanation: Option<String>,
    /// Question cursor after this answer.
    pub current_question_index: usize,
    pub session_finished: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Per-player line of a completion summary.
pub struct PlayerResult {
    pub user_id: Uuid,
    #[schema(value_type = String, example = "win")]
    pub result: Outcome,
    pub score: u32,
    pub hearts_remaining: u8,
    pub questions_answered: usize,
    pub correct_answers: usize,
}

impl From<&PlayerReport> for PlayerResult {
    fn from(report: &PlayerReport) -> Self {
        Self {
            user_id: report.user_id,
            result: report.outcome,
            score: report.score,
            hearts_remaining: report.hearts_remaining,
            questions_answered: report.questions_answered,
            correct_answers: report.correct_answers,
        }
    }
}

/// Session-wide summary broadcast with `session-complete`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub questions_answered: usize,
    pub correct_answers: usize,
    pub total_time_seconds: u64,
    pub players: Vec<PlayerResult>,
}

impl From<&SessionReport> for SessionSummary {
    fn from(report: &SessionReport) -> Self {
        Self {
            session_id: report.session_id,
            questions_answered: report.questions_answered,
            correct_answers: report.correct_answers,
            total_time_seconds: report.total_time_seconds,
            players: report.players.iter().map(Into::into).collect(),
        }
    }
}

/// Completion summary from the requesting player's point of view.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub session_id: Uuid,
    #[schema(value_type = String, example = "fail")]
    pub result: Outcome,
    pub hearts_remaining: u8,
    pub score: u32,
    pub questions_answered: usize,
    pub correct_answers: usize,
    pub total_time_seconds: u64,
    pub players: Vec<PlayerResult>,
}

impl CompletionResponse {
    /// Build the caller's view of `report`; `None` if the caller has no line in it.
    pub fn for_player(report: &SessionReport, user_id: UserId) -> Option<Self> {
        let own = report.player(user_id)?;
        Some(Self {
            session_id: report.session_id,
            result: own.outcome,
            hearts_remaining: own.hearts_remaining,
            score: own.score,
            questions_answered: report.questions_answered,
            correct_answers: report.correct_answers,
            total_time_seconds: report.total_time_seconds,
            players: report.players.iter().map(Into::into).collect(),
        })
    }
}

/// Result of toggling the ready flag.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub ready: bool,
    #[schema(value_type = String)]
    pub status: SessionStatus,
}

/// Session status after a lobby action.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub session_id: Uuid,
    #[schema(value_type = String)]
    pub status: SessionStatus,
}

impl From<&GameSession> for StatusResponse {
    fn from(session: &GameSession) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
        }
    }
}

/// Result of joining a session.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub session_id: Uuid,
    pub already_joined: bool,
    pub players: Vec<PlayerSummary>,
}

impl JoinResponse {
    /// Project the roster after a join attempt.
    pub fn new(session: &GameSession, already_joined: bool) -> Self {
        Self {
            session_id: session.id,
            already_joined,
            players: player_summaries(session),
        }
    }
}

/// Lobby roster broadcast after ready toggles, pauses and resumes.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyUpdate {
    pub session_id: Uuid,
    #[schema(value_type = String)]
    pub status: SessionStatus,
    pub players: Vec<PlayerSummary>,
    /// Milliseconds until the session starts, while counting down.
    pub countdown_ms: Option<u64>,
}

impl LobbyUpdate {
    /// Project the lobby state of `session`.
    pub fn new(session: &GameSession, countdown_ms: Option<u64>) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            players: player_summaries(session),
            countdown_ms,
        }
    }
}
