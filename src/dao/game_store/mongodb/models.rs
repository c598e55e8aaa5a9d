use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{
        AnswerEntity, GameSessionEntity, PlayerAnswerEntity, QuestionEntity, QuizEntity,
        QuizStatus, SessionPlayerEntity, TopicEntity,
    },
    state::game::{GameMode, SessionStatus},
};

pub const TOPIC_COLLECTION: &str = "topics";
pub const QUIZ_COLLECTION: &str = "quizzes";
pub const QUESTION_COLLECTION: &str = "questions";
pub const SESSION_COLLECTION: &str = "game_sessions";

/// Parse a stored string identifier.
pub fn parse_id(collection: &'static str, raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::Corrupt {
        collection,
        message: format!("invalid id `{raw}`: {err}"),
    })
}

fn parse_ids(collection: &'static str, raw: &[String]) -> MongoResult<Vec<Uuid>> {
    raw.iter().map(|id| parse_id(collection, id)).collect()
}

fn parse_optional_id(collection: &'static str, raw: Option<&str>) -> MongoResult<Option<Uuid>> {
    raw.map(|id| parse_id(collection, id)).transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTopicDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

impl TryFrom<MongoTopicDocument> for TopicEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoTopicDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(TOPIC_COLLECTION, &value.id)?,
            name: value.name,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuizDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub topic_id: Option<String>,
    #[serde(default)]
    pub status: QuizStatus,
    #[serde(default)]
    pub question_ids: Vec<String>,
    #[serde(default)]
    pub time_limit_secs: Option<u32>,
    #[serde(default)]
    pub play_count: i64,
}

impl TryFrom<MongoQuizDocument> for QuizEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoQuizDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(QUIZ_COLLECTION, &value.id)?,
            title: value.title,
            topic_id: parse_optional_id(QUIZ_COLLECTION, value.topic_id.as_deref())?,
            status: value.status,
            question_ids: parse_ids(QUIZ_COLLECTION, &value.question_ids)?,
            time_limit_secs: value.time_limit_secs,
            play_count: u64::try_from(value.play_count).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerOptionDocument {
    pub id: String,
    pub content: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub topic_id: String,
    pub difficulty: u8,
    pub content: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub answers: Vec<MongoAnswerOptionDocument>,
}

impl TryFrom<MongoQuestionDocument> for QuestionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoQuestionDocument) -> MongoResult<Self> {
        let answers = value
            .answers
            .into_iter()
            .map(|answer| {
                Ok(AnswerEntity {
                    id: parse_id(QUESTION_COLLECTION, &answer.id)?,
                    content: answer.content,
                    is_correct: answer.is_correct,
                })
            })
            .collect::<MongoResult<Vec<_>>>()?;

        Ok(Self {
            id: parse_id(QUESTION_COLLECTION, &value.id)?,
            topic_id: parse_id(QUESTION_COLLECTION, &value.topic_id)?,
            difficulty: value.difficulty,
            content: value.content,
            explanation: value.explanation,
            answers,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    pub user_id: String,
    pub hearts_left: u8,
    pub score: u32,
    pub ready: bool,
    pub joined_at: DateTime,
}

/// Session document. Players and recorded answers are embedded so a single
/// versioned update commits a whole state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub mode: GameMode,
    pub status: SessionStatus,
    pub quiz_id: Option<String>,
    pub topic_id: Option<String>,
    pub question_ids: Vec<String>,
    pub current_question_index: i64,
    pub players: Vec<MongoPlayerDocument>,
    pub time_limit_secs: Option<u32>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub started_at: Option<DateTime>,
    pub ended_at: Option<DateTime>,
    pub countdown_started_at: Option<DateTime>,
    pub question_shown_at: Option<DateTime>,
    pub version: i64,
    #[serde(default)]
    pub answers: Vec<MongoAnswerDocument>,
}

impl MongoSessionDocument {
    /// Every field except `_id` and `answers`, ready for a `$set`.
    pub fn state_fields(&self) -> Document {
        let players: Vec<Document> = self
            .players
            .iter()
            .map(|player| {
                doc! {
                    "user_id": player.user_id.as_str(),
                    "hearts_left": i32::from(player.hearts_left),
                    "score": i64::from(player.score),
                    "ready": player.ready,
                    "joined_at": player.joined_at,
                }
            })
            .collect();

        doc! {
            "mode": self.mode.to_string(),
            "status": self.status.to_string(),
            "quiz_id": self.quiz_id.clone(),
            "topic_id": self.topic_id.clone(),
            "question_ids": self.question_ids.clone(),
            "current_question_index": self.current_question_index,
            "players": players,
            "time_limit_secs": self.time_limit_secs.map(i64::from),
            "created_at": self.created_at,
            "updated_at": self.updated_at,
            "started_at": self.started_at,
            "ended_at": self.ended_at,
            "countdown_started_at": self.countdown_started_at,
            "question_shown_at": self.question_shown_at,
            "version": self.version,
        }
    }
}

/// Projection of a session document onto its recorded answers.
#[derive(Debug, Default, Deserialize)]
pub struct MongoSessionAnswers {
    #[serde(default)]
    pub answers: Vec<MongoAnswerDocument>,
}

impl From<GameSessionEntity> for MongoSessionDocument {
    fn from(value: GameSessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            mode: value.mode,
            status: value.status,
            quiz_id: value.quiz_id.map(|id| id.to_string()),
            topic_id: value.topic_id.map(|id| id.to_string()),
            question_ids: value.question_ids.iter().map(Uuid::to_string).collect(),
            current_question_index: value.current_question_index as i64,
            players: value
                .players
                .into_iter()
                .map(|player| MongoPlayerDocument {
                    user_id: player.user_id.to_string(),
                    hearts_left: player.hearts_left,
                    score: player.score,
                    ready: player.ready,
                    joined_at: DateTime::from_system_time(player.joined_at),
                })
                .collect(),
            time_limit_secs: value.time_limit_secs,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            countdown_started_at: value.countdown_started_at.map(DateTime::from_system_time),
            question_shown_at: value.question_shown_at.map(DateTime::from_system_time),
            version: value.version as i64,
            answers: Vec::new(),
        }
    }
}

impl TryFrom<MongoSessionDocument> for GameSessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> MongoResult<Self> {
        let players = value
            .players
            .into_iter()
            .map(|player| {
                Ok(SessionPlayerEntity {
                    user_id: parse_id(SESSION_COLLECTION, &player.user_id)?,
                    hearts_left: player.hearts_left,
                    score: player.score,
                    ready: player.ready,
                    joined_at: player.joined_at.to_system_time(),
                })
            })
            .collect::<MongoResult<Vec<_>>>()?;

        let current_question_index =
            usize::try_from(value.current_question_index).map_err(|_| MongoDaoError::Corrupt {
                collection: SESSION_COLLECTION,
                message: format!("negative question index in `{}`", value.id),
            })?;

        Ok(Self {
            id: parse_id(SESSION_COLLECTION, &value.id)?,
            mode: value.mode,
            status: value.status,
            quiz_id: parse_optional_id(SESSION_COLLECTION, value.quiz_id.as_deref())?,
            topic_id: parse_optional_id(SESSION_COLLECTION, value.topic_id.as_deref())?,
            question_ids: parse_ids(SESSION_COLLECTION, &value.question_ids)?,
            current_question_index,
            players,
            time_limit_secs: value.time_limit_secs,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            started_at: value.started_at.map(DateTime::to_system_time),
            ended_at: value.ended_at.map(DateTime::to_system_time),
            countdown_started_at: value.countdown_started_at.map(DateTime::to_system_time),
            question_shown_at: value.question_shown_at.map(DateTime::to_system_time),
            version: u64::try_from(value.version).unwrap_or(0),
        })
    }
}

/// Answer embedded in its session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub question_id: String,
    pub selected_answer_id: String,
    pub is_correct: bool,
    pub points_awarded: u32,
    pub answer_time_ms: i64,
    pub answered_at: DateTime,
}

impl MongoAnswerDocument {
    /// The answer as pushed onto `answers`.
    pub fn to_document(&self) -> Document {
        doc! {
            "id": self.id.as_str(),
            "session_id": self.session_id.as_str(),
            "user_id": self.user_id.as_str(),
            "question_id": self.question_id.as_str(),
            "selected_answer_id": self.selected_answer_id.as_str(),
            "is_correct": self.is_correct,
            "points_awarded": i64::from(self.points_awarded),
            "answer_time_ms": self.answer_time_ms,
            "answered_at": self.answered_at,
        }
    }
}

impl From<PlayerAnswerEntity> for MongoAnswerDocument {
    fn from(value: PlayerAnswerEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            user_id: value.user_id.to_string(),
            question_id: value.question_id.to_string(),
            selected_answer_id: value.selected_answer_id.to_string(),
            is_correct: value.is_correct,
            points_awarded: value.points_awarded,
            answer_time_ms: i64::try_from(value.answer_time_ms).unwrap_or(i64::MAX),
            answered_at: DateTime::from_system_time(value.answered_at),
        }
    }
}

impl TryFrom<MongoAnswerDocument> for PlayerAnswerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoAnswerDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(SESSION_COLLECTION, &value.id)?,
            session_id: parse_id(SESSION_COLLECTION, &value.session_id)?,
            user_id: parse_id(SESSION_COLLECTION, &value.user_id)?,
            question_id: parse_id(SESSION_COLLECTION, &value.question_id)?,
            selected_answer_id: parse_id(SESSION_COLLECTION, &value.selected_answer_id)?,
            is_correct: value.is_correct,
            points_awarded: value.points_awarded,
            answer_time_ms: u64::try_from(value.answer_time_ms).unwrap_or(0),
            answered_at: value.answered_at.to_system_time(),
        })
    }
}
