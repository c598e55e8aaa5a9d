use serde::{Deserialize, Serialize};
use std::{path::Path, time::SystemTime};
use uuid::Uuid;

use crate::state::game::{GameMode, SessionStatus};

/// Lowest difficulty a question may carry.
pub const MIN_DIFFICULTY: u8 = 1;
/// Highest difficulty a question may carry.
pub const MAX_DIFFICULTY: u8 = 5;

/// Topic grouping related questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicEntity {
    /// Stable identifier for the topic.
    pub id: Uuid,
    /// Display name.
    pub name: String,
}

/// Publication state of a curated quiz.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuizStatus {
    /// Still being edited; cannot be played.
    #[default]
    Draft,
    /// Playable.
    Published,
    /// Retired; cannot be played.
    Archived,
}

/// Curated, ordered list of questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizEntity {
    /// Stable identifier for the quiz.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Topic the quiz belongs to, if any.
    #[serde(default)]
    pub topic_id: Option<Uuid>,
    /// Publication state.
    #[serde(default)]
    pub status: QuizStatus,
    /// Question identifiers in curator-defined order.
    #[serde(default)]
    pub question_ids: Vec<Uuid>,
    /// Per-question time limit in seconds.
    #[serde(default)]
    pub time_limit_secs: Option<u32>,
    /// Number of sessions started from this quiz.
    #[serde(default)]
    pub play_count: u64,
}

/// Answer option of a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Stable identifier for the answer option.
    pub id: Uuid,
    /// Text shown to players.
    pub content: String,
    /// Whether picking this option is correct.
    pub is_correct: bool,
}

/// Question with its answer options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Topic the question belongs to.
    pub topic_id: Uuid,
    /// Difficulty between 1 and 5.
    pub difficulty: u8,
    /// Question text.
    pub content: String,
    /// Explanation revealed after answering.
    #[serde(default)]
    pub explanation: Option<String>,
    /// Answer options in display order.
    pub answers: Vec<AnswerEntity>,
}

impl QuestionEntity {
    /// The first answer flagged as correct.
    pub fn correct_answer(&self) -> Option<&AnswerEntity> {
        self.answers.iter().find(|answer| answer.is_correct)
    }

    /// Look up an answer option belonging to this question.
    pub fn answer(&self, answer_id: Uuid) -> Option<&AnswerEntity> {
        self.answers.iter().find(|answer| answer.id == answer_id)
    }
}

/// Inclusive difficulty filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyRange {
    /// Lowest accepted difficulty.
    pub min: u8,
    /// Highest accepted difficulty.
    pub max: u8,
}

impl Default for DifficultyRange {
    fn default() -> Self {
        Self {
            min: MIN_DIFFICULTY,
            max: MAX_DIFFICULTY,
        }
    }
}

impl DifficultyRange {
    /// Build a range from optional bounds, defaulting to the full scale.
    pub fn from_bounds(min: Option<u8>, max: Option<u8>) -> Self {
        Self {
            min: min.unwrap_or(MIN_DIFFICULTY),
            max: max.unwrap_or(MAX_DIFFICULTY),
        }
    }

    /// Whether `difficulty` falls inside the range.
    pub fn contains(&self, difficulty: u8) -> bool {
        (self.min..=self.max).contains(&difficulty)
    }
}

/// Player row persisted inside its session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionPlayerEntity {
    /// Participant identity.
    pub user_id: Uuid,
    /// Remaining lives.
    pub hearts_left: u8,
    /// Accumulated points.
    pub score: u32,
    /// Lobby ready flag.
    pub ready: bool,
    /// Join timestamp.
    pub joined_at: SystemTime,
}

/// Aggregate session entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Player arrangement.
    pub mode: GameMode,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Source quiz, when quiz-based.
    pub quiz_id: Option<Uuid>,
    /// Source topic, when topic-based.
    pub topic_id: Option<Uuid>,
    /// Ordered question identifiers.
    pub question_ids: Vec<Uuid>,
    /// Question cursor.
    pub current_question_index: usize,
    /// Participants in join order.
    pub players: Vec<SessionPlayerEntity>,
    /// Per-question time limit in seconds.
    pub time_limit_secs: Option<u32>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the session was updated.
    pub updated_at: SystemTime,
    /// Activation timestamp.
    pub started_at: Option<SystemTime>,
    /// Completion timestamp.
    pub ended_at: Option<SystemTime>,
    /// Start of the running lobby countdown.
    pub countdown_started_at: Option<SystemTime>,
    /// When the current question was first served.
    pub question_shown_at: Option<SystemTime>,
    /// Optimistic concurrency counter.
    pub version: u64,
}

/// Append-only answer record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerAnswerEntity {
    /// Primary key.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Answering player.
    pub user_id: Uuid,
    /// Answered question.
    pub question_id: Uuid,
    /// Picked answer option.
    pub selected_answer_id: Uuid,
    /// Correctness of the pick.
    pub is_correct: bool,
    /// Points granted.
    pub points_awarded: u32,
    /// Latency in milliseconds.
    pub answer_time_ms: u64,
    /// Server receive time.
    pub answered_at: SystemTime,
}

/// Question bank content used to seed a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    /// Topics to insert.
    #[serde(default)]
    pub topics: Vec<TopicEntity>,
    /// Quizzes to insert.
    #[serde(default)]
    pub quizzes: Vec<QuizEntity>,
    /// Questions (with embedded answers) to insert.
    #[serde(default)]
    pub questions: Vec<QuestionEntity>,
}

/// Failure to read a seed file.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// The file could not be read.
    #[error("failed to read seed file `{path}`")]
    Read {
        /// Seed file path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid seed JSON.
    #[error("failed to parse seed file `{path}`")]
    Parse {
        /// Seed file path.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl SeedData {
    /// Load seed data from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
