pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{
    DifficultyRange, GameSessionEntity, PlayerAnswerEntity, QuestionEntity, QuizEntity,
    TopicEntity,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for the question bank and game sessions.
///
/// Session writes are guarded by an optimistic version check: the caller passes
/// the version it read, and the store refuses the write with
/// [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict) if
/// the stored document moved on in the meantime.
pub trait GameStore: Send + Sync {
    /// Look up a quiz by id.
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;
    /// Look up a topic by id.
    fn find_topic(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TopicEntity>>>;
    /// Fetch questions by id, returned in the order of `ids`; unknown ids are skipped.
    fn find_questions(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
    /// Every question of a topic within a difficulty range, ordered by id.
    fn list_topic_questions(
        &self,
        topic_id: Uuid,
        difficulty: DifficultyRange,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
    /// Insert a new session; bumps the source quiz play count when quiz-based.
    fn create_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Look up a session by id.
    fn find_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>>;
    /// Replace a session if its stored version still equals `expected_version`.
    fn update_session(
        &self,
        session: GameSessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Append an answer and replace its session under the same version check.
    fn record_answer(
        &self,
        session: GameSessionEntity,
        expected_version: u64,
        answer: PlayerAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// All answers recorded for a session, oldest first.
    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerAnswerEntity>>>;
    /// Cheap liveness probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
