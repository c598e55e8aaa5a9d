use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::info;
use uuid::Uuid;

use crate::dao::{
    game_store::GameStore,
    models::{
        DifficultyRange, GameSessionEntity, PlayerAnswerEntity, QuestionEntity, QuizEntity,
        SeedData, TopicEntity,
    },
    storage::{StorageError, StorageResult},
};

/// Process-local store used when no database is configured, and in tests.
#[derive(Clone, Default)]
pub struct InMemoryGameStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    topics: DashMap<Uuid, TopicEntity>,
    quizzes: DashMap<Uuid, QuizEntity>,
    questions: DashMap<Uuid, QuestionEntity>,
    sessions: DashMap<Uuid, GameSessionEntity>,
    answers: DashMap<Uuid, Vec<PlayerAnswerEntity>>,
}

impl InMemoryGameStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with the given question bank.
    pub fn from_seed(seed: SeedData) -> Self {
        let store = Self::new();
        let (topics, quizzes, questions) =
            (seed.topics.len(), seed.quizzes.len(), seed.questions.len());
        seed.topics
            .into_iter()
            .for_each(|topic| store.insert_topic(topic));
        seed.quizzes
            .into_iter()
            .for_each(|quiz| store.insert_quiz(quiz));
        seed.questions
            .into_iter()
            .for_each(|question| store.insert_question(question));
        info!(topics, quizzes, questions, "seeded in-memory question bank");
        store
    }

    /// Insert or replace a topic.
    pub fn insert_topic(&self, topic: TopicEntity) {
        self.inner.topics.insert(topic.id, topic);
    }

    /// Insert or replace a quiz.
    pub fn insert_quiz(&self, quiz: QuizEntity) {
        self.inner.quizzes.insert(quiz.id, quiz);
    }

    /// Insert or replace a question.
    pub fn insert_question(&self, question: QuestionEntity) {
        self.inner.questions.insert(question.id, question);
    }

    fn compare_and_replace(
        &self,
        session: GameSessionEntity,
        expected_version: u64,
        answer: Option<PlayerAnswerEntity>,
    ) -> StorageResult<()> {
        let id = session.id;
        // The session entry guard serializes writers for this id.
        let mut stored = self
            .inner
            .sessions
            .get_mut(&id)
            .ok_or(StorageError::Conflict { id })?;
        if stored.version != expected_version {
            return Err(StorageError::Conflict { id });
        }

        if let Some(answer) = answer {
            self.inner.answers.entry(id).or_default().push(answer);
        }
        *stored = session;
        Ok(())
    }
}

impl GameStore for InMemoryGameStore {
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let quiz = self.inner.quizzes.get(&id).map(|entry| entry.clone());
        Box::pin(async move { Ok(quiz) })
    }

    fn find_topic(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TopicEntity>>> {
        let topic = self.inner.topics.get(&id).map(|entry| entry.clone());
        Box::pin(async move { Ok(topic) })
    }

    fn find_questions(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let questions = ids
            .iter()
            .filter_map(|id| self.inner.questions.get(id).map(|entry| entry.clone()))
            .collect();
        Box::pin(async move { Ok(questions) })
    }

    fn list_topic_questions(
        &self,
        topic_id: Uuid,
        difficulty: DifficultyRange,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let mut questions: Vec<QuestionEntity> = self
            .inner
            .questions
            .iter()
            .filter(|entry| entry.topic_id == topic_id && difficulty.contains(entry.difficulty))
            .map(|entry| entry.value().clone())
            .collect();
        questions.sort_by_key(|question| question.id);
        Box::pin(async move { Ok(questions) })
    }

    fn create_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        if let Some(quiz_id) = session.quiz_id
            && let Some(mut quiz) = self.inner.quizzes.get_mut(&quiz_id)
        {
            quiz.play_count += 1;
        }
        self.inner.sessions.insert(session.id, session);
        Box::pin(async { Ok(()) })
    }

    fn find_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let session = self.inner.sessions.get(&id).map(|entry| entry.clone());
        Box::pin(async move { Ok(session) })
    }

    fn update_session(
        &self,
        session: GameSessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.compare_and_replace(session, expected_version, None);
        Box::pin(async move { result })
    }

    fn record_answer(
        &self,
        session: GameSessionEntity,
        expected_version: u64,
        answer: PlayerAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.compare_and_replace(session, expected_version, Some(answer));
        Box::pin(async move { result })
    }

    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerAnswerEntity>>> {
        let answers = self
            .inner
            .answers
            .get(&session_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        Box::pin(async move { Ok(answers) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{
        dao::models::QuizStatus,
        state::game::{GameMode, SessionStatus},
    };

    fn session(quiz_id: Option<Uuid>) -> GameSessionEntity {
        let now = SystemTime::now();
        GameSessionEntity {
            id: Uuid::new_v4(),
            mode: GameMode::Solo,
            status: SessionStatus::Active,
            quiz_id,
            topic_id: quiz_id.is_none().then(Uuid::new_v4),
            question_ids: vec![Uuid::new_v4()],
            current_question_index: 0,
            players: Vec::new(),
            time_limit_secs: None,
            created_at: now,
            updated_at: now,
            started_at: Some(now),
            ended_at: None,
            countdown_started_at: None,
            question_shown_at: None,
            version: 0,
        }
    }

    fn answer(session_id: Uuid) -> PlayerAnswerEntity {
        PlayerAnswerEntity {
            id: Uuid::new_v4(),
            session_id,
            user_id: Uuid::new_v4(),
            question_id: Uuid::new_v4(),
            selected_answer_id: Uuid::new_v4(),
            is_correct: true,
            points_awarded: 100,
            answer_time_ms: 500,
            answered_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn creating_a_quiz_session_bumps_play_count() {
        let store = InMemoryGameStore::new();
        let quiz_id = Uuid::new_v4();
        store.insert_quiz(QuizEntity {
            id: quiz_id,
            title: "Rivers".into(),
            topic_id: None,
            status: QuizStatus::Published,
            question_ids: Vec::new(),
            time_limit_secs: None,
            play_count: 0,
        });

        store.create_session(session(Some(quiz_id))).await.unwrap();
        store.create_session(session(None)).await.unwrap();

        let quiz = store.find_quiz(quiz_id).await.unwrap().unwrap();
        assert_eq!(quiz.play_count, 1);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = InMemoryGameStore::new();
        let original = session(None);
        store.create_session(original.clone()).await.unwrap();

        let mut next = original.clone();
        next.version = 1;
        store.update_session(next.clone(), 0).await.unwrap();

        let err = store.update_session(next, 0).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { id } if id == original.id));
    }

    #[tokio::test]
    async fn conflicting_answer_is_not_recorded() {
        let store = InMemoryGameStore::new();
        let original = session(None);
        store.create_session(original.clone()).await.unwrap();

        let mut next = original.clone();
        next.version = 1;
        store
            .record_answer(next.clone(), 0, answer(original.id))
            .await
            .unwrap();
        assert!(
            store
                .record_answer(next, 0, answer(original.id))
                .await
                .is_err()
        );

        assert_eq!(store.list_answers(original.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn questions_come_back_in_requested_order() {
        let store = InMemoryGameStore::new();
        let topic_id = Uuid::new_v4();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for (difficulty, id) in ids.iter().enumerate() {
            store.insert_question(QuestionEntity {
                id: *id,
                topic_id,
                difficulty: difficulty as u8 + 1,
                content: format!("Q{difficulty}"),
                explanation: None,
                answers: Vec::new(),
            });
        }

        let reversed: Vec<Uuid> = ids.iter().rev().copied().collect();
        let found = store.find_questions(reversed.clone()).await.unwrap();
        assert_eq!(
            found.iter().map(|question| question.id).collect::<Vec<_>>(),
            reversed
        );

        let easy = store
            .list_topic_questions(topic_id, DifficultyRange { min: 1, max: 2 })
            .await
            .unwrap();
        assert_eq!(easy.len(), 2);
    }
}
