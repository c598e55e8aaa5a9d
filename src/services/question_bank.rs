use std::sync::Arc;

use rand::{Rng, seq::index};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::{
    game_store::GameStore,
    models::{DifficultyRange, QuestionEntity, QuizEntity, QuizStatus},
    storage::StorageError,
};

/// Failures of the read-only question bank queries.
#[derive(Debug, Error)]
pub enum QuestionBankError {
    /// No quiz with this id.
    #[error("quiz `{0}` not found")]
    QuizNotFound(Uuid),
    /// No topic with this id.
    #[error("topic `{0}` not found")]
    TopicNotFound(Uuid),
    /// The quiz or the difficulty filter yields no questions.
    #[error("no questions available")]
    Empty,
    /// The quiz exists but cannot be played yet (or anymore).
    #[error("quiz `{0}` is not published")]
    NotPublished(Uuid),
    /// Backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A quiz together with its questions in curator-defined order.
#[derive(Debug, Clone)]
pub struct QuizQuestions {
    /// The quiz record.
    pub quiz: QuizEntity,
    /// Its questions, in quiz order.
    pub questions: Vec<QuestionEntity>,
}

/// Read-only accessor over quizzes, topics and questions.
pub struct QuestionBank {
    store: Arc<dyn GameStore>,
}

impl QuestionBank {
    /// Wrap a store handle.
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self { store }
    }

    /// Questions of a published quiz, in the order the curator defined.
    pub async fn questions_for_quiz(
        &self,
        quiz_id: Uuid,
    ) -> Result<QuizQuestions, QuestionBankError> {
        let quiz = self
            .store
            .find_quiz(quiz_id)
            .await?
            .ok_or(QuestionBankError::QuizNotFound(quiz_id))?;

        if quiz.status != QuizStatus::Published {
            return Err(QuestionBankError::NotPublished(quiz_id));
        }
        if quiz.question_ids.is_empty() {
            return Err(QuestionBankError::Empty);
        }

        let questions = self.store.find_questions(quiz.question_ids.clone()).await?;
        if questions.is_empty() {
            return Err(QuestionBankError::Empty);
        }

        Ok(QuizQuestions { quiz, questions })
    }

    /// Uniform sample without replacement of `min(count, available)` questions
    /// of a topic within `difficulty`.
    pub async fn random_questions<R>(
        &self,
        topic_id: Uuid,
        count: usize,
        difficulty: DifficultyRange,
        rng: &mut R,
    ) -> Result<Vec<QuestionEntity>, QuestionBankError>
    where
        R: Rng + ?Sized,
    {
        self.store
            .find_topic(topic_id)
            .await?
            .ok_or(QuestionBankError::TopicNotFound(topic_id))?;

        let candidates = self
            .store
            .list_topic_questions(topic_id, difficulty)
            .await?;
        if candidates.is_empty() {
            return Err(QuestionBankError::Empty);
        }

        Ok(sample(candidates, count, rng))
    }
}

/// Draw `min(count, candidates.len())` distinct entries uniformly at random.
pub fn sample<T, R>(candidates: Vec<T>, count: usize, rng: &mut R) -> Vec<T>
where
    R: Rng + ?Sized,
{
    let amount = count.min(candidates.len());
    let mut slots: Vec<Option<T>> = candidates.into_iter().map(Some).collect();
    index::sample(rng, slots.len(), amount)
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::dao::{
        game_store::memory::InMemoryGameStore,
        models::{AnswerEntity, TopicEntity},
    };

    fn question(topic_id: Uuid, difficulty: u8) -> QuestionEntity {
        QuestionEntity {
            id: Uuid::new_v4(),
            topic_id,
            difficulty,
            content: format!("difficulty {difficulty}"),
            explanation: None,
            answers: vec![AnswerEntity {
                id: Uuid::new_v4(),
                content: "yes".into(),
                is_correct: true,
            }],
        }
    }

    fn quiz(status: QuizStatus, question_ids: Vec<Uuid>) -> QuizEntity {
        QuizEntity {
            id: Uuid::new_v4(),
            title: "Geography".into(),
            topic_id: None,
            status,
            question_ids,
            time_limit_secs: Some(30),
            play_count: 0,
        }
    }

    fn bank() -> (InMemoryGameStore, QuestionBank) {
        let store = InMemoryGameStore::new();
        let bank = QuestionBank::new(Arc::new(store.clone()));
        (store, bank)
    }

    #[tokio::test]
    async fn quiz_questions_keep_curated_order() {
        let (store, bank) = bank();
        let topic = Uuid::new_v4();
        let questions: Vec<QuestionEntity> = (1..=4).map(|d| question(topic, d)).collect();
        questions
            .iter()
            .cloned()
            .for_each(|q| store.insert_question(q));
        let order: Vec<Uuid> = questions.iter().rev().map(|q| q.id).collect();
        let quiz = quiz(QuizStatus::Published, order.clone());
        store.insert_quiz(quiz.clone());

        let result = bank.questions_for_quiz(quiz.id).await.unwrap();
        assert_eq!(
            result.questions.iter().map(|q| q.id).collect::<Vec<_>>(),
            order
        );
    }

    #[tokio::test]
    async fn quiz_errors_are_distinguished() {
        let (store, bank) = bank();
        assert!(matches!(
            bank.questions_for_quiz(Uuid::new_v4()).await,
            Err(QuestionBankError::QuizNotFound(_))
        ));

        let empty = quiz(QuizStatus::Published, Vec::new());
        store.insert_quiz(empty.clone());
        assert!(matches!(
            bank.questions_for_quiz(empty.id).await,
            Err(QuestionBankError::Empty)
        ));

        let draft = quiz(QuizStatus::Draft, vec![Uuid::new_v4()]);
        store.insert_quiz(draft.clone());
        assert!(matches!(
            bank.questions_for_quiz(draft.id).await,
            Err(QuestionBankError::NotPublished(_))
        ));
    }

    #[tokio::test]
    async fn random_sample_is_bounded_and_filtered() {
        let (store, bank) = bank();
        let topic = Uuid::new_v4();
        store.insert_topic(TopicEntity {
            id: topic,
            name: "Science".into(),
        });
        for difficulty in [1, 1, 2, 3, 5, 5] {
            store.insert_question(question(topic, difficulty));
        }
        let mut rng = StdRng::seed_from_u64(7);

        let easy = bank
            .random_questions(topic, 10, DifficultyRange { min: 1, max: 2 }, &mut rng)
            .await
            .unwrap();
        assert_eq!(easy.len(), 3);
        assert!(easy.iter().all(|q| q.difficulty <= 2));

        let two = bank
            .random_questions(topic, 2, DifficultyRange::default(), &mut rng)
            .await
            .unwrap();
        let distinct: HashSet<Uuid> = two.iter().map(|q| q.id).collect();
        assert_eq!(distinct.len(), 2);

        assert!(matches!(
            bank.random_questions(topic, 3, DifficultyRange { min: 4, max: 4 }, &mut rng)
                .await,
            Err(QuestionBankError::Empty)
        ));
        assert!(matches!(
            bank.random_questions(Uuid::new_v4(), 3, DifficultyRange::default(), &mut rng)
                .await,
            Err(QuestionBankError::TopicNotFound(_))
        ));
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let items: Vec<u32> = (0..20).collect();
        let first = sample(items.clone(), 5, &mut StdRng::seed_from_u64(42));
        let second = sample(items, 5, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }
}
