#![allow(dead_code)]

use std::sync::Arc;

use quiz_arena_back::{
    config::AppConfig,
    dao::{
        game_store::memory::InMemoryGameStore,
        models::{AnswerEntity, QuestionEntity, QuizEntity, QuizStatus, TopicEntity},
    },
    services::auth::StaticTokenProvider,
    state::{AppState, SharedState},
};
use uuid::Uuid;

/// A topic with one published quiz, installed in an in-memory store.
pub struct Fixture {
    pub state: SharedState,
    pub store: InMemoryGameStore,
    pub topic_id: Uuid,
    pub quiz_id: Uuid,
    pub questions: Vec<QuestionEntity>,
}

impl Fixture {
    /// Correct option of the question at `index`.
    pub fn correct_answer(&self, index: usize) -> Uuid {
        self.questions[index]
            .answers
            .iter()
            .find(|answer| answer.is_correct)
            .map(|answer| answer.id)
            .unwrap()
    }

    /// Some incorrect option of the question at `index`.
    pub fn wrong_answer(&self, index: usize) -> Uuid {
        self.questions[index]
            .answers
            .iter()
            .find(|answer| !answer.is_correct)
            .map(|answer| answer.id)
            .unwrap()
    }
}

/// Question with one correct and three incorrect options.
pub fn question(topic_id: Uuid, difficulty: u8, n: usize) -> QuestionEntity {
    QuestionEntity {
        id: Uuid::new_v4(),
        topic_id,
        difficulty,
        content: format!("question {n}"),
        explanation: Some(format!("explanation {n}")),
        answers: (0..4)
            .map(|option| AnswerEntity {
                id: Uuid::new_v4(),
                content: format!("option {option}"),
                is_correct: option == 0,
            })
            .collect(),
    }
}

/// Shared state over a quiz of `question_count` questions.
pub async fn fixture(config: AppConfig, question_count: usize) -> Fixture {
    let store = InMemoryGameStore::new();
    let topic_id = Uuid::new_v4();
    store.insert_topic(TopicEntity {
        id: topic_id,
        name: "General".into(),
    });

    let questions: Vec<QuestionEntity> = (0..question_count)
        .map(|n| question(topic_id, (n % 5) as u8 + 1, n))
        .collect();
    for question in &questions {
        store.insert_question(question.clone());
    }

    let quiz_id = Uuid::new_v4();
    store.insert_quiz(QuizEntity {
        id: quiz_id,
        title: "Fixture quiz".into(),
        topic_id: Some(topic_id),
        status: QuizStatus::Published,
        question_ids: questions.iter().map(|question| question.id).collect(),
        time_limit_secs: Some(30),
        play_count: 0,
    });

    let state = AppState::new(config, Arc::new(StaticTokenProvider::default()));
    state.install_game_store(Arc::new(store.clone())).await;

    Fixture {
        state,
        store,
        topic_id,
        quiz_id,
        questions,
    }
}

/// Default configuration with the lobby switched off.
pub fn lobby_disabled() -> AppConfig {
    let mut config = AppConfig::default();
    config.lobby.enabled = false;
    config
}

/// Default configuration with a short lobby countdown.
pub fn quick_countdown(countdown_ms: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.lobby.countdown_ms = countdown_ms;
    config
}
