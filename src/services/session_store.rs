use std::{sync::Arc, time::SystemTime};

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{game_store::GameStore, models::GameSessionEntity},
    error::ServiceError,
    state::game::{GameSession, JoinOutcome, PlayerAnswer, UserId},
};

/// Durable record of sessions, their players and answers.
///
/// Every write is a single store call guarded by the session version, so a
/// caller that read a stale copy gets a conflict instead of clobbering newer
/// state. Callers serialize writes per session with
/// [`AppState::run_exclusive`](crate::state::AppState::run_exclusive).
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn GameStore>,
}

impl SessionStore {
    /// Wrap a store handle.
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self { store }
    }

    /// Persist a freshly built session.
    pub async fn create_session(&self, session: GameSession) -> Result<GameSession, ServiceError> {
        self.store
            .create_session(GameSessionEntity::from(session.clone()))
            .await?;
        info!(
            session_id = %session.id,
            mode = %session.mode,
            status = %session.status,
            questions = session.total_questions(),
            "created game session"
        );
        Ok(session)
    }

    /// Load a session or fail with [`ServiceError::NotFound`].
    pub async fn load(&self, id: Uuid) -> Result<GameSession, ServiceError> {
        let entity = self
            .store
            .find_session(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("session `{id}` not found")))?;
        Ok(GameSession::try_from(entity)?)
    }

    /// Write back a mutated session, bumping its version.
    pub async fn save(&self, session: &mut GameSession) -> Result<(), ServiceError> {
        let expected = session.version;
        session.version += 1;
        self.store
            .update_session(GameSessionEntity::from(session.clone()), expected)
            .await?;
        debug!(session_id = %session.id, version = session.version, "saved session");
        Ok(())
    }

    /// Write back a mutated session together with the answer that caused the mutation.
    pub async fn save_with_answer(
        &self,
        session: &mut GameSession,
        answer: PlayerAnswer,
    ) -> Result<(), ServiceError> {
        let expected = session.version;
        session.version += 1;
        self.store
            .record_answer(
                GameSessionEntity::from(session.clone()),
                expected,
                answer.into(),
            )
            .await?;
        Ok(())
    }

    /// Add `user_id` to a session if capacity and status allow it.
    pub async fn join_session(
        &self,
        id: Uuid,
        user_id: UserId,
        hearts: u8,
        now: SystemTime,
    ) -> Result<(GameSession, JoinOutcome), ServiceError> {
        let mut session = self.load(id).await?;
        let outcome = session.join(user_id, hearts, now)?;
        if outcome == JoinOutcome::Joined {
            self.save(&mut session).await?;
            info!(session_id = %id, user_id = %user_id, "player joined session");
        }
        Ok((session, outcome))
    }

    /// Move the question cursor of a stored session.
    pub async fn advance_question(
        &self,
        id: Uuid,
        new_index: usize,
        now: SystemTime,
    ) -> Result<GameSession, ServiceError> {
        let mut session = self.load(id).await?;
        session.advance_question(new_index, now)?;
        self.save(&mut session).await?;
        Ok(session)
    }

    /// Every answer recorded for the session, oldest first.
    pub async fn answers(&self, id: Uuid) -> Result<Vec<PlayerAnswer>, ServiceError> {
        let answers = self.store.list_answers(id).await?;
        Ok(answers.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::game_store::memory::InMemoryGameStore,
        state::game::{GameMode, SessionSource, SessionStatus},
    };

    fn new_session(mode: GameMode, status: SessionStatus, questions: usize) -> GameSession {
        GameSession::new(
            mode,
            SessionSource::Topic {
                topic_id: Uuid::new_v4(),
            },
            (0..questions).map(|_| Uuid::new_v4()).collect(),
            Uuid::new_v4(),
            3,
            status,
            None,
            SystemTime::now(),
        )
    }

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(InMemoryGameStore::new()))
    }

    #[tokio::test]
    async fn join_is_idempotent_and_persisted() {
        let sessions = store();
        let session = sessions
            .create_session(new_session(GameMode::Competitive, SessionStatus::Waiting, 3))
            .await
            .unwrap();
        let guest = Uuid::new_v4();

        let (joined, outcome) = sessions
            .join_session(session.id, guest, 3, SystemTime::now())
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::Joined);
        assert_eq!(joined.version, 1);

        let (again, outcome) = sessions
            .join_session(session.id, guest, 3, SystemTime::now())
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::AlreadyJoined);
        assert_eq!(again.version, 1);
        assert_eq!(sessions.load(session.id).await.unwrap().players.len(), 2);
    }

    #[tokio::test]
    async fn stale_copy_cannot_overwrite_newer_state() {
        let sessions = store();
        let session = sessions
            .create_session(new_session(GameMode::Solo, SessionStatus::Active, 3))
            .await
            .unwrap();

        let mut first = sessions.load(session.id).await.unwrap();
        let mut stale = first.clone();
        first.advance_question(1, SystemTime::now()).unwrap();
        sessions.save(&mut first).await.unwrap();

        stale.advance_question(2, SystemTime::now()).unwrap();
        assert!(matches!(
            sessions.save(&mut stale).await,
            Err(ServiceError::Internal(_))
        ));
        assert_eq!(
            sessions.load(session.id).await.unwrap().current_question_index,
            1
        );
    }

    #[tokio::test]
    async fn advance_past_end_is_rejected() {
        let sessions = store();
        let session = sessions
            .create_session(new_session(GameMode::Solo, SessionStatus::Active, 2))
            .await
            .unwrap();

        assert!(matches!(
            sessions
                .advance_question(session.id, 3, SystemTime::now())
                .await,
            Err(ServiceError::InvalidInput(_))
        ));
        let advanced = sessions
            .advance_question(session.id, 2, SystemTime::now())
            .await
            .unwrap();
        assert!(advanced.is_exhausted());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        assert!(matches!(
            store().load(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
