use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::game_store::GameStore,
    dto::{
        epoch_millis,
        game::{ReadyResponse, StatusResponse},
    },
    error::ServiceError,
    services::{session_events, session_store::SessionStore},
    state::{
        SharedState,
        game::{GameSession, SessionError, SessionStatus, UserId, timestamp_now},
        state_machine::SessionEvent,
    },
};

/// Flip the caller's ready flag; starts the countdown once everyone is ready.
pub async fn toggle_ready(
    state: &SharedState,
    user_id: UserId,
    session_id: Uuid,
) -> Result<ReadyResponse, ServiceError> {
    ensure_lobby_enabled(state)?;
    let store = state.require_game_store().await?;
    let sessions = SessionStore::new(store);
    let sessions = &sessions;

    let (session, ready) = state
        .run_exclusive(session_id, move || async move {
            let mut session = sessions.load(session_id).await?;
            let now = timestamp_now();

            session.require_player(user_id)?;
            if session.status != SessionStatus::Waiting {
                return Err(ServiceError::InvalidState(format!(
                    "ready can only be toggled while waiting (session is {})",
                    session.status
                )));
            }

            let player = session.require_player_mut(user_id)?;
            player.ready = !player.ready;
            let ready = player.ready;
            session.updated_at = now;

            if session.lobby_complete() {
                session.apply(SessionEvent::AllReady, now)?;
            }

            sessions.save(&mut session).await?;

            info!(
                session_id = %session_id,
                user_id = %user_id,
                ready,
                status = %session.status,
                "toggled ready flag"
            );
            let countdown_ms = match (session.status, session.countdown_started_at) {
                (SessionStatus::Countdown, Some(started_at)) => {
                    schedule_countdown(state.clone(), session_id, started_at);
                    Some(state.config().lobby.countdown_ms)
                }
                _ => None,
            };
            session_events::broadcast_lobby_update(state, &session, countdown_ms);
            Ok((session, ready))
        })
        .await?;

    Ok(ReadyResponse {
        ready,
        status: session.status,
    })
}

/// Host-only pause: an active game is paused, a lobby countdown is cancelled.
pub async fn pause_session(
    state: &SharedState,
    user_id: UserId,
    session_id: Uuid,
) -> Result<StatusResponse, ServiceError> {
    ensure_lobby_enabled(state)?;
    let countdown = state.config().countdown();
    let store = state.require_game_store().await?;
    let sessions = SessionStore::new(store);
    let sessions = &sessions;

    let session = state
        .run_exclusive(session_id, move || async move {
            let mut session = sessions.load(session_id).await?;
            let now = timestamp_now();
            settle_if_due(&mut session, countdown, now)?;
            session.require_host(user_id)?;

            let event = match session.status {
                SessionStatus::Active => SessionEvent::Pause,
                _ => SessionEvent::PauseCountdown,
            };
            session.apply(event, now)?;
            sessions.save(&mut session).await?;

            info!(session_id = %session_id, status = %session.status, "session paused");
            session_events::broadcast_lobby_update(state, &session, None);
            Ok(session)
        })
        .await?;

    Ok(StatusResponse::from(&session))
}

/// Host-only resume: a paused session goes back to the lobby.
pub async fn resume_session(
    state: &SharedState,
    user_id: UserId,
    session_id: Uuid,
) -> Result<StatusResponse, ServiceError> {
    ensure_lobby_enabled(state)?;
    let store = state.require_game_store().await?;
    let sessions = SessionStore::new(store);
    let sessions = &sessions;

    let session = state
        .run_exclusive(session_id, move || async move {
            let mut session = sessions.load(session_id).await?;
            session.require_host(user_id)?;
            session.apply(SessionEvent::Resume, timestamp_now())?;
            sessions.save(&mut session).await?;

            info!(session_id = %session_id, status = %session.status, "session resumed");
            session_events::broadcast_lobby_update(state, &session, None);
            Ok(session)
        })
        .await?;

    Ok(StatusResponse::from(&session))
}

/// Activate `session` if its countdown is over. Returns whether it changed.
///
/// Covers countdowns whose timer task never fired, e.g. after a restart.
pub fn settle_if_due(
    session: &mut GameSession,
    countdown: Duration,
    now: SystemTime,
) -> Result<bool, SessionError> {
    let due = session.status == SessionStatus::Countdown
        && session
            .countdown_started_at
            .is_some_and(|started| started + countdown <= now);
    if !due {
        return Ok(false);
    }
    activate(session, now)?;
    Ok(true)
}

/// Broadcast `session-start` followed by the first question to show.
///
/// Call it while holding the session gate so the announcement cannot
/// overtake later events of the same session.
pub async fn announce_start(state: &SharedState, store: &Arc<dyn GameStore>, session: &GameSession) {
    session_events::broadcast_session_start(state, session);

    let Some(question_id) = session.current_question_id() else {
        return;
    };
    match store.find_questions(vec![question_id]).await {
        Ok(questions) => match questions.first() {
            Some(question) => session_events::broadcast_question(state, session, question),
            None => warn!(session_id = %session.id, question_id = %question_id, "first question missing"),
        },
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "failed to load first question")
        }
    }
}

fn activate(session: &mut GameSession, now: SystemTime) -> Result<(), SessionError> {
    session.apply(SessionEvent::CountdownElapsed, now)?;
    session.question_shown_at = Some(now);
    Ok(())
}

fn ensure_lobby_enabled(state: &SharedState) -> Result<(), ServiceError> {
    if state.config().lobby.enabled {
        Ok(())
    } else {
        Err(ServiceError::NotImplemented("lobby is disabled".into()))
    }
}

/// Fire `CountdownElapsed` once the configured countdown has passed.
fn schedule_countdown(state: SharedState, session_id: Uuid, started_at: SystemTime) {
    let countdown = state.config().countdown();
    tokio::spawn(async move {
        sleep(countdown).await;
        match finish_countdown(&state, session_id, started_at).await {
            Ok(true) => info!(session_id = %session_id, "countdown elapsed; session active"),
            Ok(false) => debug!(session_id = %session_id, "countdown superseded"),
            Err(err) => warn!(session_id = %session_id, error = %err, "failed to finish countdown"),
        }
    });
}

/// Activate the session if it is still in the countdown that started at `started_at`.
async fn finish_countdown(
    state: &SharedState,
    session_id: Uuid,
    started_at: SystemTime,
) -> Result<bool, ServiceError> {
    let store = state.require_game_store().await?;
    let sessions = SessionStore::new(Arc::clone(&store));
    let (sessions, store_ref) = (&sessions, &store);
    // Stored timestamps only keep millisecond precision.
    let expected = epoch_millis(started_at);

    state
        .run_exclusive(session_id, move || async move {
            let mut session = sessions.load(session_id).await?;
            let same_countdown = session.status == SessionStatus::Countdown
                && session.countdown_started_at.map(epoch_millis) == Some(expected);
            if !same_countdown {
                return Ok(false);
            }
            activate(&mut session, timestamp_now())?;
            sessions.save(&mut session).await?;
            announce_start(state, store_ref, &session).await;
            Ok(true)
        })
        .await
}
