use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use rand::{SeedableRng, rngs::StdRng};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        game_store::GameStore,
        models::{DifficultyRange, QuestionEntity},
    },
    dto::{
        epoch_millis,
        game::{
            AnswerResultResponse, CompletionResponse, JoinResponse, QuestionResponse,
            SessionDescriptor, SessionSnapshot, StartQuizRequest, StartTopicRequest,
            SubmitAnswerRequest,
        },
    },
    error::ServiceError,
    services::{
        lobby_service,
        question_bank::{QuestionBank, QuizQuestions},
        session_events,
        session_store::SessionStore,
    },
    state::{
        SharedState,
        completion::{all_players_answered, build_report},
        game::{
            GameMode, GameSession, JoinOutcome, PlayerAnswer, SessionError, SessionSource,
            SessionStatus, UserId, timestamp_now,
        },
        scoring::{clamp_response_time, score_answer},
        state_machine::{FinishReason, SessionEvent},
    },
};

/// Status a freshly created session starts in.
///
/// Multiplayer sessions wait in the lobby while it is enabled; solo sessions
/// only do so when `solo_lobby` is set.
pub fn initial_status(config: &AppConfig, mode: GameMode) -> SessionStatus {
    let lobby = &config.lobby;
    if lobby.enabled && (mode != GameMode::Solo || lobby.solo_lobby) {
        SessionStatus::Waiting
    } else {
        SessionStatus::Active
    }
}

/// Create a session over the questions of a published quiz, with the caller as host.
pub async fn start_quiz_session(
    state: &SharedState,
    user_id: UserId,
    quiz_id: Uuid,
    request: StartQuizRequest,
) -> Result<SessionDescriptor, ServiceError> {
    let store = state.require_game_store().await?;
    let QuizQuestions { quiz, questions } =
        QuestionBank::new(Arc::clone(&store)).questions_for_quiz(quiz_id).await?;

    let session = build_session(
        &state.config(),
        request.mode,
        SessionSource::Quiz { quiz_id },
        &questions,
        user_id,
        quiz.time_limit_secs,
    );
    let session = SessionStore::new(store).create_session(session).await?;
    Ok(SessionDescriptor::from(&session))
}

/// Create a session over a random sample of a topic's questions, with the caller as host.
pub async fn start_topic_session(
    state: &SharedState,
    user_id: UserId,
    topic_id: Uuid,
    request: StartTopicRequest,
) -> Result<SessionDescriptor, ServiceError> {
    let config = state.config();
    let count = request
        .question_count
        .unwrap_or(config.gameplay.default_question_count)
        .clamp(1, config.gameplay.max_question_count.max(1));
    let difficulty = DifficultyRange::from_bounds(request.difficulty_min, request.difficulty_max);

    let store = state.require_game_store().await?;
    let mut rng = StdRng::from_os_rng();
    let questions = QuestionBank::new(Arc::clone(&store))
        .random_questions(topic_id, count, difficulty, &mut rng)
        .await?;

    let session = build_session(
        &config,
        request.mode,
        SessionSource::Topic { topic_id },
        &questions,
        user_id,
        None,
    );
    let session = SessionStore::new(store).create_session(session).await?;
    Ok(SessionDescriptor::from(&session))
}

fn build_session(
    config: &AppConfig,
    mode: GameMode,
    source: SessionSource,
    questions: &[QuestionEntity],
    host: UserId,
    time_limit_secs: Option<u32>,
) -> GameSession {
    let now = timestamp_now();
    let status = initial_status(config, mode);
    let mut session = GameSession::new(
        mode,
        source,
        questions.iter().map(|question| question.id).collect(),
        host,
        config.gameplay.starting_hearts,
        status,
        time_limit_secs,
        now,
    );
    if status == SessionStatus::Active {
        session.question_shown_at = Some(now);
    }
    session
}

/// Current view of a session. Any authenticated user may look a session up.
pub async fn session_snapshot(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    let store = state.require_game_store().await?;
    let session = load_settled(state, &store, session_id).await?;
    Ok(SessionSnapshot::from(&session))
}

/// Add the caller to a session; joining twice is a no-op.
pub async fn join_session(
    state: &SharedState,
    user_id: UserId,
    session_id: Uuid,
) -> Result<JoinResponse, ServiceError> {
    let hearts = state.config().gameplay.starting_hearts;
    let store = state.require_game_store().await?;
    let sessions = SessionStore::new(store);
    let sessions = &sessions;

    let (session, outcome) = state
        .run_exclusive(session_id, move || async move {
            let (session, outcome) = sessions
                .join_session(session_id, user_id, hearts, timestamp_now())
                .await?;
            if outcome == JoinOutcome::Joined {
                session_events::broadcast_player_joined(state, &session, user_id);
            }
            Ok((session, outcome))
        })
        .await?;

    Ok(JoinResponse::new(
        &session,
        outcome == JoinOutcome::AlreadyJoined,
    ))
}

/// Serve the question at `index` to a participant.
///
/// Only questions up to the current cursor are visible. Fetching the current
/// question for the first time starts its response clock.
pub async fn get_question(
    state: &SharedState,
    user_id: UserId,
    session_id: Uuid,
    index: usize,
) -> Result<QuestionResponse, ServiceError> {
    let countdown = state.config().countdown();
    let store = state.require_game_store().await?;
    let sessions = SessionStore::new(Arc::clone(&store));
    let (sessions, store_ref) = (&sessions, &store);

    let (session, question) = state
        .run_exclusive(session_id, move || async move {
            let mut session = sessions.load(session_id).await?;
            let now = timestamp_now();
            if lobby_service::settle_if_due(&mut session, countdown, now)? {
                sessions.save(&mut session).await?;
                lobby_service::announce_start(state, store_ref, &session).await;
            }

            session.require_player(user_id)?;
            if !matches!(
                session.status,
                SessionStatus::Active | SessionStatus::Finished
            ) {
                return Err(ServiceError::InvalidState(format!(
                    "questions are not available while the session is {}",
                    session.status
                )));
            }

            let len = session.total_questions();
            if index >= len {
                return Err(ServiceError::NotFound(format!(
                    "question {index} does not exist (session has {len} question(s))"
                )));
            }
            if index > session.current_question_index {
                return Err(ServiceError::InvalidInput(format!(
                    "question {index} is not unlocked yet"
                )));
            }

            let question = load_question(store_ref, session.question_ids[index]).await?;

            if session.status == SessionStatus::Active
                && index == session.current_question_index
                && session.question_shown_at.is_none()
            {
                session.question_shown_at = Some(now);
                session.updated_at = now;
                sessions.save(&mut session).await?;
            }
            Ok((session, question))
        })
        .await?;

    Ok(QuestionResponse::new(&session, index, &question))
}

/// Score one answer, update the player and move the session forward.
///
/// Solo and competitive sessions advance as soon as the current question is
/// answered. Collaborative sessions wait until every player answered it.
/// Running out of questions finishes the session.
pub async fn submit_answer(
    state: &SharedState,
    user_id: UserId,
    session_id: Uuid,
    request: SubmitAnswerRequest,
) -> Result<AnswerResultResponse, ServiceError> {
    let config = state.config();
    let countdown = config.countdown();
    let formula = config.gameplay.scoring;
    let store = state.require_game_store().await?;
    let sessions = SessionStore::new(Arc::clone(&store));
    let (sessions, store_ref) = (&sessions, &store);

    state
        .run_exclusive(session_id, move || async move {
            let mut session = sessions.load(session_id).await?;
            let now = timestamp_now();
            if lobby_service::settle_if_due(&mut session, countdown, now)? {
                sessions.save(&mut session).await?;
                lobby_service::announce_start(state, store_ref, &session).await;
            }

            session.require_player(user_id)?;
            if session.status != SessionStatus::Active {
                return Err(ServiceError::InvalidState(format!(
                    "answers are only accepted while the session is active (session is {})",
                    session.status
                )));
            }

            let position = session
                .question_ids
                .iter()
                .position(|id| *id == request.question_id)
                .ok_or_else(|| {
                    ServiceError::InvalidInput(format!(
                        "question `{}` is not part of this session",
                        request.question_id
                    ))
                })?;
            if position > session.current_question_index {
                return Err(ServiceError::InvalidInput(format!(
                    "question `{}` is not unlocked yet",
                    request.question_id
                )));
            }

            let mut answers = sessions.answers(session_id).await?;
            if answers
                .iter()
                .any(|answer| answer.user_id == user_id && answer.question_id == request.question_id)
            {
                return Err(ServiceError::InvalidState(format!(
                    "question `{}` was already answered",
                    request.question_id
                )));
            }

            let question = load_question(store_ref, request.question_id).await?;
            let picked = question.answer(request.answer_id).ok_or_else(|| {
                ServiceError::InvalidInput(format!(
                    "answer `{}` does not belong to question `{}`",
                    request.answer_id, request.question_id
                ))
            })?;
            let is_correct = picked.is_correct;

            let is_current = position == session.current_question_index;
            let response_time_ms = clamp_response_time(
                request
                    .answered_at
                    .saturating_sub(epoch_millis(clock_origin(&session, is_current))),
            );

            let mode = session.mode;
            let player = session.require_player_mut(user_id)?;
            if player.hearts_left == 0 {
                return Err(SessionError::NoHeartsLeft.into());
            }
            let score = score_answer(formula, mode, is_correct, response_time_ms, player.hearts_left);
            player.score = player.score.saturating_add(score.points);
            player.hearts_left = score.hearts_left;
            let (player_score, player_hearts) = (player.score, player.hearts_left);

            let answer = PlayerAnswer {
                id: Uuid::new_v4(),
                session_id,
                user_id,
                question_id: question.id,
                selected_answer_id: request.answer_id,
                is_correct,
                points_awarded: score.points,
                answer_time_ms: response_time_ms,
                answered_at: now,
            };
            answers.push(answer.clone());

            let advance = is_current
                && (!mode.defers_advance()
                    || all_players_answered(&session, &answers, question.id));
            if advance {
                session.advance_question(session.current_question_index + 1, now)?;
                if session.is_exhausted() {
                    session.apply(SessionEvent::Finish(FinishReason::QuestionsExhausted), now)?;
                } else {
                    session.question_shown_at = Some(now);
                }
            }
            session.updated_at = now;
            sessions.save_with_answer(&mut session, answer).await?;

            let finished = session.status == SessionStatus::Finished;
            let next_question = match session.current_question_id() {
                Some(next_id) if advance && !finished => {
                    Some(load_question(store_ref, next_id).await?)
                }
                _ => None,
            };
            let report = finished.then(|| build_report(&session, &answers));

            let result = AnswerResultResponse {
                user_id,
                question_id: question.id,
                is_correct,
                correct_answer_id: question.correct_answer().map(|correct| correct.id),
                points_earned: score.points,
                response_time_ms,
                player_score,
                player_hearts,
                explanation: question.explanation.clone(),
                current_question_index: session.current_question_index,
                session_finished: finished,
            };

            info!(
                session_id = %session_id,
                user_id = %user_id,
                correct = is_correct,
                points = score.points,
                cursor = session.current_question_index,
                "answer recorded"
            );

            // Still under the gate: events leave in commit order.
            session_events::broadcast_answer_result(state, &session, result.clone());
            if let Some(question) = next_question.as_ref() {
                session_events::broadcast_question(state, &session, question);
            }
            if let Some(report) = report.as_ref() {
                info!(session_id = %session_id, "questions exhausted; session finished");
                session_events::broadcast_session_complete(state, &session, report);
            }

            Ok(result)
        })
        .await
}

/// Finish a session (if still active) and return the caller's summary.
///
/// Completing an already finished session returns the same summary again
/// and does not re-broadcast it.
pub async fn complete_session(
    state: &SharedState,
    user_id: UserId,
    session_id: Uuid,
) -> Result<CompletionResponse, ServiceError> {
    let countdown = state.config().countdown();
    let store = state.require_game_store().await?;
    let sessions = SessionStore::new(Arc::clone(&store));
    let (sessions, store_ref) = (&sessions, &store);

    let report = state
        .run_exclusive(session_id, move || async move {
            let mut session = sessions.load(session_id).await?;
            let now = timestamp_now();
            if lobby_service::settle_if_due(&mut session, countdown, now)? {
                sessions.save(&mut session).await?;
                lobby_service::announce_start(state, store_ref, &session).await;
            }
            session.require_player(user_id)?;

            let newly_finished = session.status != SessionStatus::Finished;
            if newly_finished {
                session.apply(SessionEvent::Finish(FinishReason::Completed), now)?;
                sessions.save(&mut session).await?;
            }

            let answers = sessions.answers(session_id).await?;
            let report = build_report(&session, &answers);
            if newly_finished {
                info!(session_id = %session_id, user_id = %user_id, "session completed");
                session_events::broadcast_session_complete(state, &session, &report);
            }
            Ok(report)
        })
        .await?;

    CompletionResponse::for_player(&report, user_id).ok_or_else(|| {
        warn!(session_id = %session_id, user_id = %user_id, "participant missing from report");
        ServiceError::Internal("participant missing from report".into())
    })
}

/// Load a session, activating it first if its lobby countdown already ran out.
async fn load_settled(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
    session_id: Uuid,
) -> Result<GameSession, ServiceError> {
    let countdown: Duration = state.config().countdown();
    let sessions = SessionStore::new(Arc::clone(store));
    let sessions = &sessions;

    state
        .run_exclusive(session_id, move || async move {
            let mut session = sessions.load(session_id).await?;
            if lobby_service::settle_if_due(&mut session, countdown, timestamp_now())? {
                sessions.save(&mut session).await?;
                lobby_service::announce_start(state, store, &session).await;
            }
            Ok(session)
        })
        .await
}

async fn load_question(
    store: &Arc<dyn GameStore>,
    question_id: Uuid,
) -> Result<QuestionEntity, ServiceError> {
    store
        .find_questions(vec![question_id])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::NotFound(format!("question `{question_id}` not found")))
}

/// Reference point of the response clock.
///
/// The current question is timed from when it was first shown. A question the
/// cursor already moved past is timed from the session start.
fn clock_origin(session: &GameSession, is_current: bool) -> SystemTime {
    let shown = if is_current {
        session.question_shown_at
    } else {
        None
    };
    shown
        .or(session.started_at)
        .unwrap_or(session.created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LobbyConfig;

    #[test]
    fn solo_skips_the_lobby_unless_configured() {
        let mut config = AppConfig::default();
        assert_eq!(initial_status(&config, GameMode::Solo), SessionStatus::Active);
        assert_eq!(
            initial_status(&config, GameMode::Competitive),
            SessionStatus::Waiting
        );

        config.lobby.solo_lobby = true;
        assert_eq!(initial_status(&config, GameMode::Solo), SessionStatus::Waiting);

        config.lobby = LobbyConfig {
            enabled: false,
            ..LobbyConfig::default()
        };
        assert_eq!(
            initial_status(&config, GameMode::Collaborative),
            SessionStatus::Active
        );
    }

    #[test]
    fn past_questions_are_timed_from_session_start() {
        let created = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let mut session = GameSession::new(
            GameMode::Competitive,
            SessionSource::Quiz {
                quiz_id: Uuid::new_v4(),
            },
            vec![Uuid::new_v4(), Uuid::new_v4()],
            Uuid::new_v4(),
            3,
            SessionStatus::Active,
            None,
            created,
        );
        let shown = created + Duration::from_secs(30);
        session.question_shown_at = Some(shown);

        assert_eq!(clock_origin(&session, true), shown);
        assert_eq!(clock_origin(&session, false), created);
    }
}
