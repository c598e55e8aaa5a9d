mod common;

use std::{sync::Arc, time::Duration};

use axum::extract::ws::Message;
use quiz_arena_back::{
    config::AppConfig,
    dto::game::{StartQuizRequest, StartTopicRequest, SubmitAnswerRequest},
    error::ServiceError,
    services::{game_service, lobby_service, session_store::SessionStore},
    state::{
        SharedState,
        completion::Outcome,
        game::{GameMode, SessionStatus},
        state_machine::SessionEvent,
    },
};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use common::{Fixture, fixture, lobby_disabled, quick_countdown};

async fn start(f: &Fixture, host: Uuid, mode: GameMode) -> Uuid {
    game_service::start_quiz_session(&f.state, host, f.quiz_id, StartQuizRequest { mode })
        .await
        .unwrap()
        .session_id
}

/// Fetch the question at `index` and answer it `latency_ms` after it was shown.
async fn answer(
    f: &Fixture,
    user: Uuid,
    session_id: Uuid,
    index: usize,
    correct: bool,
    latency_ms: i64,
) -> Result<quiz_arena_back::dto::game::AnswerResultResponse, ServiceError> {
    let question = game_service::get_question(&f.state, user, session_id, index).await?;
    let shown = question.show_timestamp.unwrap_or_default();
    let answer_id = if correct {
        f.correct_answer(index)
    } else {
        f.wrong_answer(index)
    };
    game_service::submit_answer(
        &f.state,
        user,
        session_id,
        SubmitAnswerRequest {
            question_id: question.question_id,
            answer_id,
            answered_at: shown + latency_ms,
        },
    )
    .await
}

fn drain_events(outbound: &mut mpsc::Receiver<Message>) -> Vec<String> {
    let mut events = Vec::new();
    while let Ok(message) = outbound.try_recv() {
        if let Message::Text(text) = message {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            events.push(value["event"].as_str().unwrap().to_owned());
        }
    }
    events
}

fn drain_payloads(outbound: &mut mpsc::Receiver<Message>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(message) = outbound.try_recv() {
        if let Message::Text(text) = message {
            events.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    events
}

fn sessions(f: &Fixture) -> SessionStore {
    SessionStore::new(Arc::new(f.store.clone()))
}

#[tokio::test]
async fn solo_answers_are_scored_by_latency_and_cost_hearts() {
    let f = fixture(AppConfig::default(), 5).await;
    let player = Uuid::new_v4();
    let session_id = start(&f, player, GameMode::Solo).await;

    let first = answer(&f, player, session_id, 0, true, 2_000).await.unwrap();
    assert!(first.is_correct);
    assert_eq!(first.points_earned, 100);
    assert_eq!(first.response_time_ms, 2_000);
    assert_eq!(first.player_hearts, 3);
    assert_eq!(first.correct_answer_id, Some(f.correct_answer(0)));
    assert_eq!(first.explanation.as_deref(), Some("explanation 0"));
    assert_eq!(first.current_question_index, 1);

    let second = answer(&f, player, session_id, 1, false, 1_000).await.unwrap();
    assert!(!second.is_correct);
    assert_eq!(second.points_earned, 0);
    assert_eq!(second.player_hearts, 2);
    assert_eq!(second.player_score, 100);

    let third = answer(&f, player, session_id, 2, true, 4_500).await.unwrap();
    assert_eq!(third.points_earned, 50);
    assert_eq!(third.player_score, 150);
}

#[tokio::test]
async fn collaborative_answers_keep_hearts_and_wait_for_both_players() {
    let f = fixture(lobby_disabled(), 5).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let session_id = start(&f, host, GameMode::Collaborative).await;
    game_service::join_session(&f.state, guest, session_id)
        .await
        .unwrap();

    let host_result = answer(&f, host, session_id, 0, false, 1_000).await.unwrap();
    assert_eq!(host_result.player_hearts, 3);
    assert_eq!(host_result.current_question_index, 0);

    let guest_result = answer(&f, guest, session_id, 0, true, 1_000).await.unwrap();
    assert_eq!(guest_result.points_earned, 100);
    assert_eq!(guest_result.current_question_index, 1);
}

#[tokio::test]
async fn losing_every_heart_fails_the_run() {
    let f = fixture(AppConfig::default(), 5).await;
    let player = Uuid::new_v4();
    let session_id = start(&f, player, GameMode::Solo).await;

    for index in 0..3 {
        answer(&f, player, session_id, index, false, 500)
            .await
            .unwrap();
    }

    let exhausted = answer(&f, player, session_id, 3, true, 500).await;
    assert!(matches!(exhausted, Err(ServiceError::InvalidState(_))));

    let summary = game_service::complete_session(&f.state, player, session_id)
        .await
        .unwrap();
    assert_eq!(summary.result, Outcome::Fail);
    assert_eq!(summary.hearts_remaining, 0);
    assert_eq!(summary.questions_answered, 3);
    assert_eq!(summary.correct_answers, 0);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["result"], "fail");
    assert_eq!(json["heartsRemaining"], 0);
}

#[tokio::test]
async fn completing_twice_returns_the_same_summary_and_broadcasts_once() {
    let f = fixture(AppConfig::default(), 3).await;
    let player = Uuid::new_v4();
    let session_id = start(&f, player, GameMode::Solo).await;
    let mut connection = f.state.hub().register(session_id, player);

    answer(&f, player, session_id, 0, true, 100).await.unwrap();

    let first = game_service::complete_session(&f.state, player, session_id)
        .await
        .unwrap();
    let ended_at = sessions(&f).load(session_id).await.unwrap().ended_at;
    assert!(ended_at.is_some());

    let second = game_service::complete_session(&f.state, player, session_id)
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(sessions(&f).load(session_id).await.unwrap().ended_at, ended_at);
    assert_eq!(first.result, Outcome::Win);

    let events = drain_events(&mut connection.outbound);
    assert_eq!(
        events.iter().filter(|event| *event == "session-complete").count(),
        1
    );
}

#[tokio::test]
async fn joining_respects_mode_capacity() {
    let f = fixture(AppConfig::default(), 3).await;

    let solo = start(&f, Uuid::new_v4(), GameMode::Solo).await;
    let full = game_service::join_session(&f.state, Uuid::new_v4(), solo).await;
    match full {
        Err(ServiceError::CapacityExceeded(detail)) => assert!(detail.contains("bereits voll")),
        other => panic!("expected capacity error, got {other:?}"),
    }

    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let duel = start(&f, host, GameMode::Competitive).await;
    let joined = game_service::join_session(&f.state, guest, duel).await.unwrap();
    assert!(!joined.already_joined);
    assert_eq!(joined.players.len(), 2);
    assert!(joined.players[0].is_host);

    let again = game_service::join_session(&f.state, guest, duel).await.unwrap();
    assert!(again.already_joined);

    assert!(matches!(
        game_service::join_session(&f.state, Uuid::new_v4(), duel).await,
        Err(ServiceError::CapacityExceeded(_))
    ));
}

#[tokio::test]
async fn everyone_ready_counts_down_into_an_active_session() {
    let f = fixture(quick_countdown(50), 3).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let session_id = start(&f, host, GameMode::Competitive).await;
    game_service::join_session(&f.state, guest, session_id)
        .await
        .unwrap();
    let mut connection = f.state.hub().register(session_id, host);

    let host_ready = lobby_service::toggle_ready(&f.state, host, session_id)
        .await
        .unwrap();
    assert!(host_ready.ready);
    assert_eq!(host_ready.status, SessionStatus::Waiting);

    let guest_ready = lobby_service::toggle_ready(&f.state, guest, session_id)
        .await
        .unwrap();
    assert_eq!(guest_ready.status, SessionStatus::Countdown);

    let counting = sessions(&f).load(session_id).await.unwrap();
    assert!(counting.countdown_started_at.is_some());
    assert!(counting.started_at.is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;

    let active = sessions(&f).load(session_id).await.unwrap();
    assert_eq!(active.status, SessionStatus::Active);
    assert!(active.started_at.is_some());
    assert!(active.countdown_started_at.is_none());
    assert!(active.question_shown_at.is_some());

    let events = drain_events(&mut connection.outbound);
    assert!(events.contains(&"lobby-update".to_owned()));
    assert!(events.contains(&"session-start".to_owned()));
    assert!(events.contains(&"question".to_owned()));
}

#[tokio::test]
async fn host_pause_cancels_the_countdown() {
    let f = fixture(quick_countdown(200), 3).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let session_id = start(&f, host, GameMode::Competitive).await;
    game_service::join_session(&f.state, guest, session_id)
        .await
        .unwrap();

    lobby_service::toggle_ready(&f.state, host, session_id)
        .await
        .unwrap();
    lobby_service::toggle_ready(&f.state, guest, session_id)
        .await
        .unwrap();

    assert!(matches!(
        lobby_service::pause_session(&f.state, guest, session_id).await,
        Err(ServiceError::Forbidden(_))
    ));

    let paused = lobby_service::pause_session(&f.state, host, session_id)
        .await
        .unwrap();
    assert_eq!(paused.status, SessionStatus::Waiting);

    tokio::time::sleep(Duration::from_millis(400)).await;

    let session = sessions(&f).load(session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Waiting);
    assert!(session.players.iter().all(|player| !player.ready));
    assert!(session.countdown_started_at.is_none());
}

#[tokio::test]
async fn paused_game_resumes_into_the_lobby() {
    let mut config = quick_countdown(10);
    config.lobby.solo_lobby = true;
    let f = fixture(config, 3).await;
    let host = Uuid::new_v4();
    let session_id = start(&f, host, GameMode::Solo).await;

    assert!(matches!(
        lobby_service::resume_session(&f.state, host, session_id).await,
        Err(ServiceError::InvalidState(_))
    ));

    lobby_service::toggle_ready(&f.state, host, session_id)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        sessions(&f).load(session_id).await.unwrap().status,
        SessionStatus::Active
    );

    let paused = lobby_service::pause_session(&f.state, host, session_id)
        .await
        .unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);
    assert!(matches!(
        game_service::complete_session(&f.state, host, session_id).await,
        Err(ServiceError::InvalidState(_))
    ));

    let resumed = lobby_service::resume_session(&f.state, host, session_id)
        .await
        .unwrap();
    assert_eq!(resumed.status, SessionStatus::Waiting);
}

#[tokio::test]
async fn ready_requires_an_enabled_lobby_and_a_waiting_session() {
    let disabled = fixture(lobby_disabled(), 3).await;
    let host = Uuid::new_v4();
    let session_id = start(&disabled, host, GameMode::Competitive).await;
    assert!(matches!(
        lobby_service::toggle_ready(&disabled.state, host, session_id).await,
        Err(ServiceError::NotImplemented(_))
    ));

    let enabled = fixture(AppConfig::default(), 3).await;
    let player = Uuid::new_v4();
    let active = start(&enabled, player, GameMode::Solo).await;
    assert!(matches!(
        lobby_service::toggle_ready(&enabled.state, player, active).await,
        Err(ServiceError::InvalidState(_))
    ));
}

#[tokio::test]
async fn question_cursor_stays_within_bounds() {
    let f = fixture(AppConfig::default(), 3).await;
    let player = Uuid::new_v4();
    let session_id = start(&f, player, GameMode::Solo).await;

    assert!(matches!(
        game_service::get_question(&f.state, player, session_id, 2).await,
        Err(ServiceError::InvalidInput(_))
    ));
    assert!(matches!(
        game_service::get_question(&f.state, player, session_id, 3).await,
        Err(ServiceError::NotFound(_))
    ));

    for index in 0..3 {
        let result = answer(&f, player, session_id, index, true, 100).await.unwrap();
        assert_eq!(result.session_finished, index == 2);
    }

    let session = sessions(&f).load(session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Finished);
    assert_eq!(session.current_question_index, 3);
    assert_eq!(session.question_ids.len(), 3);

    let replay = game_service::get_question(&f.state, player, session_id, 2)
        .await
        .unwrap();
    assert_eq!(replay.question_number, 3);
    assert!(replay.show_timestamp.is_none());

    let late = game_service::submit_answer(
        &f.state,
        player,
        session_id,
        SubmitAnswerRequest {
            question_id: f.questions[0].id,
            answer_id: f.correct_answer(0),
            answered_at: 0,
        },
    )
    .await;
    assert!(matches!(late, Err(ServiceError::InvalidState(_))));
}

#[tokio::test]
async fn malformed_answers_are_rejected() {
    let f = fixture(AppConfig::default(), 3).await;
    let player = Uuid::new_v4();
    let session_id = start(&f, player, GameMode::Solo).await;

    let foreign_option = game_service::submit_answer(
        &f.state,
        player,
        session_id,
        SubmitAnswerRequest {
            question_id: f.questions[0].id,
            answer_id: f.correct_answer(1),
            answered_at: 0,
        },
    )
    .await;
    assert!(matches!(foreign_option, Err(ServiceError::InvalidInput(_))));

    let foreign_question = game_service::submit_answer(
        &f.state,
        player,
        session_id,
        SubmitAnswerRequest {
            question_id: Uuid::new_v4(),
            answer_id: f.correct_answer(0),
            answered_at: 0,
        },
    )
    .await;
    assert!(matches!(foreign_question, Err(ServiceError::InvalidInput(_))));

    let stranger = answer(&f, Uuid::new_v4(), session_id, 0, true, 100).await;
    assert!(matches!(stranger, Err(ServiceError::Forbidden(_))));

    answer(&f, player, session_id, 0, true, 100).await.unwrap();
    let duplicate = game_service::submit_answer(
        &f.state,
        player,
        session_id,
        SubmitAnswerRequest {
            question_id: f.questions[0].id,
            answer_id: f.correct_answer(0),
            answered_at: 0,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(ServiceError::InvalidState(_))));
}

#[tokio::test]
async fn topic_sessions_sample_within_the_difficulty_range() {
    let f = fixture(AppConfig::default(), 5).await;
    let player = Uuid::new_v4();

    let sampled = game_service::start_topic_session(
        &f.state,
        player,
        f.topic_id,
        StartTopicRequest {
            mode: GameMode::Solo,
            question_count: Some(3),
            difficulty_min: None,
            difficulty_max: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(sampled.total_questions, 3);
    assert_eq!(sampled.topic_id, Some(f.topic_id));
    assert!(sampled.quiz_id.is_none());

    let hardest = game_service::start_topic_session(
        &f.state,
        player,
        f.topic_id,
        StartTopicRequest {
            mode: GameMode::Solo,
            question_count: Some(10),
            difficulty_min: Some(5),
            difficulty_max: Some(5),
        },
    )
    .await
    .unwrap();
    assert_eq!(hardest.total_questions, 1);

    let unknown = game_service::start_topic_session(
        &f.state,
        player,
        Uuid::new_v4(),
        StartTopicRequest {
            mode: GameMode::Solo,
            question_count: None,
            difficulty_min: None,
            difficulty_max: None,
        },
    )
    .await;
    assert!(matches!(unknown, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn answers_and_joins_are_broadcast_to_live_connections() {
    let f = fixture(lobby_disabled(), 3).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let session_id = start(&f, host, GameMode::Competitive).await;
    let mut connection = f.state.hub().register(session_id, host);

    game_service::join_session(&f.state, guest, session_id)
        .await
        .unwrap();
    answer(&f, host, session_id, 0, true, 100).await.unwrap();

    assert_eq!(
        drain_events(&mut connection.outbound),
        vec!["player-joined", "answer-result", "question"]
    );
}

#[tokio::test]
async fn degraded_state_rejects_requests() {
    let f = fixture(AppConfig::default(), 3).await;
    f.state.clear_game_store().await;

    let result = game_service::start_quiz_session(
        &f.state,
        Uuid::new_v4(),
        f.quiz_id,
        StartQuizRequest {
            mode: GameMode::Solo,
        },
    )
    .await;
    assert!(matches!(result, Err(ServiceError::Degraded)));
}

/// Answer every question of the session in order, waiting for each to unlock.
async fn race_through(state: SharedState, plan: Vec<(Uuid, Uuid)>, user: Uuid, session_id: Uuid) {
    for (index, (_, correct_answer)) in plan.iter().enumerate() {
        let question = loop {
            match game_service::get_question(&state, user, session_id, index).await {
                Ok(question) => break question,
                Err(ServiceError::InvalidInput(_)) => tokio::task::yield_now().await,
                Err(err) => panic!("unexpected error fetching question {index}: {err}"),
            }
        };
        // The slower player may find the session already finished.
        let _ = game_service::submit_answer(
            &state,
            user,
            session_id,
            SubmitAnswerRequest {
                question_id: question.question_id,
                answer_id: *correct_answer,
                answered_at: question.show_timestamp.unwrap_or_default() + 500,
            },
        )
        .await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_answers_are_broadcast_in_commit_order() {
    let mut config = lobby_disabled();
    config.realtime.outbound_buffer = 10_000;
    let question_count = 60;
    let f = fixture(config, question_count).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let session_id = start(&f, host, GameMode::Competitive).await;
    game_service::join_session(&f.state, guest, session_id)
        .await
        .unwrap();
    let mut connection = f.state.hub().register(session_id, host);

    let plan: Vec<(Uuid, Uuid)> = (0..question_count)
        .map(|index| (f.questions[index].id, f.correct_answer(index)))
        .collect();
    let racers: Vec<_> = [host, guest]
        .into_iter()
        .map(|user| {
            tokio::spawn(race_through(
                Arc::clone(&f.state),
                plan.clone(),
                user,
                session_id,
            ))
        })
        .collect();
    for racer in racers {
        racer.await.unwrap();
    }

    let events = drain_payloads(&mut connection.outbound);
    let question_numbers: Vec<u64> = events
        .iter()
        .filter(|event| event["event"] == "question")
        .map(|event| event["payload"]["questionNumber"].as_u64().unwrap())
        .collect();
    let expected: Vec<u64> = (2..=question_count as u64).collect();
    assert_eq!(question_numbers, expected);

    let cursors: Vec<u64> = events
        .iter()
        .filter(|event| event["event"] == "answer-result")
        .map(|event| event["payload"]["currentQuestionIndex"].as_u64().unwrap())
        .collect();
    assert!(cursors.windows(2).all(|pair| pair[0] <= pair[1]));

    assert_eq!(events.last().unwrap()["event"], "session-complete");
    let finished = sessions(&f).load(session_id).await.unwrap();
    assert_eq!(finished.status, SessionStatus::Finished);
    assert_eq!(finished.current_question_index, question_count);
}

#[tokio::test]
async fn overdue_countdown_is_announced_when_an_answer_settles_it() {
    let f = fixture(quick_countdown(20), 3).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let session_id = start(&f, host, GameMode::Competitive).await;
    game_service::join_session(&f.state, guest, session_id)
        .await
        .unwrap();

    // Put the session into an overdue countdown without a live timer.
    let store = sessions(&f);
    let mut session = store.load(session_id).await.unwrap();
    for player in &mut session.players {
        player.ready = true;
    }
    let started = std::time::SystemTime::now() - Duration::from_secs(60);
    session
        .apply(SessionEvent::AllReady, started)
        .unwrap();
    store.save(&mut session).await.unwrap();

    let mut connection = f.state.hub().register(session_id, host);
    let result = game_service::submit_answer(
        &f.state,
        host,
        session_id,
        SubmitAnswerRequest {
            question_id: f.questions[0].id,
            answer_id: f.correct_answer(0),
            answered_at: 0,
        },
    )
    .await
    .unwrap();
    assert!(result.is_correct);

    assert_eq!(
        drain_events(&mut connection.outbound),
        vec!["session-start", "question", "answer-result", "question"]
    );
}
