use std::{collections::HashSet, time::SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::game::{GameMode, GameSession, PlayerAnswer, UserId};

/// Final classification of a player's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The player finished with at least one heart.
    Win,
    /// The player (or, in collaborative mode, the team) ran out of hearts.
    Fail,
}

/// Per-player line of a session report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerReport {
    /// Player identity.
    pub user_id: UserId,
    /// Final score.
    pub score: u32,
    /// Hearts left at completion.
    pub hearts_remaining: u8,
    /// Win or fail.
    pub outcome: Outcome,
    /// Number of answers submitted by this player.
    pub questions_answered: usize,
    /// Number of correct answers submitted by this player.
    pub correct_answers: usize,
}

/// Aggregated statistics of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Session identifier.
    pub session_id: Uuid,
    /// Answers recorded for the whole session.
    pub questions_answered: usize,
    /// Correct answers recorded for the whole session.
    pub correct_answers: usize,
    /// Whole seconds between activation and completion.
    pub total_time_seconds: u64,
    /// One line per player, in join order.
    pub players: Vec<PlayerReport>,
}

impl SessionReport {
    /// Line for a given player.
    pub fn player(&self, user_id: UserId) -> Option<&PlayerReport> {
        self.players.iter().find(|player| player.user_id == user_id)
    }
}

/// Seconds between `started_at` and `ended_at`, rounded down.
pub fn elapsed_seconds(started_at: Option<SystemTime>, ended_at: Option<SystemTime>) -> u64 {
    match (started_at, ended_at) {
        (Some(start), Some(end)) => end
            .duration_since(start)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0),
        _ => 0,
    }
}

/// Build the report for `session` from its recorded answers.
///
/// This is a pure read: calling it repeatedly on a finished session yields the
/// same report.
pub fn build_report(session: &GameSession, answers: &[PlayerAnswer]) -> SessionReport {
    let team_wiped = session.mode == GameMode::Collaborative
        && session.players.iter().any(|player| player.hearts_left == 0);

    let players = session
        .players
        .iter()
        .map(|player| {
            let own: Vec<&PlayerAnswer> = answers
                .iter()
                .filter(|answer| answer.user_id == player.user_id)
                .collect();
            let outcome = if team_wiped || player.hearts_left == 0 {
                Outcome::Fail
            } else {
                Outcome::Win
            };

            PlayerReport {
                user_id: player.user_id,
                score: player.score,
                hearts_remaining: player.hearts_left,
                outcome,
                questions_answered: own.len(),
                correct_answers: own.iter().filter(|answer| answer.is_correct).count(),
            }
        })
        .collect();

    SessionReport {
        session_id: session.id,
        questions_answered: answers.len(),
        correct_answers: answers.iter().filter(|answer| answer.is_correct).count(),
        total_time_seconds: elapsed_seconds(session.started_at, session.ended_at),
        players,
    }
}

/// Whether every player has an answer recorded for `question_id`.
pub fn all_players_answered(session: &GameSession, answers: &[PlayerAnswer], question_id: Uuid) -> bool {
    let answered: HashSet<UserId> = answers
        .iter()
        .filter(|answer| answer.question_id == question_id)
        .map(|answer| answer.user_id)
        .collect();

    session
        .players
        .iter()
        .all(|player| answered.contains(&player.user_id))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::game::{SessionSource, SessionStatus};

    fn finished_session(mode: GameMode) -> GameSession {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut session = GameSession::new(
            mode,
            SessionSource::Topic {
                topic_id: Uuid::new_v4(),
            },
            vec![Uuid::new_v4(), Uuid::new_v4()],
            Uuid::new_v4(),
            3,
            SessionStatus::Active,
            None,
            start,
        );
        session.status = SessionStatus::Finished;
        session.ended_at = Some(start + Duration::from_millis(42_900));
        session
    }

    fn answer(session: &GameSession, user_id: UserId, question_id: Uuid, is_correct: bool) -> PlayerAnswer {
        PlayerAnswer {
            id: Uuid::new_v4(),
            session_id: session.id,
            user_id,
            question_id,
            selected_answer_id: Uuid::new_v4(),
            is_correct,
            points_awarded: if is_correct { 100 } else { 0 },
            answer_time_ms: 1_000,
            answered_at: SystemTime::now(),
        }
    }

    #[test]
    fn aggregates_counts_and_floors_elapsed_time() {
        let session = finished_session(GameMode::Solo);
        let player = session.host().unwrap();
        let answers = vec![
            answer(&session, player, session.question_ids[0], true),
            answer(&session, player, session.question_ids[1], false),
        ];

        let report = build_report(&session, &answers);
        assert_eq!(report.questions_answered, 2);
        assert_eq!(report.correct_answers, 1);
        assert_eq!(report.total_time_seconds, 42);
        assert_eq!(report.player(player).unwrap().outcome, Outcome::Win);
    }

    #[test]
    fn zero_hearts_is_a_fail() {
        let mut session = finished_session(GameMode::Solo);
        session.players[0].hearts_left = 0;
        let report = build_report(&session, &[]);
        assert_eq!(report.players[0].outcome, Outcome::Fail);
        assert_eq!(report.players[0].hearts_remaining, 0);
    }

    #[test]
    fn competitive_outcomes_are_independent() {
        let mut session = finished_session(GameMode::Competitive);
        let guest = Uuid::new_v4();
        session.players.push(crate::state::game::SessionPlayer::new(
            guest,
            0,
            SystemTime::now(),
        ));

        let report = build_report(&session, &[]);
        assert_eq!(report.players[0].outcome, Outcome::Win);
        assert_eq!(report.player(guest).unwrap().outcome, Outcome::Fail);
    }

    #[test]
    fn collaborative_team_shares_fate() {
        let mut session = finished_session(GameMode::Collaborative);
        session.players.push(crate::state::game::SessionPlayer::new(
            Uuid::new_v4(),
            0,
            SystemTime::now(),
        ));

        let report = build_report(&session, &[]);
        assert!(
            report
                .players
                .iter()
                .all(|player| player.outcome == Outcome::Fail)
        );
    }

    #[test]
    fn missing_start_reports_zero_seconds() {
        assert_eq!(elapsed_seconds(None, Some(SystemTime::now())), 0);
    }

    #[test]
    fn deferred_advance_waits_for_everyone() {
        let mut session = finished_session(GameMode::Collaborative);
        let host = session.host().unwrap();
        let guest = Uuid::new_v4();
        session.players.push(crate::state::game::SessionPlayer::new(
            guest,
            3,
            SystemTime::now(),
        ));
        let question = session.question_ids[0];

        let mut answers = vec![answer(&session, host, question, true)];
        assert!(!all_players_answered(&session, &answers, question));
        answers.push(answer(&session, guest, question, false));
        assert!(all_players_answered(&session, &answers, question));
    }
}
