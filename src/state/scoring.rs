use serde::{Deserialize, Serialize};

use crate::state::game::GameMode;

/// Points granted for a correct answer in the fastest tier.
pub const MAX_POINTS: u32 = 100;

/// Formula used to turn answer latency into points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringFormula {
    /// 100 / 50 / 25 points at the 3s and 6s breakpoints.
    #[default]
    Tiered,
    /// 100 points minus one point per 300ms, floored at 0.
    Linear,
}

/// Result of scoring a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerScore {
    /// Points to add to the player's score.
    pub points: u32,
    /// Hearts the player has left after this answer.
    pub hearts_left: u8,
}

impl ScoringFormula {
    /// Points for a correct answer given after `response_time_ms`.
    pub fn points(self, response_time_ms: u64) -> u32 {
        match self {
            ScoringFormula::Tiered => match response_time_ms {
                0..=3_000 => MAX_POINTS,
                3_001..=6_000 => 50,
                _ => 25,
            },
            ScoringFormula::Linear => {
                let decay = (response_time_ms / 300).min(u64::from(MAX_POINTS));
                // decay <= MAX_POINTS so the cast is lossless
                MAX_POINTS - decay as u32
            }
        }
    }
}

/// Clamp a client-relative latency to a non-negative millisecond count.
pub fn clamp_response_time(raw_ms: i64) -> u64 {
    u64::try_from(raw_ms).unwrap_or(0)
}

/// Score one answer and compute the player's hearts afterwards.
///
/// Incorrect answers earn nothing and cost a heart, except in collaborative
/// mode where answers never remove hearts.
pub fn score_answer(
    formula: ScoringFormula,
    mode: GameMode,
    is_correct: bool,
    response_time_ms: u64,
    hearts_left: u8,
) -> AnswerScore {
    if is_correct {
        return AnswerScore {
            points: formula.points(response_time_ms),
            hearts_left,
        };
    }

    let hearts_left = if mode.wrong_answer_costs_heart() {
        hearts_left.saturating_sub(1)
    } else {
        hearts_left
    };

    AnswerScore {
        points: 0,
        hearts_left,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiered_breakpoints() {
        let formula = ScoringFormula::Tiered;
        assert_eq!(formula.points(0), 100);
        assert_eq!(formula.points(2_000), 100);
        assert_eq!(formula.points(3_000), 100);
        assert_eq!(formula.points(3_001), 50);
        assert_eq!(formula.points(6_000), 50);
        assert_eq!(formula.points(6_001), 25);
        assert_eq!(formula.points(120_000), 25);
    }

    #[test]
    fn linear_decays_and_floors_at_zero() {
        let formula = ScoringFormula::Linear;
        assert_eq!(formula.points(0), 100);
        assert_eq!(formula.points(299), 100);
        assert_eq!(formula.points(300), 99);
        assert_eq!(formula.points(15_000), 50);
        assert_eq!(formula.points(30_000), 0);
        assert_eq!(formula.points(u64::MAX), 0);
    }

    #[test]
    fn negative_latency_is_clamped() {
        assert_eq!(clamp_response_time(-250), 0);
        assert_eq!(clamp_response_time(1_500), 1_500);
    }

    #[test]
    fn wrong_answer_costs_a_heart_outside_collaborative() {
        for mode in [GameMode::Solo, GameMode::Competitive] {
            let score = score_answer(ScoringFormula::Tiered, mode, false, 1_000, 3);
            assert_eq!(
                score,
                AnswerScore {
                    points: 0,
                    hearts_left: 2
                }
            );
        }
    }

    #[test]
    fn collaborative_never_loses_hearts_on_answers() {
        let score = score_answer(
            ScoringFormula::Tiered,
            GameMode::Collaborative,
            false,
            1_000,
            3,
        );
        assert_eq!(score.hearts_left, 3);
        assert_eq!(score.points, 0);
    }

    #[test]
    fn hearts_floor_at_zero() {
        let score = score_answer(ScoringFormula::Tiered, GameMode::Solo, false, 0, 0);
        assert_eq!(score.hearts_left, 0);
    }

    #[test]
    fn correct_answer_keeps_hearts() {
        let score = score_answer(ScoringFormula::Tiered, GameMode::Solo, true, 2_000, 1);
        assert_eq!(
            score,
            AnswerScore {
                points: 100,
                hearts_left: 1
            }
        );
    }
}
