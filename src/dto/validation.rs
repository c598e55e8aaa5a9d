//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dao::models::{MAX_DIFFICULTY, MIN_DIFFICULTY};

/// Hard upper bound on the number of questions a client may request.
pub const MAX_REQUESTED_QUESTIONS: usize = 50;

/// Validates that a difficulty lies on the 1-5 scale.
pub fn validate_difficulty(value: u8) -> Result<(), ValidationError> {
    if (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&value) {
        return Ok(());
    }

    let mut err = ValidationError::new("difficulty_range");
    err.message = Some(
        format!("Difficulty must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY} (got {value})")
            .into(),
    );
    Err(err)
}

/// Validates that a requested question count is positive and bounded.
pub fn validate_question_count(value: usize) -> Result<(), ValidationError> {
    if (1..=MAX_REQUESTED_QUESTIONS).contains(&value) {
        return Ok(());
    }

    let mut err = ValidationError::new("question_count_range");
    err.message = Some(
        format!("Question count must be between 1 and {MAX_REQUESTED_QUESTIONS} (got {value})")
            .into(),
    );
    Err(err)
}

/// Validates that the lower difficulty bound does not exceed the upper one.
pub fn validate_difficulty_bounds(min: Option<u8>, max: Option<u8>) -> Result<(), ValidationError> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => {
            let mut err = ValidationError::new("difficulty_bounds");
            err.message = Some(
                format!("difficultyMin ({min}) must not exceed difficultyMax ({max})").into(),
            );
            Err(err)
        }
        _ => Ok(()),
    }
}
