use thiserror::Error;

use crate::state::game::SessionStatus;

/// Indicates why a session reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// A player asked for the final report.
    Completed,
    /// The last question was answered.
    QuestionsExhausted,
}

/// Events that can be applied to a session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Every lobby player flagged themselves ready.
    AllReady,
    /// The lobby countdown ran to completion.
    CountdownElapsed,
    /// The host stopped the lobby or its countdown.
    PauseCountdown,
    /// The host suspended gameplay.
    Pause,
    /// The host reopened the lobby after a pause.
    Resume,
    /// Gameplay is over.
    Finish(FinishReason),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from}")]
pub struct InvalidTransition {
    /// Status the session was in when the event was received.
    pub from: SessionStatus,
    /// The event that cannot be applied from this status.
    pub event: SessionEvent,
}

/// Compute the status reached by applying `event` from `from`.
///
/// ```text
/// Waiting   --AllReady-------->  Countdown
/// Countdown --CountdownElapsed-> Active
/// Waiting   --PauseCountdown-->  Waiting
/// Countdown --PauseCountdown-->  Waiting
/// Active    --Pause----------->  Paused
/// Paused    --Resume---------->  Waiting
/// Active    --Finish---------->  Finished
/// ```
pub fn next_status(
    from: SessionStatus,
    event: &SessionEvent,
) -> Result<SessionStatus, InvalidTransition> {
    let next = match (from, event) {
        (SessionStatus::Waiting, SessionEvent::AllReady) => SessionStatus::Countdown,
        (SessionStatus::Countdown, SessionEvent::CountdownElapsed) => SessionStatus::Active,
        (SessionStatus::Waiting | SessionStatus::Countdown, SessionEvent::PauseCountdown) => {
            SessionStatus::Waiting
        }
        (SessionStatus::Active, SessionEvent::Pause) => SessionStatus::Paused,
        (SessionStatus::Paused, SessionEvent::Resume) => SessionStatus::Waiting,
        (SessionStatus::Active, SessionEvent::Finish(..)) => SessionStatus::Finished,
        (from, event) => {
            return Err(InvalidTransition {
                from,
                event: event.clone(),
            });
        }
    };

    Ok(next)
}
