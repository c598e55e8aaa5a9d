use std::{
    fmt,
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::{
        models::{GameSessionEntity, PlayerAnswerEntity, SessionPlayerEntity},
        storage::StorageError,
    },
    state::state_machine::{InvalidTransition, SessionEvent, next_status},
};

/// Identifier of an authenticated user, as resolved by the identity provider.
pub type UserId = Uuid;

/// Current time at millisecond precision, the resolution sessions are stored with.
///
/// Stamping sessions with this keeps a freshly computed value identical to
/// what a later load returns.
pub fn timestamp_now() -> SystemTime {
    truncate_to_millis(SystemTime::now())
}

/// Drop everything below the millisecond from `time`.
pub fn truncate_to_millis(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => {
            UNIX_EPOCH + Duration::new(elapsed.as_secs(), elapsed.subsec_millis() * 1_000_000)
        }
        Err(_) => time,
    }
}

/// Error returned when a persisted enum name matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownName {
    /// Kind of value that failed to parse (e.g. "game mode").
    pub kind: &'static str,
    /// Raw value that was rejected.
    pub value: String,
}

/// How players share a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum GameMode {
    /// One player on their own.
    Solo,
    /// Two players racing independently.
    Competitive,
    /// Two players sharing the same fate.
    Collaborative,
}

impl GameMode {
    /// Every mode, in declaration order.
    pub const ALL: [GameMode; 3] = [
        GameMode::Solo,
        GameMode::Competitive,
        GameMode::Collaborative,
    ];

    /// Persisted names: the canonical name first, then legacy names still accepted on read.
    const fn names(self) -> &'static [&'static str] {
        match self {
            GameMode::Solo => &["solo"],
            GameMode::Competitive => &["comp", "duel", "competitive"],
            GameMode::Collaborative => &["collab", "coop", "collaborative"],
        }
    }

    /// Canonical persisted name.
    pub fn as_str(self) -> &'static str {
        self.names()[0]
    }

    /// Maximum number of players allowed in a session of this mode.
    pub fn capacity(self) -> usize {
        match self {
            GameMode::Solo => 1,
            GameMode::Competitive | GameMode::Collaborative => 2,
        }
    }

    /// Minimum number of players required before the lobby countdown may start.
    pub fn min_players(self) -> usize {
        self.capacity()
    }

    /// Whether a wrong answer costs the answering player a heart.
    pub fn wrong_answer_costs_heart(self) -> bool {
        !matches!(self, GameMode::Collaborative)
    }

    /// Whether question advancement waits for every player to answer.
    pub fn defers_advance(self) -> bool {
        matches!(self, GameMode::Collaborative)
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = UnknownName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| {
                mode.names()
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(value.trim()))
            })
            .ok_or_else(|| UnknownName {
                kind: "game mode",
                value: value.to_owned(),
            })
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum SessionStatus {
    /// Lobby: players join and ready up.
    Waiting,
    /// Everyone is ready; the start timer is running.
    Countdown,
    /// Questions are being played.
    Active,
    /// Gameplay suspended by the host.
    Paused,
    /// Terminal state.
    Finished,
}

impl SessionStatus {
    /// Every status, in declaration order.
    pub const ALL: [SessionStatus; 5] = [
        SessionStatus::Waiting,
        SessionStatus::Countdown,
        SessionStatus::Active,
        SessionStatus::Paused,
        SessionStatus::Finished,
    ];

    const fn names(self) -> &'static [&'static str] {
        match self {
            SessionStatus::Waiting => &["waiting"],
            SessionStatus::Countdown => &["countdown"],
            SessionStatus::Active => &["active", "running"],
            SessionStatus::Paused => &["paused"],
            SessionStatus::Finished => &["finished", "completed"],
        }
    }

    /// Canonical persisted name.
    pub fn as_str(self) -> &'static str {
        self.names()[0]
    }

    /// Whether new players may join in this status.
    pub fn is_joinable(self) -> bool {
        matches!(self, SessionStatus::Waiting | SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| {
                status
                    .names()
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(value.trim()))
            })
            .ok_or_else(|| UnknownName {
                kind: "session status",
                value: value.to_owned(),
            })
    }
}

/// Where the questions of a session come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionSource {
    /// Curated quiz played in its defined order.
    Quiz {
        /// Quiz identifier.
        quiz_id: Uuid,
    },
    /// Random sample drawn from a topic.
    Topic {
        /// Topic identifier.
        topic_id: Uuid,
    },
}

/// Domain errors raised while mutating a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The mode's player cap has been reached.
    #[error("session is full ({capacity} player(s) max)")]
    SessionFull {
        /// Maximum number of players for the mode.
        capacity: usize,
    },
    /// The session does not accept new players in its current status.
    #[error("session cannot be joined while {0}")]
    NotJoinable(SessionStatus),
    /// A question cursor beyond the question list was requested.
    #[error("question index {index} out of range (session has {len} question(s))")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of questions in the session.
        len: usize,
    },
    /// The user has no player row in this session.
    #[error("user `{0}` is not a participant of this session")]
    NotParticipant(UserId),
    /// Only the host may perform this action.
    #[error("only the host may perform this action")]
    NotHost,
    /// The player already lost every heart.
    #[error("no hearts left")]
    NoHeartsLeft,
    /// The lifecycle refused the requested transition.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Whether a join created a new player row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new player row was added.
    Joined,
    /// The user was already a participant; nothing changed.
    AlreadyJoined,
}

/// State of one participant inside a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlayer {
    /// Participant identity.
    pub user_id: UserId,
    /// Remaining lives, never negative.
    pub hearts_left: u8,
    /// Accumulated points, never decreasing.
    pub score: u32,
    /// Lobby ready flag.
    pub ready: bool,
    /// Join timestamp; join order defines the host.
    pub joined_at: SystemTime,
}

impl SessionPlayer {
    /// Fresh player row with full hearts and no points.
    pub fn new(user_id: UserId, hearts: u8, joined_at: SystemTime) -> Self {
        Self {
            user_id,
            hearts_left: hearts,
            score: 0,
            ready: false,
            joined_at,
        }
    }
}

/// Immutable audit record of one submitted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerAnswer {
    /// Record identifier.
    pub id: Uuid,
    /// Session the answer belongs to.
    pub session_id: Uuid,
    /// Player who answered.
    pub user_id: UserId,
    /// Question being answered.
    pub question_id: Uuid,
    /// Answer option picked by the player.
    pub selected_answer_id: Uuid,
    /// Whether the picked option is the correct one.
    pub is_correct: bool,
    /// Points granted by the scoring engine.
    pub points_awarded: u32,
    /// Latency between question display and answer, in milliseconds.
    pub answer_time_ms: u64,
    /// Server receive time.
    pub answered_at: SystemTime,
}

/// One play-through of a quiz or topic sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    /// Session identifier.
    pub id: Uuid,
    /// Player arrangement.
    pub mode: GameMode,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Origin of the question list.
    pub source: SessionSource,
    /// Ordered question list, fixed at creation.
    pub question_ids: Vec<Uuid>,
    /// 0-based cursor into `question_ids`; equals the length once exhausted.
    pub current_question_index: usize,
    /// Participants in join order.
    pub players: Vec<SessionPlayer>,
    /// Per-question time limit shown to clients.
    pub time_limit_secs: Option<u32>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last mutation time.
    pub updated_at: SystemTime,
    /// First activation time.
    pub started_at: Option<SystemTime>,
    /// Completion time.
    pub ended_at: Option<SystemTime>,
    /// Start of the running lobby countdown.
    pub countdown_started_at: Option<SystemTime>,
    /// When the current question was first served.
    pub question_shown_at: Option<SystemTime>,
    /// Optimistic concurrency counter, bumped on every persisted write.
    pub version: u64,
}

impl GameSession {
    /// Build a new session with its creator as first player (and host).
    pub fn new(
        mode: GameMode,
        source: SessionSource,
        question_ids: Vec<Uuid>,
        creator: UserId,
        hearts: u8,
        initial_status: SessionStatus,
        time_limit_secs: Option<u32>,
        now: SystemTime,
    ) -> Self {
        let started_at = (initial_status == SessionStatus::Active).then_some(now);
        Self {
            id: Uuid::new_v4(),
            mode,
            status: initial_status,
            source,
            question_ids,
            current_question_index: 0,
            players: vec![SessionPlayer::new(creator, hearts, now)],
            time_limit_secs,
            created_at: now,
            updated_at: now,
            started_at,
            ended_at: None,
            countdown_started_at: None,
            question_shown_at: None,
            version: 0,
        }
    }

    /// Number of questions in the session.
    pub fn total_questions(&self) -> usize {
        self.question_ids.len()
    }

    /// Identifier of the question under the cursor, if any remain.
    pub fn current_question_id(&self) -> Option<Uuid> {
        self.question_ids.get(self.current_question_index).copied()
    }

    /// Whether the cursor has moved past the last question.
    pub fn is_exhausted(&self) -> bool {
        self.current_question_index >= self.question_ids.len()
    }

    /// The host is the earliest player to join.
    pub fn host(&self) -> Option<UserId> {
        self.players.first().map(|player| player.user_id)
    }

    /// Look up a participant.
    pub fn player(&self, user_id: UserId) -> Option<&SessionPlayer> {
        self.players.iter().find(|player| player.user_id == user_id)
    }

    /// Look up a participant or fail with [`SessionError::NotParticipant`].
    pub fn require_player(&self, user_id: UserId) -> Result<&SessionPlayer, SessionError> {
        self.player(user_id)
            .ok_or(SessionError::NotParticipant(user_id))
    }

    /// Mutable access to a participant or [`SessionError::NotParticipant`].
    pub fn require_player_mut(
        &mut self,
        user_id: UserId,
    ) -> Result<&mut SessionPlayer, SessionError> {
        self.players
            .iter_mut()
            .find(|player| player.user_id == user_id)
            .ok_or(SessionError::NotParticipant(user_id))
    }

    /// Fail with [`SessionError::NotHost`] unless `user_id` is the host.
    pub fn require_host(&self, user_id: UserId) -> Result<(), SessionError> {
        self.require_player(user_id)?;
        if self.host() == Some(user_id) {
            Ok(())
        } else {
            Err(SessionError::NotHost)
        }
    }

    /// Add a player if the mode's capacity and the status allow it.
    ///
    /// Joining twice is not an error: the second call reports
    /// [`JoinOutcome::AlreadyJoined`] and leaves the session untouched.
    pub fn join(
        &mut self,
        user_id: UserId,
        hearts: u8,
        now: SystemTime,
    ) -> Result<JoinOutcome, SessionError> {
        if self.player(user_id).is_some() {
            return Ok(JoinOutcome::AlreadyJoined);
        }
        if !self.status.is_joinable() {
            return Err(SessionError::NotJoinable(self.status));
        }
        let capacity = self.mode.capacity();
        if self.players.len() >= capacity {
            return Err(SessionError::SessionFull { capacity });
        }

        self.players.push(SessionPlayer::new(user_id, hearts, now));
        self.updated_at = now;
        Ok(JoinOutcome::Joined)
    }

    /// Move the question cursor. `new_index == len` marks the list as exhausted.
    pub fn advance_question(&mut self, new_index: usize, now: SystemTime) -> Result<(), SessionError> {
        let len = self.question_ids.len();
        if new_index > len {
            return Err(SessionError::IndexOutOfRange {
                index: new_index,
                len,
            });
        }
        self.current_question_index = new_index;
        self.question_shown_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Whether every joined player is ready and the mode's minimum is met.
    pub fn lobby_complete(&self) -> bool {
        self.players.len() >= self.mode.min_players()
            && self.players.iter().all(|player| player.ready)
    }

    /// Apply a lifecycle event, updating the timestamps it implies.
    pub fn apply(&mut self, event: SessionEvent, now: SystemTime) -> Result<SessionStatus, SessionError> {
        let next = next_status(self.status, &event)?;

        match event {
            SessionEvent::AllReady => {
                self.countdown_started_at = Some(now);
            }
            SessionEvent::CountdownElapsed => {
                self.countdown_started_at = None;
                self.started_at.get_or_insert(now);
            }
            SessionEvent::PauseCountdown | SessionEvent::Pause => {
                self.countdown_started_at = None;
                self.players.iter_mut().for_each(|player| player.ready = false);
            }
            SessionEvent::Resume => {}
            SessionEvent::Finish(_) => {
                self.countdown_started_at = None;
                self.ended_at.get_or_insert(now);
            }
        }

        self.status = next;
        self.updated_at = now;
        Ok(next)
    }
}

impl From<SessionPlayer> for SessionPlayerEntity {
    fn from(value: SessionPlayer) -> Self {
        Self {
            user_id: value.user_id,
            hearts_left: value.hearts_left,
            score: value.score,
            ready: value.ready,
            joined_at: value.joined_at,
        }
    }
}

impl From<SessionPlayerEntity> for SessionPlayer {
    fn from(value: SessionPlayerEntity) -> Self {
        Self {
            user_id: value.user_id,
            hearts_left: value.hearts_left,
            score: value.score,
            ready: value.ready,
            joined_at: value.joined_at,
        }
    }
}

impl From<PlayerAnswer> for PlayerAnswerEntity {
    fn from(value: PlayerAnswer) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: value.user_id,
            question_id: value.question_id,
            selected_answer_id: value.selected_answer_id,
            is_correct: value.is_correct,
            points_awarded: value.points_awarded,
            answer_time_ms: value.answer_time_ms,
            answered_at: value.answered_at,
        }
    }
}

impl From<PlayerAnswerEntity> for PlayerAnswer {
    fn from(value: PlayerAnswerEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: value.user_id,
            question_id: value.question_id,
            selected_answer_id: value.selected_answer_id,
            is_correct: value.is_correct,
            points_awarded: value.points_awarded,
            answer_time_ms: value.answer_time_ms,
            answered_at: value.answered_at,
        }
    }
}

impl From<GameSession> for GameSessionEntity {
    fn from(value: GameSession) -> Self {
        let (quiz_id, topic_id) = match value.source {
            SessionSource::Quiz { quiz_id } => (Some(quiz_id), None),
            SessionSource::Topic { topic_id } => (None, Some(topic_id)),
        };

        Self {
            id: value.id,
            mode: value.mode,
            status: value.status,
            quiz_id,
            topic_id,
            question_ids: value.question_ids,
            current_question_index: value.current_question_index,
            players: value.players.into_iter().map(Into::into).collect(),
            time_limit_secs: value.time_limit_secs,
            created_at: value.created_at,
            updated_at: value.updated_at,
            started_at: value.started_at,
            ended_at: value.ended_at,
            countdown_started_at: value.countdown_started_at,
            question_shown_at: value.question_shown_at,
            version: value.version,
        }
    }
}

impl TryFrom<GameSessionEntity> for GameSession {
    type Error = StorageError;

    fn try_from(value: GameSessionEntity) -> Result<Self, Self::Error> {
        let source = match (value.quiz_id, value.topic_id) {
            (Some(quiz_id), None) => SessionSource::Quiz { quiz_id },
            (None, Some(topic_id)) => SessionSource::Topic { topic_id },
            _ => {
                return Err(StorageError::Corrupt {
                    message: format!(
                        "session `{}` must reference exactly one of quiz or topic",
                        value.id
                    ),
                });
            }
        };

        if value.current_question_index > value.question_ids.len() {
            return Err(StorageError::Corrupt {
                message: format!(
                    "session `{}` cursor {} exceeds {} question(s)",
                    value.id,
                    value.current_question_index,
                    value.question_ids.len()
                ),
            });
        }

        Ok(Self {
            id: value.id,
            mode: value.mode,
            status: value.status,
            source,
            question_ids: value.question_ids,
            current_question_index: value.current_question_index,
            players: value.players.into_iter().map(Into::into).collect(),
            time_limit_secs: value.time_limit_secs,
            created_at: value.created_at,
            updated_at: value.updated_at,
            started_at: value.started_at,
            ended_at: value.ended_at,
            countdown_started_at: value.countdown_started_at,
            question_shown_at: value.question_shown_at,
            version: value.version,
        })
    }
}
