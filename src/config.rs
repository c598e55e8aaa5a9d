//! Application-level configuration loading: lobby, realtime, gameplay and static auth settings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::scoring::ScoringFormula;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ARENA_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Lobby ready-up flow.
    pub lobby: LobbyConfig,
    /// WebSocket fan-out tuning.
    pub realtime: RealtimeConfig,
    /// Hearts, question counts and scoring.
    pub gameplay: GameplayConfig,
    /// Built-in bearer tokens.
    pub auth: AuthConfig,
    /// Optional question bank seed for the in-memory store.
    pub seed_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Lobby settings.
pub struct LobbyConfig {
    /// When disabled every session starts active and ready/pause answer 501.
    pub enabled: bool,
    /// Whether solo sessions also wait in the lobby.
    pub solo_lobby: bool,
    /// Delay between everyone being ready and the first question.
    pub countdown_ms: u64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            solo_lobby: false,
            countdown_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Realtime channel settings.
pub struct RealtimeConfig {
    /// Interval between `server-ping` events on each connection.
    pub keep_alive_secs: u64,
    /// Outbound frames buffered per connection before it is evicted.
    pub outbound_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: 10,
            outbound_buffer: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Gameplay settings.
pub struct GameplayConfig {
    /// Hearts every player starts with.
    pub starting_hearts: u8,
    /// Questions drawn for a topic session when the client does not ask for a count.
    pub default_question_count: usize,
    /// Upper bound on questions drawn for a topic session.
    pub max_question_count: usize,
    /// Latency-to-points formula.
    pub scoring: ScoringFormula,
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            starting_hearts: 3,
            default_question_count: 10,
            max_question_count: 50,
            scoring: ScoringFormula::Tiered,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// Static token table backing the built-in identity provider.
pub struct AuthConfig {
    /// Accepted bearer tokens.
    pub tokens: Vec<StaticToken>,
}

#[derive(Debug, Clone, Deserialize)]
/// One accepted bearer token.
pub struct StaticToken {
    /// Opaque token value.
    pub token: String,
    /// User the token authenticates as.
    pub user_id: Uuid,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        tokens = config.auth.tokens.len(),
                        lobby = config.lobby.enabled,
                        scoring = ?config.gameplay.scoring,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Lobby countdown duration.
    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.lobby.countdown_ms)
    }

    /// Keep-alive interval for realtime connections.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.realtime.keep_alive_secs.max(1))
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
