use std::collections::HashMap;

use crate::{config::AuthConfig, state::game::UserId};

/// Resolves bearer tokens to user identities.
///
/// Token issuance lives outside this service; the game engine only needs to
/// know who is behind a request.
pub trait IdentityProvider: Send + Sync {
    /// The user behind `token`, if the token is valid.
    fn authenticate(&self, token: &str) -> Option<UserId>;
}

/// Identity provider backed by a fixed token table from the configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenProvider {
    /// Build the provider from the `auth` configuration section.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            tokens: config
                .tokens
                .iter()
                .map(|entry| (entry.token.clone(), entry.user_id))
                .collect(),
        }
    }

    /// Add a token, replacing any previous mapping.
    pub fn with_token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

impl IdentityProvider for StaticTokenProvider {
    fn authenticate(&self, token: &str) -> Option<UserId> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        self.tokens.get(token).copied()
    }
}
