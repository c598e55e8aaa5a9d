pub mod completion;
pub mod game;
pub mod hub;
pub mod scoring;
pub mod state_machine;

use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::AppConfig, dao::game_store::GameStore, error::ServiceError,
    services::auth::IdentityProvider,
};

use self::hub::BroadcastHub;

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Central application state: configuration, storage handle, identity provider
/// and the realtime connection registry.
pub struct AppState {
    config: Arc<AppConfig>,
    identity: Arc<dyn IdentityProvider>,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    hub: BroadcastHub,
    session_gates: DashMap<Uuid, Arc<Mutex<()>>>,
    degraded: watch::Sender<bool>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, identity: Arc<dyn IdentityProvider>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let hub = BroadcastHub::new(config.realtime.outbound_buffer);
        Arc::new(Self {
            config: Arc::new(config),
            identity,
            game_store: RwLock::new(None),
            hub,
            session_gates: DashMap::new(),
            degraded: degraded_tx,
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// Token-to-user resolver.
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    /// Registry of live realtime connections.
    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current game store, or [`ServiceError::Degraded`] when none is usable.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn install_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let flagged = *self.degraded.borrow();
        flagged || self.game_store.read().await.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Run `work` while holding the session's mutation gate.
    ///
    /// Every read-modify-write of a session goes through here so that
    /// concurrent events for the same session are applied one at a time.
    /// Different sessions never wait on each other. The timeout only bounds
    /// the wait for the gate; once `work` starts it runs to completion so a
    /// storage write is never abandoned halfway.
    pub async fn run_exclusive<F, Fut, T>(
        &self,
        session_id: Uuid,
        work: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = Arc::clone(self.session_gates.entry(session_id).or_default().value());

        let outcome = {
            let guard = match self.transition_timeout {
                Some(limit) => timeout(limit, gate.lock()).await.ok(),
                None => Some(gate.lock().await),
            };
            match guard {
                Some(_guard) => work().await,
                None => {
                    warn!(session_id = %session_id, "timed out waiting for the session gate");
                    Err(ServiceError::Timeout)
                }
            }
        };

        drop(gate);
        self.session_gates
            .remove_if(&session_id, |_, gate| Arc::strong_count(gate) == 1);

        outcome
    }
}
