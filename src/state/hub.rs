use std::{fmt::Debug, sync::Arc};

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::game::UserId;

/// Identifier assigned to every registered connection.
pub type ConnectionId = Uuid;

/// Routing handle for one live WebSocket connection.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    /// Connection identifier, unique for the process lifetime.
    pub id: ConnectionId,
    /// Session the connection is attached to.
    pub session_id: Uuid,
    /// Authenticated user behind the connection.
    pub user_id: UserId,
    tx: mpsc::Sender<Message>,
    evicted: Arc<Notify>,
}

impl ConnectionHandle {
    /// Resolves once the hub dropped this connection (slow consumer or closed writer).
    pub async fn evicted(&self) {
        self.evicted.notified().await
    }
}

/// Everything a connection task needs after registering with the hub.
pub struct Registration {
    /// Handle used for targeted sends and for disconnecting.
    pub handle: ConnectionHandle,
    /// Outbound queue drained by the connection's writer task.
    pub outbound: mpsc::Receiver<Message>,
}

/// Process-wide registry of live connections, grouped per session.
///
/// Each session maps to its connections in registration order. All sends are
/// non-blocking: a connection whose bounded queue is full or closed is removed
/// and told to shut down, while the remaining recipients still get the event.
pub struct BroadcastHub {
    sessions: DashMap<Uuid, IndexMap<ConnectionId, ConnectionHandle>>,
    buffer: usize,
}

impl BroadcastHub {
    /// Build a hub whose connections buffer at most `buffer` outbound frames.
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Register a connection for `user_id` on `session_id`.
    pub fn register(&self, session_id: Uuid, user_id: UserId) -> Registration {
        let (tx, outbound) = mpsc::channel(self.buffer);
        let handle = ConnectionHandle {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            tx,
            evicted: Arc::new(Notify::new()),
        };

        self.sessions
            .entry(session_id)
            .or_default()
            .insert(handle.id, handle.clone());

        info!(
            session_id = %session_id,
            user_id = %user_id,
            connection_id = %handle.id,
            "connection registered"
        );

        Registration { handle, outbound }
    }

    /// Remove a connection, pruning the session entry once it has no connections left.
    ///
    /// Returns `false` if the connection was already gone.
    pub fn disconnect(&self, handle: &ConnectionHandle) -> bool {
        let removed = match self.sessions.get_mut(&handle.session_id) {
            Some(mut connections) => connections.shift_remove(&handle.id).is_some(),
            None => false,
        };

        if self
            .sessions
            .remove_if(&handle.session_id, |_, connections| connections.is_empty())
            .is_some()
        {
            debug!(session_id = %handle.session_id, "pruned empty session connection set");
        }

        removed
    }

    /// Serialize `event` once and queue it on every connection of `session_id`
    /// except `exclude`. Returns how many connections accepted the frame.
    pub fn broadcast<T>(&self, session_id: Uuid, event: &T, exclude: Option<ConnectionId>) -> usize
    where
        T: ?Sized + Serialize + Debug,
    {
        let Some(payload) = serialize(event) else {
            return 0;
        };

        // Snapshot the targets so no shard lock is held while evicting.
        let targets: Vec<ConnectionHandle> = match self.sessions.get(&session_id) {
            Some(connections) => connections
                .values()
                .filter(|handle| Some(handle.id) != exclude)
                .cloned()
                .collect(),
            None => return 0,
        };

        targets
            .iter()
            .filter(|handle| self.deliver(handle, Message::Text(payload.clone())))
            .count()
    }

    /// Queue `event` on a single connection. Returns `false` if the connection was evicted.
    pub fn send_to<T>(&self, handle: &ConnectionHandle, event: &T) -> bool
    where
        T: ?Sized + Serialize + Debug,
    {
        match serialize(event) {
            Some(payload) => self.deliver(handle, Message::Text(payload)),
            None => false,
        }
    }

    /// Queue a raw frame (e.g. a close frame) on a single connection.
    pub fn send_raw(&self, handle: &ConnectionHandle, message: Message) -> bool {
        self.deliver(handle, message)
    }

    /// Number of live connections attached to `session_id`.
    pub fn connection_count(&self, session_id: Uuid) -> usize {
        self.sessions
            .get(&session_id)
            .map(|connections| connections.len())
            .unwrap_or(0)
    }

    /// Number of sessions with at least one live connection.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn deliver(&self, handle: &ConnectionHandle, message: Message) -> bool {
        match handle.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    session_id = %handle.session_id,
                    connection_id = %handle.id,
                    "outbound queue full, evicting slow connection"
                );
                self.evict(handle);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(
                    session_id = %handle.session_id,
                    connection_id = %handle.id,
                    "writer closed, dropping connection"
                );
                self.evict(handle);
                false
            }
        }
    }

    fn evict(&self, handle: &ConnectionHandle) {
        if self.disconnect(handle) {
            handle.evicted.notify_one();
        }
    }
}

fn serialize<T>(event: &T) -> Option<Utf8Bytes>
where
    T: ?Sized + Serialize + Debug,
{
    match serde_json::to_string(event) {
        Ok(payload) => Some(payload.into()),
        Err(err) => {
            warn!(error = %err, "failed to serialize realtime event `{event:?}`");
            None
        }
    }
}
