use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use tandem_types::events::ServerEvent;
use tandem_types::models::UserId;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    Full,
    #[error("connection is closed")]
    Closed,
}

/// Sending half of one live connection.
///
/// Cloning is cheap; all clones share the same bounded outbound queue and
/// the same close signal.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle with an outbound queue of `capacity` frames.
    /// The receiver belongs to the connection's writer task.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            tx,
            closed: CancellationToken::new(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event without waiting. Used for fan-out, where one slow
    /// socket must not hold up delivery to the others.
    pub fn try_deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        if self.closed.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Queue a direct reply to this connection, waiting for room if needed.
    pub async fn reply(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        if self.closed.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        tokio::select! {
            _ = self.closed.cancelled() => Err(DeliveryError::Closed),
            res = self.tx.send(event) => res.map_err(|_| DeliveryError::Closed),
        }
    }

    /// Signal the connection's tasks to shut down. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called on any clone.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// Who is online, and through which connections.
///
/// Two indexes are kept in step: user -> connections, and connection -> user.
/// Every write to the reverse index happens while the user's shard of the
/// forward index is held, so a connection is in both or in neither.
/// Lock order is always forward then reverse.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    by_user: DashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>,
    owners: DashMap<ConnectionId, UserId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection to a user. Returns false if the connection is
    /// already registered, in which case nothing changes.
    pub fn register(&self, user_id: UserId, handle: ConnectionHandle) -> bool {
        let id = handle.id();
        // Holding the entry (even vacant) locks the user's shard.
        let entry = self.inner.by_user.entry(user_id);

        if let Some(owner) = self.inner.owners.get(&id).map(|owner| *owner) {
            warn!("Connection {} is already registered to user {}", id, owner);
            return false;
        }

        self.inner.owners.insert(id, user_id);
        let mut connections = entry.or_default();
        connections.insert(id, handle);
        debug!(user_id, connection_id = %id, connections = connections.len(), "connection registered");
        true
    }

    /// Detach a connection. Returns the user it belonged to, or `None` if it
    /// was not registered (or a concurrent call already removed it).
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<UserId> {
        let user_id = *self.inner.owners.get(&connection_id)?;

        match self.inner.by_user.entry(user_id) {
            Entry::Occupied(mut entry) => {
                // Re-check under the user's shard; a racing unregister may have won.
                self.inner.owners.remove(&connection_id)?;
                entry.get_mut().remove(&connection_id);
                if entry.get().is_empty() {
                    entry.remove();
                }
                debug!(user_id, %connection_id, "connection unregistered");
                Some(user_id)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Snapshot of a user's live connections.
    pub fn connections_of(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        self.inner
            .by_user
            .get(&user_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn owner_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.inner.owners.get(&connection_id).map(|owner| *owner)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.inner
            .by_user
            .get(&user_id)
            .is_some_and(|connections| !connections.is_empty())
    }

    pub fn online_users(&self) -> usize {
        self.inner.by_user.len()
    }

    /// Remove a connection and tell it to shut down.
    pub fn evict(&self, handle: &ConnectionHandle) {
        self.unregister(handle.id());
        handle.close();
    }

    /// Deliver an event to every live connection of a user. Connections whose
    /// queue is full or closed are evicted. Returns how many accepted it.
    pub fn send_to_user(&self, user_id: UserId, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for handle in self.connections_of(user_id) {
            match handle.try_deliver(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Evicting connection {} of user {}: {}", handle.id(), user_id, e);
                    self.evict(&handle);
                }
            }
        }
        delivered
    }
}
