//! In-process registry of live connections per user.

use dashmap::DashMap;
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::types::ServerEvent;

/// A sender for WebSocket events to a specific connection.
pub type WsSender = mpsc::Sender<ServerEvent>;

/// Concurrency-safe map from user ID to that user's live connections.
///
/// Pure runtime state: never persisted, gone on restart. The durable store
/// is the source of truth; this exists only to decide which live sockets
/// should receive a just-persisted message. A snapshot that races a
/// connect/disconnect may miss or include that one connection, which is
/// acceptable for best-effort live delivery.
///
/// Injected wherever connections are accepted rather than living in a
/// module-level global, so tests can construct their own and a scaled-out
/// deployment can swap in a distributed implementation.
pub struct ConnectionRegistry {
    /// User ID -> that user's live connection handles.
    connections: DashMap<String, Vec<(u64, WsSender)>>,

    /// Process-unique connection IDs. Positional indexes would be reused
    /// across concurrent disconnects; unique IDs make unregister exact.
    next_conn_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Allocate a connection ID for a handle about to be registered.
    pub fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a connection under a user. Idempotent: registering the
    /// same connection ID twice leaves a single entry.
    pub fn register(&self, user_id: &str, conn_id: u64, sender: WsSender) {
        let mut conns = self.connections.entry(user_id.to_string()).or_default();
        if conns.iter().any(|(id, _)| *id == conn_id) {
            return;
        }
        conns.push((conn_id, sender));
        info!("Registered connection {} for user {}", conn_id, user_id);
    }

    /// Unregister a connection. A no-op when the handle was never
    /// registered or was already removed; concurrent disconnects must not
    /// be able to fail.
    pub fn unregister(&self, user_id: &str, conn_id: u64) {
        let mut removed = false;
        if let Some(mut conns) = self.connections.get_mut(user_id) {
            let before = conns.len();
            conns.retain(|(id, _)| *id != conn_id);
            removed = conns.len() != before;
        }

        // Drop the user entry once its last connection is gone. The
        // emptiness check is re-done under the map lock, so a register
        // racing this cannot lose its fresh entry.
        self.connections.remove_if(user_id, |_, conns| conns.is_empty());

        if removed {
            info!("Unregistered connection {} for user {}", conn_id, user_id);
        } else {
            debug!(
                "Unregister of unknown connection {} for user {} ignored",
                conn_id, user_id
            );
        }
    }

    /// Snapshot of a user's live connection senders. Empty means offline,
    /// never an error.
    pub fn connections_for(&self, user_id: &str) -> Vec<WsSender> {
        self.connections
            .get(user_id)
            .map(|conns| conns.iter().map(|(_, tx)| tx.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of live connections for a user.
    pub fn connection_count(&self, user_id: &str) -> usize {
        self.connections
            .get(user_id)
            .map(|conns| conns.len())
            .unwrap_or(0)
    }

    /// Whether any connection is registered for the user.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
