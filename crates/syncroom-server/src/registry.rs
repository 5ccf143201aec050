//! Connection registry: per-connection binding state.
//!
//! Each live connection has exactly one `ConnectionState` record holding its
//! bound room and identity. All other components read these bindings; only
//! the lifecycle handler in the driver mutates them. A connection is a member
//! of at most one room: rebinding returns the previous room so the caller
//! can leave it before joining the new one.

use std::collections::HashMap;

use syncroom_proto::SessionId;

/// Binding state for one live connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    /// Identity bound at join time, if the client supplied one.
    pub identity: Option<String>,
    /// Room this connection is currently a member of.
    pub room: Option<String>,
}

/// Registry of live connections and their bindings.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<SessionId, ConnectionState>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with no bindings.
    ///
    /// Returns `false` if the session is already registered.
    pub fn register(&mut self, session_id: SessionId) -> bool {
        if self.connections.contains_key(&session_id) {
            return false;
        }
        self.connections.insert(session_id, ConnectionState::default());
        true
    }

    /// Unregister a connection, returning its final bindings for cleanup.
    pub fn unregister(&mut self, session_id: SessionId) -> Option<ConnectionState> {
        self.connections.remove(&session_id)
    }

    /// Binding state for a connection. `None` if unknown.
    pub fn get(&self, session_id: SessionId) -> Option<&ConnectionState> {
        self.connections.get(&session_id)
    }

    /// Check if a session is registered.
    pub fn has_session(&self, session_id: SessionId) -> bool {
        self.connections.contains_key(&session_id)
    }

    /// Bind a connection to a room, returning the previously bound room.
    ///
    /// Outer `None` means the session is unknown and nothing was bound.
    pub fn bind_room(
        &mut self,
        session_id: SessionId,
        room: String,
    ) -> Option<Option<String>> {
        let state = self.connections.get_mut(&session_id)?;
        Some(state.room.replace(room))
    }

    /// Bind a connection to an identity, returning the previous identity.
    ///
    /// Outer `None` means the session is unknown and nothing was bound.
    pub fn bind_identity(
        &mut self,
        session_id: SessionId,
        identity: String,
    ) -> Option<Option<String>> {
        let state = self.connections.get_mut(&session_id)?;
        Some(state.identity.replace(identity))
    }

    /// All registered session ids.
    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.connections.keys().copied()
    }

    /// Total number of registered connections.
    pub fn session_count(&self) -> usize {
        self.connections.len()
    }
}
