//! Process-wide presence registry.
//!
//! Maps a stable user identity to its current session. Independent of any
//! room: used only for the global "who is online" broadcast. A later join
//! with the same identity supersedes the earlier mapping (reconnection), so
//! de-registration is conditional: the stale connection's disconnect must
//! not remove the entry the reconnected session now owns.

use std::collections::HashMap;

use syncroom_proto::SessionId;

/// Identity → current session mapping.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    online: HashMap<String, SessionId>,
}

impl PresenceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity as owned by `session_id`.
    ///
    /// Returns the superseded session id if this identity was already online
    /// on another connection.
    pub fn register(&mut self, identity: String, session_id: SessionId) -> Option<SessionId> {
        let previous = self.online.insert(identity, session_id);
        previous.filter(|&prev| prev != session_id)
    }

    /// Remove an identity entry, but only if it still points at this session.
    ///
    /// Returns `true` if an entry was removed (presence list changed).
    pub fn unregister_if_current(&mut self, identity: &str, session_id: SessionId) -> bool {
        match self.online.get(identity) {
            Some(&current) if current == session_id => {
                self.online.remove(identity);
                true
            },
            _ => false,
        }
    }

    /// Session currently owning an identity.
    pub fn session_for(&self, identity: &str) -> Option<SessionId> {
        self.online.get(identity).copied()
    }

    /// Snapshot of all online identities, for the `presence` broadcast.
    pub fn identities(&self) -> Vec<String> {
        self.online.keys().cloned().collect()
    }

    /// Number of online identities.
    pub fn len(&self) -> usize {
        self.online.len()
    }

    /// Whether no identity is online.
    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_snapshot() {
        let mut presence = PresenceRegistry::new();

        assert_eq!(presence.register("ada".to_string(), 1), None);
        assert_eq!(presence.session_for("ada"), Some(1));
        assert_eq!(presence.identities(), vec!["ada".to_string()]);
    }

    #[test]
    fn rejoin_supersedes_previous_session() {
        let mut presence = PresenceRegistry::new();

        presence.register("ada".to_string(), 1);
        assert_eq!(presence.register("ada".to_string(), 2), Some(1));
        assert_eq!(presence.session_for("ada"), Some(2));
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn stale_disconnect_does_not_remove_superseded_entry() {
        let mut presence = PresenceRegistry::new();

        presence.register("ada".to_string(), 1);
        presence.register("ada".to_string(), 2);

        // Session 1's late disconnect must not take "ada" offline.
        assert!(!presence.unregister_if_current("ada", 1));
        assert_eq!(presence.session_for("ada"), Some(2));

        assert!(presence.unregister_if_current("ada", 2));
        assert!(presence.is_empty());
    }

    #[test]
    fn unregister_unknown_identity_is_noop() {
        let mut presence = PresenceRegistry::new();

        assert!(!presence.unregister_if_current("ghost", 1));
    }
}
