//! Server driver.
//!
//! Ties together the connection registry (per-connection bindings), presence
//! registry, room directory, sync coordinator, and voice relay. The driver
//! is sans-IO: it consumes [`ServerEvent`]s produced by the runtime and
//! returns [`ServerAction`]s for the runtime to execute, never touching a
//! socket itself.
//!
//! Event processing is infallible by design. Every invalid client action
//! (a non-host sending a host-only control, a reference to a departed
//! session, a report into an unknown room) is a silent no-op, reflecting a
//! trust model where the only adversary is a network race. Each operation
//! funnels through one validation gate so the policy could be tightened in
//! a single place.

use syncroom_proto::{ClientMessage, ServerMessage, SessionId};

use crate::{
    presence::PresenceRegistry,
    registry::ConnectionRegistry,
    room::{DEFAULT_NAME, Room, RoomDirectory},
    sync, voice,
};

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (production or tests).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted.
    ConnectionAccepted {
        /// Unique session ID assigned by the runtime.
        session_id: SessionId,
    },

    /// A decoded message was received from a connection.
    MessageReceived {
        /// Connection that sent the message.
        session_id: SessionId,
        /// The received message.
        message: ClientMessage,
    },

    /// A connection was closed (by peer or error).
    ConnectionClosed {
        /// Connection that was closed.
        session_id: SessionId,
        /// Reason for closure.
        reason: String,
    },
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code; the driver never sends.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a message to a specific session.
    SendToSession {
        /// Target session ID.
        session_id: SessionId,
        /// Message to send.
        message: ServerMessage,
    },

    /// Broadcast a message to all current members of a room.
    BroadcastToRoom {
        /// Target room.
        room_id: String,
        /// Message to broadcast.
        message: ServerMessage,
        /// Optional session to exclude (the relayed-control sender).
        exclude_session: Option<SessionId>,
    },

    /// Broadcast a message to every live connection (presence snapshots).
    BroadcastAll {
        /// Message to broadcast.
        message: ServerMessage,
    },

    /// Close a connection.
    CloseConnection {
        /// Session to close.
        session_id: SessionId,
        /// Reason for closure.
        reason: String,
    },

    /// Log a message (for debugging/monitoring).
    Log {
        /// Log level.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels for server actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
}

/// Action-based server driver.
///
/// Orchestrates connection lifecycle, room membership, host election, drift
/// correction, chat relay, and voice signaling.
pub struct ServerDriver {
    /// Per-connection binding state.
    registry: ConnectionRegistry,
    /// Process-wide identity presence.
    presence: PresenceRegistry,
    /// All live rooms.
    rooms: RoomDirectory,
    /// Driver configuration.
    config: DriverConfig,
}

impl ServerDriver {
    /// Create a new server driver.
    pub fn new(config: DriverConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            presence: PresenceRegistry::new(),
            rooms: RoomDirectory::new(),
            config,
        }
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver.
    pub fn process_event(&mut self, event: ServerEvent) -> Vec<ServerAction> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                self.handle_connection_accepted(session_id)
            },
            ServerEvent::MessageReceived { session_id, message } => {
                self.handle_message(session_id, message)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                self.handle_connection_closed(session_id, &reason)
            },
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(&mut self, session_id: SessionId) -> Vec<ServerAction> {
        if self.registry.session_count() >= self.config.max_connections {
            return vec![ServerAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }];
        }

        self.registry.register(session_id);

        vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection accepted, session_id={session_id}"),
        }]
    }

    /// Handle a decoded message from a connection.
    fn handle_message(
        &mut self,
        session_id: SessionId,
        message: ClientMessage,
    ) -> Vec<ServerAction> {
        // Unknown sessions (already torn down) get the same treatment as any
        // other stale reference: silence.
        if !self.registry.has_session(session_id) {
            return Vec::new();
        }

        match message {
            ClientMessage::Join { room, name, identity } => {
                self.on_join(session_id, room, name, identity)
            },

            ClientMessage::Progress { progress } => {
                let Some(room_id) = self.bound_room(session_id) else {
                    return Vec::new();
                };
                let Some(room) = self.rooms.get_mut(&room_id) else {
                    return Vec::new();
                };
                sync::report_progress(room, session_id, progress)
                    .into_iter()
                    .map(|(to, message)| ServerAction::SendToSession {
                        session_id: to,
                        message,
                    })
                    .collect()
            },

            ClientMessage::SetProgress { progress } => {
                self.relay_control(session_id, ServerMessage::SetProgress { progress })
            },
            ClientMessage::Play => self.relay_control(session_id, ServerMessage::Play),
            ClientMessage::Pause => self.relay_control(session_id, ServerMessage::Pause),
            ClientMessage::ChangeEpisode { payload } => {
                self.relay_control(session_id, ServerMessage::ChangeEpisode { payload })
            },

            ClientMessage::Chat { payload } => {
                let Some(room_id) = self.bound_room(session_id) else {
                    return Vec::new();
                };
                vec![ServerAction::BroadcastToRoom {
                    room_id,
                    message: ServerMessage::Chat { from: session_id, payload },
                    exclude_session: None,
                }]
            },

            ClientMessage::VoiceReady => {
                self.with_room(session_id, |room| voice::enable(room, session_id))
            },
            ClientMessage::VoiceDisable => {
                self.with_room(session_id, |room| voice::disable(room, session_id))
            },

            ClientMessage::VoiceSignal { target, data } => {
                // Dumb pairwise forward; a dead target is an unobservable
                // drop at the transport layer.
                let (to, message) = voice::signal(session_id, target, data);
                vec![ServerAction::SendToSession { session_id: to, message }]
            },

            ClientMessage::TransferHost { target } => {
                let Some(room_id) = self.bound_room(session_id) else {
                    return Vec::new();
                };
                let Some(room) = self.rooms.get_mut(&room_id) else {
                    return Vec::new();
                };
                if room.transfer_host(session_id, target) {
                    self.roster_broadcast(&room_id).into_iter().collect()
                } else {
                    Vec::new()
                }
            },
        }
    }

    /// Bind a connection to a room and identity, joining the room.
    ///
    /// A connection is a member of at most one room: joining while bound to
    /// a different room leaves that room first (with its own roster
    /// broadcast and possible re-election) before the new membership exists.
    fn on_join(
        &mut self,
        session_id: SessionId,
        room_id: String,
        name: Option<String>,
        identity: Option<String>,
    ) -> Vec<ServerAction> {
        let Some(previous_room) = self.registry.bind_room(session_id, room_id.clone()) else {
            return Vec::new();
        };

        let mut actions = Vec::new();

        if let Some(prev) = previous_room {
            if prev != room_id {
                actions.extend(self.leave_room(session_id, &prev));
            }
        }

        if let Some(identity) = identity {
            let previous_identity =
                self.registry.bind_identity(session_id, identity.clone()).flatten();
            if let Some(old) = previous_identity {
                if old != identity {
                    self.presence.unregister_if_current(&old, session_id);
                }
            }
            if let Some(superseded) = self.presence.register(identity.clone(), session_id) {
                actions.push(ServerAction::Log {
                    level: LogLevel::Debug,
                    message: format!(
                        "identity {identity:?} moved from session {superseded} to {session_id}"
                    ),
                });
            }
        }

        let name = name.unwrap_or_else(|| DEFAULT_NAME.to_string());
        self.rooms.ensure_room(&room_id).join(session_id, name);

        actions.extend(self.roster_broadcast(&room_id));
        actions.push(ServerAction::BroadcastAll {
            message: ServerMessage::Presence { identities: self.presence.identities() },
        });
        actions.push(ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("session {session_id} joined room {room_id:?}"),
        });
        actions
    }

    /// Handle a connection being closed.
    ///
    /// Presence cleanup runs before room cleanup so the global presence
    /// broadcast is not delayed by host re-election.
    fn handle_connection_closed(
        &mut self,
        session_id: SessionId,
        reason: &str,
    ) -> Vec<ServerAction> {
        let Some(state) = self.registry.unregister(session_id) else {
            return Vec::new();
        };

        let mut actions = Vec::new();

        if let Some(identity) = state.identity {
            if self.presence.unregister_if_current(&identity, session_id) {
                actions.push(ServerAction::BroadcastAll {
                    message: ServerMessage::Presence {
                        identities: self.presence.identities(),
                    },
                });
            }
        }

        if let Some(room_id) = state.room {
            actions.extend(self.leave_room(session_id, &room_id));
        }

        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!("connection {session_id} closed: {reason}"),
        });
        actions
    }

    /// Remove a member from a room, deleting the room if it empties.
    fn leave_room(&mut self, session_id: SessionId, room_id: &str) -> Vec<ServerAction> {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Vec::new();
        };
        if !room.leave(session_id) {
            return Vec::new();
        }

        if room.is_empty() {
            self.rooms.remove_if_empty(room_id);
            return vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("room {room_id:?} deleted (empty)"),
            }];
        }

        self.roster_broadcast(room_id).into_iter().collect()
    }

    /// Relay a host-only control to the rest of the sender's room.
    ///
    /// Authorization goes through [`sync::authorize_control`], the single
    /// gate for the silent-ignore policy.
    fn relay_control(&mut self, sender: SessionId, message: ServerMessage) -> Vec<ServerAction> {
        let Some(room_id) = self.bound_room(sender) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get(&room_id) else {
            return Vec::new();
        };
        if !sync::authorize_control(room, sender) {
            return Vec::new();
        }

        vec![ServerAction::BroadcastToRoom {
            room_id,
            message,
            exclude_session: Some(sender),
        }]
    }

    /// Run a room-scoped operation that yields unicast messages.
    fn with_room<F>(&mut self, session_id: SessionId, op: F) -> Vec<ServerAction>
    where
        F: FnOnce(&mut Room) -> Vec<(SessionId, ServerMessage)>,
    {
        let Some(room_id) = self.bound_room(session_id) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Vec::new();
        };
        op(room)
            .into_iter()
            .map(|(to, message)| ServerAction::SendToSession { session_id: to, message })
            .collect()
    }

    /// Roster broadcast for a room, if it still exists.
    fn roster_broadcast(&self, room_id: &str) -> Option<ServerAction> {
        let room = self.rooms.get(room_id)?;
        Some(ServerAction::BroadcastToRoom {
            room_id: room_id.to_string(),
            message: ServerMessage::Users { users: room.roster() },
            exclude_session: None,
        })
    }

    /// Room currently bound to a session.
    fn bound_room(&self, session_id: SessionId) -> Option<String> {
        self.registry.get(session_id)?.room.clone()
    }

    /// All sessions currently members of a room (for broadcast execution).
    pub fn sessions_in_room(&self, room_id: &str) -> impl Iterator<Item = SessionId> + '_ {
        self.rooms.get(room_id).into_iter().flat_map(Room::member_ids)
    }

    /// All live sessions (for global broadcast execution).
    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.registry.sessions()
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Room state for inspection. `None` if the room doesn't exist.
    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }

    /// Snapshot of online identities.
    pub fn online_identities(&self) -> Vec<String> {
        self.presence.identities()
    }
}

impl std::fmt::Debug for ServerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connection_count", &self.registry.session_count())
            .field("room_count", &self.rooms.room_count())
            .field("online_identities", &self.presence.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(driver: &mut ServerDriver, session_id: SessionId, room: &str) -> Vec<ServerAction> {
        driver.process_event(ServerEvent::MessageReceived {
            session_id,
            message: ClientMessage::Join {
                room: room.to_string(),
                name: None,
                identity: None,
            },
        })
    }

    fn accept(driver: &mut ServerDriver, session_id: SessionId) {
        driver.process_event(ServerEvent::ConnectionAccepted { session_id });
    }

    #[test]
    fn driver_accepts_connection() {
        let mut driver = ServerDriver::new(DriverConfig::default());

        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id: 1 });

        assert_eq!(driver.connection_count(), 1);
        assert!(matches!(actions[0], ServerAction::Log { level: LogLevel::Debug, .. }));
    }

    #[test]
    fn driver_rejects_when_max_connections_exceeded() {
        let config = DriverConfig { max_connections: 2 };
        let mut driver = ServerDriver::new(config);

        accept(&mut driver, 1);
        accept(&mut driver, 2);

        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id: 3 });

        assert_eq!(driver.connection_count(), 2);
        assert!(matches!(actions[0], ServerAction::CloseConnection { .. }));
    }

    #[test]
    fn join_creates_room_and_elects_host() {
        let mut driver = ServerDriver::new(DriverConfig::default());
        accept(&mut driver, 1);

        let actions = join(&mut driver, 1, "r1");

        let room = driver.room("r1").unwrap();
        assert!(room.is_host(1));
        assert!(actions.iter().any(|a| matches!(
            a,
            ServerAction::BroadcastToRoom { message: ServerMessage::Users { .. }, .. }
        )));
        assert!(actions.iter().any(|a| matches!(
            a,
            ServerAction::BroadcastAll { message: ServerMessage::Presence { .. } }
        )));
    }

    #[test]
    fn join_defaults_name_to_guest() {
        let mut driver = ServerDriver::new(DriverConfig::default());
        accept(&mut driver, 1);
        join(&mut driver, 1, "r1");

        assert_eq!(driver.room("r1").unwrap().member(1).unwrap().name, DEFAULT_NAME);
    }

    #[test]
    fn rejoining_another_room_leaves_the_first() {
        let mut driver = ServerDriver::new(DriverConfig::default());
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        join(&mut driver, 1, "r1");
        join(&mut driver, 2, "r1");

        let actions = join(&mut driver, 2, "r2");

        assert!(!driver.room("r1").unwrap().contains(2));
        assert!(driver.room("r2").unwrap().contains(2));
        // r1 got a roster update about the departure.
        assert!(actions.iter().any(|a| matches!(
            a,
            ServerAction::BroadcastToRoom { room_id, message: ServerMessage::Users { .. }, .. }
                if room_id == "r1"
        )));
    }

    #[test]
    fn disconnect_cleans_presence_before_room() {
        let mut driver = ServerDriver::new(DriverConfig::default());
        accept(&mut driver, 1);
        driver.process_event(ServerEvent::MessageReceived {
            session_id: 1,
            message: ClientMessage::Join {
                room: "r1".to_string(),
                name: Some("ada".to_string()),
                identity: Some("ada@host".to_string()),
            },
        });

        let actions = driver.process_event(ServerEvent::ConnectionClosed {
            session_id: 1,
            reason: "peer closed".to_string(),
        });

        assert!(driver.online_identities().is_empty());
        assert_eq!(driver.room_count(), 0, "empty room deleted");

        let presence_pos = actions.iter().position(|a| {
            matches!(a, ServerAction::BroadcastAll { message: ServerMessage::Presence { .. } })
        });
        assert!(presence_pos.is_some(), "presence broadcast emitted");
        assert_eq!(presence_pos, Some(0), "presence cleanup ordered first");
    }

    #[test]
    fn message_from_unknown_session_is_dropped() {
        let mut driver = ServerDriver::new(DriverConfig::default());

        let actions = join(&mut driver, 99, "r1");
        assert!(actions.is_empty());
        assert_eq!(driver.room_count(), 0);
    }

    #[test]
    fn chat_broadcasts_to_whole_room_with_sender() {
        let mut driver = ServerDriver::new(DriverConfig::default());
        accept(&mut driver, 1);
        join(&mut driver, 1, "r1");

        let actions = driver.process_event(ServerEvent::MessageReceived {
            session_id: 1,
            message: ClientMessage::Chat { payload: serde_json::json!("hi") },
        });

        assert!(matches!(
            &actions[0],
            ServerAction::BroadcastToRoom {
                message: ServerMessage::Chat { from: 1, .. },
                exclude_session: None,
                ..
            }
        ));
    }

    #[test]
    fn control_from_nonhost_is_ignored() {
        let mut driver = ServerDriver::new(DriverConfig::default());
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        join(&mut driver, 1, "r1");
        join(&mut driver, 2, "r1");

        let actions = driver.process_event(ServerEvent::MessageReceived {
            session_id: 2,
            message: ClientMessage::Play,
        });
        assert!(actions.is_empty());

        let actions = driver.process_event(ServerEvent::MessageReceived {
            session_id: 1,
            message: ClientMessage::Play,
        });
        assert!(matches!(
            &actions[0],
            ServerAction::BroadcastToRoom {
                message: ServerMessage::Play,
                exclude_session: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn transfer_host_from_nonhost_produces_no_broadcast() {
        let mut driver = ServerDriver::new(DriverConfig::default());
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        join(&mut driver, 1, "r1");
        join(&mut driver, 2, "r1");

        let actions = driver.process_event(ServerEvent::MessageReceived {
            session_id: 2,
            message: ClientMessage::TransferHost { target: 2 },
        });

        assert!(actions.is_empty());
        assert!(driver.room("r1").unwrap().is_host(1));
    }

    #[test]
    fn voice_signal_forwards_regardless_of_room() {
        let mut driver = ServerDriver::new(DriverConfig::default());
        accept(&mut driver, 1);
        join(&mut driver, 1, "r1");

        let actions = driver.process_event(ServerEvent::MessageReceived {
            session_id: 1,
            message: ClientMessage::VoiceSignal {
                target: 42, // never connected; drop happens at the transport
                data: serde_json::json!({"sdp": "offer"}),
            },
        });

        assert!(matches!(
            &actions[0],
            ServerAction::SendToSession {
                session_id: 42,
                message: ServerMessage::VoiceSignal { from: 1, .. },
            }
        ));
    }
}
