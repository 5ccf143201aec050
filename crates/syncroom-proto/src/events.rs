//! Client and server event types.
//!
//! `ClientMessage` is everything a connection may send; `ServerMessage` is
//! everything the relay emits. The two sets overlap on the playback controls
//! (play/pause/changeEpisode) because those are relayed verbatim, but they
//! are distinct types: outbound events carry routing context (sender ids)
//! that inbound events never do.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Runtime-assigned connection identifier, unique for a session's lifetime.
pub type SessionId = u64;

/// Events sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Bind this connection to a room (and optionally an identity).
    Join {
        /// Room identifier; created lazily if unknown.
        room: String,
        /// Display name; defaults to "Guest" when absent.
        #[serde(default)]
        name: Option<String>,
        /// Stable user identity for cross-room presence. Unauthenticated.
        #[serde(default)]
        identity: Option<String>,
    },

    /// Periodic playback position report, in seconds.
    Progress {
        /// Current playback position.
        progress: f64,
    },

    /// Explicit host-initiated seek. Host-only; ignored from anyone else.
    #[serde(rename = "setprogress")]
    SetProgress {
        /// Target playback position.
        progress: f64,
    },

    /// Resume playback. Host-only; relayed to the rest of the room.
    Play,

    /// Pause playback. Host-only; relayed to the rest of the room.
    Pause,

    /// Switch to another episode. Host-only; payload is opaque to the relay.
    ChangeEpisode {
        /// Client-defined episode descriptor.
        payload: serde_json::Value,
    },

    /// Chat message; relayed unmoderated to the whole room.
    Chat {
        /// Client-defined chat payload.
        payload: serde_json::Value,
    },

    /// Opt into peer-to-peer voice signaling.
    VoiceReady,

    /// Opt out of peer-to-peer voice signaling.
    VoiceDisable,

    /// Pairwise voice handshake payload for one peer.
    VoiceSignal {
        /// Session id of the peer this signal is addressed to.
        target: SessionId,
        /// Opaque signaling payload (SDP/ICE, not inspected).
        data: serde_json::Value,
    },

    /// Hand the host role to another member. Host-only.
    TransferHost {
        /// Session id of the member to promote.
        target: SessionId,
    },
}

/// Events emitted by the relay to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full roster snapshot, in join order. Broadcast to the room.
    Users {
        /// One entry per current member.
        users: Vec<MemberSnapshot>,
    },

    /// Online identities snapshot. Broadcast to every connection.
    Presence {
        /// Identities currently registered, in no particular order.
        identities: Vec<String>,
    },

    /// Forced seek: set local playback position to this value.
    ///
    /// Sent both as an automatic drift correction (unicast) and as a relay
    /// of a host-initiated seek (room-wide); the client treats them alike.
    #[serde(rename = "setprogress")]
    SetProgress {
        /// Position to seek to.
        progress: f64,
    },

    /// Informational viewer position, unicast to the host only.
    ViewerProgress {
        /// Reporting member.
        id: SessionId,
        /// That member's reported position.
        progress: f64,
    },

    /// Relayed host play control.
    Play,

    /// Relayed host pause control.
    Pause,

    /// Relayed host episode change.
    ChangeEpisode {
        /// Opaque episode descriptor, forwarded verbatim.
        payload: serde_json::Value,
    },

    /// Relayed chat message, including the sender.
    Chat {
        /// Session id of the sender.
        from: SessionId,
        /// Chat payload, forwarded verbatim.
        payload: serde_json::Value,
    },

    /// A member became voice-available.
    VoiceReady {
        /// The voice-enabled member.
        id: SessionId,
    },

    /// A member left voice.
    VoiceDisable {
        /// The member that disabled voice.
        id: SessionId,
    },

    /// Relayed pairwise voice handshake payload.
    VoiceSignal {
        /// Session id of the originating peer.
        from: SessionId,
        /// Opaque signaling payload, forwarded verbatim.
        data: serde_json::Value,
    },
}

/// One roster entry in a `users` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    /// Member's session id.
    pub id: SessionId,
    /// Display name.
    pub name: String,
    /// Whether this member is the room host.
    #[serde(rename = "isHost")]
    pub is_host: bool,
    /// Last reported playback position.
    pub progress: f64,
}

impl ClientMessage {
    /// Decode an inbound text message.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

impl ServerMessage {
    /// Encode for transmission as a WebSocket text message.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}
