//! Voice signaling relay.
//!
//! Maintains the room's voice-participant set and relays pairwise handshake
//! payloads. The relay is deliberately dumb: `signal` forwards to any target
//! session with no existence check. If the target has disconnected, the
//! send falls on the floor at the transport layer, which is exactly the
//! contract (benign race, not an error).

use serde_json::Value;
use syncroom_proto::{ServerMessage, SessionId};

use crate::room::Room;

/// Opt a member into voice.
///
/// Every other member learns the joiner is voice-available, and the joiner
/// gets one notification per pre-existing participant so it can initiate a
/// handshake with each. Non-members and double enables are silent no-ops.
pub fn enable(room: &mut Room, session_id: SessionId) -> Vec<(SessionId, ServerMessage)> {
    let existing: Vec<SessionId> =
        room.voice_participants().filter(|&id| id != session_id).collect();

    if !room.enable_voice(session_id) {
        return Vec::new();
    }

    let mut out: Vec<(SessionId, ServerMessage)> = room
        .member_ids()
        .filter(|&id| id != session_id)
        .map(|id| (id, ServerMessage::VoiceReady { id: session_id }))
        .collect();

    for peer in existing {
        out.push((session_id, ServerMessage::VoiceReady { id: peer }));
    }
    out
}

/// Opt a member out of voice, notifying the rest of the room.
pub fn disable(room: &mut Room, session_id: SessionId) -> Vec<(SessionId, ServerMessage)> {
    if !room.disable_voice(session_id) {
        return Vec::new();
    }

    room.member_ids()
        .filter(|&id| id != session_id)
        .map(|id| (id, ServerMessage::VoiceDisable { id: session_id }))
        .collect()
}

/// Forward a handshake payload to one peer, tagged with the sender.
pub fn signal(
    from: SessionId,
    target: SessionId,
    data: Value,
) -> (SessionId, ServerMessage) {
    (target, ServerMessage::VoiceSignal { from, data })
}
