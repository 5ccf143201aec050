//! Sync coordinator: host-authoritative drift correction.
//!
//! The host's reported progress is the sole source of truth. When the host
//! reports, every viewer whose stored position has drifted beyond
//! [`DRIFT_THRESHOLD`] is snapped to the host position with a forced seek;
//! viewers within the threshold are left alone, which bounds both correction
//! traffic and perceptible playback jumps. Viewer reports flow to the host
//! as informational events only; no correction ever travels host-ward.
//!
//! All functions here are pure state transitions returning unicast
//! `(recipient, message)` pairs for the driver to dispatch.

use syncroom_proto::{ServerMessage, SessionId};

use crate::room::Room;

/// Maximum tolerated drift between host and viewer, in seconds of playback.
pub const DRIFT_THRESHOLD: f64 = 5.0;

/// Single authorization gate for host-only operations.
///
/// Anyone may *send* a control; only the current host's is honored. A stale
/// control from a demoted host is a benign race, silently ignored. Stricter
/// semantics (error responses, rate limits) would go here and nowhere else.
pub fn authorize_control(room: &Room, sender: SessionId) -> bool {
    room.is_host(sender)
}

/// Process a progress report from a room member.
///
/// Host report: store it, then force-seek every viewer beyond the drift
/// threshold (their stored progress is snapped too, so one burst of
/// corrections settles the room). Viewer report: store it and notify the
/// host informationally.
///
/// Non-finite values and reports from non-members are dropped: stored
/// progress must stay comparable, and NaN would poison every later drift
/// comparison.
pub fn report_progress(
    room: &mut Room,
    sender: SessionId,
    progress: f64,
) -> Vec<(SessionId, ServerMessage)> {
    if !progress.is_finite() || !room.contains(sender) {
        return Vec::new();
    }

    if let Some(member) = room.member_mut(sender) {
        member.progress = progress;
    }

    if room.is_host(sender) {
        let laggards: Vec<SessionId> = room
            .member_ids()
            .filter(|&id| id != sender)
            .filter(|&id| {
                room.member(id)
                    .is_some_and(|m| (progress - m.progress).abs() > DRIFT_THRESHOLD)
            })
            .collect();

        let mut out = Vec::with_capacity(laggards.len());
        for id in laggards {
            if let Some(member) = room.member_mut(id) {
                member.progress = progress;
            }
            out.push((id, ServerMessage::SetProgress { progress }));
        }
        out
    } else {
        match room.host() {
            Some(host) => {
                vec![(host, ServerMessage::ViewerProgress { id: sender, progress })]
            },
            // Unreachable while the one-host invariant holds (sender is a
            // member, so the room is non-empty), but never worth panicking
            // over.
            None => Vec::new(),
        }
    }
}
