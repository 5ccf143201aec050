//! Room state: membership, host pointer, voice-participant set.
//!
//! A `Room` is the unit of isolation. Invariant: whenever the member map is
//! non-empty, exactly one member is host and the host id is a member key.
//! The directory creates rooms lazily on first join and deletes them as soon
//! as the last member leaves, so a re-used room id always starts fresh.
//!
//! Host election tie-break: the earliest-joined remaining member, via the
//! room's join-order list. The protocol only requires "some remaining
//! member"; this rule makes re-election reproducible.

use std::collections::{HashMap, HashSet};

use syncroom_proto::{MemberSnapshot, SessionId};

/// Default display name for members that join without one.
pub const DEFAULT_NAME: &str = "Guest";

/// One connection's presence inside a room.
#[derive(Debug, Clone)]
pub struct Member {
    /// Owning connection.
    pub session_id: SessionId,
    /// Display name.
    pub name: String,
    /// Last reported playback position, seconds.
    pub progress: f64,
}

/// Membership and playback-role state for one watch party.
#[derive(Debug, Default)]
pub struct Room {
    members: HashMap<SessionId, Member>,
    /// Member ids in join order; drives re-election and roster ordering.
    join_order: Vec<SessionId>,
    host: Option<SessionId>,
    voice: HashSet<SessionId>,
}

impl Room {
    fn new() -> Self {
        Self::default()
    }

    /// Add a member with progress 0. The first member becomes host.
    ///
    /// Joining twice is a rename: the existing member keeps its progress,
    /// join position, and host role.
    pub fn join(&mut self, session_id: SessionId, name: String) {
        if let Some(member) = self.members.get_mut(&session_id) {
            member.name = name;
            return;
        }

        self.members.insert(session_id, Member { session_id, name, progress: 0.0 });
        self.join_order.push(session_id);

        if self.host.is_none() {
            self.host = Some(session_id);
        }
    }

    /// Remove a member and its voice flag, re-electing a host if needed.
    ///
    /// Returns `true` if the session was a member. When the departing member
    /// was host and others remain, the earliest-joined remaining member is
    /// promoted.
    pub fn leave(&mut self, session_id: SessionId) -> bool {
        if self.members.remove(&session_id).is_none() {
            return false;
        }
        self.join_order.retain(|&id| id != session_id);
        self.voice.remove(&session_id);

        if self.host == Some(session_id) {
            self.host = self.join_order.first().copied();
        }
        true
    }

    /// Reassign the host role.
    ///
    /// Succeeds only if `requester` is the current host and `target` is a
    /// member; otherwise a silent no-op (benign race, e.g. target already
    /// left). Returns whether the host changed.
    pub fn transfer_host(&mut self, requester: SessionId, target: SessionId) -> bool {
        if self.host != Some(requester) || !self.members.contains_key(&target) {
            return false;
        }
        self.host = Some(target);
        true
    }

    /// Current host. `None` only while the room is empty.
    pub fn host(&self) -> Option<SessionId> {
        self.host
    }

    /// Whether this session currently holds the host role.
    pub fn is_host(&self, session_id: SessionId) -> bool {
        self.host == Some(session_id)
    }

    /// Whether this session is a member.
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.members.contains_key(&session_id)
    }

    /// Whether the room has no members (eligible for deletion).
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Member ids in join order.
    pub fn member_ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.join_order.iter().copied()
    }

    /// Mutable member record. `None` if not a member.
    pub(crate) fn member_mut(&mut self, session_id: SessionId) -> Option<&mut Member> {
        self.members.get_mut(&session_id)
    }

    /// Member record. `None` if not a member.
    pub fn member(&self, session_id: SessionId) -> Option<&Member> {
        self.members.get(&session_id)
    }

    /// Add a session to the voice-participant set. Members only.
    ///
    /// Returns `false` if the session is not a member or already enabled.
    pub(crate) fn enable_voice(&mut self, session_id: SessionId) -> bool {
        self.members.contains_key(&session_id) && self.voice.insert(session_id)
    }

    /// Remove a session from the voice-participant set.
    pub(crate) fn disable_voice(&mut self, session_id: SessionId) -> bool {
        self.voice.remove(&session_id)
    }

    /// Current voice participants, in join order.
    pub fn voice_participants(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.join_order.iter().copied().filter(|id| self.voice.contains(id))
    }

    /// Whether a session has voice enabled.
    pub fn has_voice(&self, session_id: SessionId) -> bool {
        self.voice.contains(&session_id)
    }

    /// Roster snapshot in join order, annotated with the host flag.
    pub fn roster(&self) -> Vec<MemberSnapshot> {
        self.join_order
            .iter()
            .filter_map(|id| self.members.get(id))
            .map(|member| MemberSnapshot {
                id: member.session_id,
                name: member.name.clone(),
                is_host: self.host == Some(member.session_id),
                progress: member.progress,
            })
            .collect()
    }
}

/// Directory of all live rooms. Owns every `Room` instance.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, Room>,
}

impl RoomDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing room, or a freshly created empty one.
    pub fn ensure_room(&mut self, room_id: &str) -> &mut Room {
        self.rooms.entry(room_id.to_string()).or_insert_with(Room::new)
    }

    /// Room lookup. Absence is `None`, never an error.
    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Mutable room lookup.
    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    /// Delete a room iff it is empty right now.
    ///
    /// Must only be called after a member removal, so a concurrent join
    /// cannot observe a half-deleted room.
    pub fn remove_if_empty(&mut self, room_id: &str) {
        if self.rooms.get(room_id).is_some_and(Room::is_empty) {
            self.rooms.remove(room_id);
        }
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
