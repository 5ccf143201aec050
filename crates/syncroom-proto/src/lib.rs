//! Wire protocol for the syncroom relay.
//!
//! Events are JSON text messages, internally tagged with a `type` field so a
//! browser client can dispatch on it directly. Each variant maps to exactly
//! one wire tag; adding a variant without a tag is a compile error via the
//! serde derive.
//!
//! The relay never buffers or re-frames: one WebSocket text message is one
//! event. Undecodable input is the *sender's* problem: the server drops it
//! silently per the malformed-payload policy, so decode errors here carry
//! enough context for a debug log and nothing more.

mod error;
mod events;

pub use error::ProtocolError;
pub use events::{ClientMessage, MemberSnapshot, ServerMessage, SessionId};
