//! Protocol error types.

/// Errors from event encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Inbound text was not a valid event.
    ///
    /// Covers malformed JSON, unknown `type` tags, and wrong-typed fields
    /// (e.g. a non-numeric `progress`). The server treats all of these as a
    /// silent drop.
    #[error("failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),

    /// Outbound event failed to serialize.
    ///
    /// Should never happen for well-formed events; indicates a bug in the
    /// event construction, not a client problem.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
}
