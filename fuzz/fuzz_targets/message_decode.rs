//! Fuzz target for ClientMessage::decode
//!
//! This fuzzer tests event decoding with arbitrary byte sequences to find:
//! - Parser crashes or panics
//! - Unexpected acceptance of malformed tags or field types
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use syncroom_proto::ClientMessage;

fuzz_target!(|data: &[u8]| {
    // Attempt to decode arbitrary bytes as a client event
    // This should never panic, only return Err for invalid data
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = ClientMessage::decode(text);
    }
});
