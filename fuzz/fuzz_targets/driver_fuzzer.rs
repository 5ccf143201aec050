//! Fuzz target for ServerDriver event processing
//!
//! Drives the sans-IO driver with arbitrary event interleavings: joins into
//! a small set of rooms, progress reports (including non-finite values),
//! host controls from arbitrary senders, voice toggles, and disconnects.
//!
//! # Invariants
//!
//! - process_event NEVER panics, whatever the interleaving
//! - A non-empty room always has exactly one host, and the host is a member
//! - A room with no members does not exist
//! - Connection count never exceeds the configured maximum

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use syncroom_proto::ClientMessage;
use syncroom_server::{DriverConfig, ServerDriver, ServerEvent};

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Step {
    Connect { session: u8 },
    Disconnect { session: u8 },
    Join { session: u8, room: u8, with_identity: bool },
    Progress { session: u8, progress: ProgressValue },
    SetProgress { session: u8, progress: ProgressValue },
    Play { session: u8 },
    Pause { session: u8 },
    Chat { session: u8 },
    VoiceReady { session: u8 },
    VoiceDisable { session: u8 },
    VoiceSignal { session: u8, target: u8 },
    TransferHost { session: u8, target: u8 },
}

#[derive(Debug, Clone, Arbitrary)]
enum ProgressValue {
    Finite(u32),
    Nan,
    Infinity,
    NegInfinity,
}

impl ProgressValue {
    fn as_f64(&self) -> f64 {
        match self {
            Self::Finite(v) => f64::from(*v) / 10.0,
            Self::Nan => f64::NAN,
            Self::Infinity => f64::INFINITY,
            Self::NegInfinity => f64::NEG_INFINITY,
        }
    }
}

fn room_name(room: u8) -> String {
    format!("room-{}", room % 4)
}

fn message_event(session: u8, message: ClientMessage) -> ServerEvent {
    ServerEvent::MessageReceived { session_id: u64::from(session), message }
}

fuzz_target!(|scenario: Scenario| {
    let max_connections = 16;
    let mut driver = ServerDriver::new(DriverConfig { max_connections });

    for step in scenario.steps {
        let event = match step {
            Step::Connect { session } => {
                ServerEvent::ConnectionAccepted { session_id: u64::from(session) }
            },
            Step::Disconnect { session } => ServerEvent::ConnectionClosed {
                session_id: u64::from(session),
                reason: "fuzz".to_string(),
            },
            Step::Join { session, room, with_identity } => message_event(
                session,
                ClientMessage::Join {
                    room: room_name(room),
                    name: Some(format!("m{session}")),
                    identity: with_identity.then(|| format!("id-{}", session % 4)),
                },
            ),
            Step::Progress { session, progress } => message_event(
                session,
                ClientMessage::Progress { progress: progress.as_f64() },
            ),
            Step::SetProgress { session, progress } => message_event(
                session,
                ClientMessage::SetProgress { progress: progress.as_f64() },
            ),
            Step::Play { session } => message_event(session, ClientMessage::Play),
            Step::Pause { session } => message_event(session, ClientMessage::Pause),
            Step::Chat { session } => message_event(
                session,
                ClientMessage::Chat { payload: serde_json::json!("hi") },
            ),
            Step::VoiceReady { session } => message_event(session, ClientMessage::VoiceReady),
            Step::VoiceDisable { session } => message_event(session, ClientMessage::VoiceDisable),
            Step::VoiceSignal { session, target } => message_event(
                session,
                ClientMessage::VoiceSignal {
                    target: u64::from(target),
                    data: serde_json::json!({"sdp": "x"}),
                },
            ),
            Step::TransferHost { session, target } => message_event(
                session,
                ClientMessage::TransferHost { target: u64::from(target) },
            ),
        };

        let _ = driver.process_event(event);

        assert!(driver.connection_count() <= max_connections);

        for room in 0..4u8 {
            if let Some(room) = driver.room(&room_name(room)) {
                assert!(!room.is_empty(), "empty rooms must be deleted");
                let host = room.host().expect("non-empty room has a host");
                assert!(room.contains(host), "host must be a member");
            }
        }
    }
});
