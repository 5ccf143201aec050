//! End-to-end driver scenarios.
//!
//! Drives the sans-IO `ServerDriver` through full event sequences and checks
//! the emitted actions, covering the protocol's observable behavior: drift
//! correction round-trips, host loss and re-election, room teardown, and
//! voice handshake fan-out.

use syncroom_proto::{ClientMessage, ServerMessage, SessionId};
use syncroom_server::{DriverConfig, ServerAction, ServerDriver, ServerEvent};

fn driver() -> ServerDriver {
    ServerDriver::new(DriverConfig::default())
}

fn accept(driver: &mut ServerDriver, session_id: SessionId) {
    driver.process_event(ServerEvent::ConnectionAccepted { session_id });
}

fn send(
    driver: &mut ServerDriver,
    session_id: SessionId,
    message: ClientMessage,
) -> Vec<ServerAction> {
    driver.process_event(ServerEvent::MessageReceived { session_id, message })
}

fn join_as(
    driver: &mut ServerDriver,
    session_id: SessionId,
    room: &str,
    name: &str,
) -> Vec<ServerAction> {
    send(driver, session_id, ClientMessage::Join {
        room: room.to_string(),
        name: Some(name.to_string()),
        identity: None,
    })
}

fn disconnect(driver: &mut ServerDriver, session_id: SessionId) -> Vec<ServerAction> {
    driver.process_event(ServerEvent::ConnectionClosed {
        session_id,
        reason: "test disconnect".to_string(),
    })
}

/// Forced seeks sent to a specific session within an action batch.
fn seeks_to(actions: &[ServerAction], target: SessionId) -> Vec<f64> {
    actions
        .iter()
        .filter_map(|a| match a {
            ServerAction::SendToSession {
                session_id,
                message: ServerMessage::SetProgress { progress },
            } if *session_id == target => Some(*progress),
            _ => None,
        })
        .collect()
}

#[test]
fn drift_correction_round_trip() {
    // Host H joins "r1", becomes host; viewer V joins.
    let mut d = driver();
    accept(&mut d, 1);
    accept(&mut d, 2);
    join_as(&mut d, 1, "r1", "H");
    join_as(&mut d, 2, "r1", "V");
    assert!(d.room("r1").unwrap().is_host(1));

    // H reports 100; V is at 0, drift 100 > 5: forced seek + snap.
    let actions = send(&mut d, 1, ClientMessage::Progress { progress: 100.0 });
    assert_eq!(seeks_to(&actions, 2), vec![100.0]);
    assert_eq!(d.room("r1").unwrap().member(2).unwrap().progress, 100.0);

    // V then reports 102 independently: informational event to H only,
    // V's stored progress updated, no correction back.
    let actions = send(&mut d, 2, ClientMessage::Progress { progress: 102.0 });
    assert_eq!(actions.len(), 1);
    assert!(matches!(
        &actions[0],
        ServerAction::SendToSession {
            session_id: 1,
            message: ServerMessage::ViewerProgress { id: 2, progress },
        } if *progress == 102.0
    ));
    assert_eq!(d.room("r1").unwrap().member(2).unwrap().progress, 102.0);
}

#[test]
fn host_report_corrects_only_drifted_viewers() {
    let mut d = driver();
    for id in 1..=4 {
        accept(&mut d, id);
        join_as(&mut d, id, "r1", "m");
    }

    // Establish viewer positions: 2 close, 3 and 4 far behind.
    send(&mut d, 1, ClientMessage::Progress { progress: 100.0 });
    // That first report snapped everyone to 100; move the host on and keep
    // viewer 2 close by having it report.
    send(&mut d, 2, ClientMessage::Progress { progress: 118.0 });

    let actions = send(&mut d, 1, ClientMessage::Progress { progress: 120.0 });

    assert!(seeks_to(&actions, 2).is_empty(), "within threshold");
    assert_eq!(seeks_to(&actions, 3), vec![120.0]);
    assert_eq!(seeks_to(&actions, 4), vec![120.0]);
}

#[test]
fn host_loss_reelects_and_ignores_stale_controls() {
    let mut d = driver();
    accept(&mut d, 1);
    accept(&mut d, 2);
    join_as(&mut d, 1, "r1", "H");
    join_as(&mut d, 2, "r1", "V");

    // H disconnects while V remains: V is elected host.
    let actions = disconnect(&mut d, 1);
    assert!(d.room("r1").unwrap().is_host(2));
    assert!(
        actions.iter().any(|a| matches!(
            a,
            ServerAction::BroadcastToRoom { message: ServerMessage::Users { users }, .. }
                if users.len() == 1 && users[0].is_host
        )),
        "remaining members told about the new host"
    );

    // A control from the original H's now-stale session id is ignored.
    let actions = send(&mut d, 1, ClientMessage::Play);
    assert!(actions.is_empty());

    // The same control from the new host is relayed.
    let actions = send(&mut d, 2, ClientMessage::Play);
    assert!(matches!(&actions[0], ServerAction::BroadcastToRoom {
        message: ServerMessage::Play,
        exclude_session: Some(2),
        ..
    }));
}

#[test]
fn reelection_never_selects_a_stale_id() {
    let mut d = driver();
    for id in 1..=5 {
        accept(&mut d, id);
        join_as(&mut d, id, "r1", "m");
    }

    disconnect(&mut d, 1); // host leaves
    disconnect(&mut d, 2); // next host leaves too

    let room = d.room("r1").unwrap();
    let host = room.host().unwrap();
    assert!(room.contains(host));
    assert_eq!(host, 3, "earliest-joined remaining member");
}

#[test]
fn room_ceases_to_exist_after_last_member_leaves() {
    let mut d = driver();
    accept(&mut d, 1);
    join_as(&mut d, 1, "r1", "H");
    send(&mut d, 1, ClientMessage::VoiceReady);
    send(&mut d, 1, ClientMessage::Progress { progress: 500.0 });

    disconnect(&mut d, 1);
    assert!(d.room("r1").is_none());

    // Fresh join with the same id: fresh host, no residual state.
    accept(&mut d, 2);
    join_as(&mut d, 2, "r1", "V");
    let room = d.room("r1").unwrap();
    assert!(room.is_host(2));
    assert_eq!(room.member(2).unwrap().progress, 0.0);
    assert_eq!(room.voice_participants().count(), 0);
}

#[test]
fn voice_enable_fan_out_counts() {
    let mut d = driver();
    for id in [1, 2, 3] {
        accept(&mut d, id);
        join_as(&mut d, id, "r1", "m");
    }
    send(&mut d, 1, ClientMessage::VoiceReady);
    send(&mut d, 2, ClientMessage::VoiceReady);

    // Joiner 3 enables voice with existing participants {1, 2}.
    let actions = send(&mut d, 3, ClientMessage::VoiceReady);

    let mut to_joiner = 0;
    let mut to_others = 0;
    for action in &actions {
        if let ServerAction::SendToSession {
            session_id,
            message: ServerMessage::VoiceReady { id },
        } = action
        {
            if *session_id == 3 {
                assert!(*id == 1 || *id == 2);
                to_joiner += 1;
            } else {
                assert_eq!(*id, 3);
                to_others += 1;
            }
        }
    }
    assert_eq!(to_joiner, 2, "one notification per existing participant");
    assert_eq!(to_others, 2, "each existing member hears about the joiner");
}

#[test]
fn setprogress_is_host_only_explicit_seek() {
    let mut d = driver();
    accept(&mut d, 1);
    accept(&mut d, 2);
    join_as(&mut d, 1, "r1", "H");
    join_as(&mut d, 2, "r1", "V");

    let actions = send(&mut d, 2, ClientMessage::SetProgress { progress: 50.0 });
    assert!(actions.is_empty(), "non-host seek ignored");

    let actions = send(&mut d, 1, ClientMessage::SetProgress { progress: 50.0 });
    assert!(matches!(
        &actions[0],
        ServerAction::BroadcastToRoom {
            message: ServerMessage::SetProgress { progress },
            exclude_session: Some(1),
            ..
        } if *progress == 50.0
    ));
}

#[test]
fn identity_reconnection_supersedes_presence() {
    let mut d = driver();
    accept(&mut d, 1);
    send(&mut d, 1, ClientMessage::Join {
        room: "r1".to_string(),
        name: Some("ada".to_string()),
        identity: Some("ada@host".to_string()),
    });
    assert_eq!(d.online_identities(), vec!["ada@host".to_string()]);

    // Same identity reconnects on a new session.
    accept(&mut d, 2);
    send(&mut d, 2, ClientMessage::Join {
        room: "r1".to_string(),
        name: Some("ada".to_string()),
        identity: Some("ada@host".to_string()),
    });

    // The stale session's disconnect must not take the identity offline.
    let actions = disconnect(&mut d, 1);
    assert_eq!(d.online_identities(), vec!["ada@host".to_string()]);
    assert!(
        !actions.iter().any(|a| matches!(
            a,
            ServerAction::BroadcastAll { message: ServerMessage::Presence { .. } }
        )),
        "presence unchanged, so no broadcast"
    );
}

#[test]
fn change_episode_relays_opaque_payload() {
    let mut d = driver();
    accept(&mut d, 1);
    accept(&mut d, 2);
    join_as(&mut d, 1, "r1", "H");
    join_as(&mut d, 2, "r1", "V");

    let payload = serde_json::json!({"series": "s1", "episode": 7});
    let actions = send(&mut d, 1, ClientMessage::ChangeEpisode { payload: payload.clone() });

    assert!(matches!(
        &actions[0],
        ServerAction::BroadcastToRoom {
            message: ServerMessage::ChangeEpisode { payload: p },
            exclude_session: Some(1),
            ..
        } if *p == payload
    ));
}
