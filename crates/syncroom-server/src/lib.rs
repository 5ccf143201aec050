//! Syncroom production server.
//!
//! Watch-party synchronization relay: keeps each room's members in sync on
//! playback position, pause/play state, and episode selection, while
//! relaying chat and peer-to-peer voice-signaling handshakes.
//!
//! # Architecture
//!
//! The [`ServerDriver`] follows the Sans-IO pattern: it consumes
//! [`ServerEvent`]s and returns [`ServerAction`]s without performing any
//! I/O, which makes every protocol rule testable without a socket.
//! [`Server`] is the production runtime that executes those actions over
//! WebSocket connections.
//!
//! All room and presence state is mutated behind one async mutex around the
//! driver, giving the per-room serialization the protocol requires (and
//! more; a single serialization point is plenty at watch-party volumes).
//!
//! # Components
//!
//! - [`ServerDriver`]: action-based orchestrator (pure logic, no I/O)
//! - [`Server`]: production runtime executing driver actions
//! - [`WsTransport`]: WebSocket transport via tokio-tungstenite
//! - [`sync`]: host-authoritative drift-correction protocol
//! - [`voice`]: peer-to-peer voice signaling relay

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod presence;
mod registry;
mod room;
pub mod sync;
mod transport;
pub mod voice;

use std::{collections::HashMap, sync::Arc};

pub use driver::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent};
pub use error::ServerError;
use futures_util::{SinkExt, StreamExt};
pub use presence::PresenceRegistry;
pub use registry::{ConnectionRegistry, ConnectionState};
pub use room::{DEFAULT_NAME, Member, Room, RoomDirectory};
use syncroom_proto::{ClientMessage, ServerMessage, SessionId};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message;
pub use transport::{WsConnection, WsSink, WsStream, WsTransport};

/// Shared state for all connections.
///
/// One unbounded outbound channel per session; a dedicated writer task per
/// connection drains it, so sends are fire-and-forget and a slow client
/// never blocks the driver.
struct SharedState {
    /// Session ID → outbound message channel.
    outbound: RwLock<HashMap<SessionId, mpsc::UnboundedSender<Message>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3001").
    pub bind_address: String,
    /// Driver configuration (limits).
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:3001".to_string(), driver: DriverConfig::default() }
    }
}

/// Production syncroom server.
///
/// Wraps `ServerDriver` with WebSocket transport.
pub struct Server {
    /// The action-based server driver.
    driver: ServerDriver,
    /// WebSocket listener.
    transport: WsTransport,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let driver = ServerDriver::new(config.driver);
        let transport = WsTransport::bind(&config.bind_address).await?;

        Ok(Self { driver, transport })
    }

    /// Run the server, accepting connections and processing messages.
    ///
    /// This method runs until the server is shut down or an error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("server starting on {}", self.transport.local_addr()?);

        let driver = Arc::new(Mutex::new(self.driver));
        let shared = Arc::new(SharedState { outbound: RwLock::new(HashMap::new()) });

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, driver, shared).await {
                            tracing::error!("connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle a single WebSocket connection from accept to teardown.
async fn handle_connection(
    conn: WsConnection,
    driver: Arc<Mutex<ServerDriver>>,
    shared: Arc<SharedState>,
) -> Result<(), ServerError> {
    let session_id = {
        let mut buf = [0u8; 8];
        getrandom::fill(&mut buf)
            .map_err(|e| ServerError::Transport(format!("system RNG failed: {e}")))?;
        u64::from_le_bytes(buf)
    };

    tracing::debug!("new connection from {}: session {}", conn.remote_addr(), session_id);

    let (mut sink, mut stream) = conn.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    {
        let mut outbound = shared.outbound.write().await;
        outbound.insert(session_id, tx);
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id });
        execute_actions(&driver, actions, &shared).await;
    }

    // Admission may have been refused (max connections); the executor then
    // already dropped the outbound route.
    if !shared.outbound.read().await.contains_key(&session_id) {
        return Ok(());
    }

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::decode(text.as_str()) {
                Ok(message) => {
                    let mut driver = driver.lock().await;
                    let actions =
                        driver.process_event(ServerEvent::MessageReceived { session_id, message });
                    execute_actions(&driver, actions, &shared).await;
                },
                Err(e) => {
                    // Malformed payload policy: drop, don't disconnect.
                    tracing::debug!("dropping undecodable message from {}: {}", session_id, e);
                },
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}, // binary/ping/pong: nothing to relay
            Err(e) => {
                tracing::debug!("read error on session {}: {}", session_id, e);
                break;
            },
        }
    }

    {
        let mut outbound = shared.outbound.write().await;
        outbound.remove(&session_id);
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_string(),
        });
        execute_actions(&driver, actions, &shared).await;
    }

    Ok(())
}

/// Execute server actions.
async fn execute_actions(driver: &ServerDriver, actions: Vec<ServerAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, message } => {
                send_to_sessions(shared, &[session_id], &message).await;
            },

            ServerAction::BroadcastToRoom { room_id, message, exclude_session } => {
                let targets: Vec<SessionId> = driver
                    .sessions_in_room(&room_id)
                    .filter(|&id| Some(id) != exclude_session)
                    .collect();
                send_to_sessions(shared, &targets, &message).await;
            },

            ServerAction::BroadcastAll { message } => {
                let targets: Vec<SessionId> = driver.sessions().collect();
                send_to_sessions(shared, &targets, &message).await;
            },

            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!("closing connection {}: {}", session_id, reason);
                // Dropping the outbound route ends the writer task, which
                // closes the socket.
                let mut outbound = shared.outbound.write().await;
                outbound.remove(&session_id);
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
            },
        }
    }
}

/// Encode once, then fan a message out to the given sessions.
///
/// A missing or closed route means the peer disconnected mid-send: the
/// message is simply dropped, per the fire-and-forget contract.
async fn send_to_sessions(shared: &SharedState, targets: &[SessionId], message: &ServerMessage) {
    let text = match message.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("failed to encode outbound message: {}", e);
            return;
        },
    };

    let outbound = shared.outbound.read().await;
    for session_id in targets {
        if let Some(route) = outbound.get(session_id) {
            if route.send(Message::Text(text.clone().into())).is_err() {
                tracing::debug!("send to {} failed: writer gone", session_id);
            }
        }
    }
}
