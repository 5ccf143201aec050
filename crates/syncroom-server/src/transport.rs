//! WebSocket transport.
//!
//! Production transport using tokio-tungstenite over plain TCP. Watch-party
//! clients are browsers, so the wire is WebSocket text frames carrying one
//! JSON event each; TLS termination is expected to happen at a fronting
//! proxy. The transport owns connection establishment and framing only;
//! everything above a decoded text message is the driver's business.

use std::net::SocketAddr;

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};

use crate::error::ServerError;

/// Outbound half of an accepted WebSocket connection.
pub type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Inbound half of an accepted WebSocket connection.
pub type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// WebSocket listener.
pub struct WsTransport {
    /// Underlying TCP listener.
    listener: TcpListener,
}

impl WsTransport {
    /// Create and bind a new WebSocket transport.
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("WebSocket transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accept the next connection and perform the WebSocket handshake.
    pub async fn accept(&self) -> Result<WsConnection, ServerError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))?;

        let socket = accept_async(stream)
            .await
            .map_err(|e| ServerError::Transport(format!("handshake with {peer} failed: {e}")))?;

        Ok(WsConnection { socket, peer })
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// An accepted WebSocket connection.
pub struct WsConnection {
    socket: WebSocketStream<TcpStream>,
    peer: SocketAddr,
}

impl WsConnection {
    /// Split into independent send and receive halves.
    ///
    /// The sink goes to a dedicated writer task so broadcasts never block on
    /// a slow reader loop.
    pub fn split(self) -> (WsSink, WsStream) {
        self.socket.split()
    }

    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.peer
    }
}
