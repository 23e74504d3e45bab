//! The socket-open seam.
//!
//! Connection establishment goes through a trait so tests can substitute
//! counting or failing dialers and assert, e.g., that a misconfigured client
//! never attempts the network.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use gatelink_core::error::GatewayError;

/// The concrete stream type the socket task owns.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the raw WebSocket to the gateway.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
#[async_trait]
pub trait GatewayDialer: Send + Sync + 'static {
    /// Open a socket to `url`. Auth happens later, in the connect handshake;
    /// this is purely the transport-level open.
    async fn dial(&self, url: &str) -> Result<WsStream, GatewayError>;
}

/// Production dialer backed by `tokio_tungstenite::connect_async`.
#[derive(Default)]
pub struct TungsteniteDialer;

#[async_trait]
impl GatewayDialer for TungsteniteDialer {
    async fn dial(&self, url: &str) -> Result<WsStream, GatewayError> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;
        Ok(stream)
    }
}
