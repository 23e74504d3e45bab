//! Connection ownership and lifecycle.
//!
//! One manager owns at most one live socket. The socket is dialed lazily on
//! the first caller, authenticated via the `connect` handshake, then handed to
//! a background task that owns the stream exclusively: a `tokio::select!`
//! loop over the outbound command channel and the inbound stream. On close
//! or error the task sweeps all pending requests, notifies
//! session listeners, and the manager re-dials lazily on the next caller —
//! there is no background reconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use gatelink_core::config::GatewayConfig;
use gatelink_core::error::GatewayError;
use gatelink_core::frame::{Frame, RequestFrame};
use gatelink_core::handshake::{ConnectParams, HelloOk};

use crate::correlator::RequestCorrelator;
use crate::dialer::{GatewayDialer, WsStream};
use crate::registry::SharedClientRegistry;
use crate::router::EventRouter;

/// Deadline for the `connect` request on a fresh socket.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of the managed socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Commands from callers to the socket task.
enum SocketCommand {
    Send(String),
    Close,
}

/// Cheap cloneable sender onto the live socket.
///
/// Holding a handle does not pin the connection open; it turns into `Closed`
/// errors once the socket task exits.
#[derive(Clone)]
pub struct ConnectionHandle {
    outbound: mpsc::UnboundedSender<SocketCommand>,
    alive: Arc<AtomicBool>,
    hello: Arc<HelloOk>,
}

impl ConnectionHandle {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// The decoded `hello-ok` snapshot from this connection's handshake.
    pub fn hello(&self) -> &HelloOk {
        &self.hello
    }

    /// Encode and queue one frame for sending.
    pub fn send(&self, frame: &Frame) -> Result<(), GatewayError> {
        let text = frame
            .encode()
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;
        if !self.is_alive() {
            return Err(GatewayError::Closed("socket is down".into()));
        }
        self.outbound
            .send(SocketCommand::Send(text))
            .map_err(|_| GatewayError::Closed("socket task exited".into()))
    }
}

/// Epoch-stamped state cell. A socket task that outlives its connection must
/// not clobber the state of a newer one, so writes carry the epoch of the
/// connection attempt they belong to and stale writes lose.
struct StateCell {
    inner: Mutex<(u64, ConnectionState)>,
}

impl StateCell {
    fn new() -> Self {
        Self {
            inner: Mutex::new((0, ConnectionState::Disconnected)),
        }
    }

    fn set(&self, epoch: u64, state: ConnectionState) {
        let mut inner = self.inner.lock().unwrap();
        if epoch >= inner.0 {
            *inner = (epoch, state);
        }
    }

    fn get(&self) -> ConnectionState {
        self.inner.lock().unwrap().1
    }
}

/// Owns the single shared socket; every caller funnels through here.
pub struct ConnectionManager {
    config: GatewayConfig,
    dialer: Arc<dyn GatewayDialer>,
    correlator: Arc<RequestCorrelator>,
    registry: Arc<SharedClientRegistry>,
    // Async mutex: held across dial + handshake so concurrent cold-start
    // callers share one attempt instead of racing N sockets.
    slot: tokio::sync::Mutex<Option<ConnectionHandle>>,
    state: Arc<StateCell>,
    epoch: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        config: GatewayConfig,
        dialer: Arc<dyn GatewayDialer>,
        correlator: Arc<RequestCorrelator>,
        registry: Arc<SharedClientRegistry>,
    ) -> Self {
        Self {
            config,
            dialer,
            correlator,
            registry,
            slot: tokio::sync::Mutex::new(None),
            state: Arc::new(StateCell::new()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Return the live connection, establishing it if necessary.
    ///
    /// Credential absence fails here, before any network attempt.
    pub async fn connection(&self) -> Result<ConnectionHandle, GatewayError> {
        self.config.require_credentials()?;

        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            if handle.is_alive() {
                return Ok(handle.clone());
            }
            *slot = None;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        self.state.set(epoch, ConnectionState::Connecting);
        match self.establish(epoch).await {
            Ok(handle) => {
                self.state.set(epoch, ConnectionState::Connected);
                *slot = Some(handle.clone());
                Ok(handle)
            }
            Err(err) => {
                self.state.set(epoch, ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    /// Tear down the live socket, if any. Pending requests get the
    /// connection-closed sweep; the next caller re-establishes lazily.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.take() {
            let _ = handle.outbound.send(SocketCommand::Close);
        }
    }

    async fn establish(&self, epoch: u64) -> Result<ConnectionHandle, GatewayError> {
        tracing::info!(url = %self.config.url, "connecting to gateway");
        let ws = self.dialer.dial(&self.config.url).await?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<SocketCommand>();
        let alive = Arc::new(AtomicBool::new(true));
        let router = EventRouter::new(Arc::clone(&self.registry));
        tokio::spawn(socket_task(
            ws,
            outbound_rx,
            Arc::clone(&self.correlator),
            Arc::clone(&self.registry),
            router,
            Arc::clone(&alive),
            Arc::clone(&self.state),
            epoch,
        ));

        let hello = self.handshake(&outbound_tx).await?;
        tracing::info!(
            server = %hello.server.version,
            conn_id = %hello.server.conn_id,
            protocol = hello.protocol,
            "gateway handshake complete"
        );

        Ok(ConnectionHandle {
            outbound: outbound_tx,
            alive,
            hello: Arc::new(hello),
        })
    }

    /// First request on a fresh socket must be `connect`; the connection is
    /// unusable until its response arrives.
    async fn handshake(
        &self,
        outbound: &mpsc::UnboundedSender<SocketCommand>,
    ) -> Result<HelloOk, GatewayError> {
        let params = serde_json::to_value(ConnectParams::operator(&self.config))
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;
        let request = RequestFrame::new("connect", Some(params));
        let id = request.id.clone();
        let text = Frame::Req(request)
            .encode()
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;

        let rx = self.correlator.register(&id);
        if outbound.send(SocketCommand::Send(text)).is_err() {
            self.correlator.discard(&id);
            return Err(GatewayError::Connect(
                "socket closed before handshake".into(),
            ));
        }

        let payload = match self.correlator.wait(&id, rx, HANDSHAKE_TIMEOUT).await {
            Ok(payload) => payload,
            // Remote rejection (bad credentials, protocol mismatch) surfaces
            // with its own code; transport-level failures map to Connect.
            Err(err @ GatewayError::Gateway(_)) => return Err(err),
            Err(GatewayError::Timeout { .. }) => {
                return Err(GatewayError::Connect("handshake timed out".into()))
            }
            Err(GatewayError::Closed(reason)) => {
                return Err(GatewayError::Connect(format!(
                    "socket closed during handshake: {reason}"
                )))
            }
            Err(err) => return Err(err),
        };

        serde_json::from_value(payload)
            .map_err(|e| GatewayError::Protocol(format!("invalid hello-ok payload: {e}")))
    }
}

/// Background task that exclusively owns the WebSocket stream.
#[allow(clippy::too_many_arguments)]
async fn socket_task(
    ws: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<SocketCommand>,
    correlator: Arc<RequestCorrelator>,
    registry: Arc<SharedClientRegistry>,
    router: EventRouter,
    alive: Arc<AtomicBool>,
    state: Arc<StateCell>,
    epoch: u64,
) {
    let (mut sink, mut stream) = ws.split();

    let reason: String = loop {
        tokio::select! {
            cmd = outbound_rx.recv() => {
                match cmd {
                    None | Some(SocketCommand::Close) => break "closed by client".into(),
                    Some(SocketCommand::Send(text)) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break "send failed".into();
                        }
                    }
                }
            }
            next = stream.next() => {
                match next {
                    None => break "socket closed".into(),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "socket receive error");
                        break format!("socket error: {e}");
                    }
                    Some(Ok(Message::Text(text))) => {
                        dispatch_frame(text.as_str(), &correlator, &router);
                    }
                    Some(Ok(Message::Close(_))) => break "close frame received".into(),
                    // Ping/pong handled by tungstenite; binary is not part of
                    // the protocol.
                    Some(Ok(_)) => {}
                }
            }
        }
    };

    tracing::info!(reason, "gateway connection down");
    alive.store(false, Ordering::Release);
    state.set(epoch, ConnectionState::Disconnected);
    // Synchronously fail everything still waiting on this socket.
    correlator.sweep(&reason);
    registry.notify_closed(&reason);
}

/// One inbound text frame: `res` frames settle waiters, `event` frames fan
/// out, anything else is dropped at this boundary.
fn dispatch_frame(text: &str, correlator: &RequestCorrelator, router: &EventRouter) {
    let Some(frame) = Frame::decode(text) else {
        return;
    };
    match frame {
        Frame::Res(res) => correlator.settle(res),
        Frame::Event(ev) => router.route(ev),
        Frame::Req(req) => {
            tracing::debug!(method = %req.method, "ignoring server-initiated request");
        }
    }
}
