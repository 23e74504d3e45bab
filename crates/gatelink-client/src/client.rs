//! The public façade the rest of the application calls.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use gatelink_core::config::GatewayConfig;
use gatelink_core::error::GatewayError;
use gatelink_core::frame::{Frame, RequestFrame};
use gatelink_core::handshake::HelloOk;

use crate::connection::{ConnectionManager, ConnectionState};
use crate::correlator::RequestCorrelator;
use crate::dialer::{GatewayDialer, TungsteniteDialer};
use crate::registry::{SessionHandle, SharedClientRegistry};

/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway protocol client.
///
/// One instance per process shares a single socket across arbitrarily many
/// concurrent callers: HTTP handlers issue [`call`](Self::call), SSE bridges
/// hold [`acquire`](Self::acquire) handles. Cloning is cheap and all clones
/// share the same connection.
#[derive(Clone)]
pub struct GatewayClient {
    manager: Arc<ConnectionManager>,
    correlator: Arc<RequestCorrelator>,
    registry: Arc<SharedClientRegistry>,
}

impl GatewayClient {
    /// Build a client with the production WebSocket dialer.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_dialer(config, Arc::new(TungsteniteDialer))
    }

    /// Build a client with an injected dialer (tests, instrumentation).
    pub fn with_dialer(config: GatewayConfig, dialer: Arc<dyn GatewayDialer>) -> Self {
        let correlator = Arc::new(RequestCorrelator::new());
        let registry = Arc::new(SharedClientRegistry::new());
        let manager = Arc::new(ConnectionManager::new(
            config,
            dialer,
            Arc::clone(&correlator),
            Arc::clone(&registry),
        ));
        Self {
            manager,
            correlator,
            registry,
        }
    }

    /// Issue one RPC and deserialize its payload.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<T, GatewayError> {
        let payload = self.call_value(method, params, timeout).await?;
        serde_json::from_value(payload).map_err(|e| GatewayError::Protocol(e.to_string()))
    }

    /// Issue one RPC, returning the raw JSON payload.
    pub async fn call_value(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, GatewayError> {
        let timeout = timeout.unwrap_or(DEFAULT_CALL_TIMEOUT);
        let connection = self.manager.connection().await?;

        let request = RequestFrame::new(method, params);
        let id = request.id.clone();
        let rx = self.correlator.register(&id);
        if let Err(err) = connection.send(&Frame::Req(request)) {
            self.correlator.discard(&id);
            return Err(err);
        }
        self.correlator.wait(&id, rx, timeout).await
    }

    /// Session-scoped variant of [`call_value`](Self::call_value) that
    /// coalesces concurrent identical calls into one RPC — many viewers of
    /// the same session re-fetching the same state cost the backend one
    /// request.
    pub async fn call_shared(
        &self,
        session_key: &str,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, GatewayError> {
        self.registry
            .coalesce(
                session_key,
                method,
                &params,
                self.call_value(method, Some(params.clone()), timeout),
            )
            .await
    }

    /// Subscribe to the event stream for one session. Ensures the connection
    /// is up, then registers a refcounted listener; drop or
    /// [`release`](SessionHandle::release) the handle when the consumer goes
    /// away.
    pub async fn acquire(&self, session_key: &str) -> Result<SessionHandle, GatewayError> {
        self.manager.connection().await?;
        Ok(self.registry.acquire(session_key))
    }

    /// Health probe: establishes the connection (and handshake) without
    /// issuing a business RPC.
    pub async fn connect_check(&self) -> Result<(), GatewayError> {
        self.manager.connection().await.map(|_| ())
    }

    /// Connect if needed and return the server's handshake snapshot.
    pub async fn server_info(&self) -> Result<HelloOk, GatewayError> {
        Ok(self.manager.connection().await?.hello().clone())
    }

    /// Current lifecycle state of the managed socket.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Tear down the socket; the next caller reconnects lazily.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}
