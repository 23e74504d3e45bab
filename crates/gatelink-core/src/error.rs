//! Client-side error taxonomy.

use thiserror::Error;

use crate::frame::RemoteError;

/// Errors that can surface from a gateway client operation.
///
/// Cloneable on purpose: coalesced callers sharing one underlying RPC all
/// receive the same terminal outcome.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No token or password configured — raised before any network attempt.
    #[error("no gateway credentials configured (set GATEWAY_TOKEN or GATEWAY_PASSWORD)")]
    AuthMissing,

    /// Socket-level failure during open or handshake.
    #[error("gateway connect failed: {0}")]
    Connect(String),

    /// No matching response arrived within the caller's timeout.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The gateway answered `ok:false`; code and message pass through.
    #[error("gateway error {0}")]
    Gateway(RemoteError),

    /// The socket dropped while the request was outstanding.
    #[error("connection closed: {0}")]
    Closed(String),

    /// A local encode/decode failure the caller must see (outbound frames,
    /// typed payload deserialization). Inbound garbage never takes this path;
    /// it is dropped at the read boundary.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Returns `true` if this error is transient and a caller-level retry of
    /// the same operation could succeed. The client itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Timeout { .. } | Self::Closed(_)
        )
    }

    /// Returns `true` for the timeout outcome specifically; presentation
    /// layers allow-list this one.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Stable error code for presentation-layer mapping.
    pub fn code(&self) -> &str {
        match self {
            Self::AuthMissing => "AUTH_MISSING",
            Self::Connect(_) => "CONNECT_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Gateway(err) => &err.code,
            Self::Closed(_) => "CONNECTION_CLOSED",
            Self::Protocol(_) => "PROTOCOL",
        }
    }
}

impl From<RemoteError> for GatewayError {
    fn from(err: RemoteError) -> Self {
        Self::Gateway(err)
    }
}
