//! gatelink-client — multiplexing WebSocket client for the gateway protocol.
//!
//! # Features
//! - One shared socket per process, dialed lazily on the first caller
//! - Correlated request/response RPCs with per-call timeouts
//! - Session-scoped event fan-out to refcounted subscribers
//! - Coalescing of identical shared calls (single-flight)
//! - No background reconnect: connections re-establish lazily after a drop

pub mod client;
pub mod connection;
pub mod correlator;
pub mod dialer;
pub mod registry;
pub mod router;

pub use client::{GatewayClient, DEFAULT_CALL_TIMEOUT};
pub use connection::{ConnectionManager, ConnectionState};
pub use correlator::RequestCorrelator;
pub use dialer::{GatewayDialer, TungsteniteDialer};
pub use registry::{SessionEvent, SessionHandle, SharedClientRegistry};
pub use router::EventRouter;
