//! gatelink-core — wire types and configuration for the gateway protocol.
//!
//! # Overview
//!
//! Gatelink is a client for an agent-orchestration gateway speaking JSON text
//! frames over WebSocket. The core crate defines:
//!
//! - [`Frame`] — the tagged frame union (`req` / `res` / `event`)
//! - [`ConnectParams`] / [`HelloOk`] — the auth handshake payloads
//! - [`GatewayError`] — the caller-facing error taxonomy
//! - [`GatewayConfig`] — environment-driven configuration

pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use frame::{EventFrame, Frame, RemoteError, RequestFrame, ResponseFrame};
pub use handshake::{ConnectParams, HelloOk, PROTOCOL_VERSION};
