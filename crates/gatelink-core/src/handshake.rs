//! Connect handshake payloads.
//!
//! The first request on a fresh socket must be `connect`; the connection is
//! not usable until its matching response arrives. Field names are camelCase
//! on the wire (protocol v3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::GatewayConfig;

/// Gateway protocol version this client speaks.
pub const PROTOCOL_VERSION: u32 = 3;

/// Params for the `connect` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub auth: AuthParams,
    pub role: String,
    pub scopes: Vec<String>,
}

impl ConnectParams {
    /// Build handshake params for an operator-role connection from config.
    pub fn operator(config: &GatewayConfig) -> Self {
        Self {
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            client: ClientInfo::from_config(config),
            auth: AuthParams {
                token: config.token.clone(),
                password: config.password.clone(),
            },
            role: "operator".into(),
            scopes: config.scopes.clone(),
        }
    }
}

/// Identity presented in the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub version: String,
    pub platform: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl ClientInfo {
    fn from_config(config: &GatewayConfig) -> Self {
        Self {
            id: config.client_id.clone(),
            display_name: None,
            version: env!("CARGO_PKG_VERSION").into(),
            platform: std::env::consts::OS.into(),
            mode: "backend".into(),
            instance_id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }
}

/// Credentials carried in the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Decoded `hello-ok` payload from a successful handshake response.
///
/// Only the fields the client surfaces are typed; the rest of the snapshot
/// stays as raw JSON so newer gateways can extend it freely.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    pub protocol: u32,
    pub server: ServerInfo,
    #[serde(default)]
    pub features: Option<Value>,
    #[serde(default)]
    pub snapshot: Option<Value>,
}

/// Server identity reported in `hello-ok`.
///
/// Gateways disagree on the casing of the connection id field, so both
/// `connId` and `conn_id` are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub version: String,
    #[serde(default)]
    pub commit: Option<String>,
    pub host: String,
    #[serde(alias = "conn_id")]
    pub conn_id: String,
}
