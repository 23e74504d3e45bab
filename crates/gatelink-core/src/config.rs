//! Environment-driven client configuration.

use std::collections::HashMap;
use std::env;

use crate::error::GatewayError;

/// Default gateway endpoint when `GATEWAY_URL` is unset.
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:18789";

/// Default scope requested when `GATEWAY_SCOPES` is unset.
pub const DEFAULT_SCOPE: &str = "operator.admin";

/// Default client identity string.
pub const DEFAULT_CLIENT_ID: &str = "gateway-client";

/// Resolved configuration for one gateway client instance.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:18789`.
    pub url: String,
    /// Bearer token credential.
    pub token: Option<String>,
    /// Password credential; token wins when both are set.
    pub password: Option<String>,
    /// Scopes requested in the connect handshake.
    pub scopes: Vec<String>,
    /// Client identity string presented to the gateway.
    pub client_id: String,
}

impl GatewayConfig {
    /// Read configuration from the process environment.
    ///
    /// Never fails: credential absence is detected later by
    /// [`require_credentials`](Self::require_credentials) so callers that
    /// only inspect config (CLI usage output, tests) can construct one.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from an explicit map.
    /// Lets tests exercise config resolution without mutating process env.
    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let scopes = non_empty(lookup("GATEWAY_SCOPES"))
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]);

        Self {
            url: non_empty(lookup("GATEWAY_URL")).unwrap_or_else(|| DEFAULT_GATEWAY_URL.into()),
            token: non_empty(lookup("GATEWAY_TOKEN")),
            password: non_empty(lookup("GATEWAY_PASSWORD")),
            scopes,
            client_id: non_empty(lookup("GATEWAY_CLIENT_ID"))
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.into()),
        }
    }

    /// Fail fast when no credential is configured. Checked before any socket
    /// attempt so a misconfigured deployment errors immediately instead of
    /// opening a connection the gateway will reject.
    pub fn require_credentials(&self) -> Result<(), GatewayError> {
        if self.token.is_none() && self.password.is_none() {
            return Err(GatewayError::AuthMissing);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = GatewayConfig::from_map(&vars(&[]));
        assert_eq!(cfg.url, DEFAULT_GATEWAY_URL);
        assert_eq!(cfg.scopes, vec![DEFAULT_SCOPE.to_string()]);
        assert_eq!(cfg.client_id, DEFAULT_CLIENT_ID);
        assert!(cfg.require_credentials().is_err());
    }

    #[test]
    fn scopes_split_and_trimmed() {
        let cfg = GatewayConfig::from_map(&vars(&[
            ("GATEWAY_TOKEN", "tok"),
            ("GATEWAY_SCOPES", "operator.read, operator.write ,"),
        ]));
        assert_eq!(cfg.scopes, vec!["operator.read", "operator.write"]);
        assert!(cfg.require_credentials().is_ok());
    }

    #[test]
    fn empty_token_counts_as_missing() {
        let cfg = GatewayConfig::from_map(&vars(&[("GATEWAY_TOKEN", "  ")]));
        assert!(matches!(
            cfg.require_credentials(),
            Err(GatewayError::AuthMissing)
        ));
    }

    #[test]
    fn password_alone_satisfies_auth() {
        let cfg = GatewayConfig::from_map(&vars(&[("GATEWAY_PASSWORD", "hunter2")]));
        assert!(cfg.require_credentials().is_ok());
    }
}
