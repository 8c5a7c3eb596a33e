//! Relay configuration loaded from environment variables.

use std::time::Duration;

const DEFAULT_ADDR: &str = "0.0.0.0:5001";
const DEFAULT_NAMESPACE: &str = "/chat";

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to bind.
    /// Env: `REUSEU_RELAY_ADDR`
    pub addr: String,

    /// WebSocket path clients must connect to.
    /// Env: `REUSEU_RELAY_NAMESPACE`
    pub namespace: String,

    /// Shared bearer token required in `connect` frames. Unset or empty disables the check.
    /// Env: `REUSEU_RELAY_ACCESS_TOKEN`
    pub access_token: Option<String>,

    /// How long a fresh connection may take to send its `connect` frame.
    pub auth_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            access_token: None,
            auth_timeout: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: std::env::var("REUSEU_RELAY_ADDR").unwrap_or(defaults.addr),
            namespace: std::env::var("REUSEU_RELAY_NAMESPACE")
                .map(|ns| normalize_namespace(&ns))
                .unwrap_or(defaults.namespace),
            access_token: std::env::var("REUSEU_RELAY_ACCESS_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            auth_timeout: defaults.auth_timeout,
        }
    }

    /// Whether a handshake request path addresses this relay's namespace
    pub fn accepts_path(&self, path: &str) -> bool {
        normalize_namespace(path) == self.namespace
    }
}

fn normalize_namespace(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.addr, "0.0.0.0:5001");
        assert_eq!(config.namespace, "/chat");
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_accepts_path() {
        let config = RelayConfig::default();
        assert!(config.accepts_path("/chat"));
        assert!(config.accepts_path("/chat/"));
        assert!(!config.accepts_path("/"));
        assert!(!config.accepts_path("/chatter"));
    }

    #[test]
    fn test_normalize_namespace() {
        assert_eq!(normalize_namespace("chat"), "/chat");
        assert_eq!(normalize_namespace("/chat/"), "/chat");
        assert_eq!(normalize_namespace(" /market/chat "), "/market/chat");
    }
}
