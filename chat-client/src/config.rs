//! Client configuration loaded from the environment (and `.env`, if present).

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use url::Url;

use crate::error::{ChatError, Result};

const DEFAULT_API_URL: &str = "http://localhost:5001";
const DEFAULT_SOCKET_URL: &str = "ws://localhost:5001";
const DEFAULT_NAMESPACE: &str = "/chat";
const DEFAULT_RECONNECT_SECS: u64 = 3;

/// Window inside which two identical inbound messages count as one
pub const DUPLICATE_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST backend (chat, listing, and review stores).
    /// Env: `REUSEU_API_URL`
    pub api_base_url: Url,

    /// Base URL of the realtime relay, without the namespace.
    /// Env: `REUSEU_SOCKET_URL` (build-time value wins over runtime)
    pub socket_url: Url,

    /// Env: `REUSEU_CHAT_NAMESPACE`
    pub namespace: String,

    /// Delay between reconnect attempts.
    /// Env: `REUSEU_RECONNECT_SECS`
    pub reconnect_delay: Duration,

    pub duplicate_window: Duration,

    /// Directory for rolling log files; stdout only when unset.
    /// Env: `REUSEU_LOG_DIR`
    pub log_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(api_base_url: &str, socket_url: &str) -> Result<Self> {
        Ok(Self {
            api_base_url: parse_url("api", api_base_url, &["http", "https"])?,
            socket_url: parse_url("socket", socket_url, &["ws", "wss"])?,
            namespace: DEFAULT_NAMESPACE.to_string(),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_SECS),
            duplicate_window: DUPLICATE_WINDOW,
            log_dir: None,
        })
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        // Priority: build-time env -> runtime env -> default
        let build_time_socket = option_env!("REUSEU_SOCKET_URL");
        let runtime_socket = std::env::var("REUSEU_SOCKET_URL").ok();
        let socket_url = build_time_socket
            .map(String::from)
            .or(runtime_socket)
            .unwrap_or_else(|| DEFAULT_SOCKET_URL.to_string());

        let api_url =
            std::env::var("REUSEU_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let mut config = Self::new(&api_url, &socket_url)?;

        if let Ok(namespace) = std::env::var("REUSEU_CHAT_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Ok(raw) = std::env::var("REUSEU_RECONNECT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                ChatError::Config(format!("REUSEU_RECONNECT_SECS is not a number: {}", raw))
            })?;
            config.reconnect_delay = Duration::from_secs(secs.max(1));
        }
        config.log_dir = std::env::var("REUSEU_LOG_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        info!(
            api = %config.api_base_url,
            socket = %config.socket_endpoint(),
            "Loaded chat client configuration"
        );

        Ok(config)
    }

    /// Full WebSocket URL of the chat namespace
    pub fn socket_endpoint(&self) -> String {
        join_path(self.socket_url.as_str(), &self.namespace)
    }

    /// Absolute URL for a REST path, preserving any prefix on the base URL
    pub fn api_endpoint(&self, path: &str) -> String {
        join_path(self.api_base_url.as_str(), path)
    }
}

fn parse_url(label: &str, raw: &str, schemes: &[&str]) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ChatError::Config(format!("invalid {} url '{}': {}", label, raw, e)))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ChatError::Config(format!(
            "{} url '{}' must use one of {:?}",
            label, raw, schemes
        )));
    }
    Ok(url)
}

fn join_path(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_endpoint_appends_namespace() {
        let config = ClientConfig::new("http://localhost:5001", "ws://localhost:5001").unwrap();
        assert_eq!(config.socket_endpoint(), "ws://localhost:5001/chat");
    }

    #[test]
    fn test_api_endpoint_keeps_prefix() {
        let config =
            ClientConfig::new("https://market.example.edu/backend/", "wss://market.example.edu")
                .unwrap();
        assert_eq!(
            config.api_endpoint("/api/chats"),
            "https://market.example.edu/backend/api/chats"
        );
    }

    #[test]
    fn test_rejects_wrong_scheme() {
        assert!(matches!(
            ClientConfig::new("ws://localhost:5001", "ws://localhost:5001"),
            Err(ChatError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::new("http://localhost:5001", "http://localhost:5001"),
            Err(ChatError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_garbage_url() {
        assert!(ClientConfig::new("not a url", "ws://localhost:5001").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new(DEFAULT_API_URL, DEFAULT_SOCKET_URL).unwrap();
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.duplicate_window, Duration::from_secs(2));
        assert!(config.log_dir.is_none());
    }
}
