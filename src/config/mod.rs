//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Port used when neither PORT nor SERVER_ADDR is set
pub const DEFAULT_PORT: u16 = 3001;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS ("*" allows any)
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(
            env::var("PORT").ok(),
            env::var("SERVER_ADDR").ok(),
            env::var("LOG_LEVEL").ok(),
            env::var("CLIENT_ORIGIN").ok(),
        )
    }

    fn from_vars(
        port: Option<String>,
        server_addr: Option<String>,
        log_level: Option<String>,
        client_origin: Option<String>,
    ) -> Result<Self, ConfigError> {
        // PORT wins so hosted platforms can inject it
        let server_addr = match (port, server_addr) {
            (Some(port), _) => format!("0.0.0.0:{}", port.trim()),
            (None, Some(addr)) => addr,
            (None, None) => format!("0.0.0.0:{}", DEFAULT_PORT),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(server_addr))?,
            log_level: log_level.unwrap_or_else(|| "info".to_string()),
            client_origin: client_origin.unwrap_or_else(|| "*".to_string()),
        })
    }

    /// Whether CORS should accept any origin
    pub fn allows_any_origin(&self) -> bool {
        self.client_origin.trim() == "*"
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_port_3001() {
        let config = Config::from_vars(None, None, None, None).unwrap();
        assert_eq!(config.server_addr.port(), DEFAULT_PORT);
        assert_eq!(config.log_level, "info");
        assert!(config.allows_any_origin());
    }

    #[test]
    fn port_overrides_server_addr() {
        let config = Config::from_vars(
            Some("4000".to_string()),
            Some("127.0.0.1:9000".to_string()),
            None,
            None,
        )
        .unwrap();
        assert_eq!(config.server_addr.port(), 4000);
    }

    #[test]
    fn server_addr_used_without_port() {
        let config =
            Config::from_vars(None, Some("127.0.0.1:9000".to_string()), None, None).unwrap();
        assert_eq!(config.server_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn rejects_garbage_port() {
        let err = Config::from_vars(Some("not-a-port".to_string()), None, None, None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress(_)));
    }

    #[test]
    fn explicit_origins_disable_wildcard() {
        let config = Config::from_vars(
            None,
            None,
            Some("debug".to_string()),
            Some("http://localhost:5173".to_string()),
        )
        .unwrap();
        assert!(!config.allows_any_origin());
        assert_eq!(config.log_level, "debug");
    }
}
