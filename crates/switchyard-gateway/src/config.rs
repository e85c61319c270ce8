//! Gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Largest request body the gateway will buffer (4 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Configuration for one gateway listener.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `3000`, `0` for auto-assign).
    pub port: u16,
    /// The single endpoint path sessions are served on (default `"/mcp"`).
    pub path: String,
    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
    /// How long `stop()` waits for in-flight exchanges once channels are drained.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            path: "/mcp".into(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            shutdown_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("endpoint path must start with '/': {0:?}")]
    RelativePath(String),
    #[error("endpoint path must be a literal path without captures or wildcards: {0:?}")]
    PatternPath(String),
    #[error("max_body_bytes must be greater than zero")]
    ZeroBodyLimit,
}

impl ServerConfig {
    /// Check the config before it reaches the router, which panics on bad paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::RelativePath(self.path.clone()));
        }
        let has_pattern = self.path.contains(['{', '}'])
            || self
                .path
                .split('/')
                .any(|segment| segment.starts_with(':') || segment.starts_with('*'));
        if has_pattern {
            return Err(ConfigError::PatternPath(self.path.clone()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
