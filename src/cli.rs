use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use switchyard_gateway::ServerConfig;
use switchyard_telemetry::{LogFormat, TelemetryConfig};
use tracing::Level;

/// Session-multiplexing JSON-RPC gateway.
#[derive(Parser, Debug)]
#[command(name = "switchyard", about = "Session-multiplexing JSON-RPC gateway")]
pub struct Cli {
    /// Host to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    pub port: Option<u16>,

    /// Endpoint path sessions are served on.
    #[arg(long)]
    pub path: Option<String>,

    /// Largest accepted request body, in bytes.
    #[arg(long)]
    pub max_body_bytes: Option<usize>,

    /// Default log level; `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    pub log_level: Level,

    /// `json` or `pretty`.
    #[arg(long, default_value = "json")]
    pub log_format: LogFormat,

    /// JSON file with a `ServerConfig`; flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level,
            module_levels: Vec::new(),
            format: self.log_format,
        }
    }

    /// File values first, then explicit flags on top.
    pub fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = &self.path {
            config.path = path.clone();
        }
        if let Some(limit) = self.max_body_bytes {
            config.max_body_bytes = limit;
        }
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<ServerConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config: {}", path.display()))
}
