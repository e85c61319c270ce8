//! # switchyard
//!
//! Gateway binary: parses flags, starts logging, serves sessions until
//! Ctrl-C, then drains them.

mod cli;
mod engine;

use anyhow::{Context, Result};
use clap::Parser;
use switchyard_core::session_factory;
use switchyard_gateway::Gateway;
use switchyard_telemetry::init_telemetry;

use crate::cli::Cli;
use crate::engine::BasicEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_telemetry(&args.telemetry_config()).context("Failed to initialize logging")?;

    let config = args.server_config()?;
    let gateway = Gateway::new(config, session_factory(BasicEngine::default))
        .context("Invalid gateway configuration")?;
    let addr = gateway.start().await.context("Failed to start gateway")?;
    tracing::info!(%addr, path = %gateway.config().path, "switchyard ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!(sessions = gateway.registry().len(), "shutting down");
    gateway.stop().await;
    Ok(())
}
