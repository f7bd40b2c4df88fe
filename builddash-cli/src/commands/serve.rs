//! HTTP server command

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;

use builddash_server::{run_server, AppState, ServerConfig};

use crate::config::load_settings;

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(long, short = 'b', default_value = "127.0.0.1:8000", env = "BUILDDASH_BIND")]
    pub bind: SocketAddr,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,
}

/// Run the HTTP server until Ctrl+C / SIGTERM
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let settings = load_settings()?;

    let state = AppState::from_settings(&settings)
        .await
        .context("Failed to initialize application state")?;

    let config = ServerConfig {
        bind_addr: args.bind,
        cors_permissive: args.cors_permissive,
    };

    tracing::info!("Starting builddash server on {}", args.bind);
    run_server(state, config).await.context("Server error")?;

    Ok(())
}
