//! Medical practice patient portal (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                 PATIENT PORTAL                   │
//!                        │                                                  │
//!   Patient / viewer     │  ┌────────┐   ┌──────────┐   ┌───────────────┐   │
//!   ─────────────────────┼─▶│  http  │──▶│  portal  │──▶│  share_links  │   │
//!                        │  │ server │   │ handlers │   └───────┬───────┘   │
//!   Staff (Bearer key)   │  │        │   ├──────────┤           │           │
//!   ─────────────────────┼─▶│        │──▶│  staff   │──┐        ▼           │   ┌──────────┐
//!                        │  └────────┘   │ handlers │  └──▶┌──────────┐─────┼──▶│   data   │
//!                        │       │       └──────────┘      │ backend  │     │   │ platform │
//!                        │       ▼                         └──────────┘     │   └──────────┘
//!                        │  ┌──────────────────────────┐   ┌──────────┐     │   ┌──────────┐
//!                        │  │ security: rate limit,    │   │ imaging  │─────┼──▶│  DICOM   │
//!                        │  │ validators, hashing      │   └──────────┘     │   │  server  │
//!                        │  └──────────────────────────┘                    │   └──────────┘
//!                        │  ┌──────────────────────────────────────────┐    │
//!                        │  │ config │ audit │ observability │ lifecycle│    │
//!                        │  └──────────────────────────────────────────┘    │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use medical_portal::backend::SupabaseClient;
use medical_portal::config::load_config;
use medical_portal::lifecycle::{shutdown_signal, Shutdown};
use medical_portal::observability::{logging, metrics};
use medical_portal::{AppState, HttpServer};

#[derive(Parser)]
#[command(name = "medical-portal")]
#[command(about = "Patient portal for medical study results", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "medical-portal starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        public_base_url = %config.listener.public_base_url,
        imaging_enabled = config.imaging.url.is_some(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let backend = SupabaseClient::new(
        &config.backend,
        Duration::from_secs(config.timeouts.backend_secs),
    )?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let state = AppState::new(config, Arc::new(backend))?;
    let server = HttpServer::new(state);

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
