//! chat-tunnel
//!
//! HTTP tunnel that relays requests through a chat conversation.
//!
//! # Architecture Overview
//!
//! ```text
//!   HTTP client                                                  Origin
//!       │                                                          ▲
//!       ▼                                                          │
//!  ┌─────────────── ingress ───────────────┐   ┌──────────── egress ────────────┐
//!  │ ingress server → correlation engine   │   │ inbound router → origin fetch  │
//!  │        ▲              │               │   │        ▲              │        │
//!  │        │       pending registry       │   │        │              ▼        │
//!  │ inbound router   outbound dispatcher  │   │ transport    outbound dispatcher│
//!  └────────┼──────────────┼───────────────┘   └────────┼──────────────┼────────┘
//!           │              │   OUT;id;host;payload      │              │
//!           │              └──────────► chat ◄──────────┘              │
//!           └──────────────────────────  chat  ◄───────────────────────┘
//!                                   IN;id;host;payload
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use chat_tunnel::config::loader::load_config;
use chat_tunnel::config::Role;
use chat_tunnel::egress::OriginFetcher;
use chat_tunnel::observability::{logging, metrics};
use chat_tunnel::transport::RelayTransport;
use chat_tunnel::Supervisor;

#[derive(Debug, Parser)]
#[command(name = "chat-tunnel", version, about = "HTTP tunnel over a chat conversation")]
struct Cli {
    /// Which side of the tunnel to run.
    #[arg(long, value_enum)]
    mode: Role,

    /// TOML configuration file; defaults and environment apply without one.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(mode = %cli.mode, "chat-tunnel v{} starting", env!("CARGO_PKG_VERSION"));

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

    let (transport, inbound) = RelayTransport::connect(&config.transport).await?;

    match cli.mode {
        Role::Ingress => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for proxy clients");
            Supervisor::new(config).run_ingress(transport, inbound, listener).await?;
        }
        Role::Egress => {
            let fetcher = Arc::new(OriginFetcher::new(config.egress.clone()));
            Supervisor::new(config).run_egress(transport, inbound, fetcher).await?;
        }
    }

    Ok(())
}
