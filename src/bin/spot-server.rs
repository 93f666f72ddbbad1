//! # spot-server - Spot Analysis Server
//!
//! Runs inside the bridge container and answers queries from one
//! [`SpotClient`](spotbridge::SpotClient) at a time using Spot's
//! command-line tools.
//!
//! ```text
//! ┌──────────────────────────────── container ─────────────────────────────┐
//! │  spot-server ADDRESS PORT                                              │
//! │  ├─► listen on ADDRESS:PORT (length-framed JSON)                       │
//! │  ├─► route spot.* queries ──► ltlfilt / ltl2tgba / randltl             │
//! │  └─► SIGINT ──► exit 0                                                 │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! spot-server            # * 7159
//! spot-server 0.0.0.0 40123
//! RUST_LOG=debug spot-server
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use spotbridge::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_SERVER_PORT};
use spotbridge::engine::SpotCli;
use spotbridge::server::{ResponseRouter, Server};
use spotbridge::transport::{TransportContext, resolve_bind_addr};

/// Exit code for startup failures (bind, address resolution).
const EXIT_STARTUP_FAILED: u8 = 1;

/// Exit code when logging cannot be initialized.
const EXIT_INIT_FAILED: u8 = 2;

/// Serve Spot queries over the bridge protocol.
#[derive(Debug, Parser)]
#[command(name = "spot-server", version)]
struct Args {
    /// Address to bind; `*` binds all interfaces.
    #[arg(default_value = DEFAULT_BIND_ADDRESS)]
    address: String,

    /// Port to bind.
    #[arg(default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
        return ExitCode::from(EXIT_INIT_FAILED);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %args.address,
        port = args.port,
        "spot-server starting"
    );

    match run(args).await {
        Ok(()) => {
            info!("spot-server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "spot-server failed");
            ExitCode::from(EXIT_STARTUP_FAILED)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let addr = resolve_bind_addr(&args.address, args.port)
        .await
        .with_context(|| format!("cannot resolve bind address '{}'", args.address))?;

    let ctx = TransportContext::new();
    let router = ResponseRouter::new(Arc::new(SpotCli::new()));
    let server = Server::bind(&ctx, addr, router)
        .await
        .context("failed to start server")?;

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
            info!("received SIGINT, shutting down");
        })
        .await?;

    Ok(())
}
