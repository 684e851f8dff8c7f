//! Flow Seller Web Server
//!
//! HTTP control surface for the auto-sell engine.

use anyhow::{Context, Result};
use clap::Parser;
use flow_seller::api::{create_app, AppState};
use flow_seller::engine::Engine;
use flow_seller::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow-seller-server")]
#[command(about = "HTTP control API for the flow-driven auto-sell engine")]
#[command(version)]
struct Args {
    /// Address to listen on (overrides BIND_ADDR)
    #[arg(short, long)]
    bind: Option<String>,

    /// More log output (-v info for everything, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,flow_seller=info",
        1 => "info",
        _ => "info,flow_seller=debug",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(args.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut config = Config::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║       FLOW SELLER - CONTROL SERVER                           ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Relay channel: {:<44} ║", if config.relay_enabled() { "ENABLED" } else { "DISABLED" });
    println!("║  Webhook: {:<50} ║", if config.webhook_secret.is_some() { "ENABLED" } else { "DISABLED" });
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind_addr))?;

    let state = AppState::new(config);
    info!("[Server] Sources: {}", state.engine.status().await.sources.join(" -> "));
    let engine = state.engine.clone();
    let app = create_app(state);

    let listener = TcpListener::bind(addr).await?;
    info!("[Server] Listening on http://{}", addr);
    println!("  Control:  POST http://{}/start | POST /stop | GET /status", addr);
    println!("  Webhook:  POST http://{}/webhook", addr);
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(engine))
        .await?;

    Ok(())
}

/// Wait for Ctrl-C, then stop a running engine before the server exits
async fn shutdown_signal(engine: Arc<Engine>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("[Server] Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("[Server] Shutdown requested");
    if engine.is_running().await {
        if let Err(e) = engine.stop().await {
            warn!("[Server] Engine stop failed: {}", e);
        }
    }
}
