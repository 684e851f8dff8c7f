//! Flow Seller CLI
//!
//! Runs the auto-sell engine in-process without the HTTP server.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flow_seller::engine::{CooldownScope, Engine, EngineConfigRequest, EngineDeps, VolumeMode};
use flow_seller::services::Counters;
use flow_seller::Config;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "flow-seller")]
#[command(about = "Sell into net buy flow across a pool of accounts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine and run until Ctrl-C
    Run {
        /// Mint address of the asset to sell
        #[arg(short, long)]
        asset: String,

        /// File with one credential per line (base58 or byte array)
        #[arg(short, long)]
        keys_file: PathBuf,

        /// Flow window and analysis period in seconds
        #[arg(short, long)]
        window_seconds: Option<u64>,

        /// Minimum net USD flow before selling (default: any positive flow)
        #[arg(long)]
        min_net_flow_usd: Option<f64>,

        /// Share of net flow to sell per trigger
        #[arg(long)]
        sell_fraction: Option<f64>,

        /// Minimum seconds between triggers
        #[arg(short, long)]
        cooldown_seconds: Option<u64>,

        #[arg(long)]
        slippage_bps: Option<u16>,

        /// Apply the cooldown per account instead of globally
        #[arg(long)]
        per_account_cooldown: bool,

        /// Accumulate volumes across cycles instead of recomputing the window
        #[arg(long)]
        cumulative: bool,
    },
}

/// Credentials from a keys file, skipping blank lines and `#` comments
fn read_credentials(path: &Path) -> Result<Vec<String>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read keys file {}", path.display()))?;
    Ok(parse_credentials(&contents))
}

fn parse_credentials(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env();

    match cli.command {
        Commands::Run {
            asset,
            keys_file,
            window_seconds,
            min_net_flow_usd,
            sell_fraction,
            cooldown_seconds,
            slippage_bps,
            per_account_cooldown,
            cumulative,
        } => {
            let credentials = read_credentials(&keys_file)?;
            if credentials.is_empty() {
                bail!("no credentials found in {}", keys_file.display());
            }

            let request = EngineConfigRequest {
                asset: Some(asset),
                window_seconds,
                min_net_flow_usd,
                sell_fraction,
                cooldown_seconds,
                slippage_bps,
                cooldown_scope: per_account_cooldown.then_some(CooldownScope::PerAccount),
                volume_mode: cumulative.then_some(VolumeMode::Cumulative),
                ..Default::default()
            };
            let engine_config = request.into_config(config.balance_refresh_seconds)?;
            let period = Duration::from_secs(engine_config.window_seconds);

            let engine = Engine::new(EngineDeps::from_config(&config, Counters::new()));
            let summary = engine.start(engine_config, credentials).await?;
            info!(
                "[CLI] Run {} started with {} accounts ({} credentials rejected)",
                summary.run_id,
                summary.accounts.len(),
                summary.rejected_credentials
            );

            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => log_status(&engine).await,
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            let stopped = engine.stop().await?;
            info!(
                "[CLI] Stopped after {}s, sold {:.4} tokens (${:.2})",
                stopped.ran_for_seconds, stopped.total_sold_tokens, stopped.total_sold_usd
            );
        }
    }

    Ok(())
}

async fn log_status(engine: &Engine) {
    let status = engine.status().await;
    let Some(metrics) = status.metrics else {
        return;
    };
    let held: f64 = status.per_account_status.iter().map(|a| a.token_balance).sum();
    info!(
        "[CLI] buy=${:.2} sell=${:.2} net=${:.2} price={} held={:.4} last={:?}",
        metrics.buy_volume_usd(),
        metrics.sell_volume_usd(),
        metrics.net_usd_flow(),
        metrics
            .current_price_usd
            .map(|p| format!("${:.6}", p))
            .unwrap_or_else(|| "-".to_string()),
        held,
        status.last_cycle
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_file_skips_blanks_and_comments() {
        let contents = "# pool A\nkey-one\n\n   \n  key-two  \n#key-three\n[1,2,3]\n";
        assert_eq!(parse_credentials(contents), vec!["key-one", "key-two", "[1,2,3]"]);
    }
}
