//! Token Scout - New Listing Discovery and Filtering Pipeline

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use token_scout::adapters::cli::{CliApp, Command, ScanCmd, WatchCmd};
use token_scout::application::ScanPipeline;
use token_scout::config::load_config;
use token_scout::domain::candidate::TokenCandidate;
use token_scout::domain::strategy::StrategyConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in config.toml)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    init_logging(app.verbose, app.debug);

    match app.command {
        Command::Scan(cmd) => scan_command(cmd).await,
        Command::Watch(cmd) => watch_command(cmd).await,
    }
}

fn init_logging(verbose: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt().with_env_filter(filter).init();
}

async fn scan_command(cmd: ScanCmd) -> Result<()> {
    let config = load_config(&cmd.config).context("Failed to load configuration")?;
    let strategy = load_strategy(&cmd.strategy)?;

    let pipeline =
        ScanPipeline::from_config(&config).context("Failed to build scan pipeline")?;
    let accepted = pipeline
        .scan(&strategy)
        .await
        .context("Discovery round failed")?;
    pipeline.close().await;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&accepted)?);
    } else {
        print_table(&accepted);
    }
    Ok(())
}

async fn watch_command(cmd: WatchCmd) -> Result<()> {
    let mut config = load_config(&cmd.config).context("Failed to load configuration")?;
    if let Some(interval) = cmd.interval {
        config.pipeline.poll_interval_secs = interval.max(1);
    }
    let strategy = load_strategy(&cmd.strategy)?;

    let pipeline = Arc::new(
        ScanPipeline::from_config(&config).context("Failed to build scan pipeline")?,
    );

    let stopper = pipeline.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        stopper.stop().await;
    });

    pipeline
        .watch(&strategy, |accepted| {
            if !accepted.is_empty() {
                print_table(&accepted);
            }
        })
        .await;

    pipeline.close().await;
    tracing::info!("Token Scout stopped");
    Ok(())
}

/// Load a strategy file, falling back to the permissive default when the
/// path does not exist.
fn load_strategy(path: &Path) -> Result<StrategyConfig> {
    if !path.exists() {
        tracing::warn!(
            "Strategy file not found at '{}', using default strategy",
            path.display()
        );
        return Ok(StrategyConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read strategy file '{}'", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse strategy file '{}'", path.display()))
}

fn print_table(accepted: &[TokenCandidate]) {
    println!(
        "{:<44} {:<10} {:>12} {:>12} {:>12} {:>8} {:>6}",
        "ADDRESS", "SYMBOL", "PRICE", "LIQUIDITY", "VOLUME", "AGE(s)", "SCORE"
    );
    for candidate in accepted {
        println!(
            "{:<44} {:<10} {:>12} {:>12} {:>12} {:>8} {:>6}",
            candidate.address,
            candidate.symbol.as_deref().unwrap_or("-"),
            format_num(candidate.price_usd),
            format_num(candidate.liquidity_usd),
            format_num(candidate.volume_usd),
            candidate
                .age_seconds
                .map(|a| format!("{a:.0}"))
                .unwrap_or_else(|| "-".to_string()),
            candidate
                .freshness_score
                .map(|s| format!("{s:.2}"))
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    println!("{} candidate(s) accepted", accepted.len());
}

fn format_num(value: Option<f64>) -> String {
    match value {
        Some(v) if v >= 1000.0 => format!("{v:.0}"),
        Some(v) => format!("{v:.4}"),
        None => "-".to_string(),
    }
}
