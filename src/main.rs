//! IOL tenor-spread alert bot entry point.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use desarb::auth::{IolTokenExchange, TokenManager};
use desarb::config::Config;
use desarb::engine::PollingEngine;
use desarb::notify::TelegramNotifier;
use desarb::quote::QuoteClient;
use desarb::shutdown::shutdown_signal;

/// IOL t0/t1 tenor-spread (desarbitraje) alert bot.
#[derive(Parser, Debug)]
#[command(name = "desarb")]
#[command(about = "Alerts on t0/t1 settlement-price spreads for BCBA tickers")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the polling loop (default).
    Run,

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("desarb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::Run) | None => cmd_run().await,
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("DESARB - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Market: {}", config.market);
    println!("  Tickers: {}", config.ticker_list().join(", "));
    println!("  Variation Threshold: {}%", config.variation_threshold_pct);
    println!("  Poll Interval: {} min", config.poll_interval_minutes);
    println!("  Fetch Concurrency: {}", config.fetch_concurrency);
    println!("  HTTP Timeout: {} ms", config.http_timeout_ms);
    println!("  IOL API: {}", config.iol_api_url);
    println!("  Telegram Chat: {}", config.telegram_chat_id);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run the polling loop.
async fn cmd_run() -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!("Configuration loaded successfully");
    info!("Market: {}", config.market);
    info!("Tickers: {}", config.ticker_list().join(", "));
    info!("Variation threshold: {}%", config.variation_threshold_pct);
    info!("Poll interval: {} min", config.poll_interval_minutes);

    // One pooled client for token, quote, and Telegram traffic. The
    // per-request timeout keeps a stalled call from stalling the cycle.
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .connect_timeout(Duration::from_millis(1500))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?;

    let exchange = IolTokenExchange::new(http.clone(), config.iol_token_url.clone());
    let tokens = Arc::new(TokenManager::new(
        Arc::new(exchange),
        config.iol_username.clone(),
        config.iol_password.clone(),
    ));

    // Nothing useful can run without a starting credential: fatal on failure.
    info!("Authenticating against IOL...");
    tokens.acquire().await.map_err(|e| {
        error!("Initial authentication failed: {}", e);
        anyhow::anyhow!("Initial authentication failed: {}", e)
    })?;
    info!("Authenticated");

    let quotes = Arc::new(QuoteClient::from_config(&config, http.clone(), tokens));
    let notifier = Arc::new(TelegramNotifier::from_config(&config, http));

    let engine = PollingEngine::new(&config, quotes, notifier);
    engine.announce_start().await;
    engine.run(shutdown_signal()).await;

    info!("Stopped");
    Ok(())
}
