//! Hyperliquid liquidity monitor entry point.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hl_liquidity::analytics::{format_bps, format_percent, format_usd, LiquidityReport};
use hl_liquidity::api::{create_router, AppState};
use hl_liquidity::candles::CandleInterval;
use hl_liquidity::config::Config;
use hl_liquidity::feed::ConnectionStatus;
use hl_liquidity::info::{FundingSnapshot, InfoClient};
use hl_liquidity::metrics;
use hl_liquidity::monitor::MarketMonitor;
use hl_liquidity::utils::shutdown_signal;

/// Hyperliquid order-book and candle monitor with liquidity analytics.
#[derive(Parser, Debug)]
#[command(name = "hl-liquidity")]
#[command(about = "Streams Hyperliquid market data and reports depth and slippage")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitor with its HTTP API (default).
    Run {
        /// HTTP server port, overrides PORT.
        #[arg(short, long)]
        port: Option<u16>,

        /// Coin to monitor, overrides MARKET_COIN.
        #[arg(long)]
        coin: Option<String>,

        /// Candle interval, overrides CANDLE_INTERVAL.
        #[arg(long)]
        interval: Option<String>,
    },

    /// Print liquidity for a coin as the book updates.
    Watch {
        /// Coin to monitor, overrides MARKET_COIN.
        #[arg(long)]
        coin: Option<String>,

        /// Stop after this many seconds (0 runs until interrupted).
        #[arg(long, default_value = "0")]
        seconds: u64,
    },

    /// Fetch funding and open interest once.
    Funding {
        /// Coin to query, overrides MARKET_COIN.
        #[arg(long)]
        coin: Option<String>,
    },

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("hl_liquidity=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if args.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Funding { coin }) => cmd_funding(coin).await,
        Some(Command::Watch { coin, seconds }) => cmd_watch(coin, seconds).await,
        Some(Command::Run { port, coin, interval }) => cmd_run(port, coin, interval).await,
        None => cmd_run(None, None, None).await,
    }
}

fn load_config() -> anyhow::Result<Config> {
    Config::load_validated()
        .inspect_err(|e| error!("Invalid configuration: {}", e))
        .context("failed to load configuration")
}

fn resolve_interval(config: &Config, interval: Option<String>) -> anyhow::Result<CandleInterval> {
    match interval {
        Some(raw) => CandleInterval::from_str(&raw)
            .map_err(|_| anyhow::anyhow!("unknown candle interval {raw:?}")),
        None => config.interval().map_err(anyhow::Error::msg),
    }
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("HL LIQUIDITY - CONFIGURATION CHECK");
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

    println!("\nConfiguration:");
    println!("  WebSocket URL:       {}", config.hyperliquid_ws_url);
    println!("  Info URL:            {}", config.hyperliquid_info_url);
    println!("  Market:              {} @ {}", config.market_coin, config.candle_interval);
    println!(
        "  Reconnect:           {} ms x {} attempts",
        config.reconnect_delay_ms, config.max_reconnect_attempts
    );
    println!("  Heartbeat:           {} s", config.heartbeat_interval_s);
    println!("  Funding poll:        {} s", config.funding_poll_interval_s);
    println!("  Seed lookback:       {} days", config.seed_lookback_days);
    println!("  HTTP port:           {}", config.port);
    println!("  Metrics:             {}", config.metrics_enabled);
    println!("======================================================================");

    Ok(())
}

/// Fetch funding once.
async fn cmd_funding(coin: Option<String>) -> anyhow::Result<()> {
    let config = load_config()?;
    let coin = coin.unwrap_or_else(|| config.market_coin.clone());
    let client = InfoClient::new(&config)?;

    let started = Instant::now();
    let snapshot = client.fetch_funding(&coin).await?;
    println!("{}", funding_line(&snapshot));
    println!("  fetched in {:.1} ms", started.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

/// Print liquidity as the book updates.
async fn cmd_watch(coin: Option<String>, seconds: u64) -> anyhow::Result<()> {
    let config = load_config()?;
    let coin = coin.unwrap_or_else(|| config.market_coin.clone());
    let interval = resolve_interval(&config, None)?;

    let monitor = MarketMonitor::connect(&config)?;
    monitor.start();
    monitor.select_market(coin.clone(), interval);

    let Some(mut books) = monitor.watch_orderbook() else {
        return Err(anyhow::anyhow!("no order book session for {coin}"));
    };

    let deadline = (seconds > 0).then(|| tokio::time::Instant::now() + Duration::from_secs(seconds));
    let sleep_until_deadline = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(sleep_until_deadline);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut last_print: Option<Instant> = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = &mut sleep_until_deadline => break,
            changed = books.changed() => {
                if changed.is_err() {
                    warn!("Order book session closed");
                    break;
                }
                if last_print.is_some_and(|at| at.elapsed() < Duration::from_secs(1)) {
                    continue;
                }
                last_print = Some(Instant::now());
                print_report(&monitor.liquidity(), monitor.funding().as_ref());
            }
        }
    }

    monitor.shutdown().await;
    Ok(())
}

fn funding_line(snapshot: &FundingSnapshot) -> String {
    format!(
        "{} funding {} mark {} OI {} 24h vol {}",
        snapshot.coin,
        format_percent(snapshot.funding_rate),
        format_usd(snapshot.mark_price),
        format_usd(snapshot.open_interest_usd),
        format_usd(snapshot.volume_24h_usd),
    )
}

fn print_report(report: &LiquidityReport, funding: Option<&FundingSnapshot>) {
    println!(
        "{} mid {} spread {} ({} bps)",
        report.coin,
        report.mid_price,
        report.spread,
        format_bps(report.spread_bps)
    );
    if let Some(funding) = funding {
        println!("  {}", funding_line(funding));
    }
    if !report.is_available() {
        println!("  book not two-sided yet");
        return;
    }
    for depth in &report.depth {
        println!(
            "  depth {:>4} bps  bid {:>10}  ask {:>10}",
            depth.distance_bps,
            format_usd(depth.bid_depth_usd),
            format_usd(depth.ask_depth_usd)
        );
    }
    for slippage in &report.slippage {
        println!(
            "  slip  {:>9}  buy {:>8} bps  sell {:>8} bps",
            format_usd(slippage.notional_usd.into()),
            format_bps(slippage.buy_slippage_bps),
            format_bps(slippage.sell_slippage_bps)
        );
    }
}

/// Run the monitor and its HTTP API.
async fn cmd_run(
    port: Option<u16>,
    coin: Option<String>,
    interval: Option<String>,
) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = load_config()?;
    let coin = coin.unwrap_or_else(|| config.market_coin.clone());
    let interval = resolve_interval(&config, interval)?;
    let port = port.unwrap_or(config.port);

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::install_prometheus().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    let monitor = Arc::new(MarketMonitor::connect(&config)?);
    monitor.start();
    monitor.select_market(coin, interval);

    let mut status = monitor.connection().watch_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            match current {
                ConnectionStatus::Error => {
                    error!("Feed gave up reconnecting; restart the process to resume");
                }
                other => info!(status = %other, "Feed status"),
            }
        }
    });

    let mut app_state = AppState::new(monitor.clone());
    if let Some(handle) = metrics_handle {
        app_state = app_state.with_metrics(handle);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
