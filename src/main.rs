use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal_macros::dec;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use strategy_kernel::config::KernelConfig;
use strategy_kernel::demo::{DeterministicExchange, DeterministicSignalGenerator};
use strategy_kernel::drivers::{BacktestDriver, LiveDriver, StopMode, WalkerCancelToken, WalkerDriver, WalkerMetric};
use strategy_kernel::drivers::walker::WalkerCandidate;
use strategy_kernel::event_bus::EventBus;
use strategy_kernel::exchange::ExchangeProvider;
use strategy_kernel::generator::SignalGenerator;
use strategy_kernel::position_store::NoopPositionStore;
use strategy_kernel::risk_gate::{RiskGate, RiskProfile};
use strategy_kernel::stats::StatsAggregator;
use strategy_kernel::strategy_core::StrategyCoreBuilder;
use strategy_kernel::types::{Frame, Interval, ProposalInterval, Symbol};

#[derive(Parser)]
#[command(name = "strategy-kernel")]
#[command(author = "Trading Bot")]
#[command(version = "0.1.0")]
#[command(about = "Strategy execution kernel CLI: backtest, live, and walker-sweep drivers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (TOML). Falls back to defaults when absent.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single strategy through a historical frame with the
    /// deterministic demo exchange/generator.
    Backtest {
        /// Trading symbol, e.g. BTCUSDT
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
        /// Strategy name, for logging/reporting only
        #[arg(long, default_value = "demo-strategy")]
        strategy: String,
    },
    /// Run a single strategy against the wall clock until Ctrl-C.
    Live {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        #[arg(long, default_value = "demo-strategy")]
        strategy: String,
        /// Poll interval in seconds
        #[arg(long, default_value = "30")]
        poll_seconds: u64,
    },
    /// Sweep several strategy names over the same historical frame and rank
    /// them by a chosen metric.
    Walk {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Comma-separated strategy names to sweep
        #[arg(long, default_value = "demo-a,demo-b")]
        strategies: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("strategy-kernel CLI");
    let config = Arc::new(load_config(&cli.config));

    match cli.command {
        Commands::Backtest { symbol, start, end, strategy } => {
            run_backtest(Arc::clone(&config), &symbol, &start, &end, &strategy).await?;
        }
        Commands::Live { symbol, strategy, poll_seconds } => {
            run_live(Arc::clone(&config), &symbol, &strategy, poll_seconds).await?;
        }
        Commands::Walk { symbol, start, end, strategies } => {
            let names: Vec<String> = strategies.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            run_walk(Arc::clone(&config), &symbol, &start, &end, &names).await?;
        }
    }

    Ok(())
}

/// Loads `KernelConfig` from the given TOML path if it exists, falling back
/// to defaults otherwise; either way the result is validated before use.
fn load_config(path: &str) -> KernelConfig {
    let loaded = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .build()
        .ok()
        .and_then(|c| c.try_deserialize::<KernelConfig>().ok());

    let config = loaded.unwrap_or_default();
    if let Err(errors) = config.validate() {
        error!(?errors, "configuration failed validation, falling back to defaults");
        return KernelConfig::default();
    }
    config
}

fn parse_frame(start: &str, end: &str) -> Result<Frame> {
    let start_date = NaiveDate::parse_from_str(start, "%Y-%m-%d").context("invalid --start date")?;
    let end_date = NaiveDate::parse_from_str(end, "%Y-%m-%d").context("invalid --end date")?;
    let start = start_date.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let end = end_date.and_hms_opt(0, 0, 0).unwrap().and_utc();
    Frame::new(start, end, Interval::M15).map_err(Into::into)
}

async fn run_backtest(config: Arc<KernelConfig>, symbol: &str, start: &str, end: &str, strategy: &str) -> Result<()> {
    let frame = parse_frame(start, end)?;
    let symbol = Symbol::new(symbol);
    let exchange: Arc<dyn ExchangeProvider> = Arc::new(DeterministicExchange::default());
    let generator: Arc<dyn SignalGenerator> = Arc::new(DeterministicSignalGenerator::default());
    let event_bus = Arc::new(EventBus::new());
    let risk_gate = Arc::new(RiskGate::new(RiskProfile::new("default")));

    let core = StrategyCoreBuilder {
        symbol: symbol.clone(),
        strategy_name: strategy.to_string(),
        exchange_name: "demo".into(),
        frame_name: format!("{start}..{end}"),
        proposal_interval: ProposalInterval::M15,
        backtest: true,
        config,
        exchange: Arc::clone(&exchange),
        risk_gate,
        position_store: Arc::new(NoopPositionStore),
        event_bus,
        generator,
    }
    .build();

    let mut driver = BacktestDriver::new(core, exchange, &frame);
    let mut closed = 0usize;
    while let Some(result) = driver.next().await? {
        info!(action = result.action_name(), "backtest tick");
        if result.is_terminal() {
            closed += 1;
        }
    }
    info!(closed, "backtest finished");
    Ok(())
}

async fn run_live(config: Arc<KernelConfig>, symbol: &str, strategy: &str, poll_seconds: u64) -> Result<()> {
    let symbol = Symbol::new(symbol);
    let exchange: Arc<dyn ExchangeProvider> = Arc::new(DeterministicExchange::default());
    let generator: Arc<dyn SignalGenerator> = Arc::new(DeterministicSignalGenerator::default());
    let event_bus = Arc::new(EventBus::new());
    let risk_gate = Arc::new(RiskGate::new(RiskProfile::new("default")));

    let core = StrategyCoreBuilder {
        symbol,
        strategy_name: strategy.to_string(),
        exchange_name: "demo".into(),
        frame_name: "live".into(),
        proposal_interval: ProposalInterval::M15,
        backtest: false,
        config,
        exchange,
        risk_gate,
        position_store: Arc::new(NoopPositionStore),
        event_bus,
        generator,
    }
    .build();

    let (mut driver, controller) = LiveDriver::new(core, StdDuration::from_secs(poll_seconds));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, requesting graceful stop");
            controller.stop(StopMode::Graceful);
        }
    });

    let results = driver.run().await?;
    info!(terminal_results = results.len(), "live driver stopped");
    Ok(())
}

async fn run_walk(config: Arc<KernelConfig>, symbol: &str, start: &str, end: &str, strategies: &[String]) -> Result<()> {
    let frame = parse_frame(start, end)?;
    let symbol = Symbol::new(symbol);
    let exchange: Arc<dyn ExchangeProvider> = Arc::new(DeterministicExchange::default());
    let event_bus = Arc::new(EventBus::new());
    let risk_gate = Arc::new(RiskGate::new(RiskProfile::new("default")));
    let stats = Arc::new(StatsAggregator::new());
    let _stats_task = Arc::clone(&stats).spawn(Arc::clone(&event_bus));

    let driver = WalkerDriver::new(
        symbol,
        frame,
        ProposalInterval::M15,
        exchange,
        config,
        risk_gate,
        event_bus,
        stats,
        WalkerMetric::SharpeRatio,
        WalkerCancelToken::new(),
    );

    let candidates = strategies
        .iter()
        .map(|name| WalkerCandidate {
            strategy_name: name.clone(),
            generator: Arc::new(DeterministicSignalGenerator::new(15, dec!(102), dec!(98), 60)) as Arc<dyn SignalGenerator>,
        })
        .collect();

    let completion = driver.run(candidates).await?;
    for ranking in &completion.ranked {
        info!(strategy = ranking.strategy_name.as_str(), metric = ?ranking.metric, "ranked");
    }
    info!(best = ?completion.best_strategy, best_metric = ?completion.best_metric, "walk finished");
    Ok(())
}
