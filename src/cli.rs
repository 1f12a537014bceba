//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::{ENV_PREFIX, FileConfigAdapter};
use crate::adapters::paper_venue::PaperVenue;
use crate::adapters::rule_scorer::RuleScorer;
use crate::domain::bar::Bar;
use crate::domain::engine::{StopReason, TradingEngine};
use crate::domain::error::ScalperError;
use crate::domain::metrics::TradingStats;
use crate::domain::settings::{ScalperConfig, TradingMode};
use crate::ports::scoring_port::ScoringPort;

#[derive(Parser, Debug)]
#[command(name = "psiscalper", about = "Momentum scalping decision engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the decision loop against the paper venue
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: Option<String>,
        #[arg(short, long)]
        mode: Option<String>,
        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
        /// CSV bars preloaded into the paper venue
        #[arg(short, long)]
        bars: Option<PathBuf>,
        /// Seconds between cycles, defaults to the base timeframe
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Replay CSV bars through the engine one cycle per bar
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        bars: PathBuf,
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Outcome of [`replay`].
#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub cycles: usize,
    pub stop_reason: Option<StopReason>,
    pub stats: TradingStats,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            symbol,
            mode,
            duration,
            bars,
            interval,
        } => run_trading(
            &config,
            symbol.as_deref(),
            mode.as_deref(),
            duration,
            bars.as_deref(),
            interval,
        ),
        Command::Replay {
            config,
            bars,
            symbol,
        } => run_replay(&config, &bars, symbol.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Read the INI file and layer `SCALPER_*` environment overrides on top.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ScalperError> {
    Ok(FileConfigAdapter::from_file(path)?.with_env_overrides(ENV_PREFIX, std::env::vars()))
}

/// Validated settings with command-line overrides applied.
pub fn load_settings(
    path: &Path,
    symbol: Option<&str>,
    mode: Option<&str>,
) -> Result<ScalperConfig, ScalperError> {
    let adapter = load_config(path)?;
    let mut settings = ScalperConfig::from_config(&adapter)?;
    if let Some(symbol) = symbol {
        settings.symbol = symbol.to_string();
    }
    if let Some(mode) = mode {
        settings.mode = mode.parse()?;
    }
    Ok(settings)
}

/// Feed `bars` into the paper venue one at a time, running a cycle after
/// each. Stops early on a daily loss breach or a stop request.
pub fn replay<S: ScoringPort>(
    engine: &mut TradingEngine<PaperVenue, S>,
    bars: Vec<Bar>,
) -> Result<ReplaySummary, ScalperError> {
    let symbol = engine.config().symbol.clone();
    let stop = engine.stop_handle();
    let mut cycles = 0;
    let mut stop_reason = None;

    for bar in bars {
        if stop.is_stopped() {
            stop_reason = Some(StopReason::Requested);
            break;
        }
        if engine.venue_mut().add_candles(&symbol, [bar]) == 0 {
            continue;
        }
        let report = engine.run_cycle()?;
        cycles += 1;
        if report.risk_limit_breached {
            stop_reason = Some(StopReason::RiskLimit {
                loss_pct: report.daily_loss_pct,
                limit_pct: engine.config().max_daily_loss_percent,
            });
            break;
        }
    }

    let stats = engine.venue().simulator().stats();
    info!(
        cycles,
        total_trades = stats.total_trades,
        total_pnl = stats.total_pnl,
        win_rate = stats.win_rate,
        total_return = stats.total_return,
        "replay finished"
    );
    Ok(ReplaySummary {
        cycles,
        stop_reason,
        stats,
    })
}

fn report_error(err: &ScalperError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

fn print_stats(stats: &TradingStats) {
    eprintln!("\n=== Trading Statistics ===");
    eprintln!("{stats}");
}

fn require_paper(settings: &ScalperConfig) -> Result<(), ScalperError> {
    match settings.mode {
        TradingMode::Paper => Ok(()),
        TradingMode::Live => Err(ScalperError::ConfigInvalid {
            section: "trading".into(),
            key: "mode".into(),
            reason: "live trading needs a network venue adapter, none is built in".into(),
        }),
    }
}

fn load_bars(path: &Path, settings: &ScalperConfig) -> Result<Vec<Bar>, ScalperError> {
    eprintln!("Loading bars from {}", path.display());
    let bars = CsvAdapter::new(path).load_bars(settings.base_timeframe())?;
    eprintln!("  {} bars", bars.len());
    Ok(bars)
}

fn run_trading(
    config_path: &Path,
    symbol: Option<&str>,
    mode: Option<&str>,
    duration: Option<u64>,
    bars_path: Option<&Path>,
    interval: Option<u64>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let settings = match load_settings(config_path, symbol, mode) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };
    init_logging(&settings.log_level);

    if let Err(e) = require_paper(&settings) {
        return report_error(&e);
    }

    let mut venue = PaperVenue::new(settings.initial_balance);
    match bars_path {
        Some(path) => match load_bars(path, &settings) {
            Ok(bars) => {
                venue.add_candles(&settings.symbol, bars);
            }
            Err(e) => return report_error(&e),
        },
        None => warn!("no bars supplied, the paper venue has no prices and every cycle will hold"),
    }

    let run_duration = duration.map(Duration::from_secs).or(settings.run_duration);
    let mut engine = TradingEngine::new(settings, venue, RuleScorer::new());
    if let Some(secs) = interval {
        engine = engine.with_cycle_interval(Duration::from_secs(secs));
    }

    match engine.run(run_duration) {
        Ok(summary) => {
            eprintln!("Stopped after {} cycles: {}", summary.cycles, summary.stop_reason);
            if let Some(stats) = &summary.stats {
                print_stats(stats);
            }
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

fn run_replay(config_path: &Path, bars_path: &Path, symbol: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let settings = match load_settings(config_path, symbol, None) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };
    init_logging(&settings.log_level);

    let bars = match load_bars(bars_path, &settings) {
        Ok(b) => b,
        Err(e) => return report_error(&e),
    };

    let venue = PaperVenue::new(settings.initial_balance);
    let mut engine = TradingEngine::new(settings, venue, RuleScorer::new())
        .with_cycle_interval(Duration::ZERO);

    match replay(&mut engine, bars) {
        Ok(summary) => {
            eprintln!("Replayed {} cycles", summary.cycles);
            if let Some(reason) = summary.stop_reason {
                eprintln!("Stopped early: {reason}");
            }
            print_stats(&summary.stats);
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let settings = match load_settings(config_path, None, None) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };

    eprintln!("  mode:      {}", settings.mode);
    eprintln!("  symbol:    {}", settings.symbol);
    eprintln!("  balance:   {:.2}", settings.initial_balance);
    eprintln!(
        "  leverage:  {}x (max {}x)",
        settings.default_leverage, settings.max_leverage
    );
    let timeframes: Vec<String> = settings.timeframes.iter().map(u32::to_string).collect();
    eprintln!("  timeframes: {}", timeframes.join(", "));
    eprintln!("Config is valid");
    ExitCode::SUCCESS
}
