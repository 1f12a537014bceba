//! Runtime configuration value, built once at startup from a [`ConfigPort`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::config_validation::{read_f64, read_int, read_timeframes, validate_config};
use super::error::ScalperError;
use super::momentum::MomentumConfig;
use super::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Paper,
    Live,
}

impl FromStr for TradingMode {
    type Err = ScalperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            _ => Err(ScalperError::ConfigInvalid {
                section: "trading".into(),
                key: "mode".into(),
                reason: format!("unknown mode '{s}'"),
            }),
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalperConfig {
    pub mode: TradingMode,
    pub symbol: String,
    pub initial_balance: f64,
    pub default_leverage: u32,
    pub max_leverage: u32,
    pub max_daily_loss_percent: f64,
    pub strategy: StrategyConfig,
    /// Minutes, ascending and deduplicated.
    pub timeframes: Vec<u32>,
    pub candle_limit: usize,
    pub run_duration: Option<Duration>,
    pub log_level: String,
}

impl Default for ScalperConfig {
    fn default() -> Self {
        ScalperConfig {
            mode: TradingMode::Paper,
            symbol: "BTC-USDT".to_string(),
            initial_balance: 10_000.0,
            default_leverage: 5,
            max_leverage: 10,
            max_daily_loss_percent: 5.0,
            strategy: StrategyConfig::default(),
            timeframes: vec![1, 5, 15, 30, 60, 240],
            candle_limit: 200,
            run_duration: None,
            log_level: "info".to_string(),
        }
    }
}

impl ScalperConfig {
    /// Validate then read every recognised key, using defaults for absent ones.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScalperError> {
        validate_config(config)?;
        let d = ScalperConfig::default();
        let ds = &d.strategy;

        let mode = match config.get_string("trading", "mode") {
            Some(m) => m.parse()?,
            None => d.mode,
        };

        let mut timeframes = read_timeframes(config)?;
        timeframes.sort_unstable();
        timeframes.dedup();

        let run_duration = match read_int(config, "engine", "run_duration_secs", 0)? {
            0 => None,
            secs => Some(Duration::from_secs(secs as u64)),
        };

        let strategy = StrategyConfig {
            momentum: MomentumConfig {
                threshold: read_f64(config, "momentum", "threshold", ds.momentum.threshold)?,
                window: read_int(config, "momentum", "window", ds.momentum.window as i64)?
                    as usize,
                sensitivity: read_f64(
                    config,
                    "momentum",
                    "sensitivity",
                    ds.momentum.sensitivity,
                )?,
            },
            prediction_threshold: read_f64(
                config,
                "scoring",
                "prediction_threshold",
                ds.prediction_threshold,
            )?,
            sequence_window: read_int(
                config,
                "scoring",
                "sequence_window",
                ds.sequence_window as i64,
            )? as usize,
            pyramiding_levels: read_int(
                config,
                "trading",
                "pyramiding_levels",
                ds.pyramiding_levels as i64,
            )? as u32,
            position_size_percent: read_f64(
                config,
                "trading",
                "position_size_percent",
                ds.position_size_percent,
            )?,
            min_position_size: read_f64(
                config,
                "trading",
                "min_position_size",
                ds.min_position_size,
            )?,
            stop_loss_percent: read_f64(config, "risk", "stop_loss_percent", ds.stop_loss_percent)?,
            take_profit_percent: read_f64(
                config,
                "risk",
                "take_profit_percent",
                ds.take_profit_percent,
            )?,
            trailing_stop_percent: read_f64(
                config,
                "risk",
                "trailing_stop_percent",
                ds.trailing_stop_percent,
            )?,
        };

        Ok(ScalperConfig {
            mode,
            symbol: config
                .get_string("trading", "symbol")
                .map(|s| s.trim().to_string())
                .unwrap_or(d.symbol),
            initial_balance: read_f64(config, "trading", "initial_balance", d.initial_balance)?,
            default_leverage: read_int(
                config,
                "trading",
                "default_leverage",
                d.default_leverage as i64,
            )? as u32,
            max_leverage: read_int(config, "trading", "max_leverage", d.max_leverage as i64)?
                as u32,
            max_daily_loss_percent: read_f64(
                config,
                "risk",
                "max_daily_loss_percent",
                d.max_daily_loss_percent,
            )?,
            strategy,
            timeframes,
            candle_limit: read_int(config, "engine", "candle_limit", d.candle_limit as i64)?
                as usize,
            run_duration,
            log_level: config
                .get_string("logging", "level")
                .map(|s| s.trim().to_lowercase())
                .unwrap_or(d.log_level),
        })
    }

    /// Smallest configured timeframe, in minutes.
    pub fn base_timeframe(&self) -> u32 {
        self.timeframes.first().copied().unwrap_or(1)
    }

    /// Sleep between decision cycles: one base-timeframe period.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.base_timeframe()) * 60)
    }
}
