//! Configuration validation.
//!
//! Every recognised key is optional and falls back to its default; a present
//! key must parse and fall within its range.

use crate::domain::error::ScalperError;
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), ScalperError> {
    validate_trading(config)?;
    validate_risk(config)?;
    validate_momentum(config)?;
    validate_scoring(config)?;
    validate_engine(config)?;
    Ok(())
}

pub fn validate_trading(config: &dyn ConfigPort) -> Result<(), ScalperError> {
    validate_mode(config)?;
    validate_symbol(config)?;
    if read_f64(config, "trading", "initial_balance", 10_000.0)? <= 0.0 {
        return Err(invalid("trading", "initial_balance", "must be positive"));
    }
    let default_leverage = check_int(config, "trading", "default_leverage", 5, 1, 100)?;
    let max_leverage = check_int(config, "trading", "max_leverage", 10, 1, 100)?;
    if default_leverage > max_leverage {
        return Err(invalid(
            "trading",
            "default_leverage",
            "must not exceed max_leverage",
        ));
    }
    check_int(config, "trading", "pyramiding_levels", 3, 1, 10)?;
    check_f64(config, "trading", "position_size_percent", 2.0, 0.1, 100.0)?;
    check_f64(config, "trading", "min_position_size", 10.0, 0.0, f64::MAX)?;
    Ok(())
}

pub fn validate_risk(config: &dyn ConfigPort) -> Result<(), ScalperError> {
    check_f64(config, "risk", "stop_loss_percent", 1.5, 0.1, 50.0)?;
    check_f64(config, "risk", "take_profit_percent", 3.0, 0.1, 100.0)?;
    check_f64(config, "risk", "trailing_stop_percent", 0.5, 0.1, 10.0)?;
    check_f64(config, "risk", "max_daily_loss_percent", 5.0, 0.1, 50.0)?;
    Ok(())
}

pub fn validate_momentum(config: &dyn ConfigPort) -> Result<(), ScalperError> {
    check_f64(config, "momentum", "threshold", 0.7, 0.0, 1.0)?;
    check_int(config, "momentum", "window", 20, 5, 200)?;
    check_f64(config, "momentum", "sensitivity", 1.5, 0.1, 10.0)?;
    Ok(())
}

pub fn validate_scoring(config: &dyn ConfigPort) -> Result<(), ScalperError> {
    check_f64(config, "scoring", "prediction_threshold", 0.65, 0.0, 1.0)?;
    check_int(config, "scoring", "sequence_window", 50, 10, 1000)?;
    Ok(())
}

pub fn validate_engine(config: &dyn ConfigPort) -> Result<(), ScalperError> {
    read_timeframes(config)?;
    check_int(config, "engine", "candle_limit", 200, 1, 10_000)?;
    check_int(config, "engine", "run_duration_secs", 0, 0, i64::MAX)?;
    Ok(())
}

fn validate_mode(config: &dyn ConfigPort) -> Result<(), ScalperError> {
    match config.get_string("trading", "mode") {
        None => Ok(()),
        Some(mode) => match mode.trim().to_lowercase().as_str() {
            "paper" | "live" => Ok(()),
            _ => Err(invalid("trading", "mode", "must be 'paper' or 'live'")),
        },
    }
}

fn validate_symbol(config: &dyn ConfigPort) -> Result<(), ScalperError> {
    match config.get_string("trading", "symbol") {
        Some(s) if s.trim().is_empty() => Err(invalid("trading", "symbol", "must not be empty")),
        _ => Ok(()),
    }
}

/// Timeframes in minutes, defaulting to 1,5,15,30,60,240.
pub fn read_timeframes(config: &dyn ConfigPort) -> Result<Vec<u32>, ScalperError> {
    let Some(entries) = config.get_list("engine", "timeframes") else {
        return Ok(vec![1, 5, 15, 30, 60, 240]);
    };
    if entries.is_empty() {
        return Err(invalid("engine", "timeframes", "must list at least one timeframe"));
    }
    entries
        .iter()
        .map(|e| match e.parse::<u32>() {
            Ok(tf) if tf > 0 => Ok(tf),
            _ => Err(invalid(
                "engine",
                "timeframes",
                &format!("'{e}' is not a positive number of minutes"),
            )),
        })
        .collect()
}

/// Parse a float key, `default` when absent.
pub fn read_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, ScalperError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(invalid(section, key, &format!("'{raw}' is not a number"))),
        },
    }
}

/// Parse an integer key, `default` when absent.
pub fn read_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, ScalperError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(section, key, &format!("'{raw}' is not an integer"))),
    }
}

fn check_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64, ScalperError> {
    let value = read_f64(config, section, key, default)?;
    if value < min || value > max {
        return Err(invalid(
            section,
            key,
            &format!("{value} is outside [{min}, {max}]"),
        ));
    }
    Ok(value)
}

fn check_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    min: i64,
    max: i64,
) -> Result<i64, ScalperError> {
    let value = read_int(config, section, key, default)?;
    if value < min || value > max {
        return Err(invalid(
            section,
            key,
            &format!("{value} is outside [{min}, {max}]"),
        ));
    }
    Ok(value)
}

fn invalid(section: &str, key: &str, reason: &str) -> ScalperError {
    ScalperError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
