//! Per-cycle trading decision.

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hold,
    Buy,
    Sell,
    Close,
    Pyramid,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Hold => "hold",
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Close => "close",
            Action::Pyramid => "pyramid",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: Action,
    /// In [0, 1].
    pub confidence: f64,
    pub reason: String,
    pub momentum_score: f64,
    pub trend_strength: f64,
}

impl Signal {
    pub fn hold(symbol: &str, reason: &str) -> Self {
        Signal {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            action: Action::Hold,
            confidence: 0.0,
            reason: reason.to_string(),
            momentum_score: 0.0,
            trend_strength: 0.0,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.action == Action::Hold
    }
}
