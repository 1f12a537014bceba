//! Account balance view and trading statistics.

use std::fmt;

use super::order::Trade;

/// Computed account view: `total = available + unrealized_pnl`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Balance {
    pub total: f64,
    pub available: f64,
    pub unrealized_pnl: f64,
}

impl Balance {
    pub fn new(available: f64, unrealized_pnl: f64) -> Self {
        Balance {
            total: available + unrealized_pnl,
            available,
            unrealized_pnl,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradingStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub total_pnl: f64,
    pub total_commission: f64,
    /// Percent of trades with positive realized PnL.
    pub win_rate: f64,
    pub current_balance: f64,
    /// Percent change of cash relative to the starting balance.
    pub total_return: f64,
}

impl TradingStats {
    pub fn compute(trades: &[Trade], current_balance: f64, initial_balance: f64) -> Self {
        let total_trades = trades.len();
        let winning_trades = trades.iter().filter(|t| t.realized_pnl > 0.0).count();
        let total_pnl = trades.iter().map(|t| t.realized_pnl).sum();
        let total_commission = trades.iter().map(|t| t.commission).sum();

        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let total_return = if initial_balance > 0.0 {
            (current_balance - initial_balance) / initial_balance * 100.0
        } else {
            0.0
        };

        TradingStats {
            total_trades,
            winning_trades,
            total_pnl,
            total_commission,
            win_rate,
            current_balance,
            total_return,
        }
    }
}

impl fmt::Display for TradingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total trades:     {}", self.total_trades)?;
        writeln!(f, "Total PnL:        {:.2}", self.total_pnl)?;
        writeln!(f, "Total commission: {:.2}", self.total_commission)?;
        writeln!(f, "Win rate:         {:.2}%", self.win_rate)?;
        writeln!(f, "Current balance:  {:.2}", self.current_balance)?;
        write!(f, "Total return:     {:.2}%", self.total_return)
    }
}
