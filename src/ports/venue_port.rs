//! Execution venue port and the simulation-only extension.

use crate::domain::bar::Bar;
use crate::domain::error::ScalperError;
use crate::domain::execution::ExitReason;
use crate::domain::metrics::{Balance, TradingStats};
use crate::domain::order::Order;
use crate::domain::position::Position;

/// Capabilities every venue provides, simulated or live.
///
/// Adapters report transport failures as `Err`; the engine logs them and
/// treats the cycle as a hold.
pub trait VenuePort {
    /// Bars oldest first, at most `limit`.
    fn get_candles(&mut self, symbol: &str, timeframe: u32, limit: usize)
    -> Result<Vec<Bar>, ScalperError>;

    /// Returns the venue-assigned order id.
    fn place_order(&mut self, order: Order) -> Result<String, ScalperError>;

    fn cancel_order(&mut self, order_id: &str, symbol: &str) -> Result<bool, ScalperError>;

    fn get_position(&mut self, symbol: &str) -> Result<Option<Position>, ScalperError>;

    fn get_balance(&mut self) -> Result<Balance, ScalperError>;

    fn get_current_price(&mut self, symbol: &str) -> Result<f64, ScalperError>;

    /// Simulation extras, only offered by in-process venues.
    fn simulation(&mut self) -> Option<&mut dyn SimulationPort> {
        None
    }
}

/// Position maintenance that a live venue performs server-side and a
/// simulator has to run itself each cycle.
pub trait SimulationPort {
    /// Refresh unrealized PnL at the current price.
    fn mark_to_market(&mut self, symbol: &str) -> Option<f64>;

    /// Close the position if its stop or target was crossed.
    fn check_stops(&mut self, symbol: &str) -> Option<ExitReason>;

    /// Set stop-loss and take-profit levels; 0.0 leaves a level unset.
    fn set_protection(&mut self, symbol: &str, stop_loss: f64, take_profit: f64) -> bool;

    fn stats(&self) -> TradingStats;
}
