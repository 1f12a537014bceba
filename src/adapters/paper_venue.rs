//! In-process paper trading venue.
//!
//! Wraps an [`ExecutionSimulator`] with a per-symbol, per-timeframe candle
//! cache. The current price of a symbol is the last close of its smallest
//! cached timeframe; the simulator clock follows the newest cached bar.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::bar::Bar;
use crate::domain::error::ScalperError;
use crate::domain::execution::{ExecutionSimulator, ExitReason};
use crate::domain::metrics::{Balance, TradingStats};
use crate::domain::order::Order;
use crate::domain::position::Position;
use crate::ports::venue_port::{SimulationPort, VenuePort};

pub struct PaperVenue {
    simulator: ExecutionSimulator,
    candles: HashMap<String, BTreeMap<u32, Vec<Bar>>>,
    clock: Option<DateTime<Utc>>,
}

impl PaperVenue {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            simulator: ExecutionSimulator::new(initial_balance),
            candles: HashMap::new(),
            clock: None,
        }
    }

    pub fn simulator(&self) -> &ExecutionSimulator {
        &self.simulator
    }

    /// Append bars to the cache, keyed by each bar's timeframe. Bars not
    /// newer than the cached tail are skipped. Returns how many were added.
    pub fn add_candles<I: IntoIterator<Item = Bar>>(&mut self, symbol: &str, bars: I) -> usize {
        let series = self.candles.entry(symbol.to_string()).or_default();
        let mut added = 0;
        for bar in bars {
            let cached = series.entry(bar.timeframe).or_default();
            if cached.last().is_some_and(|last| bar.timestamp <= last.timestamp) {
                continue;
            }
            if self.clock.is_none_or(|now| bar.timestamp > now) {
                self.clock = Some(bar.timestamp);
                self.simulator.set_time(bar.timestamp);
            }
            cached.push(bar);
            added += 1;
        }
        debug!(symbol, added, "paper venue candles cached");
        added
    }

    fn latest_price(&self, symbol: &str) -> Option<f64> {
        self.candles
            .get(symbol)?
            .values()
            .find_map(|bars| bars.last())
            .map(|b| b.close)
    }

    fn price_or_no_data(&self, symbol: &str) -> Result<f64, ScalperError> {
        self.latest_price(symbol).ok_or_else(|| ScalperError::NoData {
            symbol: symbol.to_string(),
        })
    }
}

impl VenuePort for PaperVenue {
    fn get_candles(
        &mut self,
        symbol: &str,
        timeframe: u32,
        limit: usize,
    ) -> Result<Vec<Bar>, ScalperError> {
        let bars = self
            .candles
            .get(symbol)
            .and_then(|series| series.get(&timeframe))
            .ok_or_else(|| ScalperError::NoData {
                symbol: symbol.to_string(),
            })?;
        Ok(bars[bars.len().saturating_sub(limit)..].to_vec())
    }

    fn place_order(&mut self, order: Order) -> Result<String, ScalperError> {
        let price = self.price_or_no_data(&order.symbol)?;
        self.simulator.place_order(order, price)
    }

    fn cancel_order(&mut self, order_id: &str, _symbol: &str) -> Result<bool, ScalperError> {
        Ok(self.simulator.cancel_order(order_id))
    }

    fn get_position(&mut self, symbol: &str) -> Result<Option<Position>, ScalperError> {
        Ok(self.simulator.position(symbol).cloned())
    }

    fn get_balance(&mut self) -> Result<Balance, ScalperError> {
        Ok(self.simulator.balance())
    }

    fn get_current_price(&mut self, symbol: &str) -> Result<f64, ScalperError> {
        self.price_or_no_data(symbol)
    }

    fn simulation(&mut self) -> Option<&mut dyn SimulationPort> {
        Some(self)
    }
}

impl SimulationPort for PaperVenue {
    fn mark_to_market(&mut self, symbol: &str) -> Option<f64> {
        let price = self.latest_price(symbol)?;
        self.simulator.mark_to_market(symbol, price)
    }

    fn check_stops(&mut self, symbol: &str) -> Option<ExitReason> {
        let price = self.latest_price(symbol)?;
        self.simulator.check_stops(symbol, price)
    }

    fn set_protection(&mut self, symbol: &str, stop_loss: f64, take_profit: f64) -> bool {
        self.simulator.set_protection(symbol, stop_loss, take_profit)
    }

    fn stats(&self) -> TradingStats {
        self.simulator.stats()
    }
}
