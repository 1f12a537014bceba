//! Paper execution simulator.
//!
//! Owns cash, open positions (at most one per symbol), pending orders and the
//! trade log. Orders fill at a caller-supplied price with a fixed commission.
//!
//! Steps for [`ExecutionSimulator::execute`]:
//! 1. commission = size * price * [`COMMISSION_RATE`]
//! 2. reject if margin + commission exceeds cash, closing orders included
//! 3. deduct commission from cash
//! 4. open, add to, reduce or close the position
//! 5. append a trade record

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::error::ScalperError;
use super::metrics::{Balance, TradingStats};
use super::order::{Order, OrderType, Trade};
use super::position::{Position, PositionSide};

pub const COMMISSION_RATE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

/// Result of executing an order against the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Opened(Trade),
    Added(Trade),
    Reduced(Trade),
    Closed(Trade),
    Rejected { required: f64, available: f64 },
}

impl ExecutionOutcome {
    pub fn trade(&self) -> Option<&Trade> {
        match self {
            ExecutionOutcome::Opened(t)
            | ExecutionOutcome::Added(t)
            | ExecutionOutcome::Reduced(t)
            | ExecutionOutcome::Closed(t) => Some(t),
            ExecutionOutcome::Rejected { .. } => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ExecutionOutcome::Rejected { .. })
    }
}

pub fn calculate_commission(size: f64, price: f64) -> f64 {
    size * price * COMMISSION_RATE
}

#[derive(Debug, Clone)]
pub struct ExecutionSimulator {
    cash: f64,
    initial_balance: f64,
    positions: HashMap<String, Position>,
    pending: HashMap<String, Order>,
    trades: Vec<Trade>,
    order_counter: u64,
    clock: Option<DateTime<Utc>>,
}

impl ExecutionSimulator {
    pub fn new(initial_balance: f64) -> Self {
        ExecutionSimulator {
            cash: initial_balance,
            initial_balance,
            positions: HashMap::new(),
            pending: HashMap::new(),
            trades: Vec::new(),
            order_counter: 0,
            clock: None,
        }
    }

    /// Pin the simulator clock, used when replaying historical bars.
    pub fn set_time(&mut self, now: DateTime<Utc>) {
        self.clock = Some(now);
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn pending_orders(&self) -> &HashMap<String, Order> {
        &self.pending
    }

    pub fn balance(&self) -> Balance {
        let unrealized = self.positions.values().map(|p| p.unrealized_pnl).sum();
        Balance::new(self.cash, unrealized)
    }

    pub fn stats(&self) -> TradingStats {
        TradingStats::compute(&self.trades, self.cash, self.initial_balance)
    }

    /// Assign an id and timestamp. Market orders fill at `reference_price`;
    /// limit orders are stored pending and never matched.
    pub fn place_order(
        &mut self,
        mut order: Order,
        reference_price: f64,
    ) -> Result<String, ScalperError> {
        if !order.size.is_finite() || order.size <= 0.0 {
            return Err(ScalperError::InvalidOrder {
                reason: format!("size must be positive, got {}", order.size),
            });
        }

        self.order_counter += 1;
        let id = format!("paper_{}", self.order_counter);
        order.id = Some(id.clone());
        order.timestamp = Some(self.now());

        match order.order_type {
            OrderType::Market => {
                if !reference_price.is_finite() || reference_price <= 0.0 {
                    return Err(ScalperError::NoData {
                        symbol: order.symbol.clone(),
                    });
                }
                match self.execute(&order, reference_price) {
                    ExecutionOutcome::Rejected {
                        required,
                        available,
                    } => Err(ScalperError::InsufficientMargin {
                        required,
                        available,
                    }),
                    _ => Ok(id),
                }
            }
            OrderType::Limit => {
                debug!(order_id = %id, symbol = %order.symbol, "limit order stored as pending");
                self.pending.insert(id.clone(), order);
                Ok(id)
            }
        }
    }

    pub fn cancel_order(&mut self, order_id: &str) -> bool {
        self.pending.remove(order_id).is_some()
    }

    /// Fill `order` at `price`. Rejections leave all state untouched.
    pub fn execute(&mut self, order: &Order, price: f64) -> ExecutionOutcome {
        let commission = calculate_commission(order.size, price);
        let reduces = self
            .positions
            .get(&order.symbol)
            .is_some_and(|p| order.side == p.closing_side());

        let required = order.size * price / order.leverage.max(1) as f64 + commission;
        if required > self.cash {
            warn!(
                symbol = %order.symbol,
                side = %order.side,
                size = order.size,
                price,
                required,
                available = self.cash,
                reduces,
                "order rejected: insufficient margin"
            );
            return ExecutionOutcome::Rejected {
                required,
                available: self.cash,
            };
        }

        self.cash -= commission;
        let now = self.now();

        let (realized_pnl, kind) = match self.positions.get_mut(&order.symbol) {
            None => {
                let position = Position {
                    symbol: order.symbol.clone(),
                    side: PositionSide::from_order_side(order.side),
                    entry_price: price,
                    size: order.size,
                    leverage: order.leverage.max(1),
                    stop_loss: 0.0,
                    take_profit: 0.0,
                    opened_at: now,
                    pyramid_level: 0,
                    unrealized_pnl: 0.0,
                };
                self.positions.insert(order.symbol.clone(), position);
                (0.0, FillKind::Opened)
            }
            Some(position) if reduces => {
                if order.size >= position.size {
                    let pnl = position.pnl_at(price);
                    self.cash += pnl;
                    self.positions.remove(&order.symbol);
                    (pnl, FillKind::Closed)
                } else {
                    let pnl = position.pnl_at(price) * (order.size / position.size);
                    self.cash += pnl;
                    position.size -= order.size;
                    position.update_pnl(price);
                    (pnl, FillKind::Reduced)
                }
            }
            Some(position) => {
                let total_size = position.size + order.size;
                position.entry_price =
                    (position.entry_price * position.size + price * order.size) / total_size;
                position.size = total_size;
                position.pyramid_level += 1;
                position.update_pnl(price);
                (0.0, FillKind::Added)
            }
        };

        let trade = Trade {
            id: format!("trade_{}", self.trades.len() + 1),
            symbol: order.symbol.clone(),
            side: order.side,
            price,
            size: order.size,
            timestamp: now,
            commission,
            realized_pnl,
        };
        self.trades.push(trade.clone());

        debug!(
            trade_id = %trade.id,
            symbol = %trade.symbol,
            side = %trade.side,
            price,
            size = trade.size,
            commission,
            realized_pnl,
            cash = self.cash,
            "order filled"
        );

        match kind {
            FillKind::Opened => ExecutionOutcome::Opened(trade),
            FillKind::Added => ExecutionOutcome::Added(trade),
            FillKind::Reduced => ExecutionOutcome::Reduced(trade),
            FillKind::Closed => ExecutionOutcome::Closed(trade),
        }
    }

    /// Refresh unrealized PnL; returns the new value when a position exists.
    pub fn mark_to_market(&mut self, symbol: &str, price: f64) -> Option<f64> {
        let position = self.positions.get_mut(symbol)?;
        position.update_pnl(price);
        Some(position.unrealized_pnl)
    }

    /// Set stop-loss and take-profit levels; 0.0 leaves a level unset.
    pub fn set_protection(&mut self, symbol: &str, stop_loss: f64, take_profit: f64) -> bool {
        match self.positions.get_mut(symbol) {
            Some(position) => {
                position.stop_loss = stop_loss;
                position.take_profit = take_profit;
                true
            }
            None => false,
        }
    }

    /// Close at `price` if the stop or target is crossed. The stop is checked
    /// first, so a price that crosses both exits as a stop-loss.
    pub fn check_stops(&mut self, symbol: &str, price: f64) -> Option<ExitReason> {
        let position = self.positions.get(symbol)?;
        let reason = if position.should_stop_loss(price) {
            ExitReason::StopLoss
        } else if position.should_take_profit(price) {
            ExitReason::TakeProfit
        } else {
            return None;
        };

        let close = Order::market(
            symbol,
            position.closing_side(),
            position.size,
            position.leverage,
        );
        let outcome = self.execute(&close, price);
        info!(
            symbol,
            price,
            ?reason,
            realized_pnl = outcome.trade().map_or(0.0, |t| t.realized_pnl),
            "protective exit"
        );
        Some(reason)
    }
}

enum FillKind {
    Opened,
    Added,
    Reduced,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderSide;
    use approx::assert_relative_eq;

    const SYMBOL: &str = "BTC-USDT";

    fn long_sim() -> ExecutionSimulator {
        let mut sim = ExecutionSimulator::new(10_000.0);
        sim.execute(&Order::market(SYMBOL, OrderSide::Buy, 0.1, 5), 50_000.0);
        sim
    }

    #[test]
    fn commission_is_tenth_of_percent() {
        assert_relative_eq!(calculate_commission(0.1, 50_000.0), 5.0);
    }

    #[test]
    fn open_long_deducts_commission_only() {
        let sim = long_sim();
        assert_relative_eq!(sim.cash(), 9_995.0);
        let pos = sim.position(SYMBOL).unwrap();
        assert_eq!(pos.side, PositionSide::Long);
        assert_relative_eq!(pos.entry_price, 50_000.0);
        assert_relative_eq!(pos.size, 0.1);
        assert_eq!(pos.leverage, 5);
        assert_eq!(pos.pyramid_level, 0);
        assert_eq!(sim.trades().len(), 1);
        assert_eq!(sim.trades()[0].realized_pnl, 0.0);
    }

    #[test]
    fn round_trip_scenario() {
        let mut sim = long_sim();
        let upnl = sim.mark_to_market(SYMBOL, 51_000.0).unwrap();
        assert_relative_eq!(upnl, 100.0, epsilon = 1e-9);
        assert_relative_eq!(sim.balance().total, 10_095.0, epsilon = 1e-9);

        let outcome = sim.execute(&Order::market(SYMBOL, OrderSide::Sell, 0.1, 5), 51_000.0);
        let trade = match outcome {
            ExecutionOutcome::Closed(t) => t,
            other => panic!("expected close, got {other:?}"),
        };
        assert_relative_eq!(trade.realized_pnl, 100.0, epsilon = 1e-9);
        assert_relative_eq!(trade.commission, 5.1, epsilon = 1e-9);
        assert_relative_eq!(sim.cash(), 10_089.9, epsilon = 1e-9);
        assert!(sim.position(SYMBOL).is_none());
    }

    #[test]
    fn mark_to_market_at_entry_is_zero() {
        let mut sim = long_sim();
        assert_eq!(sim.mark_to_market(SYMBOL, 50_000.0), Some(0.0));
    }

    #[test]
    fn mark_to_market_without_position() {
        let mut sim = ExecutionSimulator::new(1_000.0);
        assert_eq!(sim.mark_to_market(SYMBOL, 10.0), None);
    }

    #[test]
    fn short_position_profits_on_fall() {
        let mut sim = ExecutionSimulator::new(10_000.0);
        sim.execute(&Order::market(SYMBOL, OrderSide::Sell, 1.0, 10), 1_000.0);
        assert_relative_eq!(sim.mark_to_market(SYMBOL, 980.0).unwrap(), 20.0);
        assert_relative_eq!(sim.mark_to_market(SYMBOL, 1_020.0).unwrap(), -20.0);
    }

    #[test]
    fn pyramid_uses_weighted_average_entry() {
        let mut sim = long_sim();
        let outcome = sim.execute(&Order::market(SYMBOL, OrderSide::Buy, 0.3, 5), 52_000.0);
        assert!(matches!(outcome, ExecutionOutcome::Added(_)));
        let pos = sim.position(SYMBOL).unwrap();
        let expected = (50_000.0 * 0.1 + 52_000.0 * 0.3) / 0.4;
        assert_relative_eq!(pos.entry_price, expected);
        assert_relative_eq!(pos.size, 0.4);
        assert_eq!(pos.pyramid_level, 1);
        assert_eq!(outcome.trade().unwrap().realized_pnl, 0.0);
    }

    #[test]
    fn partial_close_keeps_entry() {
        let mut sim = ExecutionSimulator::new(10_000.0);
        sim.execute(&Order::market(SYMBOL, OrderSide::Buy, 1.0, 5), 1_000.0);
        let outcome = sim.execute(&Order::market(SYMBOL, OrderSide::Sell, 0.4, 5), 1_100.0);
        assert!(matches!(outcome, ExecutionOutcome::Reduced(_)));
        assert_relative_eq!(outcome.trade().unwrap().realized_pnl, 40.0, epsilon = 1e-9);

        let pos = sim.position(SYMBOL).unwrap();
        assert_relative_eq!(pos.size, 0.6, epsilon = 1e-12);
        assert_relative_eq!(pos.entry_price, 1_000.0);
        // 10000 - 1.0 open fee - 0.44 close fee + 40 pnl
        assert_relative_eq!(sim.cash(), 10_038.56, epsilon = 1e-9);
    }

    #[test]
    fn oversized_close_removes_position_without_flipping() {
        let mut sim = ExecutionSimulator::new(10_000.0);
        sim.execute(&Order::market(SYMBOL, OrderSide::Buy, 1.0, 5), 1_000.0);
        let outcome = sim.execute(&Order::market(SYMBOL, OrderSide::Sell, 3.0, 5), 900.0);
        assert!(matches!(outcome, ExecutionOutcome::Closed(_)));
        assert_relative_eq!(outcome.trade().unwrap().realized_pnl, -100.0, epsilon = 1e-9);
        assert!(sim.position(SYMBOL).is_none());
    }

    #[test]
    fn rejection_leaves_state_untouched() {
        let mut sim = ExecutionSimulator::new(100.0);
        // margin 1000/5 = 200 > 100
        let outcome = sim.execute(&Order::market(SYMBOL, OrderSide::Buy, 1.0, 5), 1_000.0);
        assert_eq!(
            outcome,
            ExecutionOutcome::Rejected {
                required: 201.0,
                available: 100.0
            }
        );
        assert_relative_eq!(sim.cash(), 100.0);
        assert!(sim.position(SYMBOL).is_none());
        assert!(sim.trades().is_empty());
    }

    #[test]
    fn close_without_margin_cover_is_rejected() {
        let mut sim = ExecutionSimulator::new(10_000.0);
        sim.execute(&Order::market(SYMBOL, OrderSide::Buy, 10.0, 10), 1_000.0);

        // 10 * 1000 / 1 + 10 commission against 9990 cash
        let outcome = sim.execute(&Order::market(SYMBOL, OrderSide::Sell, 10.0, 1), 1_000.0);

        match outcome {
            ExecutionOutcome::Rejected {
                required,
                available,
            } => {
                assert_relative_eq!(required, 10_010.0, epsilon = 1e-9);
                assert_relative_eq!(available, 9_990.0, epsilon = 1e-9);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_relative_eq!(sim.cash(), 9_990.0, epsilon = 1e-9);
        assert_relative_eq!(sim.position(SYMBOL).unwrap().size, 10.0);
        assert_eq!(sim.trades().len(), 1);
    }

    #[test]
    fn place_market_order_assigns_sequential_ids() {
        let mut sim = ExecutionSimulator::new(10_000.0);
        let first = sim
            .place_order(Order::market(SYMBOL, OrderSide::Buy, 0.01, 5), 1_000.0)
            .unwrap();
        let second = sim
            .place_order(Order::market(SYMBOL, OrderSide::Sell, 0.01, 5), 1_000.0)
            .unwrap();
        assert_eq!(first, "paper_1");
        assert_eq!(second, "paper_2");
        assert_eq!(sim.trades().len(), 2);
    }

    #[test]
    fn place_order_surfaces_rejection() {
        let mut sim = ExecutionSimulator::new(10.0);
        let result = sim.place_order(Order::market(SYMBOL, OrderSide::Buy, 1.0, 1), 1_000.0);
        assert!(matches!(
            result,
            Err(ScalperError::InsufficientMargin { .. })
        ));
    }

    #[test]
    fn place_order_rejects_non_positive_size() {
        let mut sim = ExecutionSimulator::new(10_000.0);
        let result = sim.place_order(Order::market(SYMBOL, OrderSide::Buy, 0.0, 1), 1_000.0);
        assert!(matches!(result, Err(ScalperError::InvalidOrder { .. })));
    }

    #[test]
    fn place_market_order_without_price_fails() {
        let mut sim = ExecutionSimulator::new(10_000.0);
        let result = sim.place_order(Order::market(SYMBOL, OrderSide::Buy, 1.0, 1), 0.0);
        assert!(matches!(result, Err(ScalperError::NoData { .. })));
        assert!(sim.trades().is_empty());
    }

    #[test]
    fn limit_orders_stay_pending_until_cancelled() {
        let mut sim = ExecutionSimulator::new(10_000.0);
        let id = sim
            .place_order(Order::limit(SYMBOL, OrderSide::Buy, 0.1, 900.0, 1), 1_000.0)
            .unwrap();
        assert!(sim.pending_orders().contains_key(&id));
        assert!(sim.position(SYMBOL).is_none());
        assert!(sim.cancel_order(&id));
        assert!(!sim.cancel_order(&id));
        assert!(sim.pending_orders().is_empty());
    }

    #[test]
    fn stops_do_not_fire_between_levels() {
        let mut sim = long_sim();
        sim.set_protection(SYMBOL, 49_000.0, 52_000.0);
        for price in [49_001.0, 50_000.0, 51_999.0] {
            assert_eq!(sim.check_stops(SYMBOL, price), None);
        }
        assert!(sim.position(SYMBOL).is_some());
    }

    #[test]
    fn stop_loss_closes_position() {
        let mut sim = long_sim();
        sim.set_protection(SYMBOL, 49_000.0, 52_000.0);
        assert_eq!(sim.check_stops(SYMBOL, 48_900.0), Some(ExitReason::StopLoss));
        assert!(sim.position(SYMBOL).is_none());
        let last = sim.trades().last().unwrap();
        assert_eq!(last.side, OrderSide::Sell);
        assert_relative_eq!(last.realized_pnl, -110.0, epsilon = 1e-9);
    }

    #[test]
    fn take_profit_closes_short() {
        let mut sim = ExecutionSimulator::new(10_000.0);
        sim.execute(&Order::market(SYMBOL, OrderSide::Sell, 0.1, 5), 50_000.0);
        sim.set_protection(SYMBOL, 51_000.0, 48_000.0);
        assert_eq!(sim.check_stops(SYMBOL, 47_500.0), Some(ExitReason::TakeProfit));
        assert_eq!(sim.trades().last().unwrap().side, OrderSide::Buy);
    }

    #[test]
    fn stop_wins_when_both_levels_cross() {
        let mut sim = long_sim();
        sim.set_protection(SYMBOL, 50_500.0, 50_500.0);
        assert_eq!(sim.check_stops(SYMBOL, 50_500.0), Some(ExitReason::StopLoss));
        assert_eq!(sim.trades().len(), 2);
        assert_eq!(sim.check_stops(SYMBOL, 50_500.0), None);
    }

    #[test]
    fn unset_levels_never_trigger() {
        let mut sim = long_sim();
        assert_eq!(sim.check_stops(SYMBOL, 1.0), None);
        assert_eq!(sim.check_stops(SYMBOL, 1_000_000.0), None);
    }

    #[test]
    fn set_protection_requires_position() {
        let mut sim = ExecutionSimulator::new(10_000.0);
        assert!(!sim.set_protection(SYMBOL, 1.0, 2.0));
    }

    #[test]
    fn stats_after_round_trip() {
        let mut sim = long_sim();
        sim.execute(&Order::market(SYMBOL, OrderSide::Sell, 0.1, 5), 51_000.0);
        let stats = sim.stats();
        assert_eq!(stats.total_trades, 2);
        assert_relative_eq!(stats.total_pnl, 100.0, epsilon = 1e-9);
        assert_relative_eq!(stats.total_commission, 10.1, epsilon = 1e-9);
        assert_relative_eq!(stats.win_rate, 50.0);
        assert_relative_eq!(stats.total_return, 0.899, epsilon = 1e-9);
    }

    #[test]
    fn pinned_clock_stamps_trades() {
        use chrono::TimeZone;
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut sim = ExecutionSimulator::new(10_000.0);
        sim.set_time(ts);
        sim.execute(&Order::market(SYMBOL, OrderSide::Buy, 0.01, 1), 1_000.0);
        assert_eq!(sim.trades()[0].timestamp, ts);
        assert_eq!(sim.position(SYMBOL).unwrap().opened_at, ts);
    }
}
