//! Decision-cycle driver.
//!
//! One cycle: fetch base bars, refresh the aggregator, maintain the open
//! position (mark-to-market, trailing stop, protective exits), ask the
//! strategy for a signal, execute it, then check the daily loss limit.
//! Venue failures degrade the cycle to a hold; only errors the cycle cannot
//! absorb are returned to the caller.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use super::aggregator::TimeframeAggregator;
use super::bar::Bar;
use super::error::ScalperError;
use super::execution::ExitReason;
use super::metrics::{Balance, TradingStats};
use super::order::{Order, OrderSide};
use super::position::Position;
use super::settings::ScalperConfig;
use super::signal::{Action, Signal};
use super::strategy::Strategy;
use crate::ports::scoring_port::ScoringPort;
use crate::ports::venue_port::VenuePort;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cloneable cancellation flag shared with whoever needs to stop the run.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    Requested,
    DurationElapsed,
    RiskLimit { loss_pct: f64, limit_pct: f64 },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => f.write_str("stop requested"),
            StopReason::DurationElapsed => f.write_str("run duration elapsed"),
            StopReason::RiskLimit {
                loss_pct,
                limit_pct,
            } => write!(
                f,
                "daily loss {loss_pct:.2}% exceeded limit {limit_pct:.2}%"
            ),
        }
    }
}

/// What happened during one decision cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub signal: Signal,
    /// Venue id of the order placed for the signal, if any.
    pub order_id: Option<String>,
    pub exit: Option<ExitReason>,
    pub balance: Balance,
    pub daily_loss_pct: f64,
    pub risk_limit_breached: bool,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub cycles: u64,
    pub stop_reason: StopReason,
    pub balance: Balance,
    /// Only available from simulated venues.
    pub stats: Option<TradingStats>,
}

pub struct TradingEngine<V: VenuePort, S: ScoringPort> {
    config: ScalperConfig,
    strategy: Strategy,
    aggregator: TimeframeAggregator,
    venue: V,
    scorer: S,
    stop: StopHandle,
    cycle_interval: Duration,
    day_start: Option<(NaiveDate, f64)>,
}

impl<V: VenuePort, S: ScoringPort> TradingEngine<V, S> {
    pub fn new(config: ScalperConfig, venue: V, scorer: S) -> Self {
        let strategy = Strategy::new(config.strategy.clone());
        let aggregator = TimeframeAggregator::new(&config.timeframes);
        let cycle_interval = config.cycle_interval();
        TradingEngine {
            config,
            strategy,
            aggregator,
            venue,
            scorer,
            stop: StopHandle::new(),
            cycle_interval,
            day_start: None,
        }
    }

    /// Override the sleep between cycles.
    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    pub fn config(&self) -> &ScalperConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &TimeframeAggregator {
        &self.aggregator
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn venue_mut(&mut self) -> &mut V {
        &mut self.venue
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Cycle until stopped, `duration` elapses or the daily loss limit is
    /// breached. Always finishes with an orderly stop; a fatal cycle error
    /// is returned after it.
    pub fn run(&mut self, duration: Option<Duration>) -> Result<RunSummary, ScalperError> {
        let started = Instant::now();
        let mut cycles = 0u64;
        info!(
            symbol = %self.config.symbol,
            mode = %self.config.mode,
            interval_secs = self.cycle_interval.as_secs_f64(),
            "trading engine started"
        );

        let outcome = loop {
            if self.stop.is_stopped() {
                break Ok(StopReason::Requested);
            }
            if duration.is_some_and(|limit| started.elapsed() >= limit) {
                break Ok(StopReason::DurationElapsed);
            }

            match self.run_cycle() {
                Ok(report) => {
                    cycles += 1;
                    if report.risk_limit_breached {
                        break Ok(StopReason::RiskLimit {
                            loss_pct: report.daily_loss_pct,
                            limit_pct: self.config.max_daily_loss_percent,
                        });
                    }
                }
                Err(e) => {
                    error!(error = %e, symbol = %self.config.symbol, "fatal error in decision cycle");
                    break Err(e);
                }
            }

            self.wait_for_next_cycle(started, duration);
        };

        let (balance, stats) = self.shutdown();
        match outcome {
            Ok(stop_reason) => {
                info!(cycles, reason = %stop_reason, "trading engine stopped");
                Ok(RunSummary {
                    cycles,
                    stop_reason,
                    balance,
                    stats,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn wait_for_next_cycle(&self, started: Instant, duration: Option<Duration>) {
        let wake = Instant::now() + self.cycle_interval;
        loop {
            let now = Instant::now();
            if now >= wake || self.stop.is_stopped() {
                return;
            }
            if duration.is_some_and(|limit| started.elapsed() >= limit) {
                return;
            }
            thread::sleep(STOP_POLL_INTERVAL.min(wake - now));
        }
    }

    /// Log final statistics.
    fn shutdown(&mut self) -> (Balance, Option<TradingStats>) {
        let balance = self.venue.get_balance().unwrap_or_else(|e| {
            warn!(error = %e, "could not fetch final balance");
            Balance::default()
        });
        let stats = self.venue.simulation().map(|sim| sim.stats());
        if let Some(stats) = &stats {
            info!(
                total_trades = stats.total_trades,
                total_pnl = stats.total_pnl,
                total_commission = stats.total_commission,
                win_rate = stats.win_rate,
                current_balance = stats.current_balance,
                total_return = stats.total_return,
                "final statistics"
            );
        } else {
            info!(
                total = balance.total,
                available = balance.available,
                "final balance"
            );
        }
        (balance, stats)
    }

    pub fn run_cycle(&mut self) -> Result<CycleReport, ScalperError> {
        let symbol = self.config.symbol.clone();
        let base_tf = self.config.base_timeframe();

        let fetched = match self
            .venue
            .get_candles(&symbol, base_tf, self.config.candle_limit)
        {
            Ok(bars) => bars,
            Err(e) => {
                warn!(error = %e, symbol = %symbol, timeframe = base_tf, "candle fetch failed");
                return Ok(self.hold_report(&symbol, "candles unavailable"));
            }
        };
        let added = self.aggregator.extend(fetched);
        let history: Vec<Bar> = self.aggregator.bars(base_tf, usize::MAX).to_vec();
        self.aggregator.refresh_higher_timeframes(&history);
        debug!(symbol = %symbol, added, buffered = history.len(), "bars refreshed");

        let last_close = history.last().map(|b| b.close);
        let Some(mut position) = self.fetch_position(&symbol) else {
            return Ok(self.hold_report(&symbol, "position unavailable"));
        };

        let mut exit = None;
        if let (Some(pos), Some(price)) = (position.as_ref(), last_close) {
            let trail = self.strategy.trailing_stop(pos, price);
            if let Some(sim) = self.venue.simulation() {
                sim.mark_to_market(&symbol);
                if (trail - pos.stop_loss).abs() > f64::EPSILON {
                    debug!(symbol = %symbol, from = pos.stop_loss, to = trail, "trailing stop moved");
                    sim.set_protection(&symbol, trail, pos.take_profit);
                }
                exit = sim.check_stops(&symbol);
            }
        }
        if exit.is_some() {
            match self.fetch_position(&symbol) {
                Some(refreshed) => position = refreshed,
                None => {
                    let mut report = self.hold_report(&symbol, "position unavailable");
                    report.exit = exit;
                    return Ok(report);
                }
            }
        }

        let signal = self
            .strategy
            .evaluate(&symbol, &history, position.as_ref(), &self.scorer)?;

        let order_id = match (signal.action, last_close) {
            (Action::Hold, _) | (_, None) => None,
            (_, Some(price)) => self.execute_signal(&signal, position.as_ref(), price)?,
        };

        let balance = self.venue.get_balance().unwrap_or_else(|e| {
            warn!(error = %e, "balance fetch failed");
            Balance::default()
        });
        info!(
            symbol = %symbol,
            action = %signal.action,
            confidence = signal.confidence,
            momentum = signal.momentum_score,
            reason = %signal.reason,
            total = balance.total,
            available = balance.available,
            unrealized_pnl = balance.unrealized_pnl,
            "cycle complete"
        );

        let now = history.last().map_or_else(Utc::now, |b| b.timestamp);
        let (daily_loss_pct, risk_limit_breached) = if balance.total > 0.0 {
            match self.check_daily_loss(balance.total, now) {
                Ok(loss_pct) => (loss_pct, false),
                Err(ScalperError::RiskLimit { loss_pct, limit_pct }) => {
                    warn!(loss_pct, limit_pct, "daily loss limit breached, stopping");
                    (loss_pct, true)
                }
                Err(e) => return Err(e),
            }
        } else {
            (0.0, false)
        };

        Ok(CycleReport {
            signal,
            order_id,
            exit,
            balance,
            daily_loss_pct,
            risk_limit_breached,
        })
    }

    /// Outer `None` when the venue could not report the position.
    fn fetch_position(&mut self, symbol: &str) -> Option<Option<Position>> {
        match self.venue.get_position(symbol) {
            Ok(position) => Some(position),
            Err(e) => {
                warn!(error = %e, symbol, "position fetch failed");
                None
            }
        }
    }

    /// Report for a cycle abandoned because the venue could not be read.
    /// No signal is acted on and the daily loss baseline is left alone.
    fn hold_report(&mut self, symbol: &str, reason: &str) -> CycleReport {
        let balance = self.venue.get_balance().unwrap_or_else(|e| {
            warn!(error = %e, "balance fetch failed");
            Balance::default()
        });
        info!(symbol, reason, "cycle skipped");
        CycleReport {
            signal: Signal::hold(symbol, reason),
            order_id: None,
            exit: None,
            balance,
            daily_loss_pct: 0.0,
            risk_limit_breached: false,
        }
    }

    fn execute_signal(
        &mut self,
        signal: &Signal,
        position: Option<&Position>,
        price: f64,
    ) -> Result<Option<String>, ScalperError> {
        let symbol = signal.symbol.as_str();
        match (signal.action, position) {
            (Action::Buy | Action::Sell, None) => {
                let side = if signal.action == Action::Buy {
                    OrderSide::Buy
                } else {
                    OrderSide::Sell
                };
                let leverage = self.config.default_leverage;
                let Some(available) = self.available_balance() else {
                    return Ok(None);
                };
                let size = self.strategy.position_size(available, leverage, price);
                if size <= 0.0 {
                    debug!(symbol, available, "position size below minimum, skipping entry");
                    return Ok(None);
                }
                let id = self.submit(Order::market(symbol, side, size, leverage))?;
                if id.is_some() {
                    self.protect_new_position(symbol, price);
                }
                Ok(id)
            }
            (Action::Close, Some(pos)) => {
                self.submit(Order::market(symbol, pos.closing_side(), pos.size, pos.leverage))
            }
            (Action::Pyramid, Some(pos)) => {
                let leverage = pos.leverage.min(self.config.max_leverage);
                let Some(available) = self.available_balance() else {
                    return Ok(None);
                };
                let size = self.strategy.pyramid_size(available, leverage, price);
                if size <= 0.0 {
                    debug!(symbol, available, "pyramid size below minimum, skipping");
                    return Ok(None);
                }
                self.submit(Order::market(symbol, pos.adding_side(), size, leverage))
            }
            (action, _) => {
                debug!(symbol, %action, "signal does not apply to current position");
                Ok(None)
            }
        }
    }

    fn available_balance(&mut self) -> Option<f64> {
        match self.venue.get_balance() {
            Ok(balance) => Some(balance.available),
            Err(e) => {
                warn!(error = %e, "balance fetch failed, skipping order");
                None
            }
        }
    }

    /// Place a market order. Rejections and venue failures are logged and
    /// yield `None`.
    fn submit(&mut self, order: Order) -> Result<Option<String>, ScalperError> {
        let (symbol, side, size, leverage) =
            (order.symbol.clone(), order.side, order.size, order.leverage);
        match self.venue.place_order(order) {
            Ok(id) => {
                info!(order_id = %id, symbol = %symbol, %side, size, leverage, "order placed");
                Ok(Some(id))
            }
            Err(
                e @ (ScalperError::InsufficientMargin { .. } | ScalperError::InvalidOrder { .. }),
            ) => {
                warn!(error = %e, symbol = %symbol, %side, size, "order rejected");
                Ok(None)
            }
            Err(e @ (ScalperError::Venue { .. } | ScalperError::NoData { .. })) => {
                warn!(error = %e, symbol = %symbol, %side, "order placement failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn protect_new_position(&mut self, symbol: &str, price: f64) {
        let Some(Some(position)) = self.fetch_position(symbol) else {
            return;
        };
        let entry = if position.entry_price > 0.0 {
            position.entry_price
        } else {
            price
        };
        let stop = self.strategy.stop_loss_price(entry, position.side);
        let target = self.strategy.take_profit_price(entry, position.side);
        if let Some(sim) = self.venue.simulation() {
            sim.set_protection(symbol, stop, target);
            debug!(symbol, stop, target, side = %position.side, "protection set");
        }
    }

    /// Loss in percent against equity at the first cycle of the UTC day.
    fn check_daily_loss(&mut self, total: f64, now: DateTime<Utc>) -> Result<f64, ScalperError> {
        let today = now.date_naive();
        let start_equity = match self.day_start {
            Some((day, equity)) if day == today => equity,
            _ => {
                debug!(%today, equity = total, "daily loss baseline reset");
                self.day_start = Some((today, total));
                total
            }
        };
        if start_equity <= 0.0 {
            return Ok(0.0);
        }
        let loss_pct = (start_equity - total) / start_equity * 100.0;
        if loss_pct > self.config.max_daily_loss_percent {
            return Err(ScalperError::RiskLimit {
                loss_pct,
                limit_pct: self.config.max_daily_loss_percent,
            });
        }
        Ok(loss_pct)
    }
}
