#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use psiscalper::domain::bar::Bar;
use psiscalper::domain::error::ScalperError;
use psiscalper::domain::metrics::Balance;
use psiscalper::domain::momentum::MomentumConfig;
use psiscalper::domain::order::Order;
use psiscalper::domain::position::Position;
use psiscalper::domain::settings::ScalperConfig;
use psiscalper::domain::strategy::StrategyConfig;
use psiscalper::ports::scoring_port::{Score, ScoringPort};
use psiscalper::ports::venue_port::VenuePort;
use std::cell::Cell;

pub const SYMBOL: &str = "BTC-USDT";

pub const BUY: [f64; 3] = [0.1, 0.8, 0.1];
pub const SELL: [f64; 3] = [0.1, 0.1, 0.8];

pub const RISING: [f64; 5] = [100.0, 110.0, 125.0, 145.0, 170.0];
pub const FALLING: [f64; 5] = [170.0, 145.0, 125.0, 110.0, 100.0];

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn make_bar(minute: i64, close: f64) -> Bar {
    Bar {
        timestamp: start_time() + Duration::minutes(minute),
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 100.0,
        timeframe: 1,
    }
}

pub fn make_bars(start_minute: i64, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(start_minute + i as i64, close))
        .collect()
}

/// Small windows so a handful of bars is enough to trade.
pub fn sample_config() -> ScalperConfig {
    ScalperConfig {
        timeframes: vec![1, 5],
        candle_limit: 50,
        strategy: StrategyConfig {
            momentum: MomentumConfig {
                threshold: 0.5,
                window: 5,
                sensitivity: 1.5,
            },
            ..StrategyConfig::default()
        },
        ..ScalperConfig::default()
    }
}

pub struct FixedScorer {
    pub probabilities: [f64; 3],
    pub calls: Cell<usize>,
}

impl FixedScorer {
    pub fn new(probabilities: [f64; 3]) -> Self {
        Self {
            probabilities,
            calls: Cell::new(0),
        }
    }
}

impl ScoringPort for FixedScorer {
    fn score(&self, _features: &[f64]) -> Result<Score, ScalperError> {
        self.calls.set(self.calls.get() + 1);
        Ok(Score::new(self.probabilities.to_vec()))
    }
}

pub struct FailingScorer;

impl ScoringPort for FailingScorer {
    fn score(&self, _features: &[f64]) -> Result<Score, ScalperError> {
        Err(ScalperError::Scoring {
            reason: "model offline".into(),
        })
    }
}

/// Venue double without a simulation extension. Orders are recorded, never
/// filled.
pub struct MockVenue {
    pub candles: Vec<Bar>,
    pub position: Option<Position>,
    pub balance: Balance,
    pub orders: Vec<Order>,
    pub fail_candles: bool,
    pub fail_orders: bool,
    pub fail_position: bool,
    pub fail_balance: bool,
}

impl MockVenue {
    pub fn new(balance: f64) -> Self {
        Self {
            candles: Vec::new(),
            position: None,
            balance: Balance::new(balance, 0.0),
            orders: Vec::new(),
            fail_candles: false,
            fail_orders: false,
            fail_position: false,
            fail_balance: false,
        }
    }

    pub fn with_candles(mut self, bars: Vec<Bar>) -> Self {
        self.candles = bars;
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    fn outage() -> ScalperError {
        ScalperError::Venue {
            reason: "connection reset".into(),
        }
    }
}

impl VenuePort for MockVenue {
    fn get_candles(
        &mut self,
        _symbol: &str,
        _timeframe: u32,
        limit: usize,
    ) -> Result<Vec<Bar>, ScalperError> {
        if self.fail_candles {
            return Err(Self::outage());
        }
        Ok(self.candles[self.candles.len().saturating_sub(limit)..].to_vec())
    }

    fn place_order(&mut self, order: Order) -> Result<String, ScalperError> {
        if self.fail_orders {
            return Err(Self::outage());
        }
        self.orders.push(order);
        Ok(format!("mock_{}", self.orders.len()))
    }

    fn cancel_order(&mut self, _order_id: &str, _symbol: &str) -> Result<bool, ScalperError> {
        Ok(false)
    }

    fn get_position(&mut self, _symbol: &str) -> Result<Option<Position>, ScalperError> {
        if self.fail_position {
            return Err(Self::outage());
        }
        Ok(self.position.clone())
    }

    fn get_balance(&mut self) -> Result<Balance, ScalperError> {
        if self.fail_balance {
            return Err(Self::outage());
        }
        Ok(self.balance)
    }

    fn get_current_price(&mut self, symbol: &str) -> Result<f64, ScalperError> {
        self.candles
            .last()
            .map(|b| b.close)
            .ok_or_else(|| ScalperError::NoData {
                symbol: symbol.to_string(),
            })
    }
}
