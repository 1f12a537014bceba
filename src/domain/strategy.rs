//! Strategy state machine and risk helpers.
//!
//! States are derived from the venue position each cycle:
//! - `Flat`: enter on momentum + confidence + trend/score agreement
//! - `InPosition`: close on trend reversal, pyramid on a confirmed winner

use chrono::Utc;
use tracing::debug;

use super::bar::Bar;
use super::error::ScalperError;
use super::features::{SequenceFeatures, assemble_features};
use super::momentum::{MomentumConfig, MomentumEngine, TrendLabel};
use super::position::{Position, PositionSide};
use super::signal::{Action, Signal};
use crate::ports::scoring_port::{ScoreClass, ScoringPort};

/// Unrealized profit, in percent, a position needs before pyramiding.
pub const PYRAMID_PROFIT_GATE_PCT: f64 = 1.0;
const CLOSE_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub momentum: MomentumConfig,
    pub prediction_threshold: f64,
    pub sequence_window: usize,
    pub pyramiding_levels: u32,
    pub position_size_percent: f64,
    pub min_position_size: f64,
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub trailing_stop_percent: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            momentum: MomentumConfig::default(),
            prediction_threshold: 0.65,
            sequence_window: 50,
            pyramiding_levels: 3,
            position_size_percent: 2.0,
            min_position_size: 10.0,
            stop_loss_percent: 1.5,
            take_profit_percent: 3.0,
            trailing_stop_percent: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Flat,
    InPosition {
        side: PositionSide,
        pyramid_level: u32,
    },
}

impl StrategyState {
    pub fn from_position(position: Option<&Position>) -> Self {
        match position {
            None => StrategyState::Flat,
            Some(p) => StrategyState::InPosition {
                side: p.side,
                pyramid_level: p.pyramid_level,
            },
        }
    }
}

/// Indicator readings for one decision.
#[derive(Debug, Clone, Copy)]
struct Reading {
    momentum: f64,
    trend: TrendLabel,
    class: ScoreClass,
    confidence: f64,
    trend_strength: f64,
    last_close: f64,
}

#[derive(Debug, Clone)]
pub struct Strategy {
    config: StrategyConfig,
    momentum: MomentumEngine,
}

impl Strategy {
    pub fn new(config: StrategyConfig) -> Self {
        let momentum = MomentumEngine::new(config.momentum.clone());
        Self { config, momentum }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn momentum_engine(&self) -> &MomentumEngine {
        &self.momentum
    }

    /// One decision cycle. The scorer is only consulted once at least
    /// `window` bars are available; its errors propagate.
    pub fn evaluate(
        &self,
        symbol: &str,
        bars: &[Bar],
        position: Option<&Position>,
        scorer: &dyn ScoringPort,
    ) -> Result<Signal, ScalperError> {
        if bars.len() < self.config.momentum.window {
            return Ok(Signal::hold(symbol, "insufficient data"));
        }

        let momentum = self.momentum.momentum_score(bars);
        let trend = self.momentum.detect_trend(bars);

        let window = &bars[bars.len().saturating_sub(self.config.sequence_window)..];
        let seq = SequenceFeatures::from_bars(window);
        let features = assemble_features(bars, &seq, momentum);
        let score = scorer.score(&features)?;

        let reading = Reading {
            momentum,
            trend,
            class: score.predicted_class(),
            confidence: score.confidence(),
            trend_strength: seq.trend_strength,
            last_close: bars.last().map_or(0.0, |b| b.close),
        };

        let state = StrategyState::from_position(position);
        let signal = match (state, position) {
            (StrategyState::InPosition { side, pyramid_level }, Some(p)) => {
                let profit_pct = p.profit_pct(reading.last_close);
                self.position_signal(symbol, side, pyramid_level, profit_pct, &reading)
            }
            _ => self.entry_signal(symbol, &reading),
        };
        debug!(
            symbol,
            state = ?state,
            trend = %trend,
            momentum,
            action = %signal.action,
            reason = %signal.reason,
            "strategy decision"
        );
        Ok(signal)
    }

    fn entry_signal(&self, symbol: &str, r: &Reading) -> Signal {
        if r.momentum < self.config.momentum.threshold {
            return self.hold(symbol, r, "momentum below threshold");
        }
        if r.confidence < self.config.prediction_threshold {
            return self.hold(symbol, r, "confidence below threshold");
        }
        match (r.trend, r.class) {
            (TrendLabel::Bullish, ScoreClass::Buy) => self.signal(
                symbol,
                r,
                Action::Buy,
                r.confidence,
                format!("bullish trend with momentum {:.2}", r.momentum),
            ),
            (TrendLabel::Bearish, ScoreClass::Sell) => self.signal(
                symbol,
                r,
                Action::Sell,
                r.confidence,
                format!("bearish trend with momentum {:.2}", r.momentum),
            ),
            _ => self.hold(symbol, r, "no strong signal"),
        }
    }

    fn position_signal(
        &self,
        symbol: &str,
        side: PositionSide,
        pyramid_level: u32,
        profit_pct: f64,
        r: &Reading,
    ) -> Signal {
        let trend_matches = matches!(
            (side, r.trend),
            (PositionSide::Long, TrendLabel::Bullish) | (PositionSide::Short, TrendLabel::Bearish)
        );
        if !trend_matches {
            return self.signal(
                symbol,
                r,
                Action::Close,
                CLOSE_CONFIDENCE,
                "trend reversal".to_string(),
            );
        }

        let class_matches = matches!(
            (side, r.class),
            (PositionSide::Long, ScoreClass::Buy) | (PositionSide::Short, ScoreClass::Sell)
        );
        if pyramid_level < self.config.pyramiding_levels
            && profit_pct > PYRAMID_PROFIT_GATE_PCT
            && class_matches
            && r.confidence >= self.config.prediction_threshold
        {
            return self.signal(
                symbol,
                r,
                Action::Pyramid,
                r.confidence,
                format!("pyramiding at level {}", pyramid_level + 1),
            );
        }

        self.hold(symbol, r, "holding position")
    }

    fn signal(
        &self,
        symbol: &str,
        r: &Reading,
        action: Action,
        confidence: f64,
        reason: String,
    ) -> Signal {
        Signal {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            action,
            confidence,
            reason,
            momentum_score: r.momentum,
            trend_strength: r.trend_strength,
        }
    }

    fn hold(&self, symbol: &str, r: &Reading, reason: &str) -> Signal {
        Signal {
            momentum_score: r.momentum,
            trend_strength: r.trend_strength,
            ..Signal::hold(symbol, reason)
        }
    }

    /// Units to trade: `available * pct * leverage / price`, or 0 when the
    /// leveraged value is under `min_position_size`.
    pub fn position_size(&self, available: f64, leverage: u32, price: f64) -> f64 {
        if price <= 0.0 || available <= 0.0 {
            return 0.0;
        }
        let value = available * self.config.position_size_percent / 100.0 * leverage as f64;
        if value < self.config.min_position_size {
            return 0.0;
        }
        value / price
    }

    /// Half of a fresh entry's size.
    pub fn pyramid_size(&self, available: f64, leverage: u32, price: f64) -> f64 {
        self.position_size(available, leverage, price) / 2.0
    }

    pub fn stop_loss_price(&self, entry_price: f64, side: PositionSide) -> f64 {
        let pct = self.config.stop_loss_percent / 100.0;
        match side {
            PositionSide::Long => entry_price * (1.0 - pct),
            PositionSide::Short => entry_price * (1.0 + pct),
        }
    }

    pub fn take_profit_price(&self, entry_price: f64, side: PositionSide) -> f64 {
        let pct = self.config.take_profit_percent / 100.0;
        match side {
            PositionSide::Long => entry_price * (1.0 + pct),
            PositionSide::Short => entry_price * (1.0 - pct),
        }
    }

    /// Proposed stop that only tightens in the profit direction and never
    /// crosses back over the entry price. Returns the current stop otherwise.
    pub fn trailing_stop(&self, position: &Position, price: f64) -> f64 {
        let pct = self.config.trailing_stop_percent / 100.0;
        match position.side {
            PositionSide::Long => {
                let proposed = price * (1.0 - pct);
                if proposed > position.stop_loss && proposed > position.entry_price {
                    return proposed;
                }
            }
            PositionSide::Short => {
                let proposed = price * (1.0 + pct);
                if (position.stop_loss == 0.0 || proposed < position.stop_loss)
                    && proposed < position.entry_price
                {
                    return proposed;
                }
            }
        }
        position.stop_loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::scoring_port::Score;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use std::cell::Cell;

    struct FixedScorer {
        probabilities: Vec<f64>,
        calls: Cell<usize>,
    }

    impl FixedScorer {
        fn new(probabilities: [f64; 3]) -> Self {
            Self {
                probabilities: probabilities.to_vec(),
                calls: Cell::new(0),
            }
        }
    }

    impl ScoringPort for FixedScorer {
        fn score(&self, features: &[f64]) -> Result<Score, ScalperError> {
            assert_eq!(features.len(), crate::domain::features::FEATURE_VECTOR_LEN);
            self.calls.set(self.calls.get() + 1);
            Ok(Score::new(self.probabilities.clone()))
        }
    }

    struct FailingScorer;

    impl ScoringPort for FailingScorer {
        fn score(&self, _features: &[f64]) -> Result<Score, ScalperError> {
            Err(ScalperError::Scoring {
                reason: "model unavailable".into(),
            })
        }
    }

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::minutes(i as i64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 100.0,
                timeframe: 1,
            })
            .collect()
    }

    fn rising() -> Vec<Bar> {
        make_bars(&[100.0, 110.0, 125.0, 145.0, 170.0])
    }

    fn falling() -> Vec<Bar> {
        make_bars(&[170.0, 145.0, 125.0, 110.0, 100.0])
    }

    fn flat() -> Vec<Bar> {
        make_bars(&[100.0; 5])
    }

    fn strategy(threshold: f64) -> Strategy {
        Strategy::new(StrategyConfig {
            momentum: MomentumConfig {
                threshold,
                window: 5,
                sensitivity: 1.5,
            },
            ..StrategyConfig::default()
        })
    }

    fn make_position(side: PositionSide, entry: f64, level: u32) -> Position {
        Position {
            symbol: "BTC-USDT".into(),
            side,
            entry_price: entry,
            size: 1.0,
            leverage: 5,
            stop_loss: 0.0,
            take_profit: 0.0,
            opened_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            pyramid_level: level,
            unrealized_pnl: 0.0,
        }
    }

    const BUY: [f64; 3] = [0.1, 0.8, 0.1];
    const SELL: [f64; 3] = [0.1, 0.1, 0.8];
    const WEAK_BUY: [f64; 3] = [0.3, 0.4, 0.3];

    #[test]
    fn insufficient_data_skips_scorer() {
        let scorer = FixedScorer::new(BUY);
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &rising()[..4], None, &scorer)
            .unwrap();
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reason, "insufficient data");
        assert_eq!(scorer.calls.get(), 0);
    }

    #[test]
    fn low_momentum_holds_for_any_score() {
        for probs in [BUY, SELL, WEAK_BUY] {
            let scorer = FixedScorer::new(probs);
            for bars in [rising(), falling(), flat()] {
                let signal = strategy(1.01).evaluate("BTC-USDT", &bars, None, &scorer).unwrap();
                assert_eq!(signal.action, Action::Hold);
                assert_eq!(signal.reason, "momentum below threshold");
            }
        }
    }

    #[test]
    fn low_confidence_holds() {
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &rising(), None, &FixedScorer::new(WEAK_BUY))
            .unwrap();
        assert_eq!(signal.reason, "confidence below threshold");
    }

    #[test]
    fn bullish_trend_with_buy_class_enters_long() {
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &rising(), None, &FixedScorer::new(BUY))
            .unwrap();
        assert_eq!(signal.action, Action::Buy);
        assert_relative_eq!(signal.confidence, 0.8);
        assert!(signal.momentum_score >= 0.5);
        assert!(signal.trend_strength > 0.0);
    }

    #[test]
    fn bearish_trend_with_sell_class_enters_short() {
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &falling(), None, &FixedScorer::new(SELL))
            .unwrap();
        assert_eq!(signal.action, Action::Sell);
    }

    #[test]
    fn disagreeing_trend_and_class_holds() {
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &rising(), None, &FixedScorer::new(SELL))
            .unwrap();
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reason, "no strong signal");
    }

    #[test]
    fn long_closes_on_bearish_trend() {
        let pos = make_position(PositionSide::Long, 150.0, 0);
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &falling(), Some(&pos), &FixedScorer::new(BUY))
            .unwrap();
        assert_eq!(signal.action, Action::Close);
        assert_eq!(signal.reason, "trend reversal");
        assert_relative_eq!(signal.confidence, 0.8);
    }

    #[test]
    fn position_closes_on_neutral_trend() {
        let pos = make_position(PositionSide::Short, 100.0, 0);
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &flat(), Some(&pos), &FixedScorer::new(SELL))
            .unwrap();
        assert_eq!(signal.action, Action::Close);
    }

    #[test]
    fn winning_long_pyramids() {
        // last close 170 is well above the 1% gate over 100
        let pos = make_position(PositionSide::Long, 100.0, 0);
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &rising(), Some(&pos), &FixedScorer::new(BUY))
            .unwrap();
        assert_eq!(signal.action, Action::Pyramid);
        assert_eq!(signal.reason, "pyramiding at level 1");
    }

    #[test]
    fn winning_short_pyramids() {
        let pos = make_position(PositionSide::Short, 150.0, 1);
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &falling(), Some(&pos), &FixedScorer::new(SELL))
            .unwrap();
        assert_eq!(signal.action, Action::Pyramid);
    }

    #[test]
    fn pyramid_capped_by_levels() {
        let pos = make_position(PositionSide::Long, 100.0, 3);
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &rising(), Some(&pos), &FixedScorer::new(BUY))
            .unwrap();
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.reason, "holding position");
    }

    #[test]
    fn pyramid_requires_profit_gate() {
        // 170 vs 169 is under 1%
        let pos = make_position(PositionSide::Long, 169.0, 0);
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &rising(), Some(&pos), &FixedScorer::new(BUY))
            .unwrap();
        assert_eq!(signal.action, Action::Hold);
    }

    #[test]
    fn pyramid_requires_agreeing_class() {
        let pos = make_position(PositionSide::Long, 100.0, 0);
        let signal = strategy(0.5)
            .evaluate("BTC-USDT", &rising(), Some(&pos), &FixedScorer::new([0.8, 0.1, 0.1]))
            .unwrap();
        assert_eq!(signal.action, Action::Hold);
    }

    #[test]
    fn scorer_error_propagates() {
        let result = strategy(0.5).evaluate("BTC-USDT", &rising(), None, &FailingScorer);
        assert!(matches!(result, Err(ScalperError::Scoring { .. })));
    }

    #[test]
    fn state_from_position() {
        assert_eq!(StrategyState::from_position(None), StrategyState::Flat);
        let pos = make_position(PositionSide::Short, 1.0, 2);
        assert_eq!(
            StrategyState::from_position(Some(&pos)),
            StrategyState::InPosition {
                side: PositionSide::Short,
                pyramid_level: 2
            }
        );
    }

    #[test]
    fn position_size_applies_percent_and_leverage() {
        let s = Strategy::new(StrategyConfig::default());
        // 10000 * 2% * 5 = 1000 notional at 50000
        assert_relative_eq!(s.position_size(10_000.0, 5, 50_000.0), 0.02);
        assert_relative_eq!(s.pyramid_size(10_000.0, 5, 50_000.0), 0.01);
    }

    #[test]
    fn position_size_below_minimum_is_zero() {
        let s = Strategy::new(StrategyConfig::default());
        // 100 * 2% * 1 = 2 < 10
        assert_eq!(s.position_size(100.0, 1, 50.0), 0.0);
        assert_eq!(s.position_size(10_000.0, 5, 0.0), 0.0);
    }

    #[test]
    fn stop_and_target_prices() {
        let s = Strategy::new(StrategyConfig::default());
        assert_relative_eq!(s.stop_loss_price(100.0, PositionSide::Long), 98.5, epsilon = 1e-9);
        assert_relative_eq!(s.stop_loss_price(100.0, PositionSide::Short), 101.5, epsilon = 1e-9);
        assert_relative_eq!(s.take_profit_price(100.0, PositionSide::Long), 103.0, epsilon = 1e-9);
        assert_relative_eq!(s.take_profit_price(100.0, PositionSide::Short), 97.0, epsilon = 1e-9);
    }

    #[test]
    fn trailing_stop_long_only_moves_up_above_entry() {
        let s = Strategy::new(StrategyConfig::default());
        let mut pos = make_position(PositionSide::Long, 100.0, 0);
        pos.stop_loss = 98.5;
        // 100.2 * 0.995 < entry
        assert_relative_eq!(s.trailing_stop(&pos, 100.2), 98.5);
        // 110 * 0.995 = 109.45
        assert_relative_eq!(s.trailing_stop(&pos, 110.0), 109.45, epsilon = 1e-9);
        pos.stop_loss = 109.45;
        assert_relative_eq!(s.trailing_stop(&pos, 105.0), 109.45);
    }

    #[test]
    fn trailing_stop_short_only_moves_down_below_entry() {
        let s = Strategy::new(StrategyConfig::default());
        let mut pos = make_position(PositionSide::Short, 100.0, 0);
        pos.stop_loss = 101.5;
        assert_relative_eq!(s.trailing_stop(&pos, 99.8), 101.5);
        assert_relative_eq!(s.trailing_stop(&pos, 90.0), 90.45, epsilon = 1e-9);
        pos.stop_loss = 0.0;
        assert_relative_eq!(s.trailing_stop(&pos, 90.0), 90.45, epsilon = 1e-9);
        pos.stop_loss = 90.45;
        assert_relative_eq!(s.trailing_stop(&pos, 95.0), 90.45);
    }
}
