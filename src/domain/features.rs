//! Per-bar and per-sequence feature extraction for the scoring function.
//!
//! [`feature_vector`] always returns [`FEATURE_VECTOR_LEN`] values:
//! 1. five per-bar features for each of the last 10 bars, zero-padded to 50
//! 2. six sequence summary features
//! 3. the momentum score

use super::bar::Bar;
use super::stats::{finite_or_zero, linear_fit, mean, stddev};

pub const BAR_FEATURE_BARS: usize = 10;
pub const BAR_FEATURES_PER_BAR: usize = 5;
pub const SUMMARY_FEATURES: usize = 6;
pub const FEATURE_VECTOR_LEN: usize =
    BAR_FEATURE_BARS * BAR_FEATURES_PER_BAR + SUMMARY_FEATURES + 1;

const ATR_PERIOD: usize = 14;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarFeatures {
    pub body_size: f64,
    pub body_ratio: f64,
    pub upper_wick: f64,
    pub lower_wick: f64,
    pub total_range: f64,
    pub upper_wick_ratio: f64,
    pub lower_wick_ratio: f64,
    /// 1.0 for a bullish bar, else 0.0.
    pub is_bullish: f64,
    pub volume: f64,
    pub typical_price: f64,
    pub high_low_ratio: f64,
}

impl BarFeatures {
    pub fn from_bar(bar: &Bar) -> Self {
        let range = bar.range();
        let (upper_wick_ratio, lower_wick_ratio) = if range > 0.0 {
            (bar.upper_wick() / range, bar.lower_wick() / range)
        } else {
            (0.0, 0.0)
        };
        BarFeatures {
            body_size: bar.body(),
            body_ratio: bar.body_ratio(),
            upper_wick: bar.upper_wick(),
            lower_wick: bar.lower_wick(),
            total_range: range,
            upper_wick_ratio,
            lower_wick_ratio,
            is_bullish: if bar.is_bullish() { 1.0 } else { 0.0 },
            volume: bar.volume,
            typical_price: bar.typical_price(),
            high_low_ratio: if bar.low > 0.0 { bar.high / bar.low } else { 0.0 },
        }
    }

    fn scoring_slice(&self) -> [f64; BAR_FEATURES_PER_BAR] {
        [
            self.body_size,
            self.body_ratio,
            self.is_bullish,
            self.upper_wick_ratio,
            self.lower_wick_ratio,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceFeatures {
    pub bars: usize,
    pub price_mean: f64,
    pub price_std: f64,
    pub price_range: f64,
    pub price_change: f64,
    pub price_change_pct: f64,
    pub volume_mean: f64,
    pub volume_std: f64,
    pub volume_trend: f64,
    pub atr: f64,
    pub volatility: f64,
    /// sign(slope) * R^2 of close against index.
    pub trend_strength: f64,
    pub higher_highs: usize,
    pub lower_lows: usize,
    pub bullish_bars: usize,
    pub bearish_bars: usize,
}

impl SequenceFeatures {
    /// All-zero features for an empty sequence.
    pub fn from_bars(bars: &[Bar]) -> Self {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Self::default();
        };

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let max_close = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_close = closes.iter().copied().fold(f64::INFINITY, f64::min);
        let price_change = last.close - first.close;
        let price_change_pct = if first.close > 0.0 {
            price_change / first.close * 100.0
        } else {
            0.0
        };

        let volume_trend = if volumes.len() > 1 {
            linear_fit(&volumes).slope
        } else {
            0.0
        };

        let bullish_bars = bars.iter().filter(|b| b.is_bullish()).count();

        SequenceFeatures {
            bars: bars.len(),
            price_mean: mean(&closes),
            price_std: stddev(&closes),
            price_range: max_close - min_close,
            price_change,
            price_change_pct,
            volume_mean: mean(&volumes),
            volume_std: stddev(&volumes),
            volume_trend: finite_or_zero(volume_trend),
            atr: average_true_range(bars, ATR_PERIOD),
            volatility: return_volatility(&closes),
            trend_strength: trend_strength(&closes),
            higher_highs: bars.windows(2).filter(|w| w[1].high > w[0].high).count(),
            lower_lows: bars.windows(2).filter(|w| w[1].low < w[0].low).count(),
            bullish_bars,
            bearish_bars: bars.len() - bullish_bars,
        }
    }

    /// Fraction of bullish bars in the sequence, 0 when empty.
    ///
    /// Normalized by the sequence length, so it stays within [0, 1]. Models
    /// trained on vectors that divided the window's bullish count by the
    /// ten-bar feature block see values up to `window / 10` in this slot and
    /// need retraining before they can score these vectors.
    pub fn bullish_fraction(&self) -> f64 {
        if self.bars == 0 {
            0.0
        } else {
            self.bullish_bars as f64 / self.bars as f64
        }
    }
}

/// Mean of the trailing `period` true ranges; 0 with fewer than two bars.
pub fn average_true_range(bars: &[Bar], period: usize) -> f64 {
    if bars.len() < 2 || period == 0 {
        return 0.0;
    }
    let true_ranges: Vec<f64> = bars
        .windows(2)
        .map(|w| w[1].true_range(w[0].close))
        .collect();
    let start = true_ranges.len().saturating_sub(period);
    mean(&true_ranges[start..])
}

fn return_volatility(closes: &[f64]) -> f64 {
    if closes.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = closes
        .windows(2)
        .map(|w| {
            if w[0] == 0.0 {
                0.0
            } else {
                finite_or_zero((w[1] - w[0]) / w[0])
            }
        })
        .collect();
    stddev(&returns)
}

fn trend_strength(closes: &[f64]) -> f64 {
    if closes.len() < 2 {
        return 0.0;
    }
    let fit = linear_fit(closes);
    if fit.r_squared == 0.0 {
        return 0.0;
    }
    finite_or_zero(fit.slope.signum() * fit.r_squared)
}

/// Fixed-length scoring input built from the trailing bars.
///
/// Per-bar features use the last 10 bars; summary features use the last
/// `sequence_window` bars.
pub fn feature_vector(bars: &[Bar], sequence_window: usize, momentum: f64) -> Vec<f64> {
    let window = &bars[bars.len().saturating_sub(sequence_window)..];
    assemble_features(bars, &SequenceFeatures::from_bars(window), momentum)
}

/// Build the scoring vector from precomputed sequence features.
pub fn assemble_features(bars: &[Bar], seq: &SequenceFeatures, momentum: f64) -> Vec<f64> {
    let mut features = Vec::with_capacity(FEATURE_VECTOR_LEN);

    let recent = &bars[bars.len().saturating_sub(BAR_FEATURE_BARS)..];
    for bar in recent {
        features.extend(BarFeatures::from_bar(bar).scoring_slice());
    }
    features.resize(BAR_FEATURE_BARS * BAR_FEATURES_PER_BAR, 0.0);

    features.extend([
        seq.price_change_pct,
        seq.volume_trend,
        seq.atr,
        seq.volatility,
        seq.trend_strength,
        seq.bullish_fraction(),
    ]);
    features.push(momentum);

    features.into_iter().map(finite_or_zero).collect()
}
