//! Momentum engine: price trajectory, bounded momentum score, and trend label.
//!
//! Every function here is total over finite input. Insufficient data yields
//! the documented default (0.0 or [`TrendLabel::Neutral`]) rather than an error.

use std::fmt;

use super::bar::Bar;
use super::stats::{finite_or_zero, mean, stddev};

const PRICE_WEIGHT: f64 = 0.4;
const VOLUME_WEIGHT: f64 = 0.3;
const WAVE_WEIGHT: f64 = 0.3;
const TREND_TAIL: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumConfig {
    /// Score a trend must exceed to be labelled, in [0, 1].
    pub threshold: f64,
    /// Number of trailing bars scored.
    pub window: usize,
    pub sensitivity: f64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        MomentumConfig {
            threshold: 0.7,
            window: 20,
            sensitivity: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendLabel {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendLabel::Bullish => "bullish",
            TrendLabel::Bearish => "bearish",
            TrendLabel::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct MomentumEngine {
    config: MomentumConfig,
}

impl MomentumEngine {
    pub fn new(config: MomentumConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MomentumConfig {
        &self.config
    }

    /// velocity[i] + sensitivity * acceleration[i], both leading-zero padded.
    ///
    /// Output length equals input length; fewer than two bars give `[0.0]`.
    pub fn trajectory(&self, bars: &[Bar]) -> Vec<f64> {
        if bars.len() < 2 {
            return vec![0.0];
        }

        let velocity = first_difference(&bars.iter().map(|b| b.close).collect::<Vec<_>>());
        let acceleration = first_difference(&velocity);

        velocity
            .iter()
            .zip(acceleration.iter())
            .map(|(v, a)| v + self.config.sensitivity * a)
            .collect()
    }

    /// Weighted blend of price, volume and wave sub-scores over the last
    /// `window` bars, clamped to [0, 1].
    pub fn momentum_score(&self, bars: &[Bar]) -> f64 {
        let window = self.config.window;
        if window == 0 || bars.len() < window {
            return 0.0;
        }
        let recent = &bars[bars.len() - window..];

        let score = PRICE_WEIGHT * self.price_momentum(recent)
            + VOLUME_WEIGHT * volume_momentum(recent)
            + WAVE_WEIGHT * wave_strength(recent);

        finite_or_zero(score).clamp(0.0, 1.0)
    }

    pub fn detect_trend(&self, bars: &[Bar]) -> TrendLabel {
        let window = self.config.window;
        if window == 0 || bars.len() < window {
            return TrendLabel::Neutral;
        }

        let score = self.momentum_score(bars);
        let trajectory = self.trajectory(&bars[bars.len() - window..]);
        let tail_start = trajectory.len().saturating_sub(TREND_TAIL);
        let direction = mean(&trajectory[tail_start..]);

        if score > self.config.threshold && direction > 0.0 {
            TrendLabel::Bullish
        } else if score > self.config.threshold && direction < 0.0 {
            TrendLabel::Bearish
        } else {
            TrendLabel::Neutral
        }
    }

    /// Mean absolute relative close-to-close return, scaled by sensitivity.
    fn price_momentum(&self, bars: &[Bar]) -> f64 {
        let returns: Vec<f64> = bars
            .windows(2)
            .map(|w| relative_change(w[0].close, w[1].close).abs())
            .collect();
        mean(&returns) * self.config.sensitivity
    }
}

fn first_difference(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    out.push(0.0);
    out.extend(values.windows(2).map(|w| w[1] - w[0]));
    out
}

fn relative_change(prev: f64, current: f64) -> f64 {
    if prev == 0.0 {
        return 0.0;
    }
    finite_or_zero((current - prev) / prev)
}

/// Sum of |close change| weighted by each bar's share of total volume.
fn volume_momentum(bars: &[Bar]) -> f64 {
    let total_volume: f64 = bars.iter().map(|b| b.volume).sum();
    if total_volume == 0.0 {
        return 0.0;
    }
    let weighted: f64 = bars
        .windows(2)
        .map(|w| (w[1].close - w[0].close).abs() * w[1].volume)
        .sum();
    finite_or_zero(weighted / total_volume)
}

/// Mean high-low amplitude relative to the latest high, penalised by
/// amplitude dispersion.
fn wave_strength(bars: &[Bar]) -> f64 {
    let amplitudes: Vec<f64> = bars.iter().map(Bar::range).collect();
    let avg = mean(&amplitudes);
    if avg == 0.0 {
        return 0.0;
    }
    let last_high = bars.last().map(|b| b.high).unwrap_or(0.0);
    if last_high == 0.0 {
        return 0.0;
    }
    let consistency = 1.0 / (1.0 + stddev(&amplitudes) / avg);
    finite_or_zero(avg / last_high * consistency)
}
