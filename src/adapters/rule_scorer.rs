//! Deterministic stand-in for a trained model.
//!
//! Reads the sequence summary block of the feature vector: a directional
//! bias from the signed trend strength and the bullish bar fraction, scaled
//! by the momentum score. Zero bias scores every class equally, which
//! resolves to Hold.

use crate::domain::error::ScalperError;
use crate::domain::features::{BAR_FEATURE_BARS, BAR_FEATURES_PER_BAR, FEATURE_VECTOR_LEN};
use crate::domain::stats::finite_or_zero;
use crate::ports::scoring_port::{Score, ScoringPort};

const SUMMARY_START: usize = BAR_FEATURE_BARS * BAR_FEATURES_PER_BAR;
const TREND_STRENGTH: usize = SUMMARY_START + 4;
const BULLISH_FRACTION: usize = SUMMARY_START + 5;
const MOMENTUM: usize = FEATURE_VECTOR_LEN - 1;

const TREND_WEIGHT: f64 = 0.6;
const BREADTH_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleScorer;

impl RuleScorer {
    pub fn new() -> Self {
        RuleScorer
    }
}

impl ScoringPort for RuleScorer {
    fn score(&self, features: &[f64]) -> Result<Score, ScalperError> {
        if features.len() != FEATURE_VECTOR_LEN {
            return Err(ScalperError::Scoring {
                reason: format!(
                    "expected {FEATURE_VECTOR_LEN} features, got {}",
                    features.len()
                ),
            });
        }

        let trend = finite_or_zero(features[TREND_STRENGTH]).clamp(-1.0, 1.0);
        let breadth = finite_or_zero(features[BULLISH_FRACTION] * 2.0 - 1.0).clamp(-1.0, 1.0);
        let momentum = finite_or_zero(features[MOMENTUM]).clamp(0.0, 1.0);

        let bias = (TREND_WEIGHT * trend + BREADTH_WEIGHT * breadth).clamp(-1.0, 1.0);
        let strength = bias.abs() * momentum;

        let directional = (1.0 + 2.0 * strength) / 3.0;
        let other = (1.0 - directional) / 2.0;
        let probabilities = if bias > 0.0 {
            vec![other, directional, other]
        } else if bias < 0.0 {
            vec![other, other, directional]
        } else {
            vec![1.0 / 3.0; 3]
        };
        Ok(Score::new(probabilities))
    }
}
