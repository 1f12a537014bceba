//! Scoring function port: feature vector to class probabilities.

use crate::domain::error::ScalperError;

/// Class predicted by a scorer, indexed 0 = hold, 1 = buy, 2 = sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreClass {
    Hold,
    Buy,
    Sell,
}

impl ScoreClass {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => ScoreClass::Buy,
            2 => ScoreClass::Sell,
            _ => ScoreClass::Hold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub probabilities: Vec<f64>,
}

impl Score {
    pub fn new(probabilities: Vec<f64>) -> Self {
        Self { probabilities }
    }

    /// Argmax class; the first index wins ties. Empty scores are Hold.
    pub fn predicted_class(&self) -> ScoreClass {
        let mut best: Option<(usize, f64)> = None;
        for (i, &p) in self.probabilities.iter().enumerate() {
            if best.is_none_or(|(_, b)| p > b) {
                best = Some((i, p));
            }
        }
        best.map_or(ScoreClass::Hold, |(i, _)| ScoreClass::from_index(i))
    }

    /// Max probability clamped to [0, 1]; 0 for an empty score.
    pub fn confidence(&self) -> f64 {
        self.probabilities
            .iter()
            .copied()
            .filter(|p| p.is_finite())
            .fold(0.0, f64::max)
            .clamp(0.0, 1.0)
    }
}

pub trait ScoringPort {
    fn score(&self, features: &[f64]) -> Result<Score, ScalperError>;
}
