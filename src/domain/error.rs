//! Domain error types.

/// Top-level error type for psiscalper.
#[derive(Debug, thiserror::Error)]
pub enum ScalperError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("venue error: {reason}")]
    Venue { reason: String },

    #[error("scoring error: {reason}")]
    Scoring { reason: String },

    #[error("insufficient margin: required {required:.4}, available {available:.4}")]
    InsufficientMargin { required: f64, available: f64 },

    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("daily loss {loss_pct:.2}% exceeds limit {limit_pct:.2}%")]
    RiskLimit { loss_pct: f64, limit_pct: f64 },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&ScalperError> for std::process::ExitCode {
    fn from(err: &ScalperError) -> Self {
        let code: u8 = match err {
            ScalperError::Io(_) => 1,
            ScalperError::ConfigParse { .. }
            | ScalperError::ConfigMissing { .. }
            | ScalperError::ConfigInvalid { .. } => 2,
            ScalperError::Venue { .. } | ScalperError::NoData { .. } => 3,
            ScalperError::Scoring { .. } => 4,
            ScalperError::InsufficientMargin { .. }
            | ScalperError::InvalidOrder { .. }
            | ScalperError::RiskLimit { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
