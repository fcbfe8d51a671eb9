use thiserror::Error;

/// Rejections and failures produced by the scoring engine.
#[derive(Debug, Error)]
pub enum VibeError {
    #[error("amount must be between 1 and {max}")]
    InvalidAmount { max: i64 },

    #[error("resulting score {attempted} is outside ±{bound}")]
    BoundExceeded { attempted: i64, bound: i64 },

    #[error("insufficient balance: have {available}, need {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("cannot transfer vibe to yourself")]
    SelfTransfer,

    #[error("recipient not found")]
    RecipientNotFound,

    #[error("store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for VibeError {
    fn from(err: rusqlite::Error) -> Self {
        VibeError::Store(err.into())
    }
}

impl VibeError {
    /// Rejections are expected outcomes; only store failures get logged as errors.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, VibeError::Store(_))
    }
}
