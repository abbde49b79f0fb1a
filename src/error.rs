use crate::types::ModelKind;
use thiserror::Error;

/// Failures surfaced by the forecasting pipeline.
///
/// Per-kind fit failures during multi-kind training are captured in the
/// training summary instead of aborting the call; only table-level
/// insufficiency and store failures abort the whole operation.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("model '{0}' not trained")]
    ModelNotTrained(ModelKind),
    #[error("feature importance is not available for model '{0}'")]
    UnsupportedModelKind(ModelKind),
    #[error("model fit failed: {0}")]
    Fit(String),
    #[error("model store error: {0}")]
    Store(#[from] StoreError),
    #[error("model serialization failed: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("model store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode feature columns: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("model store lock poisoned")]
    LockPoisoned,
}
