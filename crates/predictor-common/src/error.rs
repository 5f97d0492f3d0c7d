//! Error taxonomy shared across every predictor-platform crate.

use thiserror::Error;

/// Result type alias used throughout the platform.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the predictor-serving platform.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid traffic percentage: {0}")]
    InvalidTraffic(String),

    #[error("unknown predictor: {0}")]
    UnknownPredictor(String),

    #[error("no active predictor for prediction type: {0}")]
    NoActivePredictor(String),

    #[error("version regression: {0}")]
    VersionRegression(String),

    #[error("failed to load predictor: {0}")]
    LoadFailed(String),

    #[error("failed to unload predictor: {0}")]
    UnloadFailed(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("queue binding conflict: {0}")]
    QueueBindingConflict(String),

    #[error("store transaction failed: {0}")]
    StoreTransactionFailed(String),

    #[error("malformed event: {0}")]
    Malformed(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    /// Whether retrying the operation that produced this error is sane.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BrokerUnavailable(_) | Error::StoreTransactionFailed(_))
    }

    /// Stable error-category tag, used as a metric/log field.
    pub fn category(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::InvalidTraffic(_) => "invalid_traffic",
            Error::UnknownPredictor(_) => "unknown_predictor",
            Error::NoActivePredictor(_) => "no_active_predictor",
            Error::VersionRegression(_) => "version_regression",
            Error::LoadFailed(_) => "load_failed",
            Error::UnloadFailed(_) => "unload_failed",
            Error::InferenceFailed(_) => "inference_failed",
            Error::BrokerUnavailable(_) => "broker_unavailable",
            Error::QueueBindingConflict(_) => "queue_binding_conflict",
            Error::StoreTransactionFailed(_) => "store_transaction_failed",
            Error::Malformed(_) => "malformed",
            Error::Configuration(_) => "configuration",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Generic(_) => "generic",
        }
    }
}
