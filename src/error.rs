//! Crate-wide error type.
//!
//! Most operations on the redirect path are infallible by contract and log
//! instead of returning these. The variants surface from store backends and
//! the model, and are handled one layer up.

/// Errors raised by stores, persisted records, and the classifier model.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store I/O failed: {0}")]
    Store(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed record under key {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    #[error("model error: {reason}")]
    Model { reason: String },
}

impl Error {
    pub fn model(reason: impl Into<String>) -> Self {
        Error::Model {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
