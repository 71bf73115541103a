//! Error taxonomy for the import pipeline.
//!
//! Nothing in the pipeline catches or retries these: the first error aborts
//! the run and the operator re-invokes the tool.

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Error, Debug)]
pub enum ImportError {
    /// Network failure, non-2xx status or an unreadable response body.
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// Malformed CSV/Excel/JSON/HTML, unknown encoding, missing sheet or table.
    #[error("decode error: {0}")]
    Decode(String),

    /// An expected field is absent from a record.
    #[error("shape error: {0}")]
    Shape(String),

    /// Unsupported version identifier, unknown dataset or invalid config file.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    pub(crate) fn transport(url: &str, err: impl std::fmt::Display) -> Self {
        ImportError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        ImportError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::Decode(format!("invalid JSON: {}", err))
    }
}
