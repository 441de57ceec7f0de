//! Error types for lookalike.

use thiserror::Error;

/// Errors that can occur while fitting, building, loading, or querying an index.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Invalid build or fit parameter (tree count, leaf size, target dimension, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Vector length does not match the dimension the model or forest expects.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Not enough training vectors to fit the requested number of components.
    #[error("rank deficiency: {samples} training vectors cannot yield {required} components")]
    RankDeficiency { samples: usize, required: usize },

    /// Build requested on a corpus with no items.
    #[error("corpus is empty")]
    EmptyCorpus,

    /// `k` or the search budget is out of range.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Persisted artifact failed validation (magic, version, checksum, bounds).
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// The external embedder failed to produce a vector.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// I/O error while reading or writing artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptIndex(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_dimensions() {
        let err = SearchError::DimensionMismatch {
            expected: 100,
            actual: 3,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 100, got 3");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SearchError = io.into();
        assert!(matches!(err, SearchError::Io(_)));
    }
}
