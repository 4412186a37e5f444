//! Custom error types for the writeout buffer.
//!
//! `WriteoutError` consolidates every failure the library can report, using
//! `thiserror` so that `?` converts the underlying I/O, serialization and
//! configuration errors automatically.
//!
//! ## Error Hierarchy
//!
//! - **`ContributionCount`**: a deposit did not provide exactly one contribution per
//!   future bin. The buffer is left untouched.
//! - **`InvalidBufferSize`**: a buffer of zero time bins was requested.
//! - **`Config`** / **`Configuration`**: the configuration could not be loaded, or
//!   loaded but failed validation.
//! - **`Io`**, **`Serialization`**, **`Csv`**: a sink failed to persist a window.
//! - **`FeatureNotEnabled`**: a sink was requested whose storage backend was not
//!   compiled in.
//! - **`Sink`**: any other sink-specific failure, including writes after a sink
//!   has shut down.

use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type WriteoutResult<T> = std::result::Result<T, WriteoutError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum WriteoutError {
    #[error("Expected {expected} contributions (one per future bin), got {actual}")]
    ContributionCount { expected: usize, actual: usize },

    #[error("Buffer must hold at least one time bin")]
    InvalidBufferSize,

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    /// Sink-specific failure without an underlying I/O or format error, such as
    /// writing after shut down. External `WindowSink` implementations report
    /// their own failures through this variant.
    #[error("Sink error: {0}")]
    Sink(String),
}

impl From<figment::Error> for WriteoutError {
    fn from(value: figment::Error) -> Self {
        WriteoutError::Config(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contribution_count_message_names_both_sizes() {
        let err = WriteoutError::ContributionCount {
            expected: 15,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Expected 15 contributions (one per future bin), got 3"
        );
    }

    #[test]
    fn figment_errors_convert() {
        let err: WriteoutError = figment::Error::from("bad value".to_string()).into();
        assert!(matches!(err, WriteoutError::Config(_)));
    }
}
