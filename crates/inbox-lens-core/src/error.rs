//! Error taxonomy for Inbox Lens operations.
//!
//! Only hard failures are represented here. Empty inputs, emails without a
//! vector, clusters below the size floor, and a search signal with no hits
//! are ordinary outcomes and produce empty or degraded results instead.

use thiserror::Error;

/// Result type alias using the core [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Long-running operation classes guarded by a single-flight lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Embedding,
    Clustering,
    Projection,
    PromptScoring,
    Search,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Embedding => "embedding",
            Operation::Clustering => "clustering",
            Operation::Projection => "projection",
            Operation::PromptScoring => "prompt scoring",
            Operation::Search => "search",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// The embedding oracle could not be reached or loaded.
    #[error("Embedding oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Another run of the same operation class is in flight.
    #[error("Operation already in progress: {0}")]
    Busy(Operation),

    /// Vector length does not match the expected dimensionality.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Similarity threshold outside `[0, 1]`.
    #[error("Invalid threshold: {0} (must be within 0.0..=1.0)")]
    InvalidThreshold(f32),

    /// A named entity (e.g. a prompt cluster slug) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A storage collaborator failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_message_names_operation() {
        let err = Error::Busy(Operation::Clustering);
        assert_eq!(err.to_string(), "Operation already in progress: clustering");
    }

    #[test]
    fn dimension_mismatch_message() {
        let err = Error::DimensionMismatch {
            expected: 384,
            actual: 3,
        };
        assert!(err.to_string().contains("expected 384, got 3"));
    }
}
