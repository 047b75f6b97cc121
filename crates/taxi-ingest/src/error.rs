//! Error types for an ingestion run

use thiserror::Error;

use crate::loader::LoadError;
use crate::reader::FormatError;
use crate::sink::SinkError;

/// Errors surfaced by [`crate::IngestPipeline::run`] and its collaborators
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Failed to read input: {0}")]
    Read(#[source] csv_async::Error),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Batch size must be a positive integer, got {0}")]
    InvalidBatchSize(usize),

    #[error("Run cancelled")]
    Cancelled,

    /// A run stopped part way. `committed` rows were loaded before the failure.
    #[error("Run aborted after committing {committed} rows: {source}")]
    Aborted {
        committed: u64,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// Rows committed before the run stopped, zero when nothing was loaded
    pub fn committed(&self) -> u64 {
        match self {
            IngestError::Aborted { committed, .. } => *committed,
            _ => 0,
        }
    }

    /// The failure underneath any [`IngestError::Aborted`] wrapper
    pub fn root(&self) -> &IngestError {
        match self {
            IngestError::Aborted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the run stopped because cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.root(),
            IngestError::Cancelled
                | IngestError::Sink(SinkError::Cancelled)
                | IngestError::Load(LoadError::Cancelled)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_reports_committed_and_root() {
        let err = IngestError::Aborted {
            committed: 20,
            source: Box::new(IngestError::Load(LoadError::fatal("relation does not exist"))),
        };

        assert_eq!(err.committed(), 20);
        assert!(matches!(err.root(), IngestError::Load(LoadError::Fatal(_))));
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("after committing 20 rows"));
    }

    #[test]
    fn test_cancellation_is_detected_through_wrappers() {
        let from_reader = IngestError::Aborted {
            committed: 0,
            source: Box::new(IngestError::Cancelled),
        };
        let from_loader = IngestError::Aborted {
            committed: 5,
            source: Box::new(IngestError::Load(LoadError::Cancelled)),
        };

        assert!(from_reader.is_cancelled());
        assert!(from_loader.is_cancelled());
        assert_eq!(IngestError::InvalidBatchSize(0).committed(), 0);
    }
}
