//! Error types for baix

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors raised while reading, validating, or rewriting a BAM index
#[derive(Debug, Error)]
pub enum IndexError {
    /// The source index failed structural validation.
    ///
    /// `position` is a byte offset for binary indexes and a 1-based line
    /// number for text renderings.
    #[error("malformed index at position {position}: {reason}")]
    MalformedSourceIndex { position: usize, reason: String },

    /// A reference index outside `[0, reference_count)` was requested
    #[error("reference {reference} out of range (index has {count} references)")]
    ReferenceOutOfRange { reference: usize, count: usize },

    /// A writer method was called out of sequence
    #[error("protocol violation: {operation} not allowed while {state}")]
    ProtocolViolation {
        operation: &'static str,
        state: String,
    },

    /// An I/O error while emitting index content
    #[error("failed to write {what}")]
    WriteFailure {
        what: String,
        #[source]
        source: io::Error,
    },

    /// The partial output could not be removed
    #[error("failed to remove partial index {}", path.display())]
    CleanupFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Block address or in-block offset does not fit a virtual offset
    #[error("virtual offset out of range: block address {block_address}, offset {offset_in_block}")]
    InvalidVirtualOffset {
        block_address: u64,
        offset_in_block: u64,
    },

    /// The rewrite was abandoned by the caller
    #[error("reindexing cancelled")]
    Cancelled,

    /// A failure during a rewrite, tagged with the reference being processed
    #[error("{}", describe_reindex_failure(*reference))]
    Reindex {
        reference: Option<usize>,
        #[source]
        source: Box<IndexError>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn describe_reindex_failure(reference: Option<usize>) -> String {
    match reference {
        Some(reference) => format!("reindexing failed at reference {}", reference),
        None => "reindexing failed".to_string(),
    }
}

impl IndexError {
    pub(crate) fn malformed(position: usize, reason: impl Into<String>) -> Self {
        IndexError::MalformedSourceIndex {
            position,
            reason: reason.into(),
        }
    }

    pub(crate) fn write_failure(what: impl Into<String>, source: io::Error) -> Self {
        IndexError::WriteFailure {
            what: what.into(),
            source,
        }
    }

    /// The innermost error, looking through `Reindex` wrappers
    pub fn root_cause(&self) -> &IndexError {
        match self {
            IndexError::Reindex { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
