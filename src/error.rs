use crate::line::LineError;
use thiserror::Error;

/// Errors that abort a whole alignment run.
///
/// Weak or degenerate geometry within a single frame pair never shows up here,
/// it is reported as a [`crate::sequence::PairWarning`] on the affected record.
#[derive(Debug, Error)]
pub enum Error {
    #[error("frame sequence is empty")]
    EmptySequence,

    #[error("frame {key:?} appears more than once in the frame ordering")]
    DuplicateFrame { key: String },

    #[error("line table references frame {key:?} which is not part of the frame ordering")]
    UnknownFrame { key: String },

    #[error("malformed line table row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("invalid line in frame {key:?}: {source}")]
    Line {
        key: String,
        #[source]
        source: LineError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
