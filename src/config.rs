use crate::{estimator::Strategy, filter::LinePreprocessor, line::Similarity};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Everything an [`crate::sequence::Aligner`] can be tuned with.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlignConfig {
    /// Thresholds for two lines to be twins.
    pub similarity: Similarity,

    pub strategy: Strategy,

    /// Applied to the lines of every frame before matching.
    pub preprocess: LinePreprocessor,

    /// Number of worker threads, the global pool is used if `None`.
    pub max_concurrency: Option<usize>,
}
