//! Frame-to-frame alignment from straight edges.
//!
//! Every frame of a scan is described by the lines detected in it. Lines of
//! consecutive frames that show the same edge are matched into twins, and
//! every two twins yield an estimate of the translation between the frames.

#[allow(missing_docs)]
pub mod error;

pub mod chain;
pub mod config;
pub mod estimator;
pub mod filter;
pub mod line;
pub mod sequence;
pub mod table;
pub mod twin;

pub use error::Error;

pub mod prelude {
    pub use crate::{
        config::AlignConfig,
        error::Error,
        estimator::{Estimator, Strategy, Translation},
        filter::{Dedup, LinePreprocessor},
        line::{Line, Similarity},
        sequence::{Aligner, Frame, PairWarning, Sequence, TranslationRecord},
        table::{LineTable, write_translations},
        twin::{TwinMatcher, Twins},
    };
}
