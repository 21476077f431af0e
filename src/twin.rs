//! Correspondences between the lines of two consecutive frames.

use crate::line::{Line, Similarity};
use tracing::debug;

/// A line of the current frame matched to a line of the next frame.
///
/// Both sides are indices into the line lists of their frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Twin {
    /// Index into the lines of the current frame.
    pub source: usize,

    /// Index into the lines of the next frame.
    pub target: usize,
}

/// A [`Twin`] resolved against the line lists of its frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwinLines {
    pub current: Line,
    pub next: Line,
}

impl TwinLines {
    pub fn new(current: Line, next: Line) -> Self {
        Self { current, next }
    }
}

/// Outcome of matching the lines of one frame against the next.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Twins {
    twins: Vec<Twin>,
    unmatched: Vec<usize>,
    ambiguous: usize,
}

impl Twins {
    /// Twin relations in order of their source index.
    pub fn twins(&self) -> &[Twin] {
        &self.twins
    }

    /// Indices of current lines without any similar line in the next frame.
    pub fn unmatched(&self) -> &[usize] {
        &self.unmatched
    }

    /// Number of current lines that had more than one similar candidate.
    pub fn ambiguous(&self) -> usize {
        self.ambiguous
    }

    pub fn len(&self) -> usize {
        self.twins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.twins.is_empty()
    }

    /// Looks up the lines of every twin.
    ///
    /// `current` and `next` must be the slices the twins were matched on.
    pub fn lines(&self, current: &[Line], next: &[Line]) -> Vec<TwinLines> {
        self.twins
            .iter()
            .map(|twin| TwinLines::new(current[twin.source], next[twin.target]))
            .collect()
    }
}

/// Finds the twin of every line among the lines of the next frame.
///
/// A candidate must be similar to the line. Among several candidates the one
/// with the smallest `rho` difference wins, the earliest on a tie. Two lines of
/// the current frame may end up with the same target.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TwinMatcher {
    similarity: Similarity,
}

impl TwinMatcher {
    pub fn new(similarity: Similarity) -> Self {
        Self { similarity }
    }

    pub fn similarity(&self) -> &Similarity {
        &self.similarity
    }

    pub fn match_lines(&self, current: &[Line], next: &[Line]) -> Twins {
        let mut twins = Twins::default();

        for (source, line) in current.iter().enumerate() {
            let rho_offset = |candidate: &Line| (candidate.rho() - line.rho()).abs();

            let mut candidates = next
                .iter()
                .enumerate()
                .filter(|(_, candidate)| line.is_similar(candidate, &self.similarity));

            let Some(mut closest) = candidates.next() else {
                debug!(%line, "line cannot be found in the next frame");
                twins.unmatched.push(source);
                continue;
            };

            let mut count = 1;
            for candidate in candidates {
                count += 1;
                if rho_offset(candidate.1) < rho_offset(closest.1) {
                    closest = candidate;
                }
            }

            if count > 1 {
                debug!(%line, candidates = count, twin = %closest.1, "ambiguous twin");
                twins.ambiguous += 1;
            }

            twins.twins.push(Twin {
                source,
                target: closest.0,
            });
        }

        let mut claimed = vec![false; next.len()];
        for twin in &twins.twins {
            if std::mem::replace(&mut claimed[twin.target], true) {
                debug!(target_line = %next[twin.target], "line is the twin of several lines");
            }
        }

        twins
    }
}
