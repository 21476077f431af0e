//! Frames in acquisition order and the per-pair alignment driver.

use crate::{
    config::AlignConfig,
    error::Error,
    estimator::{EstimateError, Estimator, Translation},
    line::Line,
    table::LineTable,
    twin::TwinMatcher,
};
use rayon::{ThreadPoolBuilder, prelude::*};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};
use tracing::{info, warn};

/// The lines detected in one image.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    key: String,
    lines: Vec<Line>,
}

impl Frame {
    pub fn new(key: impl Into<String>, lines: Vec<Line>) -> Self {
        Self {
            key: key.into(),
            lines,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }
}

/// Non-empty list of frames with unique keys in acquisition order.
#[derive(Clone, Debug, PartialEq)]
pub struct Sequence {
    frames: Vec<Frame>,
}

impl Sequence {
    /// Orders `frames` lexicographically by key.
    pub fn new(mut frames: Vec<Frame>) -> Result<Self, Error> {
        frames.sort_by(|a, b| a.key.cmp(&b.key));
        if let Some(pair) = frames.windows(2).find(|pair| pair[0].key == pair[1].key) {
            return Err(Error::DuplicateFrame {
                key: pair[0].key.clone(),
            });
        }

        Self::ordered(frames)
    }

    /// Keeps `frames` in the given order.
    pub fn from_ordered(frames: Vec<Frame>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        for frame in &frames {
            if !seen.insert(frame.key.as_str()) {
                return Err(Error::DuplicateFrame {
                    key: frame.key.clone(),
                });
            }
        }

        Self::ordered(frames)
    }

    fn ordered(frames: Vec<Frame>) -> Result<Self, Error> {
        if frames.is_empty() {
            return Err(Error::EmptySequence);
        }

        Ok(Self { frames })
    }

    /// Groups the rows of `table` by file, ordering frames by key.
    pub fn from_table(table: LineTable) -> Result<Self, Error> {
        let frames = group_rows(table)?
            .into_iter()
            .map(|(key, lines)| Frame::new(key, lines))
            .collect();

        Self::new(frames)
    }

    /// Groups the rows of `table` into the frames named by `ordering`.
    ///
    /// Frames without rows are kept as frames without lines. Rows naming a
    /// frame outside of `ordering` are an error.
    pub fn from_table_with_ordering<S: AsRef<str>>(
        table: LineTable,
        ordering: &[S],
    ) -> Result<Self, Error> {
        let mut grouped = group_rows(table)?;
        let frames = ordering
            .iter()
            .map(|key| {
                let key = key.as_ref();
                Frame::new(key, grouped.remove(key).unwrap_or_default())
            })
            .collect();
        let sequence = Self::from_ordered(frames)?;

        if let Some(key) = grouped.into_keys().next() {
            return Err(Error::UnknownFrame { key });
        }

        Ok(sequence)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false, a sequence holds at least one frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn group_rows(table: LineTable) -> Result<BTreeMap<String, Vec<Line>>, Error> {
    let mut grouped: BTreeMap<String, Vec<Line>> = BTreeMap::new();
    for row in table.into_rows() {
        let line = Line::from_radians(row.rho, row.theta).map_err(|source| Error::Line {
            key: row.file.clone(),
            source,
        })?;
        grouped.entry(row.file).or_default().push(line);
    }

    Ok(grouped)
}

/// Something worth knowing about a frame pair that did not stop the run.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PairWarning {
    /// Lines of the current frame without a twin.
    UnmatchedLines { count: usize },

    /// Lines of the current frame with more than one twin candidate.
    AmbiguousMatches { count: usize },

    /// Twin pairs left out because of degenerate geometry.
    DegenerateTwinPairs { dropped: usize },

    /// Not a single usable twin pair, the translation fell back to zero.
    InsufficientTwinPairs { twins: usize },

    /// The refinement failed, the translation fell back to zero.
    RefinementFailed { reason: String },
}

impl PairWarning {
    /// True if the translation of the record is a placeholder.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            PairWarning::InsufficientTwinPairs { .. } | PairWarning::RefinementFailed { .. }
        )
    }
}

impl fmt::Display for PairWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairWarning::UnmatchedLines { count } => write!(f, "{count} lines without twin"),
            PairWarning::AmbiguousMatches { count } => {
                write!(f, "{count} lines with several twin candidates")
            }
            PairWarning::DegenerateTwinPairs { dropped } => {
                write!(f, "{dropped} degenerate twin pairs dropped")
            }
            PairWarning::InsufficientTwinPairs { twins } => {
                write!(f, "no usable twin pair among {twins} twins")
            }
            PairWarning::RefinementFailed { reason } => write!(f, "refinement failed: {reason}"),
        }
    }
}

/// Translation from `frame` to the next frame `reference`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TranslationRecord {
    pub frame: String,
    pub reference: String,
    pub translation: Translation,
    pub warnings: Vec<PairWarning>,
}

impl TranslationRecord {
    /// True if no translation could be estimated for the pair.
    pub fn is_fallback(&self) -> bool {
        self.warnings.iter().any(PairWarning::is_fallback)
    }
}

/// Estimates the translation between every two consecutive frames.
#[derive(Clone, Debug, Default)]
pub struct Aligner {
    config: AlignConfig,
    matcher: TwinMatcher,
}

impl Aligner {
    pub fn new(config: AlignConfig) -> Self {
        let matcher = TwinMatcher::new(config.similarity);
        Self { config, matcher }
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    /// Returns one record per consecutive frame pair in acquisition order.
    ///
    /// Pairs are processed in parallel, on a dedicated pool if the
    /// configuration limits concurrency.
    pub fn align(&self, sequence: &Sequence) -> Result<Vec<TranslationRecord>, Error> {
        let run = || -> Result<Vec<TranslationRecord>, Error> {
            let frames = sequence
                .frames()
                .par_iter()
                .map(|frame| {
                    let lines = self.config.preprocess.apply(frame.lines()).map_err(|source| {
                        Error::Line {
                            key: frame.key.clone(),
                            source,
                        }
                    })?;
                    Ok(Frame::new(frame.key.clone(), lines))
                })
                .collect::<Result<Vec<Frame>, Error>>()?;

            Ok(frames
                .par_windows(2)
                .map(|pair| self.align_pair(&pair[0], &pair[1]))
                .collect())
        };

        let records = match self.config.max_concurrency {
            Some(threads) => ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()?
                .install(run)?,
            None => run()?,
        };

        let fallbacks = records.iter().filter(|r| r.is_fallback()).count();
        info!(pairs = records.len(), fallbacks, "aligned sequence");

        Ok(records)
    }

    /// Estimates the translation from `current` to `next`.
    ///
    /// Never fails: a pair without a usable estimate gets a zero translation
    /// and a warning saying why.
    pub fn align_pair(&self, current: &Frame, next: &Frame) -> TranslationRecord {
        let twins = self.matcher.match_lines(current.lines(), next.lines());

        let mut warnings = Vec::new();
        if !twins.unmatched().is_empty() {
            let unmatched: Vec<String> = twins
                .unmatched()
                .iter()
                .map(|&i| current.lines()[i].to_string())
                .collect();
            warn!(
                frame = %current.key,
                reference = %next.key,
                lines = ?unmatched,
                "lines cannot be found in the next frame"
            );
            warnings.push(PairWarning::UnmatchedLines {
                count: twins.unmatched().len(),
            });
        }
        if twins.ambiguous() > 0 {
            warnings.push(PairWarning::AmbiguousMatches {
                count: twins.ambiguous(),
            });
        }

        let lines = twins.lines(current.lines(), next.lines());
        let translation = match self.config.strategy.estimate(&lines) {
            Ok(estimate) => {
                if estimate.dropped > 0 {
                    warnings.push(PairWarning::DegenerateTwinPairs {
                        dropped: estimate.dropped,
                    });
                }
                estimate.translation
            }
            Err(EstimateError::InsufficientData { twins, dropped }) => {
                warn!(
                    frame = %current.key,
                    reference = %next.key,
                    twins,
                    "not enough twins to estimate translation, assuming no motion"
                );
                if dropped > 0 {
                    warnings.push(PairWarning::DegenerateTwinPairs { dropped });
                }
                warnings.push(PairWarning::InsufficientTwinPairs { twins });
                Translation::ZERO
            }
            Err(err) => {
                warn!(
                    frame = %current.key,
                    reference = %next.key,
                    %err,
                    "estimation failed, assuming no motion"
                );
                warnings.push(PairWarning::RefinementFailed {
                    reason: err.to_string(),
                });
                Translation::ZERO
            }
        };

        TranslationRecord {
            frame: current.key.clone(),
            reference: next.key.clone(),
            translation,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{estimator::Strategy, table::LineRow};
    use rstest::rstest;
    use std::{
        f64::consts::FRAC_PI_2,
        io,
        sync::{Arc, Mutex},
    };

    /// Formatted events written by a test subscriber.
    #[derive(Clone, Default)]
    struct Logs(Arc<Mutex<Vec<u8>>>);

    impl Logs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Logs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn line(rho: f64, theta: f64) -> Line {
        Line::from_radians(rho, theta).unwrap()
    }

    fn tapered(dx: f64, dy: f64) -> Vec<Line> {
        [line(100., 0.1), line(300., -0.1)]
            .iter()
            .map(|l| l.translate(dx, dy).unwrap())
            .collect()
    }

    fn row(file: &str, rho: f64, theta: f64) -> LineRow {
        LineRow {
            file: file.into(),
            rho,
            theta,
        }
    }

    #[test]
    fn orders_frames_by_key() {
        let sequence = Sequence::new(vec![
            Frame::new("b", vec![]),
            Frame::new("c", vec![]),
            Frame::new("a", vec![]),
        ])
        .unwrap();

        let keys: Vec<&str> = sequence.frames().iter().map(Frame::key).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[rstest]
    #[case(vec![Frame::new("a", vec![]), Frame::new("a", vec![])])]
    #[case(vec![Frame::new("b", vec![]), Frame::new("a", vec![]), Frame::new("b", vec![])])]
    fn rejects_duplicate_keys(#[case] frames: Vec<Frame>) {
        assert!(matches!(
            Sequence::new(frames.clone()),
            Err(Error::DuplicateFrame { .. })
        ));
        assert!(matches!(
            Sequence::from_ordered(frames),
            Err(Error::DuplicateFrame { .. })
        ));
    }

    #[test]
    fn rejects_empty_sequence() {
        assert!(matches!(
            Sequence::new(vec![]),
            Err(Error::EmptySequence)
        ));
        assert!(matches!(
            Sequence::from_table(LineTable::default()),
            Err(Error::EmptySequence)
        ));
    }

    #[test]
    fn groups_table_rows() {
        let table = LineTable::new(vec![
            row("b", 1., 0.),
            row("a", 2., 0.),
            row("b", -3., 0.),
        ]);

        let sequence = Sequence::from_table(table).unwrap();

        assert_eq!(
            sequence.frames(),
            &[
                Frame::new("a", vec![line(2., 0.)]),
                Frame::new("b", vec![line(1., 0.), line(-3., 0.)]),
            ]
        );
    }

    #[test]
    fn explicit_ordering() {
        let table = LineTable::new(vec![row("b", 1., 0.), row("a", 2., 0.)]);

        let sequence = Sequence::from_table_with_ordering(table, &["b", "empty", "a"]).unwrap();

        let counts: Vec<(&str, usize)> = sequence
            .frames()
            .iter()
            .map(|f| (f.key(), f.lines().len()))
            .collect();
        assert_eq!(counts, [("b", 1), ("empty", 0), ("a", 1)]);
    }

    #[test]
    fn explicit_ordering_rejects_unknown_frames() {
        let table = LineTable::new(vec![row("b", 1., 0.), row("z", 2., 0.)]);

        assert!(matches!(
            Sequence::from_table_with_ordering(table, &["a", "b"]),
            Err(Error::UnknownFrame { key }) if key == "z"
        ));
    }

    #[test]
    fn aligns_consecutive_pairs() {
        let sequence = Sequence::new(vec![
            Frame::new("0", tapered(0., 0.)),
            Frame::new("1", tapered(20., -15.)),
            Frame::new("2", tapered(30., -25.)),
        ])
        .unwrap();

        let records = Aligner::default().align(&sequence).unwrap();

        assert_eq!(
            records,
            vec![
                TranslationRecord {
                    frame: "0".into(),
                    reference: "1".into(),
                    translation: Translation::new(20, -15),
                    warnings: vec![],
                },
                TranslationRecord {
                    frame: "1".into(),
                    reference: "2".into(),
                    translation: Translation::new(10, -10),
                    warnings: vec![],
                },
            ]
        );
    }

    #[test]
    fn frame_without_lines_falls_back() {
        let sequence = Sequence::new(vec![
            Frame::new("0", tapered(0., 0.)),
            Frame::new("1", vec![]),
        ])
        .unwrap();

        let records = Aligner::default().align(&sequence).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].translation, Translation::ZERO);
        assert_eq!(
            records[0].warnings,
            vec![
                PairWarning::UnmatchedLines { count: 2 },
                PairWarning::InsufficientTwinPairs { twins: 0 },
            ]
        );
        assert!(records[0].is_fallback());
    }

    #[test]
    fn occluded_edge_falls_back() {
        let mut next = tapered(20., -15.);
        next.remove(1);
        let sequence = Sequence::new(vec![
            Frame::new("0", tapered(0., 0.)),
            Frame::new("1", next),
        ])
        .unwrap();

        let records = Aligner::default().align(&sequence).unwrap();

        assert_eq!(records[0].translation, Translation::ZERO);
        assert_eq!(
            records[0].warnings,
            vec![
                PairWarning::UnmatchedLines { count: 1 },
                PairWarning::InsufficientTwinPairs { twins: 1 },
            ]
        );
    }

    #[test]
    fn unmatched_lines_are_logged_with_frame_keys() {
        let logs = Logs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let mut lines = tapered(0., 0.);
        lines.push(line(50., FRAC_PI_2));
        let current = Frame::new("a.png", lines);
        let next = Frame::new("b.png", tapered(20., -15.));

        let record = tracing::subscriber::with_default(subscriber, || {
            Aligner::default().align_pair(&current, &next)
        });

        assert_eq!(record.warnings, [PairWarning::UnmatchedLines { count: 1 }]);
        let logs = logs.contents();
        let event = logs
            .lines()
            .find(|event| event.contains("lines cannot be found in the next frame"))
            .unwrap();
        assert!(event.contains("frame=a.png"), "{event}");
        assert!(event.contains("reference=b.png"), "{event}");
    }

    #[test]
    fn single_frame_has_no_pairs() {
        let sequence = Sequence::new(vec![Frame::new("0", tapered(0., 0.))]).unwrap();

        assert!(Aligner::default().align(&sequence).unwrap().is_empty());
    }

    #[rstest]
    #[case(None)]
    #[case(Some(1))]
    #[case(Some(3))]
    fn concurrency_keeps_order(#[case] max_concurrency: Option<usize>) {
        let frames = (0..12)
            .map(|i| Frame::new(format!("{i:02}"), tapered(5. * i as f64, -3. * i as f64)))
            .collect();
        let sequence = Sequence::new(frames).unwrap();
        let aligner = Aligner::new(AlignConfig {
            max_concurrency,
            strategy: Strategy::LocalSearch {
                radius: 1,
                frame_height: 480.,
            },
            ..Default::default()
        });

        let records = aligner.align(&sequence).unwrap();

        assert_eq!(records.len(), 11);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.frame, format!("{i:02}"));
            assert_eq!(record.reference, format!("{:02}", i + 1));
            assert_eq!(record.translation, Translation::new(5, -3));
        }
    }
}
