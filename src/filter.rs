//! Clean-up of detected lines before matching.

use crate::line::{Line, LineError, Similarity, wrap};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use tracing::debug;
use uom::si::{angle::radian, f64::Angle};

/// How lines describing the same edge are merged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Dedup {
    /// Keep every line.
    #[default]
    Keep,

    /// Replace every group of similar lines by their mean.
    Center,

    /// Keep the first line of every group of similar lines.
    Nub,
}

impl Dedup {
    /// Thresholds under which [`Dedup::Nub`] drops a line.
    pub fn nub_similarity() -> Similarity {
        Similarity::new(20., Angle::new::<radian>(0.1))
    }
}

/// Filters and merges the lines of a single frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinePreprocessor {
    /// Drops lines deviating further than this from the vertical.
    pub max_vertical_deviation: Option<Angle>,

    pub dedup: Dedup,
}

impl LinePreprocessor {
    pub fn apply(&self, lines: &[Line]) -> Result<Vec<Line>, LineError> {
        let lines: Vec<Line> = lines
            .iter()
            .filter(|line| self.is_upright(line))
            .copied()
            .collect();

        match self.dedup {
            Dedup::Keep => Ok(lines),
            Dedup::Center => find_centers(&lines, &Similarity::default()),
            Dedup::Nub => Ok(nub(&lines, &Dedup::nub_similarity())),
        }
    }

    fn is_upright(&self, line: &Line) -> bool {
        let Some(max) = self.max_vertical_deviation else {
            return true;
        };

        // A vertical line has its normal on the x axis.
        let theta = line.theta().abs();
        theta < max || Angle::HALF_TURN - theta < max
    }
}

/// Keeps every line not similar to a line kept before it.
fn nub(lines: &[Line], similarity: &Similarity) -> Vec<Line> {
    let mut kept: Vec<Line> = Vec::with_capacity(lines.len());
    for line in lines {
        if !kept.iter().any(|k| line.is_similar(k, similarity)) {
            kept.push(*line);
        }
    }
    kept
}

/// Groups lines by similarity to the first line of each group and returns
/// the mean line of every group.
fn find_centers(lines: &[Line], similarity: &Similarity) -> Result<Vec<Line>, LineError> {
    let mut groups: Vec<Vec<Line>> = Vec::new();
    for line in lines {
        let mut similar = groups
            .iter_mut()
            .filter(|group| line.is_similar(&group[0], similarity));

        match similar.next() {
            Some(group) => {
                if similar.next().is_some() {
                    debug!(%line, "line is similar to several groups, using the first");
                }
                group.push(*line);
            }
            None => groups.push(vec![*line]),
        }
    }

    groups.iter().map(|group| mean_line(group)).collect()
}

/// Mean of lines close to the first one, accounting for inverted normals.
fn mean_line(group: &[Line]) -> Result<Line, LineError> {
    let first = group[0].theta().get::<radian>();
    let (rho, delta) = group
        .iter()
        .map(|line| {
            let mut rho = line.rho();
            let mut delta = wrap(line.theta().get::<radian>() - first);
            if delta.abs() > FRAC_PI_2 {
                rho = -rho;
                delta -= PI.copysign(delta);
            }
            (rho, delta)
        })
        .fold((0., 0.), |(rho, delta), (r, d)| (rho + r, delta + d));

    let n = group.len() as f64;
    Line::from_radians(rho / n, first + delta / n)
}
