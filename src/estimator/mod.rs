//! Turning the twins of a frame pair into a single translation.

mod bisection;
mod local_search;
mod nelder_mead;
mod reprojection;

pub use bisection::{Bisection, aggregate, estimate_twin_pair, vertical_distance};
pub use local_search::LocalSearch;
pub use nelder_mead::NelderMead;
pub use reprojection::reprojection_error;

use crate::{
    line::{Line, LineError},
    twin::TwinLines,
};
use nalgebra::Vector2;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Add, AddAssign, Neg},
};
use thiserror::Error;

/// Estimates the translation between two frames from their twins.
pub trait Estimator {
    fn estimate(&self, twins: &[TwinLines]) -> Result<Estimate, EstimateError>;
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum EstimateError {
    #[error("no usable twin pair among {twins} twins ({dropped} twin pairs dropped)")]
    InsufficientData { twins: usize, dropped: usize },

    #[error("bisector {bisector} runs parallel to the x axis")]
    HorizontalBisector { bisector: Line },

    #[error(transparent)]
    Line(#[from] LineError),

    #[error("refinement failed: {reason}")]
    Refinement { reason: String },
}

/// Translation of a frame relative to its predecessor in whole pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Translation {
    pub dx: i64,
    pub dy: i64,
}

impl Translation {
    pub const ZERO: Self = Self { dx: 0, dy: 0 };

    pub fn new(dx: i64, dy: i64) -> Self {
        Self { dx, dy }
    }

    /// Rounds both components to the nearest pixel.
    pub fn from_rounded(v: Vector2<f64>) -> Self {
        Self::new(v.x.round() as i64, v.y.round() as i64)
    }

    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.dx as f64, self.dy as f64)
    }
}

impl Add for Translation {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.dx + rhs.dx, self.dy + rhs.dy)
    }
}

impl AddAssign for Translation {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Neg for Translation {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.dx, -self.dy)
    }
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.dx, self.dy)
    }
}

/// Result of a successful estimation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Estimate {
    pub translation: Translation,

    /// Number of twin pairs left out because of degenerate geometry.
    pub dropped: usize,
}

/// The estimation strategies an aligner can be configured with.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Strategy {
    /// Mean of the closed form twin pair estimates.
    #[default]
    Bisection,

    /// Integer grid search for the smallest reprojection error around the
    /// bisection estimate.
    LocalSearch { radius: u32, frame_height: f64 },

    /// Nelder-Mead minimization of the reprojection error from `(0, 0)`.
    NelderMead { frame_height: f64, max_iters: u64 },
}

impl Estimator for Strategy {
    fn estimate(&self, twins: &[TwinLines]) -> Result<Estimate, EstimateError> {
        match *self {
            Strategy::Bisection => Bisection.estimate(twins),
            Strategy::LocalSearch {
                radius,
                frame_height,
            } => LocalSearch::new(radius, frame_height).estimate(twins),
            Strategy::NelderMead {
                frame_height,
                max_iters,
            } => NelderMead::new(frame_height, max_iters).estimate(twins),
        }
    }
}
