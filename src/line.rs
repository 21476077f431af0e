use nalgebra::Vector2;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::fmt;
use thiserror::Error;
use uom::si::{angle::radian, f64::Angle, ratio::ratio};

/// Below this magnitude a sine or cosine is treated as zero.
pub(crate) const DEGENERATE_EPS: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum LineError {
    #[error("expected a finite line but got rho: {rho}, theta: {theta} rad")]
    NonFinite { rho: f64, theta: f64 },
    #[error("line {line} runs parallel to the x axis and has no root")]
    NoRoot { line: Line },
}

/// An infinite line in polar normal form.
///
/// A point `(x, y)` lies on the line iff `x * cos(theta) + y * sin(theta) == rho`.
/// This makes `(rho * cos(theta), rho * sin(theta))` the foot point of the line,
/// its point closest to the origin.
///
/// A `Line` is always normalized: `rho` is not negative and `theta` is on the
/// range `[-PI, PI)`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Line {
    /// Distance of the foot point from the origin in pixels.
    rho: f64,

    /// Direction of the normal vector, taken from the +X axis towards +Y.
    theta: Angle,
}

impl Line {
    /// Creates a normalized `Line` from `rho` and `theta`.
    ///
    /// A negative `rho` is flipped and compensated by half a turn on `theta`,
    /// then `theta` is wrapped onto `[-PI, PI)`. Returns an error if either
    /// value is not finite.
    pub fn new(rho: f64, theta: Angle) -> Result<Self, LineError> {
        Self::normalized(rho, theta.get::<radian>())
    }

    /// Same as [`Line::new`] with `theta` given in radians.
    pub fn from_radians(rho: f64, theta: f64) -> Result<Self, LineError> {
        Self::normalized(rho, theta)
    }

    fn normalized(mut rho: f64, mut theta: f64) -> Result<Self, LineError> {
        if !rho.is_finite() || !theta.is_finite() {
            return Err(LineError::NonFinite { rho, theta });
        }

        if rho < 0. {
            rho = -rho;
            theta += PI;
        }

        Ok(Self {
            rho,
            theta: Angle::new::<radian>(wrap(theta)),
        })
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn theta(&self) -> Angle {
        self.theta
    }

    /// The point of the line closest to the origin.
    pub fn foot_point(&self) -> Vector2<f64> {
        Vector2::new(
            self.rho * self.theta.cos().get::<ratio>(),
            self.rho * self.theta.sin().get::<ratio>(),
        )
    }

    /// Re-expresses the line relative to an origin placed at `(dx, dy)`.
    pub fn move_origin(&self, dx: f64, dy: f64) -> Result<Self, LineError> {
        let theta = self.theta.get::<radian>();
        Self::normalized(shifted_rho(self.rho, theta, dx, dy), theta)
    }

    /// Moves the line by `dx` and `dy`.
    pub fn translate(&self, dx: f64, dy: f64) -> Result<Self, LineError> {
        self.move_origin(-dx, -dy)
    }

    /// Rotates the line by `angle` around the origin.
    pub fn rotate(&self, angle: Angle) -> Result<Self, LineError> {
        self.rotate_about(angle, Vector2::zeros())
    }

    /// Rotates the line by `angle` around `pivot`.
    pub fn rotate_about(&self, angle: Angle, pivot: Vector2<f64>) -> Result<Self, LineError> {
        let theta = self.theta.get::<radian>();
        let rho = shifted_rho(self.rho, theta, pivot.x, pivot.y);
        let theta = theta + angle.get::<radian>();
        let rho = shifted_rho(rho, theta, -pivot.x, -pivot.y);
        Self::normalized(rho, theta)
    }

    /// Returns the line bisecting `self` and `other`.
    ///
    /// The bisector points in the average direction of both lines. Its foot
    /// point is found by walking along each line to the ray that leaves the
    /// origin in that direction and taking the middle of both points. Unlike
    /// an intersection of the two lines this stays exact for parallel and
    /// nearly parallel inputs.
    pub fn bisector(&self, other: &Line) -> Result<Line, LineError> {
        let (rho_a, theta_a) = (self.rho, self.theta.get::<radian>());

        // Express `other` with the normal closest to ours so the average
        // direction is the one between the two undirected lines.
        let mut delta = wrap(other.theta.get::<radian>() - theta_a);
        let mut rho_b = other.rho;
        if delta.abs() > FRAC_PI_2 {
            rho_b = -rho_b;
            delta -= PI.copysign(delta);
        }
        let theta_b = theta_a + delta;

        let theta = (theta_a + theta_b) / 2.;
        let middle =
            (walk_to_ray(rho_a, theta_a, theta) + walk_to_ray(rho_b, theta_b, theta)) / 2.;

        Self::normalized(middle.x * theta.cos() + middle.y * theta.sin(), theta)
    }

    /// The x coordinate where the line crosses the x axis.
    ///
    /// Returns an error if the line is parallel to the x axis.
    pub fn root_at_y0(&self) -> Result<f64, LineError> {
        let cos = self.theta.cos().get::<ratio>();
        if cos.abs() < DEGENERATE_EPS {
            return Err(LineError::NoRoot { line: *self });
        }

        Ok(self.rho / cos)
    }

    /// Returns true if `other` deviates from `self` by less than `similarity`.
    ///
    /// Also accepts `other` when it is close to `self` with an inverted normal.
    pub fn is_similar(&self, other: &Line, similarity: &Similarity) -> bool {
        let diff_theta = (self.theta - other.theta).abs();
        let similar =
            (self.rho - other.rho).abs() < similarity.max_rho && diff_theta < similarity.max_theta;
        let similar_inverted = (self.rho + other.rho).abs() < similarity.max_rho
            && (diff_theta - Angle::HALF_TURN).abs() < similarity.max_theta;

        similar || similar_inverted
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let theta = self.theta.get::<radian>();
        write!(
            f,
            "{:.2} = x * cos({theta:.4}) + y * sin({theta:.4})",
            self.rho
        )
    }
}

/// Thresholds under which two lines are considered the same physical edge.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Similarity {
    /// Maximum deviation of `rho` in pixels.
    pub max_rho: f64,

    /// Maximum deviation of `theta`.
    pub max_theta: Angle,
}

impl Similarity {
    pub fn new(max_rho: f64, max_theta: Angle) -> Self {
        Self { max_rho, max_theta }
    }
}

impl Default for Similarity {
    fn default() -> Self {
        Self::new(30.0, Angle::new::<radian>(0.1))
    }
}

/// Wraps `theta` onto `[-PI, PI)` leaving values already on the range untouched.
pub(crate) fn wrap(theta: f64) -> f64 {
    if (-PI..PI).contains(&theta) {
        return theta;
    }

    let wrapped = (theta + PI).rem_euclid(TAU) - PI;
    // rem_euclid can round up to TAU just below a multiple of it.
    if wrapped >= PI { wrapped - TAU } else { wrapped }
}

/// Distance of the line `(rho, theta)` from an origin moved to `(dx, dy)`.
fn shifted_rho(rho: f64, theta: f64, dx: f64, dy: f64) -> f64 {
    // Polar coordinates of the new origin.
    let dist = dx.hypot(dy);
    let alpha = dy.atan2(dx);

    rho - dist * (theta - alpha).cos()
}

/// Walks along the line `(rho, theta)` from its foot point to where it meets
/// the ray leaving the origin in direction `towards`.
fn walk_to_ray(rho: f64, theta: f64, towards: f64) -> Vector2<f64> {
    let foot = Vector2::new(rho * theta.cos(), rho * theta.sin());
    let along = Vector2::new(-theta.sin(), theta.cos());
    foot + along * ((towards - theta).tan() * rho)
}
