use super::{Estimate, EstimateError, Estimator, Translation};
use crate::{
    line::{DEGENERATE_EPS, Line, LineError},
    twin::TwinLines,
};
use nalgebra::Vector2;
use std::f64::consts::{FRAC_PI_2, PI};
use tracing::warn;
use uom::si::{angle::radian, f64::Angle, ratio::ratio};

/// Estimates the translation as the mean over all twin pairs.
///
/// Every two twins form a twin pair. The bisectors of a pair in both frames
/// give the horizontal motion, the remaining vertical slack of each side is
/// measured along the upright bisector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bisection;

impl Bisection {
    /// Estimates every twin pair, skipping degenerate ones.
    ///
    /// Returns the estimates in twin pair order along with the number of
    /// skipped pairs.
    pub fn twin_pair_estimates(&self, twins: &[TwinLines]) -> (Vec<Vector2<f64>>, usize) {
        let mut dropped = 0;
        let estimates = twins
            .iter()
            .enumerate()
            .flat_map(|(i, left)| twins[i + 1..].iter().map(move |right| (left, right)))
            .filter_map(|(left, right)| match estimate_twin_pair(left, right) {
                Ok(estimate) => Some(estimate),
                Err(err) => {
                    warn!(%err, "dropping degenerate twin pair");
                    dropped += 1;
                    None
                }
            })
            .collect();

        (estimates, dropped)
    }
}

impl Estimator for Bisection {
    fn estimate(&self, twins: &[TwinLines]) -> Result<Estimate, EstimateError> {
        let (estimates, dropped) = self.twin_pair_estimates(twins);
        let translation = aggregate(&estimates).ok_or(EstimateError::InsufficientData {
            twins: twins.len(),
            dropped,
        })?;

        Ok(Estimate {
            translation,
            dropped,
        })
    }
}

/// Mean of the twin pair estimates rounded to whole pixels.
///
/// Returns `None` if there is nothing to aggregate.
pub fn aggregate(estimates: &[Vector2<f64>]) -> Option<Translation> {
    if estimates.is_empty() {
        return None;
    }

    let mean = estimates.iter().sum::<Vector2<f64>>() / estimates.len() as f64;
    Some(Translation::from_rounded(mean))
}

/// Estimates the translation from one twin pair.
pub fn estimate_twin_pair(
    left: &TwinLines,
    right: &TwinLines,
) -> Result<Vector2<f64>, EstimateError> {
    let bisector_current = left.current.bisector(&right.current)?;
    let bisector_next = left.next.bisector(&right.next)?;

    for bisector in [bisector_current, bisector_next] {
        if bisector.theta().cos().get::<ratio>().abs() < DEGENERATE_EPS {
            return Err(EstimateError::HorizontalBisector { bisector });
        }
    }

    // Moves the foot point of the current bisector onto the next one.
    let shift = bisector_next.foot_point() - bisector_current.foot_point();
    let pivot = bisector_next.foot_point();

    // Turns both bisectors upright without flipping the working frame.
    let angle_current = -upright_angle(&bisector_current);
    let angle_next = -upright_angle(&bisector_next);
    let to_next = |line: &Line| -> Result<Line, LineError> {
        line.translate(shift.x, shift.y)?.rotate_about(angle_current, pivot)
    };

    let mut correction = 0.;
    for side in [left, right] {
        correction += vertical_distance(
            &side.next.rotate_about(angle_next, pivot)?,
            &to_next(&side.current)?,
        );
    }
    let correction = correction / 2.;

    Ok(Vector2::new(shift.x, shift.y + correction))
}

/// Direction of the bisector normal on `(-PI / 2, PI / 2]`.
///
/// Rotating by the opposite of it turns the bisector upright while keeping
/// the working y axis pointing the same way as the image y axis.
fn upright_angle(bisector: &Line) -> Angle {
    let theta = bisector.theta();
    if theta > Angle::HALF_TURN / 2. {
        theta - Angle::HALF_TURN
    } else if theta <= -Angle::HALF_TURN / 2. {
        theta + Angle::HALF_TURN
    } else {
        theta
    }
}

/// Vertical offset that moves the foot point of `moving` onto `reference`.
///
/// Solves the triangle spanned by both foot points and the point of
/// `reference` straight above or below the foot point of `moving` with the
/// law of sines. Returns `0` if `reference` is vertical.
pub fn vertical_distance(reference: &Line, moving: &Line) -> f64 {
    let beta = -reference.theta().get::<radian>();
    let sin_beta = beta.sin();
    if sin_beta.abs() < DEGENERATE_EPS {
        return 0.;
    }

    let dist = reference.foot_point() - moving.foot_point();
    if dist.x == 0. {
        return dist.y;
    }

    let b = dist.x.hypot(dist.y);
    let gamma = FRAC_PI_2 + dist.y.atan2(dist.x);
    let alpha = PI - beta - gamma;

    -(alpha.sin() * b / sin_beta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::fixtures::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(line(100., 0.3), 12.)]
    #[case(line(100., -0.3), 12.)]
    #[case(line(250., 1.2), -40.)]
    #[case(line(80., -2.5), 7.5)]
    fn vertical_distance_of_shifted_line(#[case] reference: Line, #[case] dy: f64) {
        let moving = reference.translate(0., -dy).unwrap();

        assert_relative_eq!(
            vertical_distance(&reference, &moving),
            dy,
            epsilon = 1e-9
        );
    }

    #[test]
    fn vertical_distance_along_shared_column() {
        let reference = line(100., 0.5);
        let moving = line(100., -0.5);

        assert_eq!(
            vertical_distance(&reference, &moving),
            2. * (100. * 0.5f64.sin())
        );
    }

    #[rstest]
    #[case(line(100., 0.))]
    #[case(line(100., -PI))]
    fn vertical_distance_to_vertical_line(#[case] reference: Line) {
        assert_eq!(vertical_distance(&reference, &line(140., 0.2)), 0.);
    }

    #[test]
    fn tapered_twin_pair() {
        let twins = shifted(&tapered(), 20., -15.);

        let estimate = estimate_twin_pair(&twins[0], &twins[1]).unwrap();

        assert_relative_eq!(estimate, Vector2::new(20., -15.), epsilon = 1e-9);
    }

    #[test]
    fn vertical_twin_pair_has_no_vertical_motion() {
        let twins = shifted(&[line(100., 0.), line(300., 0.)], 20., -15.);

        let estimate = estimate_twin_pair(&twins[0], &twins[1]).unwrap();

        assert_relative_eq!(estimate, Vector2::new(20., 0.), epsilon = 1e-9);
    }

    #[test]
    fn tilted_twin_pair_is_close() {
        let twins = shifted(&[line(100., 0.1), line(300., -0.05)], 20., -15.);

        let estimate = estimate_twin_pair(&twins[0], &twins[1]).unwrap();

        assert!((estimate - Vector2::new(20., -15.)).norm() < 1.);
    }

    #[rstest]
    // Normals pointing left, both bisectors near a half turn.
    #[case(&[line(100., PI - 0.1), line(300., PI + 0.1)], 20., -15.)]
    #[case(&[line(100., -PI + 0.1), line(300., PI - 0.1)], 20., -15.)]
    // Bisector crossing the origin between the frames.
    #[case(&[line(30., 0.1), line(30., -0.1)], -80., 30.)]
    #[case(&[line(30., 0.1), line(30., -0.1)], -80., -30.)]
    fn twin_pair_keeps_image_orientation(
        #[case] lines: &[Line],
        #[case] dx: f64,
        #[case] dy: f64,
    ) {
        let twins = shifted(lines, dx, dy);

        let estimate = estimate_twin_pair(&twins[0], &twins[1]).unwrap();

        assert_relative_eq!(estimate, Vector2::new(dx, dy), epsilon = 1e-9);
    }

    #[rstest]
    #[case(&[line(5., PI - 0.1), line(15., PI - 0.05)], 2., -1.)]
    #[case(&[line(5., PI - 0.1), line(15., PI - 0.05)], 20., -15.)]
    #[case(&[line(50., 0.1), line(60., 0.05)], -80., 30.)]
    fn leaning_twin_pair_is_close(#[case] lines: &[Line], #[case] dx: f64, #[case] dy: f64) {
        let twins = shifted(lines, dx, dy);

        let estimate = estimate_twin_pair(&twins[0], &twins[1]).unwrap();

        assert!((estimate - Vector2::new(dx, dy)).norm() < 3., "{estimate}");
        assert!((estimate.y - dy).abs() < 0.2, "{estimate}");
    }

    #[test]
    fn horizontal_twin_pair_is_degenerate() {
        let twins = shifted(&[line(100., FRAC_PI_2), line(300., FRAC_PI_2)], 20., -15.);

        assert!(matches!(
            estimate_twin_pair(&twins[0], &twins[1]),
            Err(EstimateError::HorizontalBisector { .. })
        ));
    }

    #[test]
    fn degenerate_pairs_are_dropped() {
        let mut lines = tapered();
        lines.push(line(200., FRAC_PI_2));
        lines.push(line(400., FRAC_PI_2));
        let twins = shifted(&lines, 20., -15.);

        let (estimates, dropped) = Bisection.twin_pair_estimates(&twins);

        assert_eq!(dropped, 1);
        assert_eq!(estimates.len(), 5);
    }

    #[test]
    fn all_pairs_degenerate() {
        let twins = shifted(&[line(100., FRAC_PI_2), line(300., FRAC_PI_2)], 20., -15.);

        assert_eq!(
            Bisection.estimate(&twins),
            Err(EstimateError::InsufficientData {
                twins: 2,
                dropped: 1
            })
        );
    }

    #[rstest]
    #[case(&[], None)]
    #[case(&[Vector2::new(1.2, 2.6), Vector2::new(2.0, -0.4)], Some(Translation::new(2, 1)))]
    #[case(&[Vector2::new(-7.6, 0.2)], Some(Translation::new(-8, 0)))]
    fn aggregates_mean(#[case] estimates: &[Vector2<f64>], #[case] expected: Option<Translation>) {
        assert_eq!(aggregate(estimates), expected);
    }
}
