use super::{
    Bisection, Estimate, EstimateError, Estimator, Translation, reprojection::reprojection_error,
};
use crate::twin::TwinLines;
use rayon::prelude::*;
use tracing::debug;

/// Refines the bisection estimate by trying every whole pixel translation
/// within `radius` of it.
///
/// The candidate with the smallest reprojection error wins. Ties go to the
/// candidate closest to the bisection estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalSearch {
    radius: u32,
    frame_height: f64,
}

impl LocalSearch {
    pub fn new(radius: u32, frame_height: f64) -> Self {
        Self {
            radius,
            frame_height,
        }
    }
}

impl Estimator for LocalSearch {
    fn estimate(&self, twins: &[TwinLines]) -> Result<Estimate, EstimateError> {
        let seed = Bisection.estimate(twins)?;
        let center = seed.translation;

        let best = Grid::new(center, self.radius)
            .candidates()
            .into_par_iter()
            .map(|translation| Candidate {
                translation,
                error: reprojection_error(twins, translation.to_vector(), self.frame_height),
                offset: (translation.dx - center.dx).pow(2) + (translation.dy - center.dy).pow(2),
            })
            .reduce_with(Candidate::min)
            .map(|candidate| candidate.translation)
            .unwrap_or(center);

        if best != center {
            debug!(%center, %best, "local search moved the estimate");
        }

        Ok(Estimate {
            translation: best,
            dropped: seed.dropped,
        })
    }
}

/// Square grid of whole pixel translations around a center.
struct Grid {
    center: Translation,
    radius: i64,
}

impl Grid {
    fn new(center: Translation, radius: u32) -> Self {
        Self {
            center,
            radius: radius.into(),
        }
    }

    /// Candidates in row-major order.
    fn candidates(&self) -> Vec<Translation> {
        let span = -self.radius..=self.radius;
        span.clone()
            .flat_map(|dx| span.clone().map(move |dy| (dx, dy)))
            .map(|(dx, dy)| self.center + Translation::new(dx, dy))
            .collect()
    }
}

struct Candidate {
    translation: Translation,
    error: f64,
    offset: i64,
}

impl Candidate {
    fn min(self, other: Self) -> Self {
        match (other.error, other.offset) < (self.error, self.offset) {
            true => other,
            false => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::fixtures::*;
    use rstest::rstest;

    #[test]
    fn improves_on_bisection() {
        let twins = shifted(&[line(120., 0.05), line(380., 0.02)], 20., -15.);

        let seed = Bisection.estimate(&twins).unwrap();
        let refined = LocalSearch::new(2, 480.).estimate(&twins).unwrap();

        assert_eq!(seed.translation, Translation::new(19, -15));
        assert_eq!(refined.translation, Translation::new(20, -15));
    }

    #[test]
    fn zero_radius_keeps_bisection() {
        let twins = shifted(&[line(120., 0.05), line(380., 0.02)], 20., -15.);

        let refined = LocalSearch::new(0, 480.).estimate(&twins).unwrap();

        assert_eq!(refined.translation, Translation::new(19, -15));
    }

    #[test]
    fn ties_prefer_the_center() {
        // Vertical edges do not constrain vertical motion.
        let twins = shifted(&[line(100., 0.), line(300., 0.)], 20., -15.);

        let refined = LocalSearch::new(3, 480.).estimate(&twins).unwrap();

        assert_eq!(refined.translation, Translation::new(20, 0));
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 9)]
    #[case(3, 49)]
    fn grid_size(#[case] radius: u32, #[case] len: usize) {
        let grid = Grid::new(Translation::new(5, -5), radius);

        let candidates = grid.candidates();

        assert_eq!(candidates.len(), len);
        assert!(candidates.contains(&Translation::new(5, -5)));
    }
}
