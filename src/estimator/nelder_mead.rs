use super::{Estimate, EstimateError, Estimator, Translation, reprojection::reprojection_error};
use crate::twin::TwinLines;
use argmin::{
    core::{CostFunction, Error as ArgminError, Executor, State},
    solver::neldermead,
};
use nalgebra::Vector2;
use tracing::debug;

/// Edge length of the initial simplex in pixels.
const INITIAL_STEP: f64 = 1.;

/// Minimizes the reprojection error with Nelder-Mead starting from no motion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NelderMead {
    frame_height: f64,
    max_iters: u64,
}

impl NelderMead {
    pub fn new(frame_height: f64, max_iters: u64) -> Self {
        Self {
            frame_height,
            max_iters,
        }
    }
}

impl Estimator for NelderMead {
    fn estimate(&self, twins: &[TwinLines]) -> Result<Estimate, EstimateError> {
        if twins.len() < 2 {
            return Err(EstimateError::InsufficientData {
                twins: twins.len(),
                dropped: 0,
            });
        }

        let problem = Reprojection {
            twins: twins.to_vec(),
            frame_height: self.frame_height,
        };
        let simplex = vec![
            vec![0., 0.],
            vec![INITIAL_STEP, 0.],
            vec![0., INITIAL_STEP],
        ];

        let result = Executor::new(problem, neldermead::NelderMead::new(simplex))
            .configure(|state| state.max_iters(self.max_iters))
            .run()
            .map_err(refinement_failed)?;

        let state = result.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| EstimateError::Refinement {
                reason: "no parameters were evaluated".into(),
            })?;
        debug!(
            iters = state.get_iter(),
            cost = state.get_best_cost(),
            "nelder-mead finished"
        );

        Ok(Estimate {
            translation: Translation::from_rounded(Vector2::from_column_slice(best)),
            dropped: 0,
        })
    }
}

fn refinement_failed(err: ArgminError) -> EstimateError {
    EstimateError::Refinement {
        reason: err.to_string(),
    }
}

/// Reprojection error as a function of `[dx, dy]`.
struct Reprojection {
    twins: Vec<TwinLines>,
    frame_height: f64,
}

impl CostFunction for Reprojection {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        let translation = Vector2::from_column_slice(param);
        Ok(reprojection_error(
            &self.twins,
            translation,
            self.frame_height,
        ))
    }
}
