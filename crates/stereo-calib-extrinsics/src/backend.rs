//! Adapter onto the `levenberg-marquardt` crate.

use levenberg_marquardt::{LevenbergMarquardt, MinimizationReport, TerminationReason};
use serde::{Deserialize, Serialize};

/// Stopping rule of the refinement. `epsilon` bounds both the relative
/// reduction of the cost and the relative parameter step; `max_iters` bounds
/// the residual evaluations at `max_iters * (params + 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermCriteria {
    pub max_iters: usize,
    pub epsilon: f64,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iters: 100,
            epsilon: 1e-4,
        }
    }
}

impl TermCriteria {
    /// Configured minimizer. Negative or NaN `epsilon` is treated as zero.
    pub fn levenberg_marquardt(&self) -> LevenbergMarquardt<f64> {
        let tol = if self.epsilon > 0.0 { self.epsilon } else { 0.0 };
        LevenbergMarquardt::new()
            .with_ftol(tol)
            .with_xtol(tol)
            .with_patience(self.max_iters.max(1))
    }
}

/// Whether a report ends in a minimum. Running out of patience, a failed
/// residual evaluation and tolerances below machine precision all count as
/// divergence.
pub fn converged(report: &MinimizationReport<f64>) -> bool {
    report.termination.was_successful()
}

pub(crate) fn describe(reason: &TerminationReason) -> String {
    match reason {
        TerminationReason::LostPatience => "evaluation budget exhausted".to_string(),
        TerminationReason::User(what) => format!("{what} not computable"),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use levenberg_marquardt::LeastSquaresProblem;
    use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

    /// Fit `y = a * exp(b * t)`.
    struct ExpFit {
        t: Vec<f64>,
        y: Vec<f64>,
        params: DVector<f64>,
    }

    impl LeastSquaresProblem<f64, Dyn, Dyn> for ExpFit {
        type ResidualStorage = Owned<f64, Dyn>;
        type JacobianStorage = Owned<f64, Dyn, Dyn>;
        type ParameterStorage = Owned<f64, Dyn>;

        fn set_params(&mut self, x: &DVector<f64>) {
            self.params.clone_from(x);
        }

        fn params(&self) -> DVector<f64> {
            self.params.clone()
        }

        fn residuals(&self) -> Option<DVector<f64>> {
            let (a, b) = (self.params[0], self.params[1]);
            Some(DVector::from_iterator(
                self.t.len(),
                self.t.iter().zip(&self.y).map(|(t, y)| a * (b * t).exp() - y),
            ))
        }

        fn jacobian(&self) -> Option<DMatrix<f64>> {
            let (a, b) = (self.params[0], self.params[1]);
            let mut j = DMatrix::zeros(self.t.len(), 2);
            for (row, t) in self.t.iter().enumerate() {
                j[(row, 0)] = (b * t).exp();
                j[(row, 1)] = a * t * (b * t).exp();
            }
            Some(j)
        }
    }

    fn exp_fit() -> ExpFit {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y = t.iter().map(|t| 2.5 * (-1.3 * t).exp()).collect();
        ExpFit {
            t,
            y,
            params: DVector::from_vec(vec![1.0, 0.0]),
        }
    }

    #[test]
    fn fits_exponential() {
        let criteria = TermCriteria {
            max_iters: 100,
            epsilon: 1e-10,
        };
        let (fit, report) = criteria.levenberg_marquardt().minimize(exp_fit());
        assert!(converged(&report), "{report:?}");
        assert_relative_eq!(2.5, fit.params[0], epsilon = 1e-6);
        assert_relative_eq!(-1.3, fit.params[1], epsilon = 1e-6);
    }

    #[test]
    fn tiny_budget_is_not_convergence() {
        let criteria = TermCriteria {
            max_iters: 1,
            epsilon: 1e-12,
        };
        let (_, report) = criteria.levenberg_marquardt().minimize(exp_fit());
        assert!(!converged(&report), "{report:?}");
        assert!(matches!(report.termination, TerminationReason::LostPatience));
        assert_eq!("evaluation budget exhausted", describe(&report.termination));
    }

    #[test]
    fn uncomputable_residuals_are_not_convergence() {
        struct Undefined(DVector<f64>);

        impl LeastSquaresProblem<f64, Dyn, Dyn> for Undefined {
            type ResidualStorage = Owned<f64, Dyn>;
            type JacobianStorage = Owned<f64, Dyn, Dyn>;
            type ParameterStorage = Owned<f64, Dyn>;

            fn set_params(&mut self, x: &DVector<f64>) {
                self.0.clone_from(x);
            }
            fn params(&self) -> DVector<f64> {
                self.0.clone()
            }
            fn residuals(&self) -> Option<DVector<f64>> {
                None
            }
            fn jacobian(&self) -> Option<DMatrix<f64>> {
                None
            }
        }

        let (_, report) = TermCriteria::default()
            .levenberg_marquardt()
            .minimize(Undefined(DVector::zeros(1)));
        assert!(!converged(&report));
    }
}
