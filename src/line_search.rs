//! Bracketing line search with safeguarded polynomial steps.
//!
//! Starting from a trial step along a descent direction, the search first
//! tightens the bracket while the trial point violates the Wolfe-Powell
//! conditions, then extrapolates with a cubic fit until the slope has flattened
//! enough. Every predicted step is clamped to a fixed fraction of the current
//! bracket, and non-finite predictions fall back to bisection or a bounded
//! extrapolation.

use crate::objective::{Evaluation, GradientMismatch, Objective};
use ndarray::Array1;

/// Sufficient-decrease constant.
pub const RHO: f64 = 0.01;
/// Curvature constant. Must exceed [`RHO`].
pub const SIG: f64 = 0.5;
/// A step never lands closer than this fraction of the bracket to either end.
pub const INT: f64 = 0.1;
/// Largest growth factor of the step in one extrapolation.
pub const EXT: f64 = 3.0;
/// Evaluations allowed in one line search after its first probe.
pub const MAX_EVALS: usize = 20;
/// Largest growth of the initial step from one line search to the next.
pub const RATIO: f64 = 100.0;

/// Tuning of the line search.
///
/// The defaults are the classic constants and rarely need changing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchParams {
    pub rho: f64,
    pub sig: f64,
    pub int: f64,
    pub ext: f64,
    pub max_evals: usize,
    pub ratio: f64,
}

impl Default for LineSearchParams {
    fn default() -> Self {
        Self {
            rho: RHO,
            sig: SIG,
            int: INT,
            ext: EXT,
            max_evals: MAX_EVALS,
            ratio: RATIO,
        }
    }
}

impl LineSearchParams {
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if !(self.rho > 0.0 && self.rho < self.sig && self.sig < 1.0) {
            return Err("expected 0 < rho < sig < 1");
        }
        if !(self.int > 0.0 && self.int < 0.5) {
            return Err("expected 0 < int < 0.5");
        }
        if !(self.ext > 1.0 && self.ext.is_finite()) {
            return Err("expected a finite ext > 1");
        }
        if self.max_evals == 0 {
            return Err("expected max_evals >= 1");
        }
        if !(self.ratio > 0.0 && self.ratio.is_finite()) {
            return Err("expected a finite ratio > 0");
        }
        Ok(())
    }
}

/// Scalars describing the search along one line.
///
/// `z1` is the distance of the trial point from the start of the line, `z3`
/// the signed distance from the trial point to the other end of the bracket.
#[derive(Debug, Clone, Copy)]
struct Bracket {
    f1: f64,
    d1: f64,
    z1: f64,
    f2: f64,
    d2: f64,
    z3: f64,
    f3: f64,
    d3: f64,
    limit: Option<f64>,
}

impl Bracket {
    fn sufficient_decrease(&self, params: &LineSearchParams) -> bool {
        self.f2 <= self.f1 + self.z1 * params.rho * self.d1
    }

    fn curvature_bounded(&self, params: &LineSearchParams) -> bool {
        self.d2 <= -params.sig * self.d1
    }

    fn acceptable(&self, params: &LineSearchParams) -> bool {
        self.sufficient_decrease(params) && self.curvature_bounded(params)
    }

    fn cubic_coefficients(&self) -> (f64, f64) {
        let a = 6.0 * (self.f2 - self.f3) / self.z3 + 3.0 * (self.d2 + self.d3);
        let b = 3.0 * (self.f3 - self.f2) - self.z3 * (self.d3 + 2.0 * self.d2);
        (a, b)
    }

    /// Step back into the bracket, in `[(1-int)*z3, int*z3]`.
    fn interpolation_step(&self, params: &LineSearchParams) -> f64 {
        let z3 = self.z3;
        let z2 = if self.f2 > self.f1 {
            z3 - (0.5 * self.d3 * z3 * z3) / (self.d3 * z3 + self.f2 - self.f3)
        } else {
            let (a, b) = self.cubic_coefficients();
            ((b * b - a * self.d2 * z3 * z3).sqrt() - b) / a
        };
        let z2 = if z2.is_finite() { z2 } else { z3 / 2.0 };
        z2.min(params.int * z3).max((1.0 - params.int) * z3)
    }

    /// Forward step from the cubic fit, bounded by the limit or by `ext`.
    fn extrapolation_step(&self, params: &LineSearchParams) -> f64 {
        let (a, b) = self.cubic_coefficients();
        let z1 = self.z1;
        let z3 = self.z3;
        let z2 = -self.d2 * z3 * z3 / (b + (b * b - a * self.d2 * z3 * z3).sqrt());
        match self.limit {
            None if !z2.is_finite() || z2 < 0.0 => z1 * (params.ext - 1.0),
            Some(limit) if !z2.is_finite() || z2 < 0.0 => (limit - z1) / 2.0,
            Some(limit) if z2 + z1 > limit => (limit - z1) / 2.0,
            None if z2 + z1 > z1 * params.ext => z1 * (params.ext - 1.0),
            _ if z2 < -z3 * params.int => -z3 * params.int,
            Some(limit) if z2 < (limit - z1) * (1.0 - params.int) => {
                (limit - z1) * (1.0 - params.int)
            }
            _ => z2,
        }
    }
}

pub(crate) enum LineSearchOutcome {
    Accepted {
        point: Array1<f64>,
        evaluation: Evaluation,
        step: f64,
    },
    Failed,
}

/// Searches along `s` from `x0` for a point satisfying the strong Wolfe-Powell
/// conditions, starting with the step `z1`.
///
/// `f1` is the cost at `x0` and `d1` the slope `g·s` there. The start point is
/// never modified; the trial point is built on a private copy.
#[allow(clippy::too_many_arguments)]
pub(crate) fn line_search<ObjFn>(
    objective: &mut Objective<'_, ObjFn>,
    params: &LineSearchParams,
    x0: &Array1<f64>,
    s: &Array1<f64>,
    f1: f64,
    d1: f64,
    z1: f64,
) -> Result<LineSearchOutcome, GradientMismatch>
where
    ObjFn: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    let mut x = x0.clone();
    x.scaled_add(z1, s);
    let mut probe = objective.eval(&x)?;
    let mut bracket = Bracket {
        f1,
        d1,
        z1,
        f2: probe.cost,
        d2: probe.gradient.dot(s),
        z3: -z1,
        f3: f1,
        d3: d1,
        limit: None,
    };
    let mut remaining = objective.tracker.line_search_allowance(params.max_evals);

    loop {
        while !bracket.acceptable(params) && remaining > 0 {
            bracket.limit = Some(bracket.z1);
            let z2 = bracket.interpolation_step(params);
            bracket.z1 += z2;
            x.scaled_add(z2, s);
            probe = objective.eval(&x)?;
            remaining -= 1;
            bracket.f2 = probe.cost;
            bracket.d2 = probe.gradient.dot(s);
            bracket.z3 -= z2;
        }

        if !bracket.acceptable(params) {
            log::debug!(
                "[CG LineSearch] Wolfe conditions unmet at step {:.3e} (f={:.6e}, slope={:.3e}).",
                bracket.z1,
                bracket.f2,
                bracket.d2
            );
            return Ok(LineSearchOutcome::Failed);
        }
        if bracket.d2 > params.sig * d1 {
            log::debug!(
                "[CG LineSearch] Accepted step {:.3e} with f={:.6e}.",
                bracket.z1,
                bracket.f2
            );
            return Ok(LineSearchOutcome::Accepted {
                point: x,
                evaluation: probe,
                step: bracket.z1,
            });
        }
        if remaining == 0 {
            log::debug!(
                "[CG LineSearch] Evaluation allowance spent at step {:.3e}.",
                bracket.z1
            );
            return Ok(LineSearchOutcome::Failed);
        }

        let z2 = bracket.extrapolation_step(params);
        bracket.f3 = bracket.f2;
        bracket.d3 = bracket.d2;
        bracket.z3 = -z2;
        bracket.z1 += z2;
        x.scaled_add(z2, s);
        probe = objective.eval(&x)?;
        remaining -= 1;
        bracket.f2 = probe.cost;
        bracket.d2 = probe.gradient.dot(s);
    }
}

#[cfg(test)]
mod tests {
    use super::{Bracket, LineSearchOutcome, LineSearchParams, line_search};
    use crate::budget::{Budget, BudgetTracker};
    use crate::objective::Objective;
    use ndarray::{Array1, array};
    use spectral::prelude::*;

    fn shifted_parabola(x: &Array1<f64>) -> (f64, Array1<f64>) {
        ((x[0] - 2.0).powi(2), array![2.0 * (x[0] - 2.0)])
    }

    fn downward_parabola(x: &Array1<f64>) -> (f64, Array1<f64>) {
        (-x[0] * x[0], array![-2.0 * x[0]])
    }

    fn bracket(z1: f64, f2: f64, d2: f64, z3: f64, f3: f64, d3: f64) -> Bracket {
        Bracket {
            f1: 1.0,
            d1: -2.0,
            z1,
            f2,
            d2,
            z3,
            f3,
            d3,
            limit: None,
        }
    }

    fn assert_wolfe(params: &LineSearchParams, f1: f64, d1: f64, step: f64, f2: f64, d2: f64) {
        assert_that!(f2).is_less_than_or_equal_to(f1 + params.rho * step * d1);
        assert_that!(d2).is_less_than_or_equal_to(-params.sig * d1);
        assert_that!(d2).is_greater_than(params.sig * d1);
    }

    #[test]
    fn test_accepts_wolfe_point_on_parabola() {
        let params = LineSearchParams::default();
        let mut f = shifted_parabola;
        let mut objective = Objective::new(&mut f, 1, BudgetTracker::new(Budget::Iterations(10)));
        let x0 = array![0.0];
        let s = array![4.0];
        let (f1, d1) = (4.0, -16.0);
        let outcome = line_search(&mut objective, &params, &x0, &s, f1, d1, 1.0 / 17.0).unwrap();
        match outcome {
            LineSearchOutcome::Accepted {
                point,
                evaluation,
                step,
            } => {
                assert_that!(point[0]).is_close_to(4.0 * step, 1e-12);
                assert_wolfe(&params, f1, d1, step, evaluation.cost, evaluation.gradient.dot(&s));
            }
            LineSearchOutcome::Failed => panic!("expected the parabola line search to succeed"),
        }
        assert_eq!(x0, array![0.0]);
    }

    #[test]
    fn test_overshooting_first_step_is_pulled_back() {
        let params = LineSearchParams::default();
        let mut f = shifted_parabola;
        let mut objective = Objective::new(&mut f, 1, BudgetTracker::new(Budget::Iterations(10)));
        let s = array![4.0];
        let outcome =
            line_search(&mut objective, &params, &array![0.0], &s, 4.0, -16.0, 10.0).unwrap();
        match outcome {
            LineSearchOutcome::Accepted {
                evaluation, step, ..
            } => {
                assert_that!(step).is_less_than(10.0);
                assert_that!(step).is_greater_than(0.0);
                assert_wolfe(&params, 4.0, -16.0, step, evaluation.cost, evaluation.gradient.dot(&s));
            }
            LineSearchOutcome::Failed => panic!("expected the line search to recover"),
        }
    }

    #[test]
    fn test_backs_off_from_non_finite_region() {
        let params = LineSearchParams::default();
        let mut f = |x: &Array1<f64>| {
            if x[0] < 4.0 {
                ((x[0] - 3.0).powi(2), array![2.0 * (x[0] - 3.0)])
            } else {
                (f64::NAN, array![f64::NAN])
            }
        };
        let mut objective = Objective::new(&mut f, 1, BudgetTracker::new(Budget::Iterations(10)));
        let outcome =
            line_search(&mut objective, &params, &array![0.0], &array![6.0], 9.0, -36.0, 1.0)
                .unwrap();
        match outcome {
            LineSearchOutcome::Accepted {
                point, evaluation, ..
            } => {
                assert!(point[0] < 4.0);
                assert!(evaluation.cost.is_finite());
                assert_that!(point[0]).is_close_to(3.0, 1e-12);
            }
            LineSearchOutcome::Failed => panic!("expected the line search to back off"),
        }
    }

    #[test]
    fn test_unbounded_direction_fails_after_allowance() {
        let params = LineSearchParams::default();
        let mut f = downward_parabola;
        let mut objective = Objective::new(&mut f, 1, BudgetTracker::new(Budget::Iterations(10)));
        let outcome =
            line_search(&mut objective, &params, &array![1.0], &array![2.0], -1.0, -4.0, 0.2)
                .unwrap();
        assert!(matches!(outcome, LineSearchOutcome::Failed));
        assert_eq!(objective.tracker.func_evals(), 1 + params.max_evals);
    }

    #[test]
    fn test_evaluation_budget_limits_the_search() {
        let params = LineSearchParams::default();
        let mut f = downward_parabola;
        let mut tracker = BudgetTracker::new(Budget::Evaluations(5));
        tracker.record_evaluation();
        let mut objective = Objective::new(&mut f, 1, tracker);
        let outcome =
            line_search(&mut objective, &params, &array![1.0], &array![2.0], -1.0, -4.0, 0.2)
                .unwrap();
        assert!(matches!(outcome, LineSearchOutcome::Failed));
        assert_eq!(objective.tracker.func_evals(), 5);
        assert!(!objective.tracker.has_remaining());
    }

    #[test]
    fn test_interpolation_falls_back_to_bisection_on_nan() {
        let params = LineSearchParams::default();
        let b = bracket(1.0, f64::NAN, f64::NAN, -1.0, 1.0, -2.0);
        assert_that!(b.interpolation_step(&params)).is_close_to(-0.5, 1e-15);
    }

    #[test]
    fn test_interpolation_is_clamped_away_from_bracket_ends() {
        let params = LineSearchParams::default();
        // The quadratic fit lands almost on the far end of the bracket.
        let b = Bracket {
            f1: 0.0,
            f3: 0.0,
            ..bracket(1.0, 10.0, 5.0, -1.0, 0.0, -1.0)
        };
        assert_that!(b.interpolation_step(&params)).is_close_to(-0.9, 1e-12);
    }

    #[test]
    fn test_extrapolation_without_limit_grows_by_ext_on_nan() {
        let params = LineSearchParams::default();
        let b = bracket(0.5, 1.0, -1.0, 0.0, 1.0, -1.0);
        assert_that!(b.extrapolation_step(&params)).is_close_to(1.0, 1e-15);
    }

    #[test]
    fn test_extrapolation_with_limit_bisects_on_nan() {
        let params = LineSearchParams::default();
        let b = Bracket {
            limit: Some(2.0),
            ..bracket(0.5, 1.0, -1.0, 0.0, 1.0, -1.0)
        };
        assert_that!(b.extrapolation_step(&params)).is_close_to(0.75, 1e-15);
    }

    #[test]
    fn test_predicted_steps_stay_within_bracket_bounds() {
        let params = LineSearchParams::default();
        let costs = [-1.0, 0.0, 2.0, f64::NAN, f64::INFINITY];
        let slopes = [-3.0, -0.5, 0.0, 1.0, f64::NAN];
        let gaps = [-2.0, -0.5, -1e-8];
        let steps = [0.5, 2.0, 10.0];
        for &f2 in &costs {
            for &f3 in &costs {
                for &d2 in &slopes {
                    for &d3 in &slopes {
                        for &z3 in &gaps {
                            for &z1 in &steps {
                                let b = bracket(z1, f2, d2, z3, f3, d3);

                                let back = b.interpolation_step(&params);
                                assert!(back.is_finite());
                                assert!(back <= params.int * z3);
                                assert!(back >= (1.0 - params.int) * z3);

                                let forward = b.extrapolation_step(&params);
                                assert!(forward.is_finite());
                                assert!(forward > 0.0);
                                let cap = (z1 * (params.ext - 1.0)).max(-z3 * params.int);
                                assert!(forward <= cap * (1.0 + 1e-12));

                                let limit = z1 + 1.5;
                                let bounded = Bracket {
                                    limit: Some(limit),
                                    ..b
                                };
                                let forward = bounded.extrapolation_step(&params);
                                assert!(forward.is_finite());
                                assert!(forward > 0.0);
                                let cap = (limit - z1).max(-z3 * params.int);
                                assert!(forward <= cap * (1.0 + 1e-12));
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_params_validation() {
        assert!(LineSearchParams::default().validate().is_ok());
        let swapped = LineSearchParams {
            rho: 0.6,
            ..LineSearchParams::default()
        };
        assert!(swapped.validate().is_err());
        let no_evals = LineSearchParams {
            max_evals: 0,
            ..LineSearchParams::default()
        };
        assert!(no_evals.validate().is_err());
        let wide = LineSearchParams {
            int: 0.5,
            ..LineSearchParams::default()
        };
        assert!(wide.validate().is_err());
    }
}
