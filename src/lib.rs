//! Nonlinear conjugate-gradient minimization with a Wolfe-Powell line search.
//!
//! This crate implements the long-standing `fmincg` routine: Polak-Ribière
//! conjugate directions combined with a line search that brackets an acceptable
//! step through safeguarded quadratic and cubic interpolation/extrapolation.
//!
//! # Features
//! - Budget counted either in line searches or in objective evaluations, see [`Budget`].
//! - Strong Wolfe-Powell acceptance (`rho = 0.01`, `sig = 0.5`) with steps clamped to the
//!   bracket and finite fallbacks for ill-conditioned polynomial fits.
//! - Rollback to the last accepted point when a line search fails, then one retry along the
//!   steepest-descent direction before giving up.
//! - Never fails on numerical trouble: the best point found so far is always returned, and
//!   [`FmincgSolution::termination`] tells whether the budget ran out or progress stalled.
//! - Optional progress line per accepted step (`Iteration <i> | Cost: <f>`).
//!
//! # Example
//!
//! ```
//! use fmincg::{Budget, Fmincg, FmincgSolution};
//! use ndarray::{array, Array1};
//!
//! // A shifted bowl with its minimum at (3, -1).
//! let bowl = |x: &Array1<f64>| -> (f64, Array1<f64>) {
//!     let f = (x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2);
//!     let g = array![2.0 * (x[0] - 3.0), 2.0 * (x[1] + 1.0)];
//!     (f, g)
//! };
//!
//! let FmincgSolution {
//!     final_point,
//!     final_value,
//!     iterations,
//!     ..
//! } = Fmincg::new(array![0.0, 0.0], bowl)
//!     .with_budget(Budget::Iterations(50))
//!     .run()
//!     .expect("valid configuration");
//!
//! println!("f({}) = {:.3e} after {} line searches", final_point, final_value, iterations);
//! assert!((final_point[0] - 3.0).abs() < 1e-6);
//! assert!((final_point[1] + 1.0).abs() < 1e-6);
//! ```

mod budget;
mod direction;
mod line_search;
mod objective;

pub use budget::Budget;
pub use line_search::{EXT, INT, LineSearchParams, MAX_EVALS, RATIO, RHO, SIG};

use budget::BudgetTracker;
use direction::{next_initial_step, polak_ribiere};
use line_search::{LineSearchOutcome, line_search};
use ndarray::Array1;
use objective::{Evaluation, GradientMismatch, Objective};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The iteration or evaluation budget was used up.
    BudgetExhausted,
    /// Two line searches in a row failed to find an acceptable step.
    Stagnation,
    /// The objective returned a gradient of the wrong length. Only reported
    /// through [`FmincgError::GradientDimensionMismatch`].
    InvalidGradient,
}

/// An error type for clear diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum FmincgError {
    #[error(
        "The objective returned a gradient of length {found} for a point of length {expected}. The last accepted solution is returned."
    )]
    GradientDimensionMismatch {
        expected: usize,
        found: usize,
        /// The last accepted solution. Its value and gradient norm are NaN
        /// when the starting point itself was rejected.
        last_solution: Box<FmincgSolution>,
    },
    #[error("Invalid solver configuration: {reason}.")]
    InvalidConfiguration { reason: &'static str },
}

impl FmincgError {
    /// The best solution known when the error occurred, if any.
    pub fn last_solution(&self) -> Option<&FmincgSolution> {
        match self {
            FmincgError::GradientDimensionMismatch { last_solution, .. } => Some(last_solution),
            FmincgError::InvalidConfiguration { .. } => None,
        }
    }
}

/// A summary of a finished run.
///
/// For non-convex functions the point is a local minimum at best.
#[derive(Debug, Clone)]
pub struct FmincgSolution {
    /// The last accepted point.
    pub final_point: Array1<f64>,
    /// The objective value at `final_point`.
    pub final_value: f64,
    /// The norm of the gradient at `final_point`.
    pub final_gradient_norm: f64,
    /// The number of accepted line searches.
    pub iterations: usize,
    /// The total number of objective evaluations, including the one at the
    /// starting point and those spent in failed line searches.
    pub func_evals: usize,
    /// The objective value after each accepted line search.
    pub cost_history: Vec<f64>,
    pub termination: Termination,
}

fn solution(
    point: Array1<f64>,
    value: f64,
    gradient: &Array1<f64>,
    cost_history: Vec<f64>,
    tracker: &BudgetTracker,
    termination: Termination,
) -> FmincgSolution {
    FmincgSolution {
        final_point: point,
        final_value: value,
        final_gradient_norm: gradient.dot(gradient).sqrt(),
        iterations: cost_history.len(),
        func_evals: tracker.func_evals(),
        cost_history,
        termination,
    }
}

fn mismatch_error(mismatch: GradientMismatch, last_solution: FmincgSolution) -> FmincgError {
    FmincgError::GradientDimensionMismatch {
        expected: mismatch.expected,
        found: mismatch.found,
        last_solution: Box::new(last_solution),
    }
}

/// Configuration of one minimization run.
struct FmincgCore {
    x0: Array1<f64>,
    budget: Budget,
    // Expected cost reduction of the first step; sizes the very first trial step.
    reduction: f64,
    params: LineSearchParams,
    verbose: bool,
}

impl FmincgCore {
    fn new(x0: Array1<f64>) -> Self {
        Self {
            x0,
            budget: Budget::default(),
            reduction: 1.0,
            params: LineSearchParams::default(),
            verbose: false,
        }
    }

    fn validate(&self) -> Result<(), FmincgError> {
        self.params
            .validate()
            .map_err(|reason| FmincgError::InvalidConfiguration { reason })?;
        if !(self.reduction.is_finite() && self.reduction > 0.0) {
            return Err(FmincgError::InvalidConfiguration {
                reason: "expected a finite initial reduction > 0",
            });
        }
        Ok(())
    }

    fn run<ObjFn>(&self, obj_fn: &mut ObjFn) -> Result<FmincgSolution, FmincgError>
    where
        ObjFn: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
    {
        self.validate()?;
        let n = self.x0.len();
        let mut objective = Objective::new(obj_fn, n, BudgetTracker::new(self.budget));

        let mut x_k = self.x0.clone();
        let Evaluation {
            cost: mut f_k,
            gradient: mut g_k,
        } = match objective.eval(&x_k) {
            Ok(evaluation) => evaluation,
            Err(mismatch) => {
                let rejected = FmincgSolution {
                    final_point: x_k,
                    final_value: f64::NAN,
                    final_gradient_norm: f64::NAN,
                    iterations: 0,
                    func_evals: objective.tracker.func_evals(),
                    cost_history: Vec::new(),
                    termination: Termination::InvalidGradient,
                };
                return Err(mismatch_error(mismatch, rejected));
            }
        };

        let mut s = -g_k.clone();
        let mut d1 = -s.dot(&s);
        let mut z1 = self.reduction / (1.0 - d1);
        let mut ls_failed = false;
        let mut cost_history = Vec::new();

        let termination = loop {
            if !objective.tracker.has_remaining() {
                break Termination::BudgetExhausted;
            }
            objective.tracker.record_line_search();

            let outcome = match line_search(&mut objective, &self.params, &x_k, &s, f_k, d1, z1) {
                Ok(outcome) => outcome,
                Err(mismatch) => {
                    let last = solution(
                        x_k,
                        f_k,
                        &g_k,
                        cost_history,
                        &objective.tracker,
                        Termination::InvalidGradient,
                    );
                    return Err(mismatch_error(mismatch, last));
                }
            };

            match outcome {
                LineSearchOutcome::Accepted {
                    point,
                    evaluation,
                    step,
                } => {
                    let Evaluation { cost, gradient } = evaluation;
                    cost_history.push(cost);
                    if self.verbose {
                        println!(
                            "Iteration {} | Cost: {:.15}",
                            objective.tracker.spent(),
                            cost
                        );
                    }
                    log::debug!(
                        "[CG] iter={} f={:.6e} step={:.3e} evals={}",
                        cost_history.len(),
                        cost,
                        step,
                        objective.tracker.func_evals()
                    );

                    let update = polak_ribiere(&s, &g_k, &gradient);
                    if update.restarted {
                        log::warn!("[CG] Non-descent conjugate direction; resetting to -g.");
                    }
                    z1 = next_initial_step(step, d1, update.slope, self.params.ratio);
                    d1 = update.slope;
                    s = update.direction;
                    x_k = point;
                    f_k = cost;
                    g_k = gradient;
                    ls_failed = false;
                }
                LineSearchOutcome::Failed => {
                    // x_k, f_k and g_k still hold the last accepted iterate.
                    if ls_failed {
                        break Termination::Stagnation;
                    }
                    if objective.tracker.overrun() {
                        break Termination::BudgetExhausted;
                    }
                    log::warn!(
                        "[CG] Line search failed at f={:.6e}; retrying along -g from the last accepted point.",
                        f_k
                    );
                    s = -g_k.clone();
                    d1 = -s.dot(&s);
                    z1 = 1.0 / (1.0 - d1);
                    ls_failed = true;
                }
            }
        };

        let sol = solution(
            x_k,
            f_k,
            &g_k,
            cost_history,
            &objective.tracker,
            termination,
        );
        log::info!(
            "[CG] Finished ({:?}): iters={}, f={:.6e}, ||g||={:.3e}, fe={}",
            sol.termination,
            sol.iterations,
            sol.final_value,
            sol.final_gradient_norm,
            sol.func_evals
        );
        Ok(sol)
    }
}

/// A configurable conjugate-gradient solver.
pub struct Fmincg<ObjFn> {
    core: FmincgCore,
    obj_fn: ObjFn,
}

impl<ObjFn> Fmincg<ObjFn>
where
    ObjFn: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    /// Creates a new solver.
    ///
    /// # Arguments
    /// * `x0` - The starting point.
    /// * `obj_fn` - The objective function which returns a tuple `(value, gradient)`.
    pub fn new(x0: Array1<f64>, obj_fn: ObjFn) -> Self {
        Self {
            core: FmincgCore::new(x0),
            obj_fn,
        }
    }

    /// Sets the run budget (default: 100 line searches).
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.core.budget = budget;
        self
    }

    /// Sets the cost reduction expected from the first step (default: 1.0).
    /// The first trial step is `red / (1 + |g0|^2)` along `-g0`.
    pub fn with_initial_reduction(mut self, red: f64) -> Self {
        self.core.reduction = red;
        self
    }

    pub fn with_line_search_params(mut self, params: LineSearchParams) -> Self {
        self.core.params = params;
        self
    }

    /// Prints `Iteration <i> | Cost: <f>` to stdout after every accepted step.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.core.verbose = verbose;
        self
    }

    /// Runs the minimization.
    ///
    /// Budget exhaustion and stalled line searches are not errors; they are
    /// reported through [`FmincgSolution::termination`].
    pub fn run(&mut self) -> Result<FmincgSolution, FmincgError> {
        self.core.run(&mut self.obj_fn)
    }
}

/// Minimizes `obj_fn` from `x0` and returns the best point found.
///
/// This never fails: if the objective breaks its contract, the last accepted
/// point is returned.
pub fn minimize<ObjFn>(obj_fn: ObjFn, x0: Array1<f64>, budget: Budget, verbose: bool) -> Array1<f64>
where
    ObjFn: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    let start = x0.clone();
    let result = Fmincg::new(x0, obj_fn)
        .with_budget(budget)
        .with_verbose(verbose)
        .run();
    match result {
        Ok(sol) => sol.final_point,
        Err(FmincgError::GradientDimensionMismatch { last_solution, .. }) => {
            last_solution.final_point
        }
        Err(err) => {
            log::error!("[CG] {err}");
            start
        }
    }
}
