//! Adapter around the user's cost/gradient closure.

use crate::budget::BudgetTracker;
use ndarray::Array1;

/// Cost and gradient at one probe point.
#[derive(Debug, Clone)]
pub(crate) struct Evaluation {
    pub(crate) cost: f64,
    pub(crate) gradient: Array1<f64>,
}

/// The objective returned a gradient whose length differs from the point's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GradientMismatch {
    pub(crate) expected: usize,
    pub(crate) found: usize,
}

pub(crate) struct Objective<'a, ObjFn> {
    obj_fn: &'a mut ObjFn,
    dim: usize,
    pub(crate) tracker: BudgetTracker,
}

impl<'a, ObjFn> Objective<'a, ObjFn>
where
    ObjFn: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    pub(crate) fn new(obj_fn: &'a mut ObjFn, dim: usize, tracker: BudgetTracker) -> Self {
        Self {
            obj_fn,
            dim,
            tracker,
        }
    }

    /// Calls the objective once and charges it to the budget.
    pub(crate) fn eval(&mut self, x: &Array1<f64>) -> Result<Evaluation, GradientMismatch> {
        let (cost, gradient) = (self.obj_fn)(x);
        self.tracker.record_evaluation();
        if gradient.len() != self.dim {
            log::error!(
                "[CG] Objective returned a gradient of length {} for a point of length {}.",
                gradient.len(),
                self.dim
            );
            return Err(GradientMismatch {
                expected: self.dim,
                found: gradient.len(),
            });
        }
        Ok(Evaluation { cost, gradient })
    }
}
