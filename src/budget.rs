//! Run budgets and the counter that enforces them.

/// How much work a run may spend.
///
/// The classic `fmincg` interface multiplexes both meanings into the sign of
/// one integer; [`Budget::from_signed`] converts from that form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Counts outer line searches. At most this many steps are accepted.
    Iterations(usize),
    /// Counts raw calls to the objective, including the call at the starting
    /// point and calls made inside line searches that later fail.
    Evaluations(usize),
}

impl Budget {
    /// Positive values count iterations, negative values count evaluations.
    pub fn from_signed(length: i64) -> Self {
        if length < 0 {
            Budget::Evaluations(length.unsigned_abs() as usize)
        } else {
            Budget::Iterations(length as usize)
        }
    }

    /// The absolute limit regardless of what is being counted.
    pub fn limit(self) -> usize {
        match self {
            Budget::Iterations(n) | Budget::Evaluations(n) => n,
        }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Budget::Iterations(100)
    }
}

/// Tracks spending against a [`Budget`] over one run.
#[derive(Debug)]
pub(crate) struct BudgetTracker {
    budget: Budget,
    spent: usize,
    func_evals: usize,
}

impl BudgetTracker {
    pub(crate) fn new(budget: Budget) -> Self {
        Self {
            budget,
            spent: 0,
            func_evals: 0,
        }
    }

    pub(crate) fn record_evaluation(&mut self) {
        self.func_evals += 1;
        if let Budget::Evaluations(_) = self.budget {
            self.spent += 1;
        }
    }

    pub(crate) fn record_line_search(&mut self) {
        if let Budget::Iterations(_) = self.budget {
            self.spent += 1;
        }
    }

    pub(crate) fn has_remaining(&self) -> bool {
        self.spent < self.budget.limit()
    }

    pub(crate) fn overrun(&self) -> bool {
        self.spent > self.budget.limit()
    }

    /// Evaluations one line search may spend after its first probe.
    pub(crate) fn line_search_allowance(&self, max_evals: usize) -> usize {
        match self.budget {
            Budget::Iterations(_) => max_evals,
            Budget::Evaluations(limit) => max_evals.min(limit.saturating_sub(self.spent)),
        }
    }

    pub(crate) fn spent(&self) -> usize {
        self.spent
    }

    pub(crate) fn func_evals(&self) -> usize {
        self.func_evals
    }
}
