//! Polak-Ribière direction update.

use ndarray::Array1;

/// Guard against dividing by a slope of exactly zero.
const SLOPE_EPS: f64 = 1e-15;

pub(crate) struct ConjugateStep {
    pub(crate) direction: Array1<f64>,
    /// `direction · g_new`, negative unless the gradient vanished.
    pub(crate) slope: f64,
    pub(crate) restarted: bool,
}

/// Computes the next search direction from the gradient change along `s`.
///
/// Falls back to steepest descent whenever the conjugate direction is not a
/// descent direction.
pub(crate) fn polak_ribiere(
    s: &Array1<f64>,
    g_old: &Array1<f64>,
    g_new: &Array1<f64>,
) -> ConjugateStep {
    let beta = (g_new.dot(g_new) - g_old.dot(g_new)) / g_old.dot(g_old);
    let direction = s * beta - g_new;
    let slope = g_new.dot(&direction);
    if slope >= 0.0 || slope.is_nan() {
        let direction = -g_new.clone();
        let slope = -direction.dot(&direction);
        return ConjugateStep {
            direction,
            slope,
            restarted: true,
        };
    }
    ConjugateStep {
        direction,
        slope,
        restarted: false,
    }
}

/// Scales the accepted step into the first trial step of the next line search.
pub(crate) fn next_initial_step(step: f64, d_old: f64, d_new: f64, ratio: f64) -> f64 {
    step * ratio.min(d_old / (d_new - SLOPE_EPS))
}
