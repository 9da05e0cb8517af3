//! Finite-difference gradient estimation.
//!
//! [`GradientEstimator`] adapts a plain objective to the [`Gradient`]
//! interface, letting the gradient-based optimizers run on objectives without
//! a closed-form derivative.

use ndarray::{Array1, ArrayView1, ArrayViewMut1};

use crate::error::EvaluationError;
use crate::function::{Gradient, MultiObjective};

// Machine-epsilon-like step constant; the per-component step is
// EPS * max(|x[i]|, 1).
const EPS: f64 = 1e-8;

/// Finite-difference approximation of a gradient.
///
/// Wraps its own copy of the objective and implements [`Gradient`] with
/// central differences, `g[i] = (f(x + h*e_i) - f(x - h*e_i)) / (2*h)`, or
/// forward differences when built with [`GradientEstimator::forward`].
///
/// # Note
/// Central differences cost two evaluations per component but are accurate to
/// `O(h^2)`; forward differences cost `n + 1` evaluations in total and are
/// accurate to `O(h)`.
pub struct GradientEstimator<F> {
    objective: F,
    central: bool,
}

impl<F: MultiObjective> GradientEstimator<F> {
    /// Creates a central-difference estimator for `objective`.
    pub fn new(objective: F) -> Self {
        Self {
            objective,
            central: true,
        }
    }

    /// Creates a forward-difference estimator for `objective`.
    pub fn forward(objective: F) -> Self {
        Self {
            objective,
            central: false,
        }
    }
}

impl<F: MultiObjective> Gradient for GradientEstimator<F> {
    fn evaluate(
        &mut self,
        x: ArrayView1<'_, f64>,
        mut gradient: ArrayViewMut1<'_, f64>,
    ) -> Result<(), EvaluationError> {
        let mut perturbed: Array1<f64> = x.to_owned();
        let f_base = if self.central {
            0.0
        } else {
            self.objective.evaluate(x)?
        };

        for i in 0..x.len() {
            let x_orig = perturbed[i];
            let h = EPS * x_orig.abs().max(1.0);

            if self.central {
                perturbed[i] = x_orig + h;
                let f_plus = self.objective.evaluate(perturbed.view())?;
                perturbed[i] = x_orig - h;
                let f_minus = self.objective.evaluate(perturbed.view())?;
                gradient[i] = (f_plus - f_minus) / (2.0 * h);
            } else {
                perturbed[i] = x_orig + h;
                let f_plus = self.objective.evaluate(perturbed.view())?;
                gradient[i] = (f_plus - f_base) / h;
            }

            perturbed[i] = x_orig;
        }

        Ok(())
    }
}
