//! Callback interfaces between optimizers and user code.
//!
//! Every optimizer consumes its objective through one of the traits below.
//! Plain closures work out of the box through blanket implementations; types
//! whose evaluation can fail implement the relevant trait directly and return
//! an [`EvaluationError`].

use ndarray::{ArrayView1, ArrayViewMut1};

use crate::error::EvaluationError;

/// Objective callback for one-dimensional minimizers.
///
/// Implemented for any `FnMut(f64) -> f64` closure.
pub trait SingleObjective {
    /// Evaluates the objective at `x`.
    fn evaluate(&mut self, x: f64) -> Result<f64, EvaluationError>;
}

impl<F> SingleObjective for F
where
    F: FnMut(f64) -> f64,
{
    fn evaluate(&mut self, x: f64) -> Result<f64, EvaluationError> {
        Ok(self(x))
    }
}

/// First-derivative callback for the derivative-aware one-dimensional
/// minimizer.
///
/// Implemented for any `FnMut(f64) -> f64` closure.
pub trait SingleDerivative {
    /// Evaluates the derivative of the objective at `x`.
    fn derivative(&mut self, x: f64) -> Result<f64, EvaluationError>;
}

impl<D> SingleDerivative for D
where
    D: FnMut(f64) -> f64,
{
    fn derivative(&mut self, x: f64) -> Result<f64, EvaluationError> {
        Ok(self(x))
    }
}

/// Objective callback for multidimensional optimizers.
///
/// Implemented for any `FnMut(ArrayView1<f64>) -> f64` closure.
pub trait MultiObjective {
    /// Evaluates the objective at `x`.
    fn evaluate(&mut self, x: ArrayView1<'_, f64>) -> Result<f64, EvaluationError>;
}

impl<F> MultiObjective for F
where
    F: FnMut(ArrayView1<'_, f64>) -> f64,
{
    fn evaluate(&mut self, x: ArrayView1<'_, f64>) -> Result<f64, EvaluationError> {
        Ok(self(x))
    }
}

/// Gradient callback for gradient-based optimizers.
///
/// The gradient is written into the caller-provided buffer, which always has
/// the same length as `x`. Implemented for any
/// `FnMut(ArrayView1<f64>, ArrayViewMut1<f64>)` closure; use
/// [`GradientEstimator`](crate::gradient::GradientEstimator) when no
/// closed-form gradient is available.
pub trait Gradient {
    /// Evaluates the gradient of the objective at `x` into `gradient`.
    fn evaluate(
        &mut self,
        x: ArrayView1<'_, f64>,
        gradient: ArrayViewMut1<'_, f64>,
    ) -> Result<(), EvaluationError>;
}

impl<G> Gradient for G
where
    G: FnMut(ArrayView1<'_, f64>, ArrayViewMut1<'_, f64>),
{
    fn evaluate(
        &mut self,
        x: ArrayView1<'_, f64>,
        gradient: ArrayViewMut1<'_, f64>,
    ) -> Result<(), EvaluationError> {
        self(x, gradient);
        Ok(())
    }
}

/// Progress report delivered to an iteration observer after each completed
/// outer iteration.
///
/// The observer receives the report by value and therefore cannot reach back
/// into the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationReport {
    /// Count of completed iterations, starting at 1.
    pub iteration: usize,
    /// Iteration cap of the running algorithm, when it has one. Golden
    /// section and the simplex method iterate without a fixed cycle cap and
    /// report `None`.
    pub max_iterations: Option<usize>,
}

pub(crate) type IterationObserver = Box<dyn FnMut(IterationReport)>;
