//! Multidimensional minimization.
//!
//! Local minimization of a scalar objective over `R^n`, with and without
//! gradient information.
//!
//! # Modules
//!
//! - [`line_search`] - Minimization of an objective along a ray
//! - [`powell`] - Powell's direction-set method (no gradients)
//! - [`conjugate_gradient`] - Fletcher-Reeves and Polak-Ribiere conjugate
//!   gradients
//! - [`quasi_newton`] - BFGS with a backtracking line search
//! - [`simplex`] - Nelder-Mead downhill simplex (no gradients)
//!
//! # Quick Start
//!
//! ```ignore
//! use ndarray::{array, ArrayView1};
//! use optimr::minimize::PowellOptimizer;
//!
//! let mut optimizer = PowellOptimizer::new();
//! optimizer.set_objective(|x: ArrayView1<f64>| {
//!     x[0] * x[0] + 4.0 * x[1] * x[1]
//! })?;
//! optimizer.set_start_point(array![5.0, 5.0])?;
//! let result = optimizer.minimize()?;
//! assert!(result.fun < 1e-12);
//! ```
//!
//! With an analytic gradient:
//!
//! ```ignore
//! use ndarray::{array, ArrayView1, ArrayViewMut1};
//! use optimr::minimize::QuasiNewtonOptimizer;
//!
//! let mut optimizer = QuasiNewtonOptimizer::new();
//! optimizer.set_objective(|x: ArrayView1<f64>| {
//!     x[0] * x[0] + 4.0 * x[1] * x[1]
//! })?;
//! optimizer.set_gradient(|x: ArrayView1<f64>, mut g: ArrayViewMut1<f64>| {
//!     g[0] = 2.0 * x[0];
//!     g[1] = 8.0 * x[1];
//! })?;
//! optimizer.set_start_point(array![5.0, 5.0])?;
//! let result = optimizer.minimize()?;
//! ```

use ndarray::{Array1, ArrayView1};

use crate::error::EvaluationError;
use crate::function::MultiObjective;

pub mod conjugate_gradient;
pub mod line_search;
pub mod powell;
pub mod quasi_newton;
pub mod simplex;

pub use conjugate_gradient::{ConjugateFormula, ConjugateGradientOptimizer};
pub use line_search::{
    DerivativeLineMinimizer, DirectionalDerivativeEvaluator, DirectionalEvaluator, LineMinimizer,
};
pub use powell::PowellOptimizer;
pub use quasi_newton::QuasiNewtonOptimizer;
pub use simplex::SimplexOptimizer;

/// Result of a multidimensional minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiMinimizeResult {
    /// Location of the minimum.
    pub x: Array1<f64>,
    /// Objective value at the minimum.
    pub fun: f64,
    /// Outer iterations performed.
    pub iterations: usize,
    /// Objective evaluations performed.
    pub nfev: usize,
}

/// Counts objective evaluations flowing through nested searches.
pub(crate) struct EvaluationCounter<'a, F> {
    inner: &'a mut F,
    pub(crate) count: usize,
}

impl<'a, F> EvaluationCounter<'a, F> {
    pub(crate) fn new(inner: &'a mut F) -> Self {
        Self { inner, count: 0 }
    }
}

impl<F> MultiObjective for EvaluationCounter<'_, F>
where
    F: MultiObjective,
{
    fn evaluate(&mut self, x: ArrayView1<'_, f64>) -> Result<f64, EvaluationError> {
        self.count += 1;
        self.inner.evaluate(x)
    }
}
