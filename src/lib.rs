//! optimr - Local minimization of black-box objectives
//!
//! optimr finds local minima of scalar objectives over one or many
//! variables. It covers the classic derivative-free and gradient-based
//! workhorses: bracketing plus golden-section and Brent's method in one
//! dimension, and Powell, conjugate-gradient, BFGS, and Nelder-Mead in
//! many. Multidimensional points are `ndarray` vectors; objectives and
//! gradients are plain closures or implementations of the callback
//! traits in [`function`].
//!
//! # Modules
//!
//! - [`scalar`] - Bracketing and one-dimensional minimization
//! - [`minimize`] - Multidimensional minimization strategies
//! - [`gradient`] - Finite-difference gradient estimation
//! - [`function`] - Objective, derivative, and gradient callback traits
//! - [`error`] - Error types shared by every optimizer
//!
//! # Choosing a method
//!
//! - Only function values, smooth objective: [`PowellOptimizer`]
//! - Only function values, noisy or kinked objective: [`SimplexOptimizer`]
//! - Gradient available, large `n`: [`ConjugateGradientOptimizer`]
//! - Gradient available, moderate `n`: [`QuasiNewtonOptimizer`]
//! - One variable: [`BrentMinimizer`] (or [`DerivativeBrentMinimizer`]
//!   with a derivative)
//!
//! A [`GradientEstimator`] turns any objective into a finite-difference
//! gradient for the methods that want one.
//!
//! # Example
//!
//! ```ignore
//! use ndarray::{array, ArrayView1};
//! use optimr::{GradientEstimator, QuasiNewtonOptimizer};
//!
//! // Minimize the Rosenbrock function without an analytic gradient.
//! let rosenbrock = |x: ArrayView1<f64>| {
//!     100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
//! };
//!
//! let mut optimizer = QuasiNewtonOptimizer::new();
//! optimizer.set_objective(rosenbrock)?;
//! optimizer.set_gradient(GradientEstimator::new(rosenbrock))?;
//! optimizer.set_start_point(array![-1.2, 1.0])?;
//!
//! let result = optimizer.minimize()?;
//! assert!((result.x[0] - 1.0).abs() < 1e-3);
//! assert!((result.x[1] - 1.0).abs() < 1e-3);
//! ```
//!
//! One-dimensional minimization works the same way, with a bracket in
//! place of a start point:
//!
//! ```ignore
//! use optimr::BrentMinimizer;
//!
//! let mut minimizer = BrentMinimizer::new();
//! minimizer.set_objective(|x: f64| (x - 3.0) * (x - 3.0))?;
//! minimizer.compute_bracket(0.0, 1.0)?;
//! let result = minimizer.minimize()?;
//! assert!((result.x - 3.0).abs() < 1e-6);
//! ```

pub mod error;
pub mod function;
pub mod gradient;
pub mod minimize;
pub mod scalar;
pub(crate) mod utils;

// Re-export main types for convenience
pub use error::{EvaluationError, OptimizeError, OptimizeResult};
pub use function::{Gradient, IterationReport, MultiObjective, SingleDerivative, SingleObjective};
pub use gradient::GradientEstimator;
pub use minimize::{
    ConjugateFormula, ConjugateGradientOptimizer, DerivativeLineMinimizer,
    DirectionalDerivativeEvaluator, DirectionalEvaluator, LineMinimizer, MultiMinimizeResult,
    PowellOptimizer, QuasiNewtonOptimizer, SimplexOptimizer,
};
pub use scalar::{
    Bracket, BrentMinimizer, DerivativeBrentMinimizer, GoldenSectionMinimizer, MinimizeResult,
};
