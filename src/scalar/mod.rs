//! Univariate (1D) minimization.
//!
//! This module provides bracketing of a one-dimensional minimum and three
//! minimizers that refine a bracket.
//!
//! # Modules
//!
//! - [`bracket`] - Locating a triplet `(a, b, c)` that contains a minimum
//! - [`golden`] - Golden-section search (derivative-free, linear convergence)
//! - [`brent`] - Brent's method (parabolic interpolation with golden fallback)
//! - [`dbrent`] - Brent's method using the first derivative

pub mod bracket;
pub mod brent;
pub mod dbrent;
pub mod golden;

pub use bracket::Bracket;
pub use brent::BrentMinimizer;
pub use dbrent::DerivativeBrentMinimizer;
pub use golden::GoldenSectionMinimizer;

pub(crate) use brent::brent_minimize;
pub(crate) use dbrent::dbrent_minimize;

/// Result of a one-dimensional minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeResult {
    /// Abscissa of the located minimum.
    pub x: f64,
    /// Function value at `x`.
    pub f_min: f64,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Width of the bracketing interval at termination.
    pub bracket_width: f64,
}
