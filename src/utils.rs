//! Shared numeric helpers for the optimizers.

use ndarray::ArrayView1;

use crate::error::{OptimizeError, OptimizeResult};

/// Returns the magnitude of `a` with the sign of `b`.
#[inline]
pub(crate) fn sign_transfer(a: f64, b: f64) -> f64 {
    if b >= 0.0 {
        a.abs()
    } else {
        -a.abs()
    }
}

/// Largest component of `step` relative to the matching component of `point`,
/// with a unit floor on the denominators.
#[inline]
pub(crate) fn max_relative_step(step: ArrayView1<'_, f64>, point: ArrayView1<'_, f64>) -> f64 {
    let mut test = 0.0_f64;
    for (dx, x) in step.iter().zip(point.iter()) {
        let temp = dx.abs() / x.abs().max(1.0);
        if temp > test {
            test = temp;
        }
    }
    test
}

/// Largest gradient component scaled by the matching point component and the
/// current function value, the standard relative-gradient convergence
/// measure.
///
/// Callers must reject non-finite gradients first; a NaN component never
/// raises the maximum, so it would read as converged here.
#[inline]
pub(crate) fn max_relative_gradient(
    gradient: ArrayView1<'_, f64>,
    point: ArrayView1<'_, f64>,
    fval: f64,
) -> f64 {
    let den = fval.abs().max(1.0);
    let mut test = 0.0_f64;
    for (g, x) in gradient.iter().zip(point.iter()) {
        let temp = g.abs() * x.abs().max(1.0) / den;
        if temp > test {
            test = temp;
        }
    }
    test
}

/// Errors unless every gradient component is finite.
#[inline]
pub(crate) fn ensure_finite_gradient(gradient: ArrayView1<'_, f64>) -> OptimizeResult<()> {
    if gradient.iter().any(|g| !g.is_finite()) {
        return Err(OptimizeError::NumericalError {
            message: "gradient is not finite at the evaluated point".to_string(),
        });
    }
    Ok(())
}
