//! Bracketing of a one-dimensional minimum.

use crate::error::{OptimizeError, OptimizeResult};
use crate::function::SingleObjective;
use crate::utils::sign_transfer;

/// Default left evaluation point for [`Bracket::find_default`].
pub const DEFAULT_MIN_EVAL_POINT: f64 = -f64::MAX;
/// Default right evaluation point for [`Bracket::find_default`].
pub const DEFAULT_MIDDLE_EVAL_POINT: f64 = f64::MAX;

// Golden-ratio magnification applied when stepping downhill.
const GOLD: f64 = 1.618034;
// Cap on how far a parabolic step may overshoot the current triplet.
const GLIMIT: f64 = 100.0;
// Floor for the parabolic-fit denominator.
const TINY: f64 = 1e-20;

/// A triplet `a <= b <= c` certifying that a minimum lies within `[a, c]`.
///
/// A bracket is either supplied directly through [`Bracket::new`], with no
/// function values attached, or located by [`Bracket::find`], which walks
/// downhill from a starting pair and caches the three function values it
/// ends on. Once evaluated, `f(b) <= f(a)` and `f(b) <= f(c)` hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    a: f64,
    b: f64,
    c: f64,
    evaluations: Option<(f64, f64, f64)>,
}

impl Bracket {
    /// Creates a bracket from endpoints without evaluating the function.
    ///
    /// # Errors
    /// * `InvalidBracket` unless `a <= b <= c`
    pub fn new(a: f64, b: f64, c: f64) -> OptimizeResult<Self> {
        if !(a <= b && b <= c) {
            return Err(OptimizeError::InvalidBracket { a, b, c });
        }
        Ok(Self {
            a,
            b,
            c,
            evaluations: None,
        })
    }

    /// Searches downhill from `(min_point, middle_point)` for a bracket.
    ///
    /// Evaluates the objective at both points, swaps them if the slope runs
    /// uphill, and extrapolates a third point by golden-ratio steps. Each
    /// round fits a parabola through the current triplet to propose a trial
    /// point, falling back to a fixed magnification (capped at `GLIMIT`
    /// times the current gap) when the fit is useless, until `f(b)` is no
    /// larger than the values at both ends.
    ///
    /// # Arguments
    /// * `f` - Objective to bracket
    /// * `min_point` - First starting abscissa
    /// * `middle_point` - Second starting abscissa, at least `min_point`
    ///
    /// # Returns
    /// A bracket with its three function values cached.
    ///
    /// # Errors
    /// * `InvalidParameter` if `middle_point < min_point`
    /// * `Evaluation` if the objective fails
    /// * `NumericalError` if non-finite objective values or overflowed
    ///   abscissas leave no valid triplet
    pub fn find<F>(f: &mut F, min_point: f64, middle_point: f64) -> OptimizeResult<Self>
    where
        F: SingleObjective,
    {
        if !(min_point <= middle_point) {
            return Err(OptimizeError::InvalidParameter {
                parameter: "middle_point".to_string(),
                message: "must not be less than min_point".to_string(),
            });
        }

        let mut ax = min_point;
        let mut bx = middle_point;
        let mut fa = f.evaluate(ax)?;
        let mut fb = f.evaluate(bx)?;

        // Walk downhill from a to b.
        if fb > fa {
            std::mem::swap(&mut ax, &mut bx);
            std::mem::swap(&mut fa, &mut fb);
        }
        let mut cx = bx + GOLD * (bx - ax);
        let mut fc = f.evaluate(cx)?;

        while fb > fc {
            // Parabolic extrapolation through (a, b, c).
            let r = (bx - ax) * (fb - fc);
            let q = (bx - cx) * (fb - fa);
            let mut u = bx
                - ((bx - cx) * q - (bx - ax) * r)
                    / (2.0 * sign_transfer((q - r).abs().max(TINY), q - r));
            let ulim = bx + GLIMIT * (cx - bx);
            let mut fu;

            if (bx - u) * (u - cx) > 0.0 {
                // Trial point lies between b and c.
                fu = f.evaluate(u)?;
                if fu < fc {
                    // Minimum between b and c.
                    ax = bx;
                    fa = fb;
                    bx = u;
                    fb = fu;
                    break;
                } else if fu > fb {
                    // Minimum between a and u.
                    cx = u;
                    fc = fu;
                    break;
                }
                // Parabolic fit was no help; magnify downhill instead.
                u = cx + GOLD * (cx - bx);
                fu = f.evaluate(u)?;
            } else if (cx - u) * (u - ulim) > 0.0 {
                // Trial point between c and the extrapolation limit.
                fu = f.evaluate(u)?;
                if fu < fc {
                    bx = cx;
                    cx = u;
                    u = cx + GOLD * (cx - bx);
                    fb = fc;
                    fc = fu;
                    fu = f.evaluate(u)?;
                }
            } else if (u - ulim) * (ulim - cx) >= 0.0 {
                // Trial point beyond the limit: cap it.
                u = ulim;
                fu = f.evaluate(u)?;
            } else {
                // Reject the parabolic step; magnify downhill.
                u = cx + GOLD * (cx - bx);
                fu = f.evaluate(u)?;
            }

            // Slide the triplet forward.
            ax = bx;
            bx = cx;
            cx = u;
            fa = fb;
            fb = fc;
            fc = fu;
        }

        // The downhill walk may have run right to left.
        if ax > cx {
            std::mem::swap(&mut ax, &mut cx);
            std::mem::swap(&mut fa, &mut fc);
        }
        // Endpoint values may be infinite (a barrier wall still brackets),
        // but the abscissas and the candidate minimum value must be finite.
        if !(ax.is_finite() && cx.is_finite() && fb.is_finite())
            || !(fb <= fa && fb <= fc)
            || !(ax <= bx && bx <= cx)
        {
            return Err(OptimizeError::NumericalError {
                message: "bracket search produced a non-finite or unordered triplet".to_string(),
            });
        }

        Ok(Self {
            a: ax,
            b: bx,
            c: cx,
            evaluations: Some((fa, fb, fc)),
        })
    }

    /// Searches for a bracket from the default evaluation points covering
    /// the representable range.
    ///
    /// # Errors
    /// Same as [`Bracket::find`].
    pub fn find_default<F>(f: &mut F) -> OptimizeResult<Self>
    where
        F: SingleObjective,
    {
        Self::find(f, DEFAULT_MIN_EVAL_POINT, DEFAULT_MIDDLE_EVAL_POINT)
    }

    /// Left endpoint.
    pub fn a(&self) -> f64 {
        self.a
    }

    /// Middle point.
    pub fn b(&self) -> f64 {
        self.b
    }

    /// Right endpoint.
    pub fn c(&self) -> f64 {
        self.c
    }

    /// Cached function values `(f(a), f(b), f(c))`, present once the bracket
    /// was located by [`Bracket::find`].
    pub fn evaluations(&self) -> Option<(f64, f64, f64)> {
        self.evaluations
    }
}

impl Default for Bracket {
    /// The degenerate full-range bracket used before any point is supplied.
    fn default() -> Self {
        Self {
            a: DEFAULT_MIN_EVAL_POINT,
            b: 0.0,
            c: DEFAULT_MIDDLE_EVAL_POINT,
            evaluations: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shifted_parabola(x: f64) -> f64 {
        (x - 3.0) * (x - 3.0)
    }

    fn assert_valid(bracket: &Bracket, f: fn(f64) -> f64) {
        assert!(bracket.a() <= bracket.b() && bracket.b() <= bracket.c());
        let (fa, fb, fc) = bracket.evaluations().expect("evaluations missing");
        assert!(fb <= fa && fb <= fc);
        assert!((fa - f(bracket.a())).abs() < 1e-12);
        assert!((fb - f(bracket.b())).abs() < 1e-12);
        assert!((fc - f(bracket.c())).abs() < 1e-12);
    }

    #[test]
    fn test_find_downhill_pair() {
        let bracket =
            Bracket::find(&mut shifted_parabola, 0.0, 1.0).expect("bracket search failed");
        assert_valid(&bracket, shifted_parabola);
        assert!(bracket.a() <= 3.0 && 3.0 <= bracket.c());
    }

    #[test]
    fn test_find_uphill_pair_swaps() {
        // f decreases toward 3, so starting left of it uphill forces a swap.
        let bracket =
            Bracket::find(&mut shifted_parabola, -1.0, 0.0).expect("bracket search failed");
        assert_valid(&bracket, shifted_parabola);
        assert!(bracket.a() <= 3.0 && 3.0 <= bracket.c());
    }

    #[test]
    fn test_find_far_start() {
        let bracket =
            Bracket::find(&mut shifted_parabola, -50.0, -49.0).expect("bracket search failed");
        assert_valid(&bracket, shifted_parabola);
        assert!(bracket.a() <= 3.0 && 3.0 <= bracket.c());
    }

    #[test]
    fn test_find_cosine() {
        let mut f = |x: f64| x.cos();
        let bracket = Bracket::find(&mut f, 2.0, 2.5).expect("bracket search failed");
        assert!(bracket.a() <= std::f64::consts::PI && std::f64::consts::PI <= bracket.c());
        let (fa, fb, fc) = bracket.evaluations().expect("evaluations missing");
        assert!(fb <= fa && fb <= fc);
    }

    #[test]
    fn test_new_rejects_unordered_endpoints() {
        let result = Bracket::new(2.0, 1.0, 3.0);
        assert!(matches!(result, Err(OptimizeError::InvalidBracket { .. })));
    }

    #[test]
    fn test_new_has_no_evaluations() {
        let bracket = Bracket::new(0.0, 1.0, 2.0).expect("bracket construction failed");
        assert!(bracket.evaluations().is_none());
    }

    #[test]
    fn test_find_rejects_reversed_pair() {
        let result = Bracket::find(&mut shifted_parabola, 1.0, 0.0);
        assert!(matches!(
            result,
            Err(OptimizeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_find_nan_objective_fails() {
        let result = Bracket::find(&mut |_x: f64| f64::NAN, 0.0, 1.0);
        assert!(matches!(
            result,
            Err(OptimizeError::NumericalError { .. })
        ));
    }

    #[test]
    fn test_find_default_overflow_fails() {
        // Evaluating at the representable-range endpoints overflows any
        // objective with a genuine minimum, so the triplet is rejected.
        let result = Bracket::find_default(&mut shifted_parabola);
        assert!(matches!(
            result,
            Err(OptimizeError::NumericalError { .. })
        ));
    }
}
