//! Brent's method for a bracketed minimum.

use crate::error::{OptimizeError, OptimizeResult};
use crate::function::{IterationObserver, IterationReport, SingleObjective};
use crate::scalar::bracket::Bracket;
use crate::scalar::MinimizeResult;
use crate::utils::sign_transfer;

const ITMAX: usize = 100;
// Golden-section fallback ratio.
const CGOLD: f64 = 0.381_966_0;
// Protects tol1 when the minimum sits at exactly zero.
const ZEPS: f64 = 1e-10;

const DEFAULT_TOLERANCE: f64 = 1e-8;

pub(crate) fn brent_minimize<F>(
    f: &mut F,
    bracket: &Bracket,
    tolerance: f64,
    mut observer: Option<&mut IterationObserver>,
) -> OptimizeResult<MinimizeResult>
where
    F: SingleObjective,
{
    let mut a = bracket.a().min(bracket.c());
    let mut b = bracket.a().max(bracket.c());
    let mut x = bracket.b();
    let mut w = x;
    let mut v = x;
    let mut fx = f.evaluate(x)?;
    if !fx.is_finite() {
        return Err(OptimizeError::NumericalError {
            message: "objective is not finite inside the bracket".to_string(),
        });
    }
    let mut fw = fx;
    let mut fv = fx;

    // d is the latest step, e the one before it.
    let mut d = 0.0_f64;
    let mut e = 0.0_f64;

    for iteration in 1..=ITMAX {
        let xm = 0.5 * (a + b);
        let tol1 = tolerance * x.abs() + ZEPS;
        let tol2 = 2.0 * tol1;
        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            return Ok(MinimizeResult {
                x,
                f_min: fx,
                iterations: iteration - 1,
                bracket_width: b - a,
            });
        }

        if e.abs() > tol1 {
            // Parabolic fit through x, v, w.
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let etemp = e;
            e = d;
            if p.abs() >= (0.5 * q * etemp).abs() || p <= q * (a - x) || p >= q * (b - x) {
                // Fit rejected: golden-section step into the larger segment.
                e = if x >= xm { a - x } else { b - x };
                d = CGOLD * e;
            } else {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = sign_transfer(tol1, xm - x);
                }
            }
        } else {
            e = if x >= xm { a - x } else { b - x };
            d = CGOLD * e;
        }

        // Never step by less than tol1.
        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + sign_transfer(tol1, d)
        };
        let fu = f.evaluate(u)?;

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            w = x;
            x = u;
            fv = fw;
            fw = fx;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                w = u;
                fv = fw;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }

        if let Some(observer) = observer.as_deref_mut() {
            observer(IterationReport {
                iteration,
                max_iterations: Some(ITMAX),
            });
        }
    }

    Err(OptimizeError::DidNotConverge {
        iterations: ITMAX,
        tolerance,
        context: "brent".to_string(),
    })
}

/// Brent's minimizer for a univariate objective.
///
/// Combines parabolic interpolation through the three best points with
/// golden-section fallback steps, so well-behaved objectives converge
/// superlinearly while rough ones still make golden-section progress.
/// Uses function values only; see
/// [`DerivativeBrentMinimizer`](crate::scalar::DerivativeBrentMinimizer)
/// when the derivative is available.
pub struct BrentMinimizer<F> {
    objective: Option<F>,
    bracket: Bracket,
    tolerance: f64,
    observer: Option<IterationObserver>,
    locked: bool,
    result: Option<MinimizeResult>,
}

impl<F> BrentMinimizer<F>
where
    F: SingleObjective,
{
    /// Creates a minimizer with no objective, the full-range default
    /// bracket, and the default tolerance.
    pub fn new() -> Self {
        Self {
            objective: None,
            bracket: Bracket::default(),
            tolerance: DEFAULT_TOLERANCE,
            observer: None,
            locked: false,
            result: None,
        }
    }

    /// Sets the objective to minimize.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    pub fn set_objective(&mut self, objective: F) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.objective = Some(objective);
        Ok(())
    }

    /// Sets the bracket to search within.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    pub fn set_bracket(&mut self, bracket: Bracket) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.bracket = bracket;
        Ok(())
    }

    /// Locates a bracket by searching downhill from the given pair and
    /// stores it for the next [`minimize`](Self::minimize) call.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    /// * `NotReady` if no objective has been set
    /// * Any error raised by [`Bracket::find`]
    pub fn compute_bracket(&mut self, min_point: f64, middle_point: f64) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.locked = true;
        let outcome = match self.objective.as_mut() {
            Some(objective) => Bracket::find(objective, min_point, middle_point),
            None => Err(OptimizeError::NotReady {
                context: "objective not set".to_string(),
            }),
        };
        self.locked = false;
        self.bracket = outcome?;
        Ok(())
    }

    /// Locates a bracket from the default full-range evaluation points.
    ///
    /// # Errors
    /// Same as [`compute_bracket`](Self::compute_bracket).
    pub fn compute_default_bracket(&mut self) -> OptimizeResult<()> {
        self.compute_bracket(
            crate::scalar::bracket::DEFAULT_MIN_EVAL_POINT,
            crate::scalar::bracket::DEFAULT_MIDDLE_EVAL_POINT,
        )
    }

    /// Sets the relative tolerance on the minimizer position.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    /// * `InvalidParameter` if the tolerance is negative or not finite
    pub fn set_tolerance(&mut self, tolerance: f64) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(OptimizeError::InvalidParameter {
                parameter: "tolerance".to_string(),
                message: "must be finite and non-negative".to_string(),
            });
        }
        self.tolerance = tolerance;
        Ok(())
    }

    /// Installs an observer invoked after every completed iteration.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    pub fn set_iteration_observer<O>(&mut self, observer: O) -> OptimizeResult<()>
    where
        O: FnMut(IterationReport) + 'static,
    {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.observer = Some(Box::new(observer));
        Ok(())
    }

    /// Returns true when an objective has been set.
    pub fn is_ready(&self) -> bool {
        self.objective.is_some()
    }

    /// Returns true while a computation is in progress.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The bracket the next [`minimize`](Self::minimize) call will search.
    pub fn bracket(&self) -> &Bracket {
        &self.bracket
    }

    /// The result of the latest [`minimize`](Self::minimize) call; `None`
    /// before the first call and after a failed one.
    pub fn result(&self) -> Option<&MinimizeResult> {
        self.result.as_ref()
    }

    /// Runs Brent's method over the stored bracket.
    ///
    /// # Returns
    /// The located minimum, also retrievable through [`result`](Self::result).
    ///
    /// # Errors
    /// * `Locked` if a computation is already in progress
    /// * `NotReady` if no objective has been set
    /// * `Evaluation` if the objective fails
    /// * `NumericalError` if the objective is not finite in the bracket
    /// * `DidNotConverge` after 100 iterations
    pub fn minimize(&mut self) -> OptimizeResult<MinimizeResult> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.locked = true;
        self.result = None;
        let outcome = match self.objective.as_mut() {
            Some(objective) => brent_minimize(
                objective,
                &self.bracket,
                self.tolerance,
                self.observer.as_mut(),
            ),
            None => Err(OptimizeError::NotReady {
                context: "objective not set".to_string(),
            }),
        };
        self.locked = false;
        let result = outcome?;
        self.result = Some(result.clone());
        Ok(result)
    }
}

impl<F> Default for BrentMinimizer<F>
where
    F: SingleObjective,
{
    fn default() -> Self {
        Self::new()
    }
}
