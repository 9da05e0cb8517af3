//! Brent's method using first-derivative information.

use crate::error::{OptimizeError, OptimizeResult};
use crate::function::{IterationObserver, IterationReport, SingleDerivative, SingleObjective};
use crate::scalar::bracket::Bracket;
use crate::scalar::MinimizeResult;
use crate::utils::sign_transfer;

const ITMAX: usize = 100;
// Protects tol1 when the minimum sits at exactly zero.
const ZEPS: f64 = 1e-10;

const DEFAULT_TOLERANCE: f64 = 1e-8;

pub(crate) fn dbrent_minimize<F, D>(
    f: &mut F,
    df: &mut D,
    bracket: &Bracket,
    tolerance: f64,
    mut observer: Option<&mut IterationObserver>,
) -> OptimizeResult<MinimizeResult>
where
    F: SingleObjective,
    D: SingleDerivative,
{
    let mut a = bracket.a().min(bracket.c());
    let mut b = bracket.a().max(bracket.c());
    let mut x = bracket.b();
    let mut w = x;
    let mut v = x;
    let mut fx = f.evaluate(x)?;
    let mut dx = df.derivative(x)?;
    if !fx.is_finite() || !dx.is_finite() {
        return Err(OptimizeError::NumericalError {
            message: "objective or derivative is not finite inside the bracket".to_string(),
        });
    }
    let mut fw = fx;
    let mut fv = fx;
    let mut dw = dx;
    let mut dv = dx;

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
            // Secant extrapolations of the derivative through w and v.
            let mut d1 = 2.0 * (b - a);
            let mut d2 = d1;
            if dw != dx {
                d1 = (w - x) * dx / (dx - dw);
            }
            if dv != dx {
                d2 = (v - x) * dx / (dx - dv);
            }
            // A step is usable when it stays in the bracket and points
            // against the local slope.
            let u1 = x + d1;
            let u2 = x + d2;
            let ok1 = (a - u1) * (u1 - b) > 0.0 && dx * d1 <= 0.0;
            let ok2 = (a - u2) * (u2 - b) > 0.0 && dx * d2 <= 0.0;
            let olde = e;
            e = d;
            if ok1 || ok2 {
                d = if ok1 && ok2 {
                    if d1.abs() < d2.abs() {
                        d1
                    } else {
                        d2
                    }
                } else if ok1 {
                    d1
                } else {
                    d2
                };
                if d.abs() <= (0.5 * olde).abs() {
                    let u = x + d;
                    if u - a < tol2 || b - u < tol2 {
                        d = sign_transfer(tol1, xm - x);
                    }
                } else {
                    // Secant steps stopped shrinking: bisect the segment
                    // the derivative points away from.
                    e = if dx >= 0.0 { a - x } else { b - x };
                    d = 0.5 * e;
                }
            } else {
                e = if dx >= 0.0 { a - x } else { b - x };
                d = 0.5 * e;
            }
        } else {
            e = if dx >= 0.0 { a - x } else { b - x };
            d = 0.5 * e;
        }

        let u;
        let fu;
        if d.abs() >= tol1 {
            u = x + d;
            fu = f.evaluate(u)?;
        } else {
            u = x + sign_transfer(tol1, d);
            fu = f.evaluate(u)?;
            if fu > fx {
                // The smallest allowed step goes uphill, so x is the minimum.
                if let Some(observer) = observer.as_deref_mut() {
                    observer(IterationReport {
                        iteration,
                        max_iterations: Some(ITMAX),
                    });
                }
                return Ok(MinimizeResult {
                    x,
                    f_min: fx,
                    iterations: iteration,
                    bracket_width: b - a,
                });
            }
        }
        let du = df.derivative(u)?;

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            fv = fw;
            dv = dw;
            w = x;
            fw = fx;
            dw = dx;
            x = u;
            fx = fu;
            dx = du;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                dv = dw;
                w = u;
                fw = fu;
                dw = du;
            } else if fu < fv || v == x || v == w {
                v = u;
                fv = fu;
                dv = du;
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
        context: "dbrent".to_string(),
    })
}

/// Brent-style minimizer that uses the objective's first derivative.
///
/// The sign of the derivative tells which half of the bracket holds the
/// minimum, and secant steps on the derivative replace the parabolic fit
/// of the value-only method. Worth using when the derivative is cheap
/// relative to the objective.
pub struct DerivativeBrentMinimizer<F, D> {
    objective: Option<F>,
    derivative: Option<D>,
    bracket: Bracket,
    tolerance: f64,
    observer: Option<IterationObserver>,
    locked: bool,
    result: Option<MinimizeResult>,
}

impl<F, D> DerivativeBrentMinimizer<F, D>
where
    F: SingleObjective,
    D: SingleDerivative,
{
    /// Creates a minimizer with no objective or derivative, the full-range
    /// default bracket, and the default tolerance.
    pub fn new() -> Self {
        Self {
            objective: None,
            derivative: None,
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

    /// Sets the derivative of the objective.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    pub fn set_derivative(&mut self, derivative: D) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.derivative = Some(derivative);
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
    /// Only the objective is evaluated; the derivative is not needed here.
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

    /// Returns true when both the objective and its derivative are set.
    pub fn is_ready(&self) -> bool {
        self.objective.is_some() && self.derivative.is_some()
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

    /// Runs the derivative-aware Brent method over the stored bracket.
    ///
    /// # Returns
    /// The located minimum, also retrievable through [`result`](Self::result).
    ///
    /// # Errors
    /// * `Locked` if a computation is already in progress
    /// * `NotReady` if the objective or derivative has not been set
    /// * `Evaluation` if either callback fails
    /// * `NumericalError` if a callback is not finite in the bracket
    /// * `DidNotConverge` after 100 iterations
    pub fn minimize(&mut self) -> OptimizeResult<MinimizeResult> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.locked = true;
        self.result = None;
        let outcome = match (self.objective.as_mut(), self.derivative.as_mut()) {
            (Some(objective), Some(derivative)) => dbrent_minimize(
                objective,
                derivative,
                &self.bracket,
                self.tolerance,
                self.observer.as_mut(),
            ),
            (None, _) => Err(OptimizeError::NotReady {
                context: "objective not set".to_string(),
            }),
            (_, None) => Err(OptimizeError::NotReady {
                context: "derivative not set".to_string(),
            }),
        };
        self.locked = false;
        let result = outcome?;
        self.result = Some(result.clone());
        Ok(result)
    }
}

impl<F, D> Default for DerivativeBrentMinimizer<F, D>
where
    F: SingleObjective,
    D: SingleDerivative,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn shifted_parabola(x: f64) -> f64 {
        (x - 3.0) * (x - 3.0)
    }

    fn shifted_parabola_derivative(x: f64) -> f64 {
        2.0 * (x - 3.0)
    }

    #[test]
    fn test_dbrent_shifted_parabola() {
        let mut minimizer = DerivativeBrentMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        minimizer
            .set_derivative(shifted_parabola_derivative)
            .expect("set_derivative failed");
        minimizer
            .compute_bracket(0.0, 1.0)
            .expect("compute_bracket failed");
        let result = minimizer.minimize().expect("minimize failed");
        assert!((result.x - 3.0).abs() < 1e-6);
        assert!(result.f_min < 1e-12);
    }

    #[test]
    fn test_dbrent_cosine() {
        let mut minimizer = DerivativeBrentMinimizer::new();
        minimizer
            .set_objective(|x: f64| x.cos())
            .expect("set_objective failed");
        minimizer
            .set_derivative(|x: f64| -x.sin())
            .expect("set_derivative failed");
        minimizer
            .set_bracket(Bracket::new(2.0, 3.0, 4.0).expect("bracket construction failed"))
            .expect("set_bracket failed");
        let result = minimizer.minimize().expect("minimize failed");
        assert!((result.x - std::f64::consts::PI).abs() < 1e-7);
        assert!((result.f_min + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dbrent_requires_derivative() {
        let mut minimizer =
            DerivativeBrentMinimizer::<fn(f64) -> f64, fn(f64) -> f64>::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        assert!(!minimizer.is_ready());
        let result = minimizer.minimize();
        assert!(matches!(result, Err(OptimizeError::NotReady { .. })));
    }

    #[test]
    fn test_dbrent_reminimize_is_idempotent() {
        let mut minimizer = DerivativeBrentMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        minimizer
            .set_derivative(shifted_parabola_derivative)
            .expect("set_derivative failed");
        minimizer
            .compute_bracket(0.0, 1.0)
            .expect("compute_bracket failed");
        let first = minimizer.minimize().expect("first minimize failed");
        let second = minimizer.minimize().expect("second minimize failed");
        assert!((first.x - second.x).abs() < 1e-12);
    }

    #[test]
    fn test_dbrent_observer_counts_iterations() {
        let count = Rc::new(Cell::new(0usize));
        let seen = count.clone();
        let mut minimizer = DerivativeBrentMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        minimizer
            .set_derivative(shifted_parabola_derivative)
            .expect("set_derivative failed");
        minimizer
            .compute_bracket(0.0, 1.0)
            .expect("compute_bracket failed");
        minimizer
            .set_iteration_observer(move |report| {
                assert_eq!(report.max_iterations, Some(100));
                seen.set(seen.get() + 1);
            })
            .expect("set_iteration_observer failed");
        let result = minimizer.minimize().expect("minimize failed");
        assert_eq!(count.get(), result.iterations);
    }

    #[test]
    fn test_dbrent_non_finite_derivative_fails() {
        let mut minimizer = DerivativeBrentMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        minimizer
            .set_derivative(|_x: f64| f64::NAN)
            .expect("set_derivative failed");
        minimizer
            .set_bracket(Bracket::new(0.0, 1.0, 5.0).expect("bracket construction failed"))
            .expect("set_bracket failed");
        let result = minimizer.minimize();
        assert!(matches!(result, Err(OptimizeError::NumericalError { .. })));
        assert!(!minimizer.is_locked());
    }

    #[test]
    fn test_dbrent_default_bracket_secant_recovers() {
        // Even from the untouched full-range bracket, bisection pulls the
        // interval down until a secant step lands on the minimum.
        let mut minimizer = DerivativeBrentMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        minimizer
            .set_derivative(shifted_parabola_derivative)
            .expect("set_derivative failed");
        let result = minimizer.minimize().expect("minimize failed");
        assert!((result.x - 3.0).abs() < 1e-6);
        assert!(result.f_min < 1e-12);
        assert!(result.iterations <= 10);
    }
}
