//! Golden-section search for a bracketed minimum.

use crate::error::{OptimizeError, OptimizeResult};
use crate::function::{IterationObserver, IterationReport, SingleObjective};
use crate::scalar::bracket::Bracket;
use crate::scalar::MinimizeResult;

// Golden section ratios: each step keeps R of the interval and probes at C.
const R: f64 = 0.618_033_99;
const C: f64 = 1.0 - R;

const DEFAULT_TOLERANCE: f64 = 1e-8;

fn golden_minimize<F>(
    f: &mut F,
    bracket: &Bracket,
    tolerance: f64,
    mut observer: Option<&mut IterationObserver>,
) -> OptimizeResult<MinimizeResult>
where
    F: SingleObjective,
{
    let mut x0 = bracket.a();
    let mut x3 = bracket.c();
    let bx = bracket.b();

    // Put the first probe inside the larger of the two segments.
    let (mut x1, mut x2) = if (x3 - bx).abs() > (bx - x0).abs() {
        (bx, bx + C * (x3 - bx))
    } else {
        (bx - C * (bx - x0), bx)
    };
    let mut f1 = f.evaluate(x1)?;
    let mut f2 = f.evaluate(x2)?;
    if !f1.is_finite() || !f2.is_finite() {
        return Err(OptimizeError::NumericalError {
            message: "objective is not finite inside the bracket".to_string(),
        });
    }

    let mut iterations = 0;
    while (x3 - x0).abs() > tolerance * (x1.abs() + x2.abs()) {
        iterations += 1;
        if f2 < f1 {
            // Keep (x1, x3), probe beyond x2.
            x0 = x1;
            x1 = x2;
            x2 = R * x1 + C * x3;
            f1 = f2;
            f2 = f.evaluate(x2)?;
        } else {
            // Keep (x0, x2), probe below x1.
            x3 = x2;
            x2 = x1;
            x1 = R * x2 + C * x0;
            f2 = f1;
            f1 = f.evaluate(x1)?;
        }
        if let Some(observer) = observer.as_deref_mut() {
            observer(IterationReport {
                iteration: iterations,
                max_iterations: None,
            });
        }
    }

    let (x_min, f_min) = if f1 < f2 { (x1, f1) } else { (x2, f2) };
    if !f_min.is_finite() {
        return Err(OptimizeError::NumericalError {
            message: "objective is not finite at the located minimum".to_string(),
        });
    }
    Ok(MinimizeResult {
        x: x_min,
        f_min,
        iterations,
        bracket_width: (x3 - x0).abs(),
    })
}

/// Golden-section minimizer for a univariate objective.
///
/// Shrinks a bracket by a fixed ratio each iteration, using only function
/// values. Convergence is linear, so [`BrentMinimizer`](crate::scalar::BrentMinimizer)
/// is usually preferable; golden-section is the robust fallback when the
/// objective is too rough for parabolic interpolation.
///
/// The search stops once the bracket width drops below
/// `tolerance * (|x1| + |x2|)` for the two interior probes, with no
/// iteration cap.
pub struct GoldenSectionMinimizer<F> {
    objective: Option<F>,
    bracket: Bracket,
    tolerance: f64,
    observer: Option<IterationObserver>,
    locked: bool,
    result: Option<MinimizeResult>,
}

impl<F> GoldenSectionMinimizer<F>
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

    /// Sets the relative tolerance on the bracket width.
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

    /// Runs the golden-section search over the stored bracket.
    ///
    /// # Returns
    /// The located minimum, also retrievable through [`result`](Self::result).
    ///
    /// # Errors
    /// * `Locked` if a computation is already in progress
    /// * `NotReady` if no objective has been set
    /// * `Evaluation` if the objective fails
    /// * `NumericalError` if the objective is not finite in the bracket
    pub fn minimize(&mut self) -> OptimizeResult<MinimizeResult> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.locked = true;
        self.result = None;
        let outcome = match self.objective.as_mut() {
            Some(objective) => golden_minimize(
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

impl<F> Default for GoldenSectionMinimizer<F>
where
    F: SingleObjective,
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

    #[test]
    fn test_golden_shifted_parabola() {
        let mut minimizer = GoldenSectionMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        minimizer
            .compute_bracket(0.0, 1.0)
            .expect("compute_bracket failed");
        let result = minimizer.minimize().expect("minimize failed");
        assert!((result.x - 3.0).abs() < 1e-6);
        assert!(result.f_min < 1e-10);
        assert!(result.iterations > 0);
    }

    #[test]
    fn test_golden_explicit_bracket() {
        let mut minimizer = GoldenSectionMinimizer::new();
        minimizer
            .set_objective(|x: f64| x.cos())
            .expect("set_objective failed");
        minimizer
            .set_bracket(Bracket::new(2.0, 3.0, 4.0).expect("bracket construction failed"))
            .expect("set_bracket failed");
        let result = minimizer.minimize().expect("minimize failed");
        assert!((result.x - std::f64::consts::PI).abs() < 1e-6);
        assert!((result.f_min + 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_golden_not_ready() {
        let mut minimizer = GoldenSectionMinimizer::<fn(f64) -> f64>::new();
        assert!(!minimizer.is_ready());
        let result = minimizer.minimize();
        assert!(matches!(result, Err(OptimizeError::NotReady { .. })));
    }

    #[test]
    fn test_golden_rejects_bad_tolerance() {
        let mut minimizer = GoldenSectionMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        assert!(matches!(
            minimizer.set_tolerance(-1e-3),
            Err(OptimizeError::InvalidParameter { .. })
        ));
        assert!(matches!(
            minimizer.set_tolerance(f64::NAN),
            Err(OptimizeError::InvalidParameter { .. })
        ));
        assert!(minimizer.set_tolerance(1e-6).is_ok());
    }

    #[test]
    fn test_golden_result_cached_and_unlocked() {
        let mut minimizer = GoldenSectionMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        minimizer
            .compute_bracket(0.0, 1.0)
            .expect("compute_bracket failed");
        assert!(minimizer.result().is_none());
        let result = minimizer.minimize().expect("minimize failed");
        assert_eq!(minimizer.result(), Some(&result));
        assert!(!minimizer.is_locked());
    }

    #[test]
    fn test_golden_reminimize_is_idempotent() {
        let mut minimizer = GoldenSectionMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        minimizer
            .compute_bracket(0.0, 1.0)
            .expect("compute_bracket failed");
        let first = minimizer.minimize().expect("first minimize failed");
        let second = minimizer.minimize().expect("second minimize failed");
        assert!((first.x - second.x).abs() < 1e-12);
        assert!((first.f_min - second.f_min).abs() < 1e-12);
    }

    #[test]
    fn test_golden_observer_sees_every_iteration() {
        let count = Rc::new(Cell::new(0usize));
        let seen = count.clone();
        let mut minimizer = GoldenSectionMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        minimizer
            .compute_bracket(0.0, 1.0)
            .expect("compute_bracket failed");
        minimizer
            .set_iteration_observer(move |report| {
                assert_eq!(report.iteration, seen.get() + 1);
                assert!(report.max_iterations.is_none());
                seen.set(report.iteration);
            })
            .expect("set_iteration_observer failed");
        let result = minimizer.minimize().expect("minimize failed");
        assert_eq!(count.get(), result.iterations);
    }

    #[test]
    fn test_golden_result_cleared_after_failed_run() {
        let mut minimizer = GoldenSectionMinimizer::<fn(f64) -> f64>::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        minimizer
            .compute_bracket(0.0, 1.0)
            .expect("compute_bracket failed");
        minimizer.minimize().expect("minimize failed");
        assert!(minimizer.result().is_some());

        minimizer
            .set_objective(|_x: f64| f64::NAN)
            .expect("set_objective failed");
        assert!(minimizer.minimize().is_err());
        assert!(minimizer.result().is_none());
    }

    #[test]
    fn test_golden_failed_evaluation_unlocks() {
        let mut minimizer = GoldenSectionMinimizer::new();
        minimizer
            .set_objective(|_x: f64| f64::NAN)
            .expect("set_objective failed");
        minimizer
            .set_bracket(Bracket::new(0.0, 1.0, 2.0).expect("bracket construction failed"))
            .expect("set_bracket failed");
        let result = minimizer.minimize();
        assert!(matches!(result, Err(OptimizeError::NumericalError { .. })));
        assert!(!minimizer.is_locked());
        assert!(minimizer.result().is_none());
    }

    #[test]
    fn test_golden_default_bracket_overflow_fails() {
        // The untouched full-range bracket puts the first interior point
        // far enough out that the parabola overflows.
        let mut minimizer = GoldenSectionMinimizer::new();
        minimizer
            .set_objective(shifted_parabola)
            .expect("set_objective failed");
        let result = minimizer.minimize();
        assert!(matches!(result, Err(OptimizeError::NumericalError { .. })));
        assert!(!minimizer.is_locked());
    }
}
