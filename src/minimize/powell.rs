//! Powell's direction-set method.

use ndarray::{Array1, Array2};

use crate::error::{OptimizeError, OptimizeResult};
use crate::function::{IterationObserver, IterationReport, MultiObjective};
use crate::minimize::line_search::LineMinimizer;
use crate::minimize::{EvaluationCounter, MultiMinimizeResult};

const ITMAX: usize = 200;
// Keeps the convergence test meaningful when both values are zero.
const TINY: f64 = 1e-20;

const DEFAULT_TOLERANCE: f64 = 1e-8;

fn powell_loop<F>(
    objective: &mut F,
    start: &Array1<f64>,
    directions: &mut Array2<f64>,
    tolerance: f64,
    mut observer: Option<&mut IterationObserver>,
) -> OptimizeResult<MultiMinimizeResult>
where
    F: MultiObjective,
{
    let n = start.len();
    let mut counter = EvaluationCounter::new(objective);
    let mut p = start.clone();
    let mut fret = counter.evaluate(p.view())?;
    if !fret.is_finite() {
        return Err(OptimizeError::NumericalError {
            message: "objective is not finite at the start point".to_string(),
        });
    }
    let mut previous_point = p.clone();
    let line_minimizer = LineMinimizer::new();

    for iteration in 1..=ITMAX {
        let f_start = fret;
        let mut max_decrease = 0.0;
        let mut max_decrease_idx = 0;

        // One line minimization per direction, remembering the best one.
        for i in 0..n {
            let mut direction = directions.column(i).to_owned();
            let f_before = fret;
            fret = line_minimizer.minimize_along(&mut counter, &mut p, &mut direction)?;
            if f_before - fret > max_decrease {
                max_decrease = f_before - fret;
                max_decrease_idx = i;
            }
        }

        if let Some(observer) = observer.as_deref_mut() {
            observer(IterationReport {
                iteration,
                max_iterations: Some(ITMAX),
            });
        }

        if 2.0 * (f_start - fret) <= tolerance * (f_start.abs() + fret.abs()) + TINY {
            return Ok(MultiMinimizeResult {
                x: p,
                fun: fret,
                iterations: iteration,
                nfev: counter.count,
            });
        }
        if iteration == ITMAX {
            break;
        }

        // Probe the point mirrored through the cycle's total displacement.
        let extrapolated = &p * 2.0 - &previous_point;
        let mut average_direction = &p - &previous_point;
        previous_point.assign(&p);
        let f_extrapolated = counter.evaluate(extrapolated.view())?;

        if f_extrapolated < f_start {
            let t = 2.0 * (f_start - 2.0 * fret + f_extrapolated)
                * (f_start - fret - max_decrease).powi(2)
                - max_decrease * (f_start - f_extrapolated).powi(2);
            if t < 0.0 {
                // The averaged direction is worth keeping: minimize along it
                // and let it replace the direction of largest decrease. When
                // the test fails the old set is kept unchanged for the next
                // cycle.
                fret =
                    line_minimizer.minimize_along(&mut counter, &mut p, &mut average_direction)?;
                directions
                    .column_mut(max_decrease_idx)
                    .assign(&average_direction);
            }
        }
    }

    Err(OptimizeError::DidNotConverge {
        iterations: ITMAX,
        tolerance,
        context: "powell".to_string(),
    })
}

/// Powell's direction-set minimizer.
///
/// Minimizes an objective without derivatives by cycling line
/// minimizations over a set of `n` directions, then folding the cycle's
/// total displacement back into the set when a quadratic-decrease
/// heuristic says it will not degenerate the set. The direction matrix
/// survives across [`minimize`](Self::minimize) calls, so a warm restart
/// continues from the adapted set.
pub struct PowellOptimizer<F> {
    objective: Option<F>,
    start_point: Option<Array1<f64>>,
    directions: Option<Array2<f64>>,
    tolerance: f64,
    observer: Option<IterationObserver>,
    locked: bool,
    result: Option<MultiMinimizeResult>,
}

impl<F> PowellOptimizer<F>
where
    F: MultiObjective,
{
    /// Creates an optimizer with no objective or start point and the
    /// default tolerance.
    pub fn new() -> Self {
        Self {
            objective: None,
            start_point: None,
            directions: None,
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

    /// Sets the point the next minimization starts from.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    /// * `InvalidParameter` if the point is empty
    pub fn set_start_point(&mut self, start_point: Array1<f64>) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        if start_point.is_empty() {
            return Err(OptimizeError::InvalidParameter {
                parameter: "start_point".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        self.start_point = Some(start_point);
        Ok(())
    }

    /// Sets the direction matrix, one search direction per column.
    ///
    /// A matrix whose shape does not match the start point is replaced by
    /// the identity when [`minimize`](Self::minimize) runs.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    pub fn set_directions(&mut self, directions: Array2<f64>) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.directions = Some(directions);
        Ok(())
    }

    /// Sets the relative tolerance on the per-cycle function decrease.
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

    /// Installs an observer invoked after every completed outer cycle.
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

    /// Returns true when both the objective and the start point are set.
    pub fn is_ready(&self) -> bool {
        self.objective.is_some() && self.start_point.is_some()
    }

    /// Returns true while a computation is in progress.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The current direction set, if one has been set or built.
    pub fn directions(&self) -> Option<&Array2<f64>> {
        self.directions.as_ref()
    }

    /// The result of the latest [`minimize`](Self::minimize) call; `None`
    /// before the first call and after a failed one.
    pub fn result(&self) -> Option<&MultiMinimizeResult> {
        self.result.as_ref()
    }

    /// Runs Powell's method from the stored start point.
    ///
    /// The adapted direction set is kept on the instance afterwards, on
    /// both success and failure.
    ///
    /// # Returns
    /// The located minimum, also retrievable through [`result`](Self::result).
    ///
    /// # Errors
    /// * `Locked` if a computation is already in progress
    /// * `NotReady` if the objective or start point has not been set
    /// * `Evaluation` if the objective fails
    /// * `NumericalError` if the objective is not finite at the start
    /// * `DidNotConverge` after 200 cycles
    pub fn minimize(&mut self) -> OptimizeResult<MultiMinimizeResult> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.locked = true;
        self.result = None;
        let outcome = match (self.objective.as_mut(), self.start_point.as_ref()) {
            (Some(objective), Some(start)) => {
                let n = start.len();
                let mut directions = match self.directions.take() {
                    Some(directions) if directions.nrows() == n && directions.ncols() == n => {
                        directions
                    }
                    _ => Array2::eye(n),
                };
                let outcome = powell_loop(
                    objective,
                    start,
                    &mut directions,
                    self.tolerance,
                    self.observer.as_mut(),
                );
                self.directions = Some(directions);
                outcome
            }
            (None, _) => Err(OptimizeError::NotReady {
                context: "objective not set".to_string(),
            }),
            (_, None) => Err(OptimizeError::NotReady {
                context: "start point not set".to_string(),
            }),
        };
        self.locked = false;
        let result = outcome?;
        self.result = Some(result.clone());
        Ok(result)
    }
}

impl<F> Default for PowellOptimizer<F>
where
    F: MultiObjective,
{
    fn default() -> Self {
        Self::new()
    }
}
