//! Nelder-Mead downhill simplex minimization.

#![allow(clippy::needless_range_loop)]

use ndarray::{Array1, Array2, Axis};

use crate::error::{OptimizeError, OptimizeResult};
use crate::function::{IterationObserver, IterationReport, MultiObjective};
use crate::minimize::{EvaluationCounter, MultiMinimizeResult};

// Cap on objective evaluations, not outer iterations.
const NMAX: usize = 5000;
// Keeps the spread test meaningful when both values are zero.
const TINY: f64 = 1e-10;

const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Reflects, expands, or contracts the worst vertex through the face
/// spanned by the others, keeping it only on improvement.
fn amotry<F>(
    f: &mut F,
    p: &mut Array2<f64>,
    y: &mut Array1<f64>,
    psum: &mut Array1<f64>,
    ihi: usize,
    fac: f64,
) -> OptimizeResult<f64>
where
    F: MultiObjective,
{
    let ndim = p.ncols();
    let fac1 = (1.0 - fac) / ndim as f64;
    let fac2 = fac1 - fac;
    let mut ptry = Array1::zeros(ndim);
    for j in 0..ndim {
        ptry[j] = psum[j] * fac1 - p[[ihi, j]] * fac2;
    }
    let ytry = f.evaluate(ptry.view())?;
    if ytry < y[ihi] {
        y[ihi] = ytry;
        for j in 0..ndim {
            psum[j] += ptry[j] - p[[ihi, j]];
            p[[ihi, j]] = ptry[j];
        }
    }
    Ok(ytry)
}

fn nelder_mead_loop<F>(
    objective: &mut F,
    initial_simplex: &Array2<f64>,
    tolerance: f64,
    mut observer: Option<&mut IterationObserver>,
) -> OptimizeResult<MultiMinimizeResult>
where
    F: MultiObjective,
{
    let n = initial_simplex.ncols();
    let mpts = initial_simplex.nrows();
    let mut p = initial_simplex.clone();
    let mut counter = EvaluationCounter::new(objective);

    let mut y = Array1::zeros(mpts);
    for i in 0..mpts {
        let value = counter.evaluate(p.row(i))?;
        if !value.is_finite() {
            return Err(OptimizeError::NumericalError {
                message: "objective is not finite at an initial simplex vertex".to_string(),
            });
        }
        y[i] = value;
    }
    let mut psum = p.sum_axis(Axis(0));
    let mut iterations = 0usize;

    loop {
        // Rank the best, worst, and next-worst vertices.
        let mut ilo = 0;
        let (mut ihi, mut inhi) = if y[0] > y[1] { (0, 1) } else { (1, 0) };
        for i in 0..mpts {
            if y[i] <= y[ilo] {
                ilo = i;
            }
            if y[i] > y[ihi] {
                inhi = ihi;
                ihi = i;
            } else if y[i] > y[inhi] && i != ihi {
                inhi = i;
            }
        }

        let rtol = 2.0 * (y[ihi] - y[ilo]).abs() / (y[ihi].abs() + y[ilo].abs() + TINY);
        if rtol < tolerance {
            return Ok(MultiMinimizeResult {
                x: p.row(ilo).to_owned(),
                fun: y[ilo],
                iterations,
                nfev: counter.count,
            });
        }
        if counter.count >= NMAX {
            return Err(OptimizeError::DidNotConverge {
                iterations,
                tolerance,
                context: "nelder_mead".to_string(),
            });
        }
        iterations += 1;

        // Reflect the worst vertex through the opposite face.
        let ytry = amotry(&mut counter, &mut p, &mut y, &mut psum, ihi, -1.0)?;
        if ytry <= y[ilo] {
            // The reflection is the new best point: try doubling it.
            amotry(&mut counter, &mut p, &mut y, &mut psum, ihi, 2.0)?;
        } else if ytry >= y[inhi] {
            // Still the worst: contract toward the face.
            let ysave = y[ihi];
            let ytry = amotry(&mut counter, &mut p, &mut y, &mut psum, ihi, 0.5)?;
            if ytry >= ysave {
                // No improvement at all: shrink everything toward the best.
                for i in 0..mpts {
                    if i != ilo {
                        for j in 0..n {
                            psum[j] = 0.5 * (p[[i, j]] + p[[ilo, j]]);
                            p[[i, j]] = psum[j];
                        }
                        y[i] = counter.evaluate(psum.view())?;
                    }
                }
                psum = p.sum_axis(Axis(0));
            }
        }

        if let Some(observer) = observer.as_deref_mut() {
            observer(IterationReport {
                iteration: iterations,
                max_iterations: None,
            });
        }
    }
}

/// Nelder-Mead downhill simplex minimizer.
///
/// Crawls a simplex of `n + 1` vertices downhill by reflecting,
/// expanding, and contracting its worst vertex, using nothing but
/// function values. Slow but almost indestructible; the usual choice
/// when the objective is noisy or kinked. Stops once the relative
/// spread of vertex values falls below the tolerance, and gives up
/// after 5000 objective evaluations.
pub struct SimplexOptimizer<F> {
    objective: Option<F>,
    simplex: Option<Array2<f64>>,
    tolerance: f64,
    observer: Option<IterationObserver>,
    locked: bool,
    result: Option<MultiMinimizeResult>,
}

impl<F> SimplexOptimizer<F>
where
    F: MultiObjective,
{
    /// Creates an optimizer with no objective or simplex and the default
    /// tolerance.
    pub fn new() -> Self {
        Self {
            objective: None,
            simplex: None,
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

    /// Sets the starting simplex, one vertex per row.
    ///
    /// An `n`-dimensional problem needs `n + 1` rows of length `n`.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    /// * `InvalidParameter` if the shape is not `(n + 1, n)` with `n >= 1`
    pub fn set_simplex(&mut self, simplex: Array2<f64>) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        if simplex.ncols() < 1 || simplex.nrows() != simplex.ncols() + 1 {
            return Err(OptimizeError::InvalidParameter {
                parameter: "simplex".to_string(),
                message: "must have n + 1 rows of length n".to_string(),
            });
        }
        self.simplex = Some(simplex);
        Ok(())
    }

    /// Builds the starting simplex from a start point and one offset per
    /// dimension: vertex `i + 1` moves the start by `deltas[i]` along
    /// axis `i`.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    /// * `InvalidParameter` if the lengths differ, are zero, or any delta
    ///   is zero
    pub fn set_simplex_from_deltas(
        &mut self,
        start_point: Array1<f64>,
        deltas: Array1<f64>,
    ) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        let n = start_point.len();
        if n == 0 || deltas.len() != n {
            return Err(OptimizeError::InvalidParameter {
                parameter: "deltas".to_string(),
                message: "must match the start point in non-zero length".to_string(),
            });
        }
        if deltas.iter().any(|d| *d == 0.0) {
            return Err(OptimizeError::InvalidParameter {
                parameter: "deltas".to_string(),
                message: "must all be non-zero to span the search space".to_string(),
            });
        }
        let mut simplex = Array2::zeros((n + 1, n));
        for i in 0..=n {
            let mut row = simplex.row_mut(i);
            row.assign(&start_point);
            if i > 0 {
                row[i - 1] += deltas[i - 1];
            }
        }
        self.simplex = Some(simplex);
        Ok(())
    }

    /// Sets the relative tolerance on the spread of vertex values.
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

    /// Returns true when both the objective and the simplex are set.
    pub fn is_ready(&self) -> bool {
        self.objective.is_some() && self.simplex.is_some()
    }

    /// Returns true while a computation is in progress.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The starting simplex for the next [`minimize`](Self::minimize) call.
    pub fn simplex(&self) -> Option<&Array2<f64>> {
        self.simplex.as_ref()
    }

    /// The result of the latest [`minimize`](Self::minimize) call; `None`
    /// before the first call and after a failed one.
    pub fn result(&self) -> Option<&MultiMinimizeResult> {
        self.result.as_ref()
    }

    /// Runs the downhill simplex search from the stored starting simplex.
    ///
    /// The stored simplex is left as supplied, so a repeated call starts
    /// over rather than resuming from the collapsed simplex.
    ///
    /// # Returns
    /// The best vertex found, also retrievable through [`result`](Self::result).
    ///
    /// # Errors
    /// * `Locked` if a computation is already in progress
    /// * `NotReady` if the objective or simplex has not been set
    /// * `Evaluation` if the objective fails
    /// * `NumericalError` if the objective is not finite at a starting
    ///   vertex
    /// * `DidNotConverge` after 5000 objective evaluations
    pub fn minimize(&mut self) -> OptimizeResult<MultiMinimizeResult> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.locked = true;
        self.result = None;
        let outcome = match (self.objective.as_mut(), self.simplex.as_ref()) {
            (Some(objective), Some(simplex)) => nelder_mead_loop(
                objective,
                simplex,
                self.tolerance,
                self.observer.as_mut(),
            ),
            (None, _) => Err(OptimizeError::NotReady {
                context: "objective not set".to_string(),
            }),
            (_, None) => Err(OptimizeError::NotReady {
                context: "simplex not set".to_string(),
            }),
        };
        self.locked = false;
        let result = outcome?;
        self.result = Some(result.clone());
        Ok(result)
    }
}

impl<F> Default for SimplexOptimizer<F>
where
    F: MultiObjective,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, ArrayView1};
    use std::cell::Cell;
    use std::rc::Rc;

    fn elliptic(x: ArrayView1<'_, f64>) -> f64 {
        x[0] * x[0] + 4.0 * x[1] * x[1]
    }

    fn rosenbrock(x: ArrayView1<'_, f64>) -> f64 {
        100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
    }

    #[test]
    fn test_simplex_elliptic_from_deltas() {
        let mut optimizer = SimplexOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_simplex_from_deltas(array![5.0, 5.0], array![1.0, 1.0])
            .expect("set_simplex_from_deltas failed");
        let result = optimizer.minimize().expect("minimize failed");
        assert!(result.fun < 1e-6);
        assert!(result.x[0].abs() < 1e-3);
        assert!(result.x[1].abs() < 1e-3);
        assert!(result.nfev <= 5000);
    }

    #[test]
    fn test_simplex_explicit_vertices() {
        let mut optimizer = SimplexOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_simplex(array![[5.0, 5.0], [6.0, 5.0], [5.0, 6.0]])
            .expect("set_simplex failed");
        let result = optimizer.minimize().expect("minimize failed");
        assert!(result.fun < 1e-6);
    }

    #[test]
    fn test_simplex_observer_reports_no_cap() {
        let count = Rc::new(Cell::new(0usize));
        let seen = count.clone();
        let mut optimizer = SimplexOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_simplex_from_deltas(array![5.0, 5.0], array![1.0, 1.0])
            .expect("set_simplex_from_deltas failed");
        optimizer
            .set_iteration_observer(move |report| {
                assert!(report.max_iterations.is_none());
                seen.set(seen.get() + 1);
            })
            .expect("set_iteration_observer failed");
        let result = optimizer.minimize().expect("minimize failed");
        assert_eq!(count.get(), result.iterations);
    }

    #[test]
    fn test_simplex_rosenbrock_with_restart() {
        let mut optimizer = SimplexOptimizer::new();
        optimizer
            .set_objective(rosenbrock)
            .expect("set_objective failed");
        optimizer
            .set_simplex_from_deltas(array![-1.2, 1.0], array![0.5, 0.5])
            .expect("set_simplex_from_deltas failed");
        let first = optimizer.minimize().expect("first minimize failed");

        // Restart from the found minimum with a fresh small simplex to
        // escape any premature collapse.
        optimizer
            .set_simplex_from_deltas(first.x.clone(), array![0.1, 0.1])
            .expect("set_simplex_from_deltas failed");
        let second = optimizer.minimize().expect("second minimize failed");
        assert!(second.fun <= first.fun);
        assert_relative_eq!(second.x[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(second.x[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_simplex_rejects_bad_shapes() {
        let mut optimizer = SimplexOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        assert!(matches!(
            optimizer.set_simplex(Array2::zeros((2, 2))),
            Err(OptimizeError::InvalidParameter { .. })
        ));
        assert!(matches!(
            optimizer.set_simplex_from_deltas(array![1.0, 2.0], array![1.0]),
            Err(OptimizeError::InvalidParameter { .. })
        ));
        assert!(matches!(
            optimizer.set_simplex_from_deltas(array![1.0, 2.0], array![1.0, 0.0]),
            Err(OptimizeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_simplex_from_deltas_layout() {
        let mut optimizer = SimplexOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_simplex_from_deltas(array![1.0, 2.0], array![0.5, -0.5])
            .expect("set_simplex_from_deltas failed");
        let simplex = optimizer.simplex().expect("simplex missing");
        assert_eq!(simplex.row(0).to_vec(), vec![1.0, 2.0]);
        assert_eq!(simplex.row(1).to_vec(), vec![1.5, 2.0]);
        assert_eq!(simplex.row(2).to_vec(), vec![1.0, 1.5]);
    }

    #[test]
    fn test_simplex_not_ready() {
        let mut optimizer = SimplexOptimizer::<fn(ArrayView1<'_, f64>) -> f64>::new();
        assert!(!optimizer.is_ready());
        assert!(matches!(
            optimizer.minimize(),
            Err(OptimizeError::NotReady { .. })
        ));
    }

    #[test]
    fn test_simplex_unbounded_objective_exhausts_budget() {
        let mut optimizer = SimplexOptimizer::new();
        optimizer
            .set_objective(|x: ArrayView1<'_, f64>| x[0])
            .expect("set_objective failed");
        optimizer
            .set_simplex_from_deltas(array![0.0, 0.0], array![1.0, 1.0])
            .expect("set_simplex_from_deltas failed");
        let result = optimizer.minimize();
        assert!(matches!(
            result,
            Err(OptimizeError::DidNotConverge { .. })
        ));
        assert!(!optimizer.is_locked());
    }

    #[test]
    fn test_simplex_reminimize_is_idempotent() {
        let mut optimizer = SimplexOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_simplex_from_deltas(array![5.0, 5.0], array![1.0, 1.0])
            .expect("set_simplex_from_deltas failed");
        let first = optimizer.minimize().expect("first minimize failed");
        let second = optimizer.minimize().expect("second minimize failed");
        assert_eq!(first.iterations, second.iterations);
        assert_eq!(first.nfev, second.nfev);
        assert!((first.fun - second.fun).abs() < 1e-15);
    }

    #[test]
    fn test_simplex_nan_vertex_fails() {
        let mut optimizer = SimplexOptimizer::new();
        optimizer
            .set_objective(|x: ArrayView1<'_, f64>| {
                if x[0] > 5.5 {
                    f64::NAN
                } else {
                    elliptic(x)
                }
            })
            .expect("set_objective failed");
        optimizer
            .set_simplex_from_deltas(array![5.0, 5.0], array![1.0, 1.0])
            .expect("set_simplex_from_deltas failed");
        let result = optimizer.minimize();
        assert!(matches!(result, Err(OptimizeError::NumericalError { .. })));
        assert!(!optimizer.is_locked());
    }
}
