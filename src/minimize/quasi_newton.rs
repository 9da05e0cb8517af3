//! BFGS quasi-Newton minimization.

#![allow(clippy::needless_range_loop)]

use ndarray::{Array1, Array2};

use crate::error::{OptimizeError, OptimizeResult};
use crate::function::{Gradient, IterationObserver, IterationReport, MultiObjective};
use crate::minimize::{EvaluationCounter, MultiMinimizeResult};
use crate::utils::{ensure_finite_gradient, max_relative_gradient, max_relative_step};

const ITMAX: usize = 200;
const EPS: f64 = 3e-8;
// Convergence threshold on the relative step size.
const TOLX: f64 = 4.0 * EPS;
// Scale factor for the maximum line-search step length.
const STPMX: f64 = 100.0;
// Sufficient-decrease fraction for the backtracking line search.
const ALF: f64 = 1e-4;
// Smallest relative step the line search will attempt.
const LINE_TOLX: f64 = 1e-12;

const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Backtracking line search with quadratic, then cubic, step models.
///
/// Accepts the first step satisfying the sufficient-decrease condition
/// `f(x) <= fold + ALF * alam * slope`. Returns the old point and value
/// unchanged when the step underflows `alamin`, leaving the caller's
/// step-size test to decide whether that is convergence.
fn lnsrch<F>(
    f: &mut F,
    xold: &Array1<f64>,
    fold: f64,
    g: &Array1<f64>,
    direction: &mut Array1<f64>,
    stpmax: f64,
) -> OptimizeResult<(Array1<f64>, f64)>
where
    F: MultiObjective,
{
    let length = direction.dot(direction).sqrt();
    if length > stpmax {
        *direction *= stpmax / length;
    }
    let slope = g.dot(direction);
    if !slope.is_finite() {
        return Err(OptimizeError::NumericalError {
            message: "line-search slope is not finite".to_string(),
        });
    }
    if slope >= 0.0 {
        return Err(OptimizeError::NonDescentDirection { slope });
    }

    let test = max_relative_step(direction.view(), xold.view());
    let alamin = LINE_TOLX / test;
    let mut alam = 1.0_f64;
    let mut alam2 = 0.0_f64;
    let mut f2 = 0.0_f64;
    let mut x = Array1::zeros(xold.len());

    loop {
        x.assign(xold);
        x.scaled_add(alam, direction);
        let fnew = f.evaluate(x.view())?;

        if alam < alamin {
            return Ok((xold.clone(), fold));
        }
        if !fnew.is_finite() {
            return Err(OptimizeError::NumericalError {
                message: "objective is not finite along the search direction".to_string(),
            });
        }
        if fnew <= fold + ALF * alam * slope {
            return Ok((x, fnew));
        }

        let tmplam = if alam == 1.0 {
            // First backtrack: minimize the quadratic model.
            -slope / (2.0 * (fnew - fold - slope))
        } else {
            // Later backtracks: minimize the cubic through the two most
            // recent trials.
            let rhs1 = fnew - fold - alam * slope;
            let rhs2 = f2 - fold - alam2 * slope;
            let a = (rhs1 / (alam * alam) - rhs2 / (alam2 * alam2)) / (alam - alam2);
            let b =
                (-alam2 * rhs1 / (alam * alam) + alam * rhs2 / (alam2 * alam2)) / (alam - alam2);
            let mut t = if a == 0.0 {
                -slope / (2.0 * b)
            } else {
                let disc = b * b - 3.0 * a * slope;
                if disc < 0.0 {
                    0.5 * alam
                } else if b <= 0.0 {
                    (-b + disc.sqrt()) / (3.0 * a)
                } else {
                    -slope / (b + disc.sqrt())
                }
            };
            if t > 0.5 * alam {
                t = 0.5 * alam;
            }
            t
        };
        alam2 = alam;
        f2 = fnew;
        alam = tmplam.max(0.1 * alam);
    }
}

fn quasi_newton_loop<F, G>(
    objective: &mut F,
    gradient: &mut G,
    start: &Array1<f64>,
    tolerance: f64,
    mut observer: Option<&mut IterationObserver>,
) -> OptimizeResult<MultiMinimizeResult>
where
    F: MultiObjective,
    G: Gradient,
{
    let n = start.len();
    let mut counter = EvaluationCounter::new(objective);
    let mut p = start.clone();
    let mut fp = counter.evaluate(p.view())?;
    if !fp.is_finite() {
        return Err(OptimizeError::NumericalError {
            message: "objective is not finite at the start point".to_string(),
        });
    }
    let mut g = Array1::zeros(n);
    gradient.evaluate(p.view(), g.view_mut())?;
    ensure_finite_gradient(g.view())?;

    let mut hessin: Array2<f64> = Array2::eye(n);
    let mut xi = g.mapv(|v| -v);
    let mut dg = Array1::zeros(n);
    let stpmax = STPMX * p.dot(&p).sqrt().max(n as f64);

    for iteration in 1..=ITMAX {
        let (pnew, fret) = lnsrch(&mut counter, &p, fp, &g, &mut xi, stpmax)?;
        fp = fret;
        xi = &pnew - &p;
        p = pnew;

        if let Some(observer) = observer.as_deref_mut() {
            observer(IterationReport {
                iteration,
                max_iterations: Some(ITMAX),
            });
        }

        if max_relative_step(xi.view(), p.view()) < TOLX {
            return Ok(MultiMinimizeResult {
                x: p,
                fun: fp,
                iterations: iteration,
                nfev: counter.count,
            });
        }

        dg.assign(&g);
        gradient.evaluate(p.view(), g.view_mut())?;
        ensure_finite_gradient(g.view())?;
        if max_relative_gradient(g.view(), p.view(), fp) < tolerance {
            return Ok(MultiMinimizeResult {
                x: p,
                fun: fp,
                iterations: iteration,
                nfev: counter.count,
            });
        }

        dg = &g - &dg;
        let hdg = hessin.dot(&dg);

        let fac = dg.dot(&xi);
        let fae = dg.dot(&hdg);
        let sumdg = dg.dot(&dg);
        let sumxi = xi.dot(&xi);

        // Update only when the curvature is safely positive, so the
        // approximation stays positive-definite.
        if fac > (EPS * sumdg * sumxi).sqrt() {
            let fac = 1.0 / fac;
            let fad = 1.0 / fae;
            for i in 0..n {
                dg[i] = fac * xi[i] - fad * hdg[i];
            }
            for i in 0..n {
                for j in i..n {
                    let update =
                        fac * xi[i] * xi[j] - fad * hdg[i] * hdg[j] + fae * dg[i] * dg[j];
                    hessin[[i, j]] += update;
                    hessin[[j, i]] = hessin[[i, j]];
                }
            }
        }
        xi = -hessin.dot(&g);
    }

    Err(OptimizeError::DidNotConverge {
        iterations: ITMAX,
        tolerance,
        context: "quasi_newton".to_string(),
    })
}

/// BFGS quasi-Newton minimizer.
///
/// Maintains an approximation to the inverse Hessian, built up from
/// gradient differences, and steps toward the Newton point through a
/// safeguarded backtracking line search. Converges superlinearly near
/// the minimum at the cost of O(n^2) storage for the approximation.
pub struct QuasiNewtonOptimizer<F, G> {
    objective: Option<F>,
    gradient: Option<G>,
    start_point: Option<Array1<f64>>,
    tolerance: f64,
    observer: Option<IterationObserver>,
    locked: bool,
    result: Option<MultiMinimizeResult>,
}

impl<F, G> QuasiNewtonOptimizer<F, G>
where
    F: MultiObjective,
    G: Gradient,
{
    /// Creates an optimizer with no objective, gradient, or start point
    /// and the default tolerance.
    pub fn new() -> Self {
        Self {
            objective: None,
            gradient: None,
            start_point: None,
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

    /// Sets the gradient of the objective.
    ///
    /// Use a [`GradientEstimator`](crate::gradient::GradientEstimator) when
    /// no closed form is available.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    pub fn set_gradient(&mut self, gradient: G) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.gradient = Some(gradient);
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

    /// Sets the threshold on the relative gradient magnitude.
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

    /// Returns true when the objective, gradient, and start point are set.
    pub fn is_ready(&self) -> bool {
        self.objective.is_some() && self.gradient.is_some() && self.start_point.is_some()
    }

    /// Returns true while a computation is in progress.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The result of the latest [`minimize`](Self::minimize) call; `None`
    /// before the first call and after a failed one.
    pub fn result(&self) -> Option<&MultiMinimizeResult> {
        self.result.as_ref()
    }

    /// Runs the BFGS iteration from the stored start point.
    ///
    /// Stops when either the relative step size or the relative gradient
    /// magnitude drops below its threshold.
    ///
    /// # Returns
    /// The located minimum, also retrievable through [`result`](Self::result).
    ///
    /// # Errors
    /// * `Locked` if a computation is already in progress
    /// * `NotReady` if the objective, gradient, or start point is missing
    /// * `Evaluation` if a callback fails
    /// * `NonDescentDirection` if the proposed direction does not point
    ///   downhill, which signals a broken gradient or Hessian approximation
    /// * `NumericalError` if a callback is not finite where evaluated
    /// * `DidNotConverge` after 200 iterations
    pub fn minimize(&mut self) -> OptimizeResult<MultiMinimizeResult> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.locked = true;
        self.result = None;
        let outcome = match (
            self.objective.as_mut(),
            self.gradient.as_mut(),
            self.start_point.as_ref(),
        ) {
            (Some(objective), Some(gradient), Some(start)) => quasi_newton_loop(
                objective,
                gradient,
                start,
                self.tolerance,
                self.observer.as_mut(),
            ),
            (None, _, _) => Err(OptimizeError::NotReady {
                context: "objective not set".to_string(),
            }),
            (_, None, _) => Err(OptimizeError::NotReady {
                context: "gradient not set".to_string(),
            }),
            (_, _, None) => Err(OptimizeError::NotReady {
                context: "start point not set".to_string(),
            }),
        };
        self.locked = false;
        let result = outcome?;
        self.result = Some(result.clone());
        Ok(result)
    }
}

impl<F, G> Default for QuasiNewtonOptimizer<F, G>
where
    F: MultiObjective,
    G: Gradient,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::GradientEstimator;
    use approx::assert_relative_eq;
    use ndarray::{array, ArrayView1, ArrayViewMut1};

    fn elliptic(x: ArrayView1<'_, f64>) -> f64 {
        x[0] * x[0] + 4.0 * x[1] * x[1]
    }

    fn elliptic_gradient(x: ArrayView1<'_, f64>, mut g: ArrayViewMut1<'_, f64>) {
        g[0] = 2.0 * x[0];
        g[1] = 8.0 * x[1];
    }

    fn rosenbrock(x: ArrayView1<'_, f64>) -> f64 {
        100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
    }

    fn rosenbrock_gradient(x: ArrayView1<'_, f64>, mut g: ArrayViewMut1<'_, f64>) {
        g[0] = -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]);
        g[1] = 200.0 * (x[1] - x[0] * x[0]);
    }

    #[test]
    fn test_bfgs_elliptic() {
        let mut optimizer = QuasiNewtonOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_gradient(elliptic_gradient)
            .expect("set_gradient failed");
        optimizer
            .set_start_point(array![5.0, 5.0])
            .expect("set_start_point failed");
        let result = optimizer.minimize().expect("minimize failed");
        assert!(result.fun < 1e-6);
        assert!(result.x[0].abs() < 1e-3);
        assert!(result.x[1].abs() < 1e-3);
    }

    #[test]
    fn test_bfgs_rosenbrock() {
        let mut optimizer = QuasiNewtonOptimizer::new();
        optimizer
            .set_objective(rosenbrock)
            .expect("set_objective failed");
        optimizer
            .set_gradient(rosenbrock_gradient)
            .expect("set_gradient failed");
        optimizer
            .set_start_point(array![-1.2, 1.0])
            .expect("set_start_point failed");
        let result = optimizer.minimize().expect("minimize failed");
        assert!(result.fun < 1e-6);
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(result.x[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_bfgs_estimated_gradient() {
        let mut optimizer = QuasiNewtonOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_gradient(GradientEstimator::new(elliptic))
            .expect("set_gradient failed");
        optimizer
            .set_start_point(array![5.0, 5.0])
            .expect("set_start_point failed");
        let result = optimizer.minimize().expect("minimize failed");
        assert!(result.fun < 1e-6);
        assert!(result.x[0].abs() < 1e-3);
    }

    #[test]
    fn test_bfgs_zero_gradient_is_non_descent() {
        let mut optimizer = QuasiNewtonOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_gradient(|_x: ArrayView1<'_, f64>, mut g: ArrayViewMut1<'_, f64>| {
                g.fill(0.0);
            })
            .expect("set_gradient failed");
        optimizer
            .set_start_point(array![5.0, 5.0])
            .expect("set_start_point failed");
        let result = optimizer.minimize();
        assert!(matches!(
            result,
            Err(OptimizeError::NonDescentDirection { .. })
        ));
        assert!(!optimizer.is_locked());
    }

    #[test]
    fn test_bfgs_nan_region_fails() {
        let mut optimizer = QuasiNewtonOptimizer::new();
        optimizer
            .set_objective(|x: ArrayView1<'_, f64>| {
                if x[0] < 0.0 {
                    f64::NAN
                } else {
                    elliptic(x)
                }
            })
            .expect("set_objective failed");
        optimizer
            .set_gradient(elliptic_gradient)
            .expect("set_gradient failed");
        optimizer
            .set_start_point(array![5.0, 5.0])
            .expect("set_start_point failed");
        let result = optimizer.minimize();
        assert!(matches!(result, Err(OptimizeError::NumericalError { .. })));
        assert!(!optimizer.is_locked());
    }

    #[test]
    fn test_bfgs_nan_gradient_fails() {
        // The gradient turns NaN once the line search moves the point, which
        // must surface as an error, not as convergence.
        let mut optimizer = QuasiNewtonOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_gradient(|x: ArrayView1<'_, f64>, mut g: ArrayViewMut1<'_, f64>| {
                if x[0] < 4.0 {
                    g.fill(f64::NAN);
                } else {
                    g[0] = 2.0 * x[0];
                    g[1] = 8.0 * x[1];
                }
            })
            .expect("set_gradient failed");
        optimizer
            .set_start_point(array![5.0, 5.0])
            .expect("set_start_point failed");
        let result = optimizer.minimize();
        assert!(matches!(result, Err(OptimizeError::NumericalError { .. })));
        assert!(!optimizer.is_locked());
        assert!(optimizer.result().is_none());
    }

    #[test]
    fn test_bfgs_not_ready() {
        let mut optimizer = QuasiNewtonOptimizer::<
            fn(ArrayView1<'_, f64>) -> f64,
            fn(ArrayView1<'_, f64>, ArrayViewMut1<'_, f64>),
        >::new();
        assert!(!optimizer.is_ready());
        assert!(matches!(
            optimizer.minimize(),
            Err(OptimizeError::NotReady { .. })
        ));
    }

    #[test]
    fn test_bfgs_reminimize_is_idempotent() {
        let mut optimizer = QuasiNewtonOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_gradient(elliptic_gradient)
            .expect("set_gradient failed");
        optimizer
            .set_start_point(array![5.0, 5.0])
            .expect("set_start_point failed");
        let first = optimizer.minimize().expect("first minimize failed");
        let second = optimizer.minimize().expect("second minimize failed");
        assert!(first.fun < 1e-6);
        assert!(second.fun < 1e-6);
        assert_eq!(first.iterations, second.iterations);
    }

    #[test]
    fn test_bfgs_observer_reports_cap() {
        use std::cell::Cell;
        use std::rc::Rc;

        let count = Rc::new(Cell::new(0usize));
        let seen = count.clone();
        let mut optimizer = QuasiNewtonOptimizer::new();
        optimizer
            .set_objective(elliptic)
            .expect("set_objective failed");
        optimizer
            .set_gradient(elliptic_gradient)
            .expect("set_gradient failed");
        optimizer
            .set_start_point(array![5.0, 5.0])
            .expect("set_start_point failed");
        optimizer
            .set_iteration_observer(move |report| {
                assert_eq!(report.max_iterations, Some(200));
                assert_eq!(report.iteration, seen.get() + 1);
                seen.set(report.iteration);
            })
            .expect("set_iteration_observer failed");
        let result = optimizer.minimize().expect("minimize failed");
        assert_eq!(count.get(), result.iterations);
    }
}
