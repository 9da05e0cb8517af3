//! Conjugate-gradient minimization.

#![allow(clippy::needless_range_loop)]

use ndarray::Array1;

use crate::error::{OptimizeError, OptimizeResult};
use crate::function::{Gradient, IterationObserver, IterationReport, MultiObjective};
use crate::minimize::line_search::DerivativeLineMinimizer;
use crate::minimize::{EvaluationCounter, MultiMinimizeResult};
use crate::utils::{ensure_finite_gradient, max_relative_gradient};

const ITMAX: usize = 200;
// Keeps the convergence test meaningful when both values are zero.
const EPS: f64 = 1e-10;
// Gradient-magnitude stopping threshold.
const GTOL: f64 = 1e-8;

const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Update formula for the conjugate-direction coefficient.
///
/// Polak-Ribiere restarts itself automatically on quadratic-model
/// breakdown and is the usual choice; Fletcher-Reeves is the original
/// formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConjugateFormula {
    /// `gamma = sum((g_new - g_old) . g_new) / sum(g_old . g_old)`
    #[default]
    PolakRibiere,
    /// `gamma = sum(g_new . g_new) / sum(g_old . g_old)`
    FletcherReeves,
}

fn conjugate_gradient_loop<F, G>(
    objective: &mut F,
    gradient: &mut G,
    start: &Array1<f64>,
    formula: ConjugateFormula,
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

    // xi holds the current gradient, g the negated previous gradient and
    // h the running conjugate direction.
    let mut xi = Array1::zeros(n);
    gradient.evaluate(p.view(), xi.view_mut())?;
    ensure_finite_gradient(xi.view())?;
    let mut g = xi.mapv(|v| -v);
    let mut h = g.clone();
    xi.assign(&h);

    let line_minimizer = DerivativeLineMinimizer::new();

    for iteration in 1..=ITMAX {
        let fret = line_minimizer.minimize_along(&mut counter, gradient, &mut p, &mut xi)?;

        if let Some(observer) = observer.as_deref_mut() {
            observer(IterationReport {
                iteration,
                max_iterations: Some(ITMAX),
            });
        }

        if 2.0 * (fret - fp).abs() <= tolerance * (fret.abs() + fp.abs() + EPS) {
            return Ok(MultiMinimizeResult {
                x: p,
                fun: fret,
                iterations: iteration,
                nfev: counter.count,
            });
        }
        fp = fret;

        gradient.evaluate(p.view(), xi.view_mut())?;
        ensure_finite_gradient(xi.view())?;
        if max_relative_gradient(xi.view(), p.view(), fret) < GTOL {
            return Ok(MultiMinimizeResult {
                x: p,
                fun: fret,
                iterations: iteration,
                nfev: counter.count,
            });
        }

        let mut gg = 0.0;
        let mut dgg = 0.0;
        for j in 0..n {
            gg += g[j] * g[j];
            match formula {
                ConjugateFormula::PolakRibiere => dgg += (xi[j] + g[j]) * xi[j],
                ConjugateFormula::FletcherReeves => dgg += xi[j] * xi[j],
            }
        }
        // A zero previous gradient means p already was a stationary point.
        if gg == 0.0 {
            return Ok(MultiMinimizeResult {
                x: p,
                fun: fret,
                iterations: iteration,
                nfev: counter.count,
            });
        }
        let gam = dgg / gg;
        for j in 0..n {
            g[j] = -xi[j];
            h[j] = g[j] + gam * h[j];
            xi[j] = h[j];
        }
    }

    Err(OptimizeError::DidNotConverge {
        iterations: ITMAX,
        tolerance,
        context: "conjugate_gradient".to_string(),
    })
}

/// Conjugate-gradient minimizer.
///
/// Builds successive conjugate search directions from gradient history
/// and line-minimizes along each with the derivative-aware line search.
/// Needs one gradient evaluation per iteration plus those consumed by
/// the line searches, and only O(n) working storage, which makes it the
/// method of choice for large smooth problems.
pub struct ConjugateGradientOptimizer<F, G> {
    objective: Option<F>,
    gradient: Option<G>,
    start_point: Option<Array1<f64>>,
    formula: ConjugateFormula,
    tolerance: f64,
    observer: Option<IterationObserver>,
    locked: bool,
    result: Option<MultiMinimizeResult>,
}

impl<F, G> ConjugateGradientOptimizer<F, G>
where
    F: MultiObjective,
    G: Gradient,
{
    /// Creates an optimizer with no objective, gradient, or start point,
    /// the Polak-Ribiere formula, and the default tolerance.
    pub fn new() -> Self {
        Self {
            objective: None,
            gradient: None,
            start_point: None,
            formula: ConjugateFormula::default(),
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

    /// Selects the conjugate-direction update formula.
    ///
    /// # Errors
    /// * `Locked` if a computation is in progress
    pub fn set_formula(&mut self, formula: ConjugateFormula) -> OptimizeResult<()> {
        if self.locked {
            return Err(OptimizeError::Locked);
        }
        self.formula = formula;
        Ok(())
    }

    /// The conjugate-direction update formula in use.
    pub fn formula(&self) -> ConjugateFormula {
        self.formula
    }

    /// Sets the relative tolerance on the per-iteration function decrease.
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

    /// Runs the conjugate-gradient iteration from the stored start point.
    ///
    /// # Returns
    /// The located minimum, also retrievable through [`result`](Self::result).
    ///
    /// # Errors
    /// * `Locked` if a computation is already in progress
    /// * `NotReady` if the objective, gradient, or start point is missing
    /// * `Evaluation` if a callback fails
    /// * `NumericalError` if the objective or gradient is not finite where evaluated
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
            (Some(objective), Some(gradient), Some(start)) => conjugate_gradient_loop(
                objective,
                gradient,
                start,
                self.formula,
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

impl<F, G> Default for ConjugateGradientOptimizer<F, G>
where
    F: MultiObjective,
    G: Gradient,
{
    fn default() -> Self {
        Self::new()
    }
}
