//! Minimization of a multidimensional objective along a ray.

use ndarray::{Array1, ArrayView1};

use crate::error::{EvaluationError, OptimizeError, OptimizeResult};
use crate::function::{Gradient, MultiObjective, SingleObjective};
use crate::scalar::{brent_minimize, dbrent_minimize, Bracket};

// Line minimizations inside the direction-set methods do not need full
// precision; a loose tolerance saves evaluations without hurting the
// outer convergence.
const TOL: f64 = 2e-4;

/// Restriction of a multidimensional objective to the ray `p + t d`.
///
/// Implements [`SingleObjective`] over the step length `t`, so any
/// univariate minimizer can search along the ray.
pub struct DirectionalEvaluator<'a, F> {
    objective: &'a mut F,
    point: ArrayView1<'a, f64>,
    direction: ArrayView1<'a, f64>,
    trial: Array1<f64>,
}

impl<'a, F> DirectionalEvaluator<'a, F>
where
    F: MultiObjective,
{
    /// Creates the restriction of `objective` to the ray through `point`
    /// along `direction`.
    ///
    /// # Errors
    /// * `InvalidInput` if the lengths differ or are zero
    pub fn new(
        objective: &'a mut F,
        point: ArrayView1<'a, f64>,
        direction: ArrayView1<'a, f64>,
    ) -> OptimizeResult<Self> {
        if point.is_empty() || point.len() != direction.len() {
            return Err(OptimizeError::InvalidInput {
                context: "directional evaluator: point and direction must have equal non-zero \
                          lengths"
                    .to_string(),
            });
        }
        let trial = Array1::zeros(point.len());
        Ok(Self {
            objective,
            point,
            direction,
            trial,
        })
    }
}

impl<F> SingleObjective for DirectionalEvaluator<'_, F>
where
    F: MultiObjective,
{
    fn evaluate(&mut self, t: f64) -> Result<f64, EvaluationError> {
        self.trial.assign(&self.point);
        self.trial.scaled_add(t, &self.direction);
        self.objective.evaluate(self.trial.view())
    }
}

/// Directional derivative of a multidimensional objective along a ray.
///
/// Implements [`SingleDerivative`](crate::function::SingleDerivative) as
/// `g'(t) = grad f(p + t d) . d`.
pub struct DirectionalDerivativeEvaluator<'a, G> {
    gradient: &'a mut G,
    point: ArrayView1<'a, f64>,
    direction: ArrayView1<'a, f64>,
    trial: Array1<f64>,
    gradient_buffer: Array1<f64>,
}

impl<'a, G> DirectionalDerivativeEvaluator<'a, G>
where
    G: Gradient,
{
    /// Creates the directional derivative of `gradient` along the ray
    /// through `point` in `direction`.
    ///
    /// # Errors
    /// * `InvalidInput` if the lengths differ or are zero
    pub fn new(
        gradient: &'a mut G,
        point: ArrayView1<'a, f64>,
        direction: ArrayView1<'a, f64>,
    ) -> OptimizeResult<Self> {
        if point.is_empty() || point.len() != direction.len() {
            return Err(OptimizeError::InvalidInput {
                context: "directional derivative evaluator: point and direction must have equal \
                          non-zero lengths"
                    .to_string(),
            });
        }
        let trial = Array1::zeros(point.len());
        let gradient_buffer = Array1::zeros(point.len());
        Ok(Self {
            gradient,
            point,
            direction,
            trial,
            gradient_buffer,
        })
    }
}

impl<G> crate::function::SingleDerivative for DirectionalDerivativeEvaluator<'_, G>
where
    G: Gradient,
{
    fn derivative(&mut self, t: f64) -> Result<f64, EvaluationError> {
        self.trial.assign(&self.point);
        self.trial.scaled_add(t, &self.direction);
        self.gradient
            .evaluate(self.trial.view(), self.gradient_buffer.view_mut())?;
        Ok(self.gradient_buffer.dot(&self.direction))
    }
}

/// Minimizes a multidimensional objective along a direction, in place.
///
/// Brackets the minimum of the restricted objective from `t = 0` toward
/// `t = 1` and polishes it with Brent's method. On success the direction
/// is rescaled to the actual displacement and the point is moved by it.
#[derive(Debug, Clone)]
pub struct LineMinimizer {
    tolerance: f64,
}

impl LineMinimizer {
    /// Creates a line minimizer with the standard loose tolerance.
    pub fn new() -> Self {
        Self { tolerance: TOL }
    }

    /// Creates a line minimizer with a custom tolerance.
    ///
    /// # Errors
    /// * `InvalidParameter` if the tolerance is negative or not finite
    pub fn with_tolerance(tolerance: f64) -> OptimizeResult<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(OptimizeError::InvalidParameter {
                parameter: "tolerance".to_string(),
                message: "must be finite and non-negative".to_string(),
            });
        }
        Ok(Self { tolerance })
    }

    /// The tolerance passed to the inner univariate minimizer.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Minimizes `objective` along the ray `point + t * direction`.
    ///
    /// On success, `direction` is overwritten with the displacement
    /// `t* * direction` actually taken and `point` is advanced by it.
    /// If the univariate search fails to converge, both arrays are left
    /// untouched and the value at the unmoved point is returned.
    ///
    /// # Arguments
    /// * `objective` - Function to minimize
    /// * `point` - Starting point, advanced to the line minimum
    /// * `direction` - Search direction, rescaled to the displacement
    ///
    /// # Returns
    /// The objective value at the final point.
    ///
    /// # Errors
    /// * `InvalidInput` if the lengths differ or are zero
    /// * `Evaluation` if the objective fails
    /// * `NumericalError` if bracketing meets non-finite values
    pub fn minimize_along<F>(
        &self,
        objective: &mut F,
        point: &mut Array1<f64>,
        direction: &mut Array1<f64>,
    ) -> OptimizeResult<f64>
    where
        F: MultiObjective,
    {
        if point.is_empty() || point.len() != direction.len() {
            return Err(OptimizeError::InvalidInput {
                context: "line minimization: point and direction must have equal non-zero lengths"
                    .to_string(),
            });
        }
        let outcome = {
            let mut evaluator =
                DirectionalEvaluator::new(objective, point.view(), direction.view())?;
            Bracket::find(&mut evaluator, 0.0, 1.0).and_then(|bracket| {
                brent_minimize(&mut evaluator, &bracket, self.tolerance, None)
            })
        };
        match outcome {
            Ok(result) => {
                *direction *= result.x;
                *point += &*direction;
                Ok(result.f_min)
            }
            Err(OptimizeError::DidNotConverge { .. }) => {
                // Keep the current point rather than trust a bad step.
                Ok(objective.evaluate(point.view())?)
            }
            Err(err) => Err(err),
        }
    }
}

impl Default for LineMinimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Line minimizer that uses gradient information along the ray.
///
/// Same contract as [`LineMinimizer`], but the univariate polish is the
/// derivative-aware Brent method fed by the directional derivative.
#[derive(Debug, Clone)]
pub struct DerivativeLineMinimizer {
    tolerance: f64,
}

impl DerivativeLineMinimizer {
    /// Creates a line minimizer with the standard loose tolerance.
    pub fn new() -> Self {
        Self { tolerance: TOL }
    }

    /// Creates a line minimizer with a custom tolerance.
    ///
    /// # Errors
    /// * `InvalidParameter` if the tolerance is negative or not finite
    pub fn with_tolerance(tolerance: f64) -> OptimizeResult<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(OptimizeError::InvalidParameter {
                parameter: "tolerance".to_string(),
                message: "must be finite and non-negative".to_string(),
            });
        }
        Ok(Self { tolerance })
    }

    /// The tolerance passed to the inner univariate minimizer.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Minimizes `objective` along the ray `point + t * direction` using
    /// `gradient` for the univariate derivative.
    ///
    /// Same in-place contract as [`LineMinimizer::minimize_along`].
    ///
    /// # Errors
    /// * `InvalidInput` if the lengths differ or are zero
    /// * `Evaluation` if the objective or gradient fails
    /// * `NumericalError` if the search meets non-finite values
    pub fn minimize_along<F, G>(
        &self,
        objective: &mut F,
        gradient: &mut G,
        point: &mut Array1<f64>,
        direction: &mut Array1<f64>,
    ) -> OptimizeResult<f64>
    where
        F: MultiObjective,
        G: Gradient,
    {
        if point.is_empty() || point.len() != direction.len() {
            return Err(OptimizeError::InvalidInput {
                context: "line minimization: point and direction must have equal non-zero lengths"
                    .to_string(),
            });
        }
        let outcome = {
            let mut evaluator =
                DirectionalEvaluator::new(objective, point.view(), direction.view())?;
            let mut derivative =
                DirectionalDerivativeEvaluator::new(gradient, point.view(), direction.view())?;
            Bracket::find(&mut evaluator, 0.0, 1.0).and_then(|bracket| {
                dbrent_minimize(&mut evaluator, &mut derivative, &bracket, self.tolerance, None)
            })
        };
        match outcome {
            Ok(result) => {
                *direction *= result.x;
                *point += &*direction;
                Ok(result.f_min)
            }
            Err(OptimizeError::DidNotConverge { .. }) => {
                Ok(objective.evaluate(point.view())?)
            }
            Err(err) => Err(err),
        }
    }
}

impl Default for DerivativeLineMinimizer {
    fn default() -> Self {
        Self::new()
    }
}
