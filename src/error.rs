//! Error types for optimization operations.

use thiserror::Error;

/// Result type for optimization operations.
pub type OptimizeResult<T> = Result<T, OptimizeError>;

/// Error raised by an objective, derivative, or gradient callback.
///
/// Optimizers wrap this into [`OptimizeError::Evaluation`] and abort the
/// current call. Closures that cannot fail never produce it; implement the
/// callback traits directly when evaluation can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Evaluation failed: {reason}")]
pub struct EvaluationError {
    reason: String,
}

impl EvaluationError {
    /// Creates an evaluation error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during optimization.
#[derive(Debug, Clone, Error)]
pub enum OptimizeError {
    /// The optimizer did not converge within the iteration cap.
    #[error("{context}: did not converge after {iterations} iterations (tolerance: {tolerance})")]
    DidNotConverge {
        iterations: usize,
        tolerance: f64,
        context: String,
    },

    /// Invalid bracket endpoints.
    #[error("Invalid bracket [{a}, {b}, {c}]: endpoints must satisfy a <= b <= c")]
    InvalidBracket { a: f64, b: f64, c: f64 },

    /// Invalid parameter value.
    #[error("Invalid parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Invalid input array size or dimensions.
    #[error("Invalid input in {context}")]
    InvalidInput { context: String },

    /// A required input (objective, gradient, start point, simplex) has not
    /// been set yet.
    #[error("Optimizer is not ready: {context}")]
    NotReady { context: String },

    /// A mutating call was made while a computation is in progress on the
    /// same instance.
    #[error("Optimizer is locked: a computation is in progress")]
    Locked,

    /// The objective or gradient callback failed.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// The proposed line-search direction does not point downhill.
    #[error("Line-search direction is not a descent direction (slope = {slope})")]
    NonDescentDirection { slope: f64 },

    /// Numerical computation failed (e.g. a non-finite objective value).
    #[error("Numerical error: {message}")]
    NumericalError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_not_converge_display() {
        let err = OptimizeError::DidNotConverge {
            iterations: 100,
            tolerance: 1e-8,
            context: "brent".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("brent"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_evaluation_error_wraps() {
        let err: OptimizeError = EvaluationError::new("model blew up").into();
        assert!(matches!(err, OptimizeError::Evaluation(_)));
        assert!(err.to_string().contains("model blew up"));
    }

    #[test]
    fn test_invalid_bracket_display() {
        let err = OptimizeError::InvalidBracket {
            a: 2.0,
            b: 1.0,
            c: 3.0,
        };
        assert!(err.to_string().contains("a <= b <= c"));
    }
}
