//! Error types for trajectory fitting

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Batch window/size cannot be drawn from the trajectory
    #[error(
        "Insufficient data: cannot draw {batch_size} distinct windows of length {batch_time} \
         from a trajectory of {len} states"
    )]
    InsufficientData {
        len: usize,
        batch_time: usize,
        batch_size: usize,
    },

    /// Window request outside the trajectory
    #[error("Window [{start}, {start} + {length}) is out of range for a trajectory of {len} states")]
    OutOfRange {
        start: usize,
        length: usize,
        len: usize,
    },

    /// State dimensionality disagrees with what a component expects
    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// Solver could not complete within tolerance or step budget
    #[error(
        "Integration failed{} over [{t_start}, {t_end}]: {reason}",
        iteration_suffix(.iteration)
    )]
    IntegrationFailure {
        iteration: Option<usize>,
        t_start: f64,
        t_end: f64,
        reason: String,
    },

    /// Gradient requested from a field that cannot provide one
    #[error("Vector field '{0}' is not differentiable")]
    NotDifferentiable(String),

    /// Optimizer bound to a field without parameters
    #[error("Vector field '{0}' has no trainable parameters")]
    NotTrainable(String),

    /// Malformed trajectory or time mesh
    #[error("Invalid trajectory: {0}")]
    InvalidTrajectory(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Data parsing error
    #[error("Failed to parse data: {0}")]
    Parse(String),

    /// Array shape error
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// CSV error
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn iteration_suffix(iteration: &Option<usize>) -> String {
    match iteration {
        Some(itr) => format!(" at iteration {}", itr),
        None => String::new(),
    }
}

impl Error {
    /// Attach the training iteration to an integration failure.
    ///
    /// Other error kinds are returned unchanged.
    pub fn at_iteration(self, itr: usize) -> Self {
        match self {
            Error::IntegrationFailure {
                t_start,
                t_end,
                reason,
                ..
            } => Error::IntegrationFailure {
                iteration: Some(itr),
                t_start,
                t_end,
                reason,
            },
            other => other,
        }
    }

    pub(crate) fn shape(context: impl Into<String>, expected: usize, found: usize) -> Self {
        Error::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_iteration_tags_integration_failure() {
        let err = Error::IntegrationFailure {
            iteration: None,
            t_start: 0.0,
            t_end: 1.5,
            reason: "step budget exhausted".into(),
        }
        .at_iteration(42);

        match &err {
            Error::IntegrationFailure { iteration, .. } => assert_eq!(*iteration, Some(42)),
            other => panic!("unexpected error: {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("at iteration 42"), "{msg}");
        assert!(msg.contains("[0, 1.5]"), "{msg}");
    }

    #[test]
    fn test_at_iteration_leaves_other_kinds() {
        let err = Error::OutOfRange {
            start: 3,
            length: 4,
            len: 5,
        }
        .at_iteration(7);
        assert!(matches!(err, Error::OutOfRange { .. }));
    }
}
