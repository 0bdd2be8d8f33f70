use std::time::Duration;

use thiserror::Error;

use crate::graph::model::Time;

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Solver did not finish within {limit:?}")]
    SolverTimeout { limit: Duration },
    #[error("Solver failed: {0}")]
    SolverFailure(String),
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl MatchingError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::SolverTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, MatchingError>;

pub(crate) fn check_window(t_begin: Time, t_end: Time) -> Result<()> {
    if t_end < t_begin {
        return Err(MatchingError::invalid(format!(
            "Window end {t_end} precedes window start {t_begin}"
        )));
    }
    Ok(())
}
