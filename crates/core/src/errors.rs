use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid preference weights: {0}")]
    InvalidWeights(String),
}

/// Failure of an operator action, split by whether retrying can help.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("action rejected: {0}")]
    Rejected(String),
}

impl ApplicationError {
    /// The backend could not be reached; the same action may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Integration(_))
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn only_integration_failures_are_retryable() {
        assert!(ApplicationError::Integration("connection refused".to_owned()).is_retryable());
        assert!(!ApplicationError::Rejected("order not found".to_owned()).is_retryable());
        assert!(!ApplicationError::from(DomainError::InvalidWeights("sum is 1.2".to_owned()))
            .is_retryable());
    }
}
