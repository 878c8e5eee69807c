use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Failures raised by pure domain code.
///
/// Missing records and lock conflicts are storage outcomes and are reported
/// by the store layer instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input that can never be accepted as written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// State that should be impossible (negative stock, total mismatch, overflow).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
