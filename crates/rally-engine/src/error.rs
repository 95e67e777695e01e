use thiserror::Error;

/// Engine errors - validation and internal invariants only
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(&'static str),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
