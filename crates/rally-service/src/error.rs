use thiserror::Error;

/// Service layer errors - combines all error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    EngineError(#[from] rally_engine::error::EngineError),

    #[error(transparent)]
    StoreError(#[from] rally_store::error::StoreError),

    #[error(transparent)]
    CoreError(#[from] rally_core::error::CoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authorization error: {0}")]
    AuthorizationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(&'static str),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
