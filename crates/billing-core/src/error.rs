use billing_common::ErrorCode;
use thiserror::Error;

/// Business-logic failures raised explicitly by a stage or by enforcement.
/// These carry an HTTP status and propagate unchanged to the front end.
#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    #[error("missing required header: {header}")]
    BadRequest { header: &'static str },

    #[error("permission denied: {0:?}")]
    Forbidden(ErrorCode),
}

impl PolicyError {
    pub fn status(&self) -> u16 {
        match self {
            PolicyError::BadRequest { .. } => 400,
            PolicyError::Forbidden(_) => 403,
        }
    }

    /// The literal text sent back as the response body.
    pub fn body(&self) -> String {
        match self {
            PolicyError::BadRequest { header } => format!("missing required header: {header}"),
            PolicyError::Forbidden(code) => code.as_str().to_string(),
        }
    }
}

/// Everything else: object-store outages, malformed JSON blobs. Swallowed by
/// the preprocessor (billing is cleared, the request proceeds "on the
/// house") and logged, never surfaced to the caller.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error(transparent)]
    Cache(#[from] billing_cache::CacheError),

    #[error(transparent)]
    Store(#[from] billing_store::StoreError),
}

/// The two disjoint error universes a stage may raise: a `PolicyError`
/// propagates to the caller unchanged; an `InfraError` is caught by the
/// preprocessor and converted into fail-open behavior.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl From<billing_cache::CacheError> for StageError {
    fn from(source: billing_cache::CacheError) -> Self {
        StageError::Infra(InfraError::Cache(source))
    }
}

impl From<billing_store::StoreError> for StageError {
    fn from(source: billing_store::StoreError) -> Self {
        StageError::Infra(InfraError::Store(source))
    }
}

pub type StageResult<T> = Result<T, StageError>;
