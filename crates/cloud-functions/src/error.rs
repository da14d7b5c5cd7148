use document_store::StoreError;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Handler failure. Each variant maps to one wire code.
#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    FailedPrecondition(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Internal(String),
}

impl FunctionError {
    /// Wire code returned to the caller.
    pub fn code(&self) -> &'static str {
        match self {
            FunctionError::InvalidArgument(_) => "invalid-argument",
            FunctionError::NotFound(_) => "not-found",
            FunctionError::FailedPrecondition(_) => "failed-precondition",
            FunctionError::Unauthenticated(_) => "unauthenticated",
            FunctionError::PermissionDenied(_) => "permission-denied",
            FunctionError::Internal(_) => "internal",
        }
    }

    pub fn to_body(&self) -> Value {
        json!({ "error": { "code": self.code(), "message": self.to_string() } })
    }
}

impl From<StoreError> for FunctionError {
    fn from(err: StoreError) -> Self {
        if err.is_permission_denied() {
            FunctionError::PermissionDenied(err.to_string())
        } else {
            FunctionError::Internal(err.to_string())
        }
    }
}

impl From<reqwest::Error> for FunctionError {
    fn from(err: reqwest::Error) -> Self {
        FunctionError::Internal(err.to_string())
    }
}

pub type FunctionResult<T> = Result<T, FunctionError>;

/// Wire body for a handler outcome: `{"result": ...}` or `{"error": {...}}`.
pub fn wire_response<T: Serialize>(result: &FunctionResult<T>) -> Value {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(value) => json!({ "result": value }),
            Err(e) => FunctionError::Internal(e.to_string()).to_body(),
        },
        Err(e) => e.to_body(),
    }
}
