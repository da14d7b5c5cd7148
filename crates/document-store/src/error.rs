//! Document store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected by the store's access rules.
    #[error("Missing or insufficient permissions: {operation} {path}")]
    PermissionDenied { operation: String, path: String },

    /// Partial update of a document that does not exist.
    #[error("No document to update: {collection}/{key}")]
    NotFound { collection: String, key: String },

    /// The client library's local cache is corrupt. Only clearing site data
    /// and reloading recovers from this.
    #[error("Internal consistency failure: {0}")]
    InternalConsistency(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored data does not have the expected shape.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Supabase error: {status} - {message}")]
    Supabase { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn permission_denied(operation: impl std::fmt::Display, path: impl Into<String>) -> Self {
        StoreError::PermissionDenied {
            operation: operation.to_string(),
            path: path.into(),
        }
    }

    pub fn is_internal_consistency(&self) -> bool {
        matches!(self, StoreError::InternalConsistency(_))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied { .. })
    }

    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Http(e) => e.is_connect() || e.is_timeout(),
            StoreError::Supabase { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
