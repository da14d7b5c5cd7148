//! Identity error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("An account already exists for this email")]
    EmailInUse,

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid email or password")]
    InvalidCredential,

    #[error("No account found for this email")]
    UserNotFound,

    /// The operation needs a signed-in identity (or a different one).
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Unclassified provider rejection.
    #[error("Identity provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl IdentityError {
    /// Returns true if the operation can be retried as-is.
    pub fn is_transient(&self) -> bool {
        match self {
            IdentityError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            IdentityError::Provider { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true for failures the user can fix by changing their input.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            IdentityError::EmailInUse
                | IdentityError::WeakPassword(_)
                | IdentityError::InvalidEmail(_)
                | IdentityError::InvalidCredential
                | IdentityError::UserNotFound
        )
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;
