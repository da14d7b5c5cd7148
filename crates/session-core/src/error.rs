use document_store::StoreError;
use identity_client::IdentityError;
use thiserror::Error;
use webfront_model::ModelError;

/// Shown when the store reports corrupted local state. The only failure that
/// interrupts the user with a blocking alert.
pub const CACHE_CLEAR_ALERT: &str =
    "Your local data is out of sync. Please clear your browser cache and reload.";

/// How a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Logged; the session degrades to the last good state.
    Recoverable,
    /// Shown inline next to the triggering action.
    UserActionable,
    /// Blocking alert asking the user to clear local state.
    FatalToFlow,
    /// Rejected by role or access rules.
    Authorization,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Sign-ups are temporarily disabled for maintenance")]
    MaintenanceMode,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Already signed in; sign out first")]
    AlreadySignedIn,

    #[error("This action requires the admin role")]
    Forbidden,

    #[error("No profile loaded for {0}")]
    UnknownProfile(String),

    #[error("Invoice {index} does not exist ({len} invoices)")]
    InvoiceOutOfRange { index: usize, len: usize },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl SessionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SessionError::Identity(e) if e.is_user_actionable() => ErrorClass::UserActionable,
            SessionError::Identity(IdentityError::NotSignedIn) => ErrorClass::Authorization,
            SessionError::Identity(_) => ErrorClass::Recoverable,
            SessionError::Store(e) if e.is_internal_consistency() => ErrorClass::FatalToFlow,
            SessionError::Store(e) if e.is_permission_denied() => ErrorClass::Authorization,
            SessionError::Store(_) => ErrorClass::Recoverable,
            SessionError::Model(ModelError::Json(_)) => ErrorClass::Recoverable,
            SessionError::Model(_) => ErrorClass::UserActionable,
            SessionError::MissingField(_)
            | SessionError::MaintenanceMode
            | SessionError::AlreadySignedIn
            | SessionError::InvoiceOutOfRange { .. } => ErrorClass::UserActionable,
            SessionError::NotSignedIn | SessionError::Forbidden => ErrorClass::Authorization,
            SessionError::Json(_)
            | SessionError::UnknownProfile(_)
            | SessionError::InvalidStateTransition(_) => {
                ErrorClass::Recoverable
            }
        }
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self.class() {
            ErrorClass::FatalToFlow => CACHE_CLEAR_ALERT.to_string(),
            _ => self.to_string(),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
