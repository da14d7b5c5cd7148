//! The identity client contract.

use crate::IdentityResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// An authenticated principal issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque identity reference; also the profile document key.
    pub uid: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
        }
    }
}

/// Authentication state as published to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// The provider has not reported yet (e.g. restoring a persisted session).
    Restoring,
    SignedOut,
    SignedIn(Identity),
}

impl IdentityState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityState::SignedIn(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Identity provider operations.
///
/// `sign_up` and `sign_in` change the current identity and publish the new
/// state before returning. `provision_account` creates an account for someone
/// else and leaves the current identity untouched.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> IdentityResult<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Identity>;

    async fn sign_out(&self) -> IdentityResult<()>;

    async fn request_password_reset(&self, email: &str) -> IdentityResult<()>;

    async fn change_password(&self, identity: &Identity, new_password: &str)
        -> IdentityResult<()>;

    async fn provision_account(&self, email: &str, password: &str) -> IdentityResult<Identity>;

    /// Delete the signed-in account and sign out.
    async fn delete_current_account(&self) -> IdentityResult<()>;

    fn current_identity(&self) -> Option<Identity>;

    /// Subscribe to state changes. Dropping the receiver unsubscribes.
    fn watch_state(&self) -> watch::Receiver<IdentityState>;
}
