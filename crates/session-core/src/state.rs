//! The session snapshot and its shared holder.

use crate::ResolutionPhase;
use identity_client::Identity;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use webfront_model::{Profile, Role};

/// Everything the UI knows about the signed-in user.
///
/// `role` and `profile` are either both present with `identity`, or all
/// absent. `resolving` is true from start-up until the first resolution
/// settles or times out.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub role: Option<Role>,
    pub profile: Option<Profile>,
    pub resolving: bool,
    pub requires_password_reset: bool,
    pub phase: ResolutionPhase,
    /// Every profile, kept live while the session is an admin.
    pub clients: Vec<Profile>,
    /// Blocking alert for the user, if any.
    pub alert: Option<String>,
    /// Bumped whenever a signed-in identity is cleared, so two consecutive
    /// sign-ins of the same identity are distinct sessions.
    pub generation: u64,
}

impl Session {
    pub fn initial() -> Self {
        Self {
            identity: None,
            role: None,
            profile: None,
            resolving: true,
            requires_password_reset: false,
            phase: ResolutionPhase::Resolving,
            clients: Vec::new(),
            alert: None,
            generation: 0,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.uid.as_str())
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Some(Role::Admin))
    }

    /// Drop identity, role, profile and synchronized data. Returns whether
    /// anything was dropped.
    pub(crate) fn clear(&mut self) -> bool {
        let signed_in = self.identity.take().is_some();
        if signed_in {
            self.generation += 1;
        }
        let changed = signed_in
            | self.role.take().is_some()
            | self.profile.take().is_some()
            | std::mem::take(&mut self.requires_password_reset)
            | !self.clients.is_empty();
        self.clients.clear();
        changed
    }

    /// Locally known profile for `uid`: the caller's own, or one of the
    /// synchronized client profiles.
    pub fn find_profile(&self, uid: &str) -> Option<&Profile> {
        self.profile
            .as_ref()
            .filter(|profile| profile.id == uid)
            .or_else(|| self.clients.iter().find(|profile| profile.id == uid))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initial()
    }
}

/// Store `value` in `slot`; true when that changed it.
pub(crate) fn assign<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Shared, observable session state. Cloning yields another handle to the
/// same state.
#[derive(Clone)]
pub struct SessionContext {
    tx: Arc<watch::Sender<Session>>,
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Session::initial());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Apply `f`, which reports whether it changed anything; observers are
    /// notified only when it did.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Session) -> bool,
    {
        self.tx.send_if_modified(f)
    }

    /// Wait until `predicate` holds, up to `timeout`.
    pub async fn wait_for<P>(&self, predicate: P, timeout: Duration) -> Option<Session>
    where
        P: Fn(&Session) -> bool,
    {
        let mut rx = self.watch();
        let wait = async {
            loop {
                {
                    let session = rx.borrow_and_update();
                    if predicate(&session) {
                        return Some(session.clone());
                    }
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
