//! Turns identity-provider events into a resolved [`Session`].
//!
//! Resolution for a signed-in identity:
//! 1. decide whether the identity is the master admin
//! 2. fetch its profile document
//! 3. derive the effective role (master admin always wins)
//! 4. compute whether a password reset is still owed
//! 5. publish identity, role and profile together, clearing `resolving`
//! 6. route: forced password reset first, otherwise the role's landing
//!    route when the user is still on a public entry route
//!
//! Every resolution takes an epoch. A result is only published while its
//! epoch is still the latest, so a slow fetch can never overwrite a newer
//! sign-in or a sign-out.

use crate::navigation::{NavigationRequest, Navigator, PasswordResetState};
use crate::session_fsm::{ResolutionPhase, SessionMachine, SessionMachineInput, SessionMachineState};
use crate::state::assign;
use crate::{Route, Session, SessionContext, SessionError, SessionResult, CACHE_CLEAR_ALERT};
use document_store::DocumentStore;
use identity_client::{Identity, IdentityState};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use webfront_model::{collections, is_master_admin, resolve_role, Profile, Role};

pub struct SessionResolver {
    store: Arc<dyn DocumentStore>,
    context: SessionContext,
    navigator: Arc<dyn Navigator>,
    master_admin_email: Option<String>,
    machine: Mutex<SessionMachine>,
    provisioning: Arc<AtomicBool>,
    epoch: AtomicU64,
}

/// Held by the sign-up flow while it creates the identity and its profile.
/// Listener-driven resolution is suppressed until the guard drops.
pub struct ProvisioningGuard {
    resolver: Arc<SessionResolver>,
}

impl Drop for ProvisioningGuard {
    fn drop(&mut self) {
        self.resolver.provisioning.store(false, Ordering::SeqCst);
        let abandoned = {
            let machine = self.resolver.machine.lock().unwrap();
            *machine.state() == SessionMachineState::Provisioning
        };
        if abandoned {
            let phase = self.resolver.advance(SessionMachineInput::ProvisioningAbandoned);
            self.resolver.context.update(|s| assign(&mut s.phase, phase));
            debug!("Sign-up abandoned");
        }
    }
}

impl SessionResolver {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        context: SessionContext,
        navigator: Arc<dyn Navigator>,
        master_admin_email: Option<String>,
    ) -> Self {
        Self {
            store,
            context,
            navigator,
            master_admin_email,
            machine: Mutex::new(SessionMachine::new()),
            provisioning: Arc::new(AtomicBool::new(false)),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> ResolutionPhase {
        ResolutionPhase::from(self.machine.lock().unwrap().state())
    }

    pub fn is_provisioning(&self) -> bool {
        self.provisioning.load(Ordering::SeqCst)
    }

    /// Suppress listener-driven resolution until the returned guard drops.
    pub fn begin_provisioning(self: &Arc<Self>) -> ProvisioningGuard {
        self.provisioning.store(true, Ordering::SeqCst);
        let phase = self.advance(SessionMachineInput::ProvisioningStarted);
        self.context.update(|s| assign(&mut s.phase, phase));
        ProvisioningGuard {
            resolver: Arc::clone(self),
        }
    }

    /// React to one identity-provider state.
    pub async fn handle_identity_state(&self, state: IdentityState) {
        match state {
            IdentityState::Restoring => debug!("Identity provider still restoring"),
            IdentityState::SignedOut => self.apply_signed_out(),
            IdentityState::SignedIn(identity) => {
                if self.is_provisioning() {
                    debug!(user_id = %identity.uid, "Sign-up in progress, deferring resolution");
                    return;
                }
                self.resolve(identity).await;
            }
        }
    }

    /// Resolve `identity` into a session. Failures are logged and degrade to
    /// an empty session; they are never returned.
    pub async fn resolve(&self, identity: Identity) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let master = self.master_admin_email.as_deref();
        let is_master = is_master_admin(identity.email.as_deref(), master);

        let phase = self.advance(SessionMachineInput::IdentitySignedIn);
        self.publish(epoch, |s| {
            let mut changed = false;
            if s.uid() != Some(identity.uid.as_str()) {
                changed |= s.clear();
                changed |= assign(&mut s.resolving, true);
            }
            changed | assign(&mut s.phase, phase)
        });

        let fetched = self
            .store
            .get_document(collections::PROFILES, &identity.uid)
            .await;
        if !self.is_current(epoch) {
            debug!(user_id = %identity.uid, "Discarding stale profile fetch");
            return;
        }

        let document = match fetched {
            Ok(Some(document)) => document,
            Ok(None) => {
                warn!(user_id = %identity.uid, "Signed-in identity has no profile document");
                self.fail(epoch, SessionMachineInput::ProfileMissing, false);
                return;
            }
            Err(e) if e.is_internal_consistency() => {
                error!(user_id = %identity.uid, error = %e, "Store reported corrupted local state");
                self.fail(epoch, SessionMachineInput::FetchFailed, true);
                return;
            }
            Err(e) => {
                warn!(user_id = %identity.uid, error = %e, "Failed to fetch profile");
                self.fail(epoch, SessionMachineInput::FetchFailed, false);
                return;
            }
        };

        let profile = match Profile::from_document(&document.id, &document.data) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id = %identity.uid, error = %e, "Malformed profile document");
                self.fail(epoch, SessionMachineInput::FetchFailed, false);
                return;
            }
        };

        let role = resolve_role(identity.email.as_deref(), profile.role, master);
        let requires_reset = profile.requires_password_reset && !is_master;
        let phase = self.advance(if requires_reset {
            SessionMachineInput::ResetRequired
        } else {
            SessionMachineInput::ProfileLoaded
        });

        let published = self.publish(epoch, |s| {
            assign(&mut s.identity, Some(identity.clone()))
                | assign(&mut s.role, Some(role))
                | assign(&mut s.profile, Some(profile.clone()))
                | assign(&mut s.requires_password_reset, requires_reset)
                | assign(&mut s.resolving, false)
                | assign(&mut s.phase, phase)
        });
        if !published {
            return;
        }
        info!(user_id = %identity.uid, role = %role, requires_reset, "Session resolved");

        if requires_reset {
            self.navigator
                .navigate(NavigationRequest::PasswordReset(PasswordResetState {
                    identity,
                    profile,
                }));
        } else if self.navigator.current_route().is_public_entry() {
            self.navigator
                .navigate(NavigationRequest::To(Route::default_for(role)));
        }
    }

    /// Record that the owed password reset has been completed.
    pub fn complete_password_reset(&self) -> Option<Role> {
        let phase = self.advance(SessionMachineInput::ResetCompleted);
        let mut role = None;
        self.context.update(|s| {
            role = s.role;
            let mut changed = assign(&mut s.requires_password_reset, false);
            if let Some(profile) = s.profile.as_mut() {
                changed |= assign(&mut profile.requires_password_reset, false);
            }
            changed | assign(&mut s.phase, phase)
        });
        role
    }

    /// Stop waiting on the identity provider.
    pub fn expire(&self) {
        let timed_out = {
            let machine = self.machine.lock().unwrap();
            *machine.state() == SessionMachineState::Resolving
        };
        let phase = if timed_out {
            self.advance(SessionMachineInput::TimedOut)
        } else {
            self.phase()
        };
        let changed = self.context.update(|s| {
            if !s.resolving {
                return false;
            }
            s.resolving = false;
            s.phase = phase;
            true
        });
        if changed {
            warn!("Session resolution timed out");
        }
    }

    pub fn dismiss_alert(&self) {
        self.context.update(|s| s.alert.take().is_some());
    }

    fn apply_signed_out(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let phase = self.advance(SessionMachineInput::IdentitySignedOut);
        let changed = self.context.update(|s| {
            s.clear() | assign(&mut s.resolving, false) | assign(&mut s.phase, phase)
        });
        if changed {
            info!("Session cleared");
        }
    }

    fn fail(&self, epoch: u64, input: SessionMachineInput, alert: bool) {
        let phase = self.advance(input);
        self.publish(epoch, |s| {
            let mut changed =
                s.clear() | assign(&mut s.resolving, false) | assign(&mut s.phase, phase);
            if alert {
                changed |= assign(&mut s.alert, Some(CACHE_CLEAR_ALERT.to_string()));
            }
            changed
        });
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Apply `f` only while `epoch` is the latest resolution.
    fn publish<F>(&self, epoch: u64, f: F) -> bool
    where
        F: FnOnce(&mut Session) -> bool,
    {
        let mut applied = false;
        self.context.update(|s| {
            if !self.is_current(epoch) {
                return false;
            }
            applied = true;
            f(s)
        });
        applied
    }

    fn transition(&self, input: &SessionMachineInput) -> SessionResult<ResolutionPhase> {
        let mut machine = self.machine.lock().unwrap();
        let old_state = machine.state().clone();
        machine.consume(input).map_err(|_| {
            SessionError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input, old_state
            ))
        })?;
        debug!(old_state = ?old_state, new_state = ?machine.state(), "Session transition");
        Ok(ResolutionPhase::from(machine.state()))
    }

    fn advance(&self, input: SessionMachineInput) -> ResolutionPhase {
        match self.transition(&input) {
            Ok(phase) => phase,
            Err(e) => {
                warn!(error = %e, "Ignoring session transition");
                self.phase()
            }
        }
    }
}
