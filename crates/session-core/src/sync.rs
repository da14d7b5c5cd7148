//! Keeps the session's data live while it is signed in.
//!
//! An admin session watches the whole profile collection; a client session
//! watches its own profile document. The scope follows the session: every
//! change of identity or role tears the old subscription down before the new
//! one opens, and snapshots from a torn-down subscription are ignored.

use crate::state::assign;
use crate::{Session, SessionContext};
use document_store::{DocumentSnapshot, DocumentStore, StoreResult, Subscription};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use webfront_model::{collections, is_master_admin, resolve_role, Profile, Role};

/// What the synchronizer is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    Idle,
    AllClients { uid: String },
    OwnProfile { uid: String },
}

impl SyncScope {
    pub fn for_session(session: &Session) -> SyncScope {
        if session.resolving {
            return SyncScope::Idle;
        }
        match (session.uid(), session.role) {
            (Some(uid), Some(Role::Admin)) => SyncScope::AllClients {
                uid: uid.to_string(),
            },
            (Some(uid), Some(Role::Client)) => SyncScope::OwnProfile {
                uid: uid.to_string(),
            },
            _ => SyncScope::Idle,
        }
    }
}

struct ActiveSync {
    scope: SyncScope,
    /// `Session::generation` the subscription was opened for.
    session: u64,
    _subscription: Option<Subscription>,
}

pub struct LiveDataSynchronizer {
    store: Arc<dyn DocumentStore>,
    context: SessionContext,
    master_admin_email: Option<String>,
    active: Mutex<ActiveSync>,
    generation: Arc<AtomicU64>,
}

impl LiveDataSynchronizer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        context: SessionContext,
        master_admin_email: Option<String>,
    ) -> Self {
        Self {
            store,
            context,
            master_admin_email,
            active: Mutex::new(ActiveSync {
                scope: SyncScope::Idle,
                session: 0,
                _subscription: None,
            }),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn scope(&self) -> SyncScope {
        self.active.lock().unwrap().scope.clone()
    }

    /// Move the subscription to whatever `session` needs.
    pub fn apply(&self, session: &Session) {
        let desired = SyncScope::for_session(session);
        let mut active = self.active.lock().unwrap();
        // A sign-out and sign-in of the same identity can land between two
        // calls; the generation tells those sessions apart.
        if active.scope == desired
            && (desired == SyncScope::Idle || active.session == session.generation)
        {
            return;
        }

        // Old callbacks must be dead before the new subscription delivers.
        self.generation.fetch_add(1, Ordering::SeqCst);
        let previous = std::mem::replace(
            &mut *active,
            ActiveSync {
                scope: SyncScope::Idle,
                session: session.generation,
                _subscription: None,
            },
        );
        drop(previous);

        if !matches!(desired, SyncScope::AllClients { .. }) {
            self.context.update(|s| {
                let had_clients = !s.clients.is_empty();
                s.clients.clear();
                had_clients
            });
        }

        let subscription = match &desired {
            SyncScope::Idle => {
                debug!("Live sync idle");
                None
            }
            SyncScope::AllClients { uid } => self.open_all_clients(uid, session.generation),
            SyncScope::OwnProfile { uid } => self.open_own_profile(uid, session.generation),
        };
        *active = ActiveSync {
            scope: desired,
            session: session.generation,
            _subscription: subscription,
        };
    }

    /// Drop the current subscription.
    pub fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut active = self.active.lock().unwrap();
        let session = active.session;
        *active = ActiveSync {
            scope: SyncScope::Idle,
            session,
            _subscription: None,
        };
    }

    fn open_all_clients(&self, uid: &str, session_generation: u64) -> Option<Subscription> {
        let generation = self.generation.load(Ordering::SeqCst);
        let live = Arc::clone(&self.generation);
        let context = self.context.clone();
        let master = self.master_admin_email.clone();
        let owner = uid.to_string();

        let listener = Box::new(move |result: StoreResult<Vec<DocumentSnapshot>>| {
            if live.load(Ordering::SeqCst) != generation {
                return;
            }
            match result {
                Ok(documents) => {
                    let clients = parse_profiles(&documents);
                    context.update(|s| {
                        if s.uid() != Some(owner.as_str()) || s.generation != session_generation {
                            return false;
                        }
                        let mut changed = false;
                        if let Some(own) = clients.iter().find(|p| p.id == owner) {
                            changed |= refresh_own(s, own.clone(), master.as_deref());
                        }
                        changed | assign(&mut s.clients, clients)
                    });
                }
                Err(e) => warn!(error = %e, "Client list subscription failed"),
            }
        });

        match self
            .store
            .subscribe_collection(collections::PROFILES, listener)
        {
            Ok(subscription) => {
                info!(user_id = %uid, "Watching all client profiles");
                Some(subscription)
            }
            Err(e) => {
                warn!(user_id = %uid, error = %e, "Failed to watch client profiles");
                None
            }
        }
    }

    fn open_own_profile(&self, uid: &str, session_generation: u64) -> Option<Subscription> {
        let generation = self.generation.load(Ordering::SeqCst);
        let live = Arc::clone(&self.generation);
        let context = self.context.clone();
        let master = self.master_admin_email.clone();
        let owner = uid.to_string();

        let listener = Box::new(move |result: StoreResult<Option<DocumentSnapshot>>| {
            if live.load(Ordering::SeqCst) != generation {
                return;
            }
            match result {
                Ok(Some(document)) => match Profile::from_document(&document.id, &document.data) {
                    Ok(profile) => {
                        context.update(|s| {
                            s.uid() == Some(owner.as_str())
                                && s.generation == session_generation
                                && refresh_own(s, profile, master.as_deref())
                        });
                    }
                    Err(e) => warn!(user_id = %owner, error = %e, "Malformed profile snapshot"),
                },
                Ok(None) => warn!(user_id = %owner, "Profile document disappeared"),
                Err(e) => warn!(user_id = %owner, error = %e, "Profile subscription failed"),
            }
        });

        match self
            .store
            .subscribe_document(collections::PROFILES, uid, listener)
        {
            Ok(subscription) => {
                info!(user_id = %uid, "Watching own profile");
                Some(subscription)
            }
            Err(e) => {
                warn!(user_id = %uid, error = %e, "Failed to watch own profile");
                None
            }
        }
    }
}

/// Replace the session's own profile and re-derive what depends on it.
fn refresh_own(session: &mut Session, profile: Profile, master: Option<&str>) -> bool {
    let email = session.identity.as_ref().and_then(|i| i.email.as_deref());
    let role = resolve_role(email, profile.role, master);
    let requires_reset = profile.requires_password_reset && !is_master_admin(email, master);
    assign(&mut session.role, Some(role))
        | assign(&mut session.requires_password_reset, requires_reset)
        | assign(&mut session.profile, Some(profile))
}

fn parse_profiles(documents: &[DocumentSnapshot]) -> Vec<Profile> {
    documents
        .iter()
        .filter_map(|document| match Profile::from_document(&document.id, &document.data) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "Skipping malformed profile");
                None
            }
        })
        .collect()
}
