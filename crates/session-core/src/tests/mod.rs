//! Scenario tests for the session layer.
//!
//! Every scenario runs the full runtime against the in-process identity
//! provider and the in-process document store with access rules enabled.
//!
//! - `resolution.rs` - role derivation, missing profiles, store failures, timeout
//! - `sign_up.rs`    - sign-up provisioning, maintenance mode
//! - `live_sync.rs`  - subscription scope, teardown, role changes
//! - `routing.rs`    - guard redirects driven by session changes
//! - `mutations.rs`  - gateway writes and their preconditions

mod resolution;
mod routing;

use crate::{MemoryNavigator, Navigator, Route, RuntimeOptions, Session, SessionRuntime};
use async_trait::async_trait;
use document_store::{
    AccessRules, CollectionListener, DocumentListener, DocumentSnapshot, DocumentStore, Fields,
    MemoryDocumentStore, Principal, PrincipalSource, StoreResult, Subscription,
};
use identity_client::{Identity, IdentityClient, MemoryIdentityProvider};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use webfront_model::{collections, Profile, Role};

pub(crate) const MASTER: &str = "boss@webfront.dev";
pub(crate) const PASSWORD: &str = "secret1";
const WAIT: Duration = Duration::from_secs(2);

/// Store principal follows whoever is signed in to the identity provider.
struct SignedInPrincipal(Arc<MemoryIdentityProvider>);

impl PrincipalSource for SignedInPrincipal {
    fn principal(&self) -> Principal {
        match self.0.current_identity() {
            Some(identity) => Principal::user(identity.uid, identity.email),
            None => Principal::Anonymous,
        }
    }
}

/// Records which store operations the session layer issued.
pub(crate) struct RecordingStore {
    inner: MemoryDocumentStore,
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingStore {
    fn new(inner: MemoryDocumentStore) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| **c == operation).count()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, operation: &'static str) {
        self.calls.lock().unwrap().push(operation);
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get_document(&self, collection: &str, key: &str) -> StoreResult<Option<DocumentSnapshot>> {
        self.record("get_document");
        self.inner.get_document(collection, key).await
    }

    async fn list_documents(&self, collection: &str) -> StoreResult<Vec<DocumentSnapshot>> {
        self.record("list_documents");
        self.inner.list_documents(collection).await
    }

    async fn set_document(&self, collection: &str, key: &str, data: Fields) -> StoreResult<()> {
        self.record("set_document");
        self.inner.set_document(collection, key, data).await
    }

    async fn update_document(&self, collection: &str, key: &str, fields: Fields) -> StoreResult<()> {
        self.record("update_document");
        self.inner.update_document(collection, key, fields).await
    }

    async fn delete_document(&self, collection: &str, key: &str) -> StoreResult<()> {
        self.record("delete_document");
        self.inner.delete_document(collection, key).await
    }

    async fn array_union_append(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        element: serde_json::Value,
    ) -> StoreResult<()> {
        self.record("array_union_append");
        self.inner
            .array_union_append(collection, key, field, element)
            .await
    }

    fn subscribe_document(
        &self,
        collection: &str,
        key: &str,
        listener: DocumentListener,
    ) -> StoreResult<Subscription> {
        self.inner.subscribe_document(collection, key, listener)
    }

    fn subscribe_collection(
        &self,
        collection: &str,
        listener: CollectionListener,
    ) -> StoreResult<Subscription> {
        self.inner.subscribe_collection(collection, listener)
    }
}

pub(crate) struct Harness {
    pub identity: Arc<MemoryIdentityProvider>,
    /// Service handle on the same data; bypasses access rules.
    pub backing: MemoryDocumentStore,
    pub store: Arc<RecordingStore>,
    pub navigator: Arc<MemoryNavigator>,
    pub runtime: SessionRuntime,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::build(MemoryIdentityProvider::new(), Route::Landing, WAIT)
    }

    pub(crate) fn at(route: Route) -> Self {
        Self::build(MemoryIdentityProvider::new(), route, WAIT)
    }

    /// Provider still restoring its session, user already on `route`.
    pub(crate) fn restoring_at(route: Route) -> Self {
        Self::build(MemoryIdentityProvider::restoring(), route, WAIT)
    }

    /// Provider that never reports, with a short resolution timeout.
    pub(crate) fn stalled(timeout: Duration) -> Self {
        Self::build(MemoryIdentityProvider::restoring(), Route::Landing, timeout)
    }

    fn build(provider: MemoryIdentityProvider, route: Route, timeout: Duration) -> Self {
        let identity = Arc::new(provider);
        let backing = MemoryDocumentStore::with_rules(AccessRules::new(Some(MASTER.to_string())));
        let store = Arc::new(RecordingStore::new(
            backing.connect(SignedInPrincipal(Arc::clone(&identity))),
        ));
        let navigator = Arc::new(MemoryNavigator::new(route));
        let runtime = SessionRuntime::new(
            identity.clone(),
            store.clone(),
            navigator.clone(),
            RuntimeOptions {
                master_admin_email: Some(MASTER.to_string()),
                resolve_timeout: timeout,
            },
        );
        runtime.start();
        Self {
            identity,
            backing,
            store,
            navigator,
            runtime,
        }
    }

    /// Create an identity and, unless `role` is `None` with no profile
    /// wanted, its profile document.
    pub(crate) async fn seed_account(
        &self,
        name: &str,
        email: &str,
        role: Option<Role>,
        requires_password_reset: bool,
    ) -> Identity {
        let identity = self.identity.add_account(email, PASSWORD).unwrap();
        let mut profile =
            Profile::for_new_account(&identity.uid, name, email, Role::Client, chrono::Utc::now());
        profile.role = role;
        profile.requires_password_reset = requires_password_reset;
        self.backing
            .set_document(collections::PROFILES, &identity.uid, profile.to_fields().unwrap())
            .await
            .unwrap();
        identity
    }

    pub(crate) async fn wait<P>(&self, predicate: P) -> Session
    where
        P: Fn(&Session) -> bool,
    {
        self.runtime
            .context()
            .wait_for(predicate, WAIT)
            .await
            .expect("session never reached the expected state")
    }

    /// Sign in through the gateway and wait for the session to resolve.
    pub(crate) async fn sign_in(&self, email: &str) -> Session {
        let identity = self
            .runtime
            .gateway()
            .sign_in(email, PASSWORD)
            .await
            .unwrap();
        self.wait(|s| {
            s.uid() == Some(identity.uid.as_str()) && !s.resolving && s.phase.is_settled()
        })
        .await
    }

    pub(crate) fn profile_field(&self, uid: &str, field: &str) -> Option<serde_json::Value> {
        self.backing
            .document(collections::PROFILES, uid)
            .and_then(|doc| doc.get(field).cloned())
    }
}

/// Poll `check` until it holds or two seconds pass.
pub(crate) async fn eventually<F>(check: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Basic workflow: sign up as the master admin, provision a client, and
/// watch the client list pick it up.
#[tokio::test]
async fn basic_workflow() {
    let h = Harness::new();
    h.wait(|s| !s.resolving).await;

    let gateway = h.runtime.gateway();
    let admin = gateway.sign_up("Boss", MASTER, PASSWORD).await.unwrap();

    let session = h.runtime.session();
    assert_eq!(session.uid(), Some(admin.uid.as_str()));
    assert_eq!(session.role, Some(Role::Admin));
    assert_eq!(h.navigator.current_route(), Route::Admin);

    let client = gateway
        .provision_client("Acme Ltd", "ops@acme.test")
        .await
        .unwrap();
    let session = h
        .wait(|s| s.clients.iter().any(|p| p.id == client.identity.uid))
        .await;
    assert_eq!(session.clients.len(), 2);
    assert_eq!(h.identity.current_identity(), Some(admin));
}
