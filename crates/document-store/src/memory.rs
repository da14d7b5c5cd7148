//! In-process document store.
//!
//! All handles created from one store share the same collections and
//! listeners; each handle carries its own [`PrincipalSource`] that the access
//! rules are evaluated against. Listeners run on the writer's task after the
//! store lock is released, so a listener may call back into the store.

use crate::rules::{AccessRequest, AccessRules, Operation, Principal, PrincipalSource};
use crate::store::union_into;
use crate::{
    CollectionListener, DocumentListener, DocumentSnapshot, DocumentStore, StoreError,
    StoreResult, Subscription,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use webfront_model::{collections, Fields};

/// Injectable store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    InternalConsistency,
    Unavailable,
}

impl Fault {
    fn to_error(self) -> StoreError {
        match self {
            Fault::InternalConsistency => StoreError::InternalConsistency(
                "INTERNAL ASSERTION FAILED: Unexpected state".to_string(),
            ),
            Fault::Unavailable => StoreError::Unavailable("injected outage".to_string()),
        }
    }
}

enum Target {
    Document { collection: String, key: String },
    Collection { collection: String },
}

enum Callback {
    Document(DocumentListener),
    Collection(CollectionListener),
}

struct ListenerEntry {
    id: u64,
    target: Target,
    callback: Callback,
    active: Arc<AtomicBool>,
    /// Highest store version delivered; older snapshots are dropped.
    delivered: AtomicU64,
}

impl ListenerEntry {
    fn watches(&self, collection: &str, key: &str) -> bool {
        match &self.target {
            Target::Document {
                collection: c,
                key: k,
            } => c == collection && k == key,
            Target::Collection { collection: c } => c == collection,
        }
    }
}

enum Payload {
    Document(Option<DocumentSnapshot>),
    Collection(Vec<DocumentSnapshot>),
}

struct Delivery {
    entry: Arc<ListenerEntry>,
    payload: Payload,
    version: u64,
}

impl Delivery {
    fn run(self) {
        if !self.entry.active.load(Ordering::SeqCst) {
            return;
        }
        if self.entry.delivered.fetch_max(self.version, Ordering::SeqCst) >= self.version {
            return;
        }
        match (&self.entry.callback, self.payload) {
            (Callback::Document(listener), Payload::Document(doc)) => listener(Ok(doc)),
            (Callback::Collection(listener), Payload::Collection(docs)) => listener(Ok(docs)),
            _ => {}
        }
    }
}

struct State {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    listeners: Vec<Arc<ListenerEntry>>,
    version: u64,
}

impl State {
    fn document(&self, collection: &str, key: &str) -> Option<&Fields> {
        self.collections.get(collection)?.get(key)
    }

    fn snapshot(&self, collection: &str, key: &str) -> Option<DocumentSnapshot> {
        self.document(collection, key)
            .map(|data| DocumentSnapshot::new(key, data.clone()))
    }

    fn collection(&self, collection: &str) -> Vec<DocumentSnapshot> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(key, data)| DocumentSnapshot::new(key.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn caller_profile(&self, principal: &Principal) -> Option<Fields> {
        principal
            .uid()
            .and_then(|uid| self.document(collections::PROFILES, uid))
            .cloned()
    }

    fn payload_for(&self, entry: &ListenerEntry) -> Payload {
        match &entry.target {
            Target::Document { collection, key } => Payload::Document(self.snapshot(collection, key)),
            Target::Collection { collection } => Payload::Collection(self.collection(collection)),
        }
    }

    fn deliveries(&self, collection: &str, key: &str) -> Vec<Delivery> {
        self.listeners
            .iter()
            .filter(|entry| entry.watches(collection, key))
            .map(|entry| Delivery {
                entry: entry.clone(),
                payload: self.payload_for(entry),
                version: self.version,
            })
            .collect()
    }
}

enum Mutation {
    Set(Fields),
    Update(Fields),
    Delete,
    ArrayUnion {
        field: String,
        element: serde_json::Value,
    },
}

impl Mutation {
    /// Fields presented to the access rules.
    fn incoming(&self) -> Option<Fields> {
        match self {
            Mutation::Set(data) | Mutation::Update(data) => Some(data.clone()),
            Mutation::Delete => None,
            Mutation::ArrayUnion { field, element } => {
                let mut patch = Fields::new();
                patch.insert(
                    field.clone(),
                    serde_json::Value::Array(vec![element.clone()]),
                );
                Some(patch)
            }
        }
    }

    /// Operation class and resulting document (`None` = deleted).
    fn apply(
        self,
        collection: &str,
        key: &str,
        existing: Option<&Fields>,
    ) -> StoreResult<(Operation, Option<Fields>)> {
        let not_found = || StoreError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        };
        match self {
            Mutation::Set(data) => {
                let operation = if existing.is_some() {
                    Operation::Update
                } else {
                    Operation::Create
                };
                Ok((operation, Some(data)))
            }
            Mutation::Update(patch) => {
                let mut doc = existing.cloned().ok_or_else(not_found)?;
                doc.extend(patch);
                Ok((Operation::Update, Some(doc)))
            }
            Mutation::Delete => Ok((Operation::Delete, None)),
            Mutation::ArrayUnion { field, element } => {
                let mut doc = existing.cloned().ok_or_else(not_found)?;
                union_into(&mut doc, &field, element);
                Ok((Operation::Update, Some(doc)))
            }
        }
    }
}

struct Inner {
    rules: AccessRules,
    state: Mutex<State>,
    next_listener_id: AtomicU64,
    writes: AtomicUsize,
    read_fault: Mutex<Option<Fault>>,
    write_fault: Mutex<Option<Fault>>,
}

/// Shared in-process store handle.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<Inner>,
    principal: Arc<dyn PrincipalSource>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    /// Empty store accessed as the service principal.
    pub fn new() -> Self {
        Self::with_rules(AccessRules::default())
    }

    pub fn with_rules(rules: AccessRules) -> Self {
        Self {
            inner: Arc::new(Inner {
                rules,
                state: Mutex::new(State {
                    collections: HashMap::new(),
                    listeners: Vec::new(),
                    version: 1,
                }),
                next_listener_id: AtomicU64::new(1),
                writes: AtomicUsize::new(0),
                read_fault: Mutex::new(None),
                write_fault: Mutex::new(None),
            }),
            principal: Arc::new(Principal::Service),
        }
    }

    /// Handle on the same data acting as `principal`.
    pub fn connect(&self, principal: impl PrincipalSource + 'static) -> Self {
        self.connect_with(Arc::new(principal))
    }

    pub fn connect_with(&self, principal: Arc<dyn PrincipalSource>) -> Self {
        Self {
            inner: self.inner.clone(),
            principal,
        }
    }

    pub fn principal(&self) -> Principal {
        self.principal.principal()
    }

    /// Fail every read (`get`/`list`) until cleared.
    pub fn set_read_fault(&self, fault: Option<Fault>) {
        *self.inner.read_fault.lock().unwrap() = fault;
    }

    /// Fail every write until cleared.
    pub fn set_write_fault(&self, fault: Option<Fault>) {
        *self.inner.write_fault.lock().unwrap() = fault;
    }

    /// Deliver an error to every active listener on `collection`.
    pub fn fail_subscriptions(&self, collection: &str, fault: Fault) {
        let entries: Vec<Arc<ListenerEntry>> = {
            let state = self.inner.state.lock().unwrap();
            state
                .listeners
                .iter()
                .filter(|entry| match &entry.target {
                    Target::Document { collection: c, .. } => c == collection,
                    Target::Collection { collection: c } => c == collection,
                })
                .cloned()
                .collect()
        };
        for entry in entries {
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            match &entry.callback {
                Callback::Document(listener) => listener(Err(fault.to_error())),
                Callback::Collection(listener) => listener(Err(fault.to_error())),
            }
        }
    }

    /// Registered listeners across all handles.
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().unwrap().listeners.len()
    }

    /// Write attempts that reached the store (successful or not).
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Current contents of a collection, bypassing rules and faults.
    pub fn documents(&self, collection: &str) -> Vec<DocumentSnapshot> {
        self.inner.state.lock().unwrap().collection(collection)
    }

    /// One document, bypassing rules and faults.
    pub fn document(&self, collection: &str, key: &str) -> Option<Fields> {
        self.inner
            .state
            .lock()
            .unwrap()
            .document(collection, key)
            .cloned()
    }

    fn check_fault(slot: &Mutex<Option<Fault>>) -> StoreResult<()> {
        match *slot.lock().unwrap() {
            Some(fault) => Err(fault.to_error()),
            None => Ok(()),
        }
    }

    fn authorize(&self, state: &State, principal: &Principal, request: AccessRequest<'_>) -> StoreResult<()> {
        if principal.is_service() {
            return Ok(());
        }
        let caller = state.caller_profile(principal);
        if self.inner.rules.allows(principal, caller.as_ref(), &request) {
            Ok(())
        } else {
            let path = match request.key {
                Some(key) => format!("{}/{}", request.collection, key),
                None => request.collection.to_string(),
            };
            debug!(operation = %request.operation, path = %path, "Access denied");
            Err(StoreError::permission_denied(request.operation, path))
        }
    }

    fn commit(&self, collection: &str, key: &str, mutation: Mutation) -> StoreResult<()> {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Self::check_fault(&self.inner.write_fault)?;
        let principal = self.principal.principal();
        let incoming = mutation.incoming();

        let deliveries = {
            let mut state = self.inner.state.lock().unwrap();
            let existing = state.document(collection, key).cloned();
            let (operation, next) = mutation.apply(collection, key, existing.as_ref())?;
            self.authorize(
                &state,
                &principal,
                AccessRequest {
                    operation,
                    collection,
                    key: Some(key),
                    existing: existing.as_ref(),
                    incoming: incoming.as_ref(),
                },
            )?;

            let docs = state.collections.entry(collection.to_string()).or_default();
            match next {
                Some(doc) => {
                    docs.insert(key.to_string(), doc);
                }
                None => {
                    docs.remove(key);
                }
            }
            state.version += 1;
            state.deliveries(collection, key)
        };

        for delivery in deliveries {
            delivery.run();
        }
        Ok(())
    }

    fn register(
        &self,
        target: Target,
        callback: Callback,
        operation: Operation,
        collection: &str,
        key: Option<&str>,
    ) -> StoreResult<Subscription> {
        let principal = self.principal.principal();
        let active = Arc::new(AtomicBool::new(true));
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);

        let initial = {
            let mut state = self.inner.state.lock().unwrap();
            let existing = key.and_then(|key| state.document(collection, key));
            self.authorize(
                &state,
                &principal,
                AccessRequest {
                    operation,
                    collection,
                    key,
                    existing,
                    incoming: None,
                },
            )?;

            let entry = Arc::new(ListenerEntry {
                id,
                target,
                callback,
                active: active.clone(),
                delivered: AtomicU64::new(0),
            });
            let initial = Delivery {
                entry: entry.clone(),
                payload: state.payload_for(&entry),
                version: state.version,
            };
            state.listeners.push(entry);
            initial
        };
        initial.run();

        let inner = Arc::downgrade(&self.inner);
        Ok(Subscription::new(active, move || {
            if let Some(inner) = inner.upgrade() {
                let mut state = inner.state.lock().unwrap();
                state.listeners.retain(|entry| entry.id != id);
            }
        }))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> StoreResult<Option<DocumentSnapshot>> {
        Self::check_fault(&self.inner.read_fault)?;
        let principal = self.principal.principal();
        let state = self.inner.state.lock().unwrap();
        let existing = state.document(collection, key);
        self.authorize(
            &state,
            &principal,
            AccessRequest {
                operation: Operation::Get,
                collection,
                key: Some(key),
                existing,
                incoming: None,
            },
        )?;
        Ok(state.snapshot(collection, key))
    }

    async fn list_documents(&self, collection: &str) -> StoreResult<Vec<DocumentSnapshot>> {
        Self::check_fault(&self.inner.read_fault)?;
        let principal = self.principal.principal();
        let state = self.inner.state.lock().unwrap();
        self.authorize(
            &state,
            &principal,
            AccessRequest {
                operation: Operation::List,
                collection,
                key: None,
                existing: None,
                incoming: None,
            },
        )?;
        Ok(state.collection(collection))
    }

    async fn set_document(&self, collection: &str, key: &str, data: Fields) -> StoreResult<()> {
        self.commit(collection, key, Mutation::Set(data))
    }

    async fn update_document(
        &self,
        collection: &str,
        key: &str,
        fields: Fields,
    ) -> StoreResult<()> {
        self.commit(collection, key, Mutation::Update(fields))
    }

    async fn delete_document(&self, collection: &str, key: &str) -> StoreResult<()> {
        self.commit(collection, key, Mutation::Delete)
    }

    async fn array_union_append(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        element: serde_json::Value,
    ) -> StoreResult<()> {
        self.commit(
            collection,
            key,
            Mutation::ArrayUnion {
                field: field.to_string(),
                element,
            },
        )
    }

    fn subscribe_document(
        &self,
        collection: &str,
        key: &str,
        listener: DocumentListener,
    ) -> StoreResult<Subscription> {
        self.register(
            Target::Document {
                collection: collection.to_string(),
                key: key.to_string(),
            },
            Callback::Document(listener),
            Operation::Get,
            collection,
            Some(key),
        )
    }

    fn subscribe_collection(
        &self,
        collection: &str,
        listener: CollectionListener,
    ) -> StoreResult<Subscription> {
        self.register(
            Target::Collection {
                collection: collection.to_string(),
            },
            Callback::Collection(listener),
            Operation::List,
            collection,
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn rules() -> AccessRules {
        AccessRules::new(Some("admin@x.com".to_string()))
    }

    #[tokio::test]
    async fn test_set_get_update_delete() {
        let store = MemoryDocumentStore::new();
        store
            .set_document("users", "u1", doc(json!({"name": "Ada", "progress": 0})))
            .await
            .unwrap();
        store
            .update_document("users", "u1", doc(json!({"progress": 40})))
            .await
            .unwrap();

        let snapshot = store.get_document("users", "u1").await.unwrap().unwrap();
        assert_eq!(snapshot.data["name"], json!("Ada"));
        assert_eq!(snapshot.data["progress"], json!(40));

        store.delete_document("users", "u1").await.unwrap();
        assert!(store.get_document("users", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = MemoryDocumentStore::new();
        let err = store
            .update_document("users", "nope", doc(json!({"a": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let err = store
            .array_union_append("users", "nope", "activity", json!({"a": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_array_union_is_duplicate_safe() {
        let store = MemoryDocumentStore::new();
        store
            .set_document("users", "u1", doc(json!({"activity": []})))
            .await
            .unwrap();

        let entry = json!({"action": "Login", "date": "d", "status": "completed"});
        store
            .array_union_append("users", "u1", "activity", entry.clone())
            .await
            .unwrap();
        store
            .array_union_append("users", "u1", "activity", entry.clone())
            .await
            .unwrap();

        assert_eq!(store.document("users", "u1").unwrap()["activity"], json!([entry]));
    }

    #[tokio::test]
    async fn test_collection_subscription_initial_and_updates() {
        let store = MemoryDocumentStore::new();
        store.set_document("users", "a", Fields::new()).await.unwrap();
        store.set_document("users", "b", Fields::new()).await.unwrap();

        let sizes = Arc::new(Mutex::new(Vec::new()));
        let seen = sizes.clone();
        let sub = store
            .subscribe_collection(
                "users",
                Box::new(move |result| seen.lock().unwrap().push(result.unwrap().len())),
            )
            .unwrap();

        store.set_document("users", "c", Fields::new()).await.unwrap();
        assert_eq!(*sizes.lock().unwrap(), vec![2, 3]);

        sub.unsubscribe();
        store.set_document("users", "d", Fields::new()).await.unwrap();
        assert_eq!(*sizes.lock().unwrap(), vec![2, 3]);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_document_subscription_sees_deletion() {
        let store = MemoryDocumentStore::new();
        store
            .set_document("users", "u1", doc(json!({"name": "A"})))
            .await
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store
            .subscribe_document(
                "users",
                "u1",
                Box::new(move |result| sink.lock().unwrap().push(result.unwrap().is_some())),
            )
            .unwrap();

        store.set_document("users", "other", Fields::new()).await.unwrap();
        store.delete_document("users", "u1").await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_client_cannot_subscribe_to_collection() {
        let store = MemoryDocumentStore::with_rules(rules());
        store
            .set_document("users", "c1", doc(json!({"role": "client"})))
            .await
            .unwrap();

        let client = store.connect(Principal::user("c1", Some("c@x.com".into())));
        let err = client
            .subscribe_collection("users", Box::new(|_| {}))
            .unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(store.listener_count(), 0);

        assert!(client
            .subscribe_document("users", "c1", Box::new(|_| {}))
            .is_ok());
    }

    #[tokio::test]
    async fn test_document_subscription_is_rule_checked() {
        let store = MemoryDocumentStore::with_rules(rules());
        store
            .set_document("users", "c1", doc(json!({"role": "client"})))
            .await
            .unwrap();
        store
            .set_document("users", "c2", doc(json!({"role": "client", "name": "Bo"})))
            .await
            .unwrap();

        let client = store.connect(Principal::user("c1", Some("c@x.com".into())));
        let err = client
            .subscribe_document("users", "c2", Box::new(|_| {}))
            .unwrap_err();
        assert!(err.is_permission_denied());

        let admin = store.connect(Principal::user("a1", Some("admin@x.com".into())));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = admin
            .subscribe_document(
                "users",
                "c2",
                Box::new(move |result| sink.lock().unwrap().push(result.unwrap().is_some())),
            )
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![true]);
        assert_eq!(store.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_client_cannot_escalate_role() {
        let store = MemoryDocumentStore::with_rules(rules());
        let client = store.connect(Principal::user("c1", Some("c@x.com".into())));

        client
            .set_document("users", "c1", doc(json!({"role": "client", "name": "C"})))
            .await
            .unwrap();
        let err = client
            .update_document("users", "c1", doc(json!({"role": "admin"})))
            .await
            .unwrap_err();
        assert!(err.is_permission_denied());

        client
            .update_document("users", "c1", doc(json!({"name": "Renamed"})))
            .await
            .unwrap();
        assert_eq!(store.document("users", "c1").unwrap()["role"], json!("client"));
    }

    #[tokio::test]
    async fn test_faults() {
        let store = MemoryDocumentStore::new();
        store.set_read_fault(Some(Fault::InternalConsistency));
        let err = store.get_document("users", "u1").await.unwrap_err();
        assert!(err.is_internal_consistency());
        store.set_read_fault(None);
        assert!(store.get_document("users", "u1").await.unwrap().is_none());

        store.set_write_fault(Some(Fault::Unavailable));
        let err = store
            .set_document("users", "u1", Fields::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_subscriptions_reaches_listeners() {
        let store = MemoryDocumentStore::new();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        let _sub = store
            .subscribe_collection(
                "users",
                Box::new(move |result| {
                    if result.is_err() {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .unwrap();

        store.fail_subscriptions("users", Fault::Unavailable);
        store.fail_subscriptions("settings", Fault::Unavailable);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_both_entries() {
        let store = MemoryDocumentStore::new();
        store
            .set_document("users", "u1", doc(json!({"activity": []})))
            .await
            .unwrap();

        let a = store.clone();
        let b = store.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move {
                a.array_union_append("users", "u1", "activity", json!({"action": "A"}))
                    .await
            }),
            tokio::spawn(async move {
                b.array_union_append("users", "u1", "activity", json!({"action": "B"}))
                    .await
            }),
        );
        ra.unwrap().unwrap();
        rb.unwrap().unwrap();

        let activity = store.document("users", "u1").unwrap()["activity"].clone();
        let entries = activity.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&json!({"action": "A"})));
        assert!(entries.contains(&json!({"action": "B"})));
    }
}
