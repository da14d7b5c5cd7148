//! The document store contract.

use crate::{StoreResult, Subscription};
use async_trait::async_trait;
use webfront_model::Fields;

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub data: Fields,
}

impl DocumentSnapshot {
    pub fn new(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// Receives the document (or `None` once it no longer exists) on every change.
pub type DocumentListener =
    Box<dyn Fn(StoreResult<Option<DocumentSnapshot>>) + Send + Sync + 'static>;

/// Receives the full collection on every change.
pub type CollectionListener =
    Box<dyn Fn(StoreResult<Vec<DocumentSnapshot>>) + Send + Sync + 'static>;

/// Store operations.
///
/// Writes are atomic per document. Subscriptions deliver the current state
/// immediately and a full snapshot after every change until the returned
/// [`Subscription`] is unsubscribed or dropped.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> StoreResult<Option<DocumentSnapshot>>;

    /// All documents of a collection, ordered by key.
    async fn list_documents(&self, collection: &str) -> StoreResult<Vec<DocumentSnapshot>>;

    /// Create or fully replace a document.
    async fn set_document(&self, collection: &str, key: &str, data: Fields) -> StoreResult<()>;

    /// Merge top-level fields into an existing document.
    async fn update_document(
        &self,
        collection: &str,
        key: &str,
        fields: Fields,
    ) -> StoreResult<()>;

    async fn delete_document(&self, collection: &str, key: &str) -> StoreResult<()>;

    /// Add `element` to the array in `field` unless an equal element is
    /// already present.
    async fn array_union_append(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        element: serde_json::Value,
    ) -> StoreResult<()>;

    fn subscribe_document(
        &self,
        collection: &str,
        key: &str,
        listener: DocumentListener,
    ) -> StoreResult<Subscription>;

    fn subscribe_collection(
        &self,
        collection: &str,
        listener: CollectionListener,
    ) -> StoreResult<Subscription>;
}

/// Set-union append on a field map: creates the array when missing (or not an
/// array) and skips elements already present by value.
pub(crate) fn union_into(fields: &mut Fields, field: &str, element: serde_json::Value) {
    match fields.get_mut(field) {
        Some(serde_json::Value::Array(items)) => {
            if !items.contains(&element) {
                items.push(element);
            }
        }
        _ => {
            fields.insert(field.to_string(), serde_json::Value::Array(vec![element]));
        }
    }
}
