//! Supabase PostgREST document store.
//!
//! Each collection is a table of `(id text primary key, data jsonb)` rows.
//! Partial updates and set-union appends run server-side through two RPC
//! functions so they stay atomic per row:
//!
//! ```sql
//! merge_document(p_collection text, p_id text, p_patch jsonb) returns boolean
//! array_union_append(p_collection text, p_id text, p_field text, p_element jsonb) returns boolean
//! ```
//!
//! Both return `false` when the row does not exist. Subscriptions poll the
//! table and deliver a snapshot whenever the fetched data changes.

use crate::{
    CollectionListener, DocumentListener, DocumentSnapshot, DocumentStore, StoreError,
    StoreResult, Subscription,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use webfront_model::Fields;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Supplies the bearer token for each request; `None` falls back to the
/// publishable key (anonymous access).
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct Row {
    id: String,
    #[serde(default)]
    data: Fields,
}

impl From<Row> for DocumentSnapshot {
    fn from(row: Row) -> Self {
        DocumentSnapshot::new(row.id, row.data)
    }
}

#[derive(Debug, Serialize)]
struct RowUpsert<'a> {
    id: &'a str,
    data: &'a Fields,
}

#[derive(Clone)]
pub struct SupabaseDocumentStore {
    http_client: reqwest::Client,
    api_url: String,
    anon_key: String,
    tokens: Option<Arc<dyn TokenSource>>,
    poll_interval: Duration,
}

impl SupabaseDocumentStore {
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            tokens: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    fn row_url(&self, table: &str, key: &str) -> String {
        format!("{}?id=eq.{}", self.rest_url(table), encode_filter_value(key))
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.api_url, function)
    }

    fn bearer(&self) -> String {
        let token = self
            .tokens
            .as_ref()
            .and_then(|tokens| tokens.access_token())
            .unwrap_or_else(|| self.anon_key.clone());
        format!("Bearer {}", token)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer())
    }

    async fn fetch_rows(&self, url: &str) -> StoreResult<Vec<DocumentSnapshot>> {
        let response = self
            .request(reqwest::Method::GET, url)
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = check_response(response).await?;
        let rows: Vec<Row> = response.json().await?;
        Ok(rows.into_iter().map(DocumentSnapshot::from).collect())
    }

    async fn fetch_document(
        &self,
        collection: &str,
        key: &str,
    ) -> StoreResult<Option<DocumentSnapshot>> {
        let url = format!("{}&select=id,data", self.row_url(collection, key));
        Ok(self.fetch_rows(&url).await?.into_iter().next())
    }

    async fn fetch_collection(&self, collection: &str) -> StoreResult<Vec<DocumentSnapshot>> {
        let url = format!("{}?select=id,data&order=id.asc", self.rest_url(collection));
        self.fetch_rows(&url).await
    }

    /// Call a row-level RPC; `false` means the row was missing.
    async fn rpc_on_row(
        &self,
        function: &str,
        collection: &str,
        key: &str,
        body: serde_json::Value,
    ) -> StoreResult<()> {
        let response = self
            .request(reqwest::Method::POST, &self.rpc_url(function))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        let response = check_response(response).await?;
        let found: bool = response.json().await?;
        if !found {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Spawn a polling task delivering `fetch` results through `deliver`
    /// whenever they change. Errors are delivered once per failure streak.
    fn spawn_poller<T, F, Fut, D>(&self, fetch: F, deliver: D) -> StoreResult<Subscription>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(SupabaseDocumentStore) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = StoreResult<T>> + Send,
        D: Fn(StoreResult<T>) + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StoreError::Unavailable(format!("no async runtime: {}", e)))?;

        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();
        let store = self.clone();
        let interval = self.poll_interval;

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last: Option<T> = None;
            let mut failing = false;
            loop {
                ticker.tick().await;
                let result = fetch(store.clone()).await;
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                match result {
                    Ok(current) => {
                        failing = false;
                        if last.as_ref() != Some(&current) {
                            last = Some(current.clone());
                            deliver(Ok(current));
                        }
                    }
                    Err(e) => {
                        if !failing {
                            warn!(error = %e, "Subscription poll failed");
                            failing = true;
                            deliver(Err(e));
                        }
                    }
                }
            }
            debug!("Subscription poller stopped");
        });

        Ok(Subscription::new(active, move || handle.abort()))
    }
}

#[async_trait]
impl DocumentStore for SupabaseDocumentStore {
    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> StoreResult<Option<DocumentSnapshot>> {
        self.fetch_document(collection, key).await
    }

    async fn list_documents(&self, collection: &str) -> StoreResult<Vec<DocumentSnapshot>> {
        self.fetch_collection(collection).await
    }

    async fn set_document(&self, collection: &str, key: &str, data: Fields) -> StoreResult<()> {
        let response = self
            .request(reqwest::Method::POST, &self.rest_url(collection))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates")
            .json(&RowUpsert { id: key, data: &data })
            .send()
            .await?;
        check_response(response).await?;
        debug!(collection, key, "Document written");
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        key: &str,
        fields: Fields,
    ) -> StoreResult<()> {
        self.rpc_on_row(
            "merge_document",
            collection,
            key,
            serde_json::json!({
                "p_collection": collection,
                "p_id": key,
                "p_patch": fields,
            }),
        )
        .await
    }

    async fn delete_document(&self, collection: &str, key: &str) -> StoreResult<()> {
        let response = self
            .request(reqwest::Method::DELETE, &self.row_url(collection, key))
            .send()
            .await?;
        check_response(response).await?;
        debug!(collection, key, "Document deleted");
        Ok(())
    }

    async fn array_union_append(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        element: serde_json::Value,
    ) -> StoreResult<()> {
        self.rpc_on_row(
            "array_union_append",
            collection,
            key,
            serde_json::json!({
                "p_collection": collection,
                "p_id": key,
                "p_field": field,
                "p_element": element,
            }),
        )
        .await
    }

    fn subscribe_document(
        &self,
        collection: &str,
        key: &str,
        listener: DocumentListener,
    ) -> StoreResult<Subscription> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.spawn_poller(
            move |store| {
                let collection = collection.clone();
                let key = key.clone();
                async move { store.fetch_document(&collection, &key).await }
            },
            listener,
        )
    }

    fn subscribe_collection(
        &self,
        collection: &str,
        listener: CollectionListener,
    ) -> StoreResult<Subscription> {
        let collection = collection.to_string();
        self.spawn_poller(
            move |store| {
                let collection = collection.clone();
                async move { store.fetch_collection(&collection).await }
            },
            listener,
        )
    }
}

impl std::fmt::Debug for SupabaseDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseDocumentStore")
            .field("api_url", &self.api_url)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

async fn check_response(response: reqwest::Response) -> StoreResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(status = %status, "Supabase request failed");
    Err(classify_error(status.as_u16(), body))
}

fn classify_error(status: u16, body: String) -> StoreError {
    match status {
        401 | 403 => StoreError::permission_denied("request", body),
        503 => StoreError::Unavailable(body),
        _ => StoreError::Supabase {
            status,
            message: body,
        },
    }
}

/// Percent-encode characters PostgREST treats specially in filter values.
fn encode_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
