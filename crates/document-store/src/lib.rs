//! Document store clients for WebFront.
//!
//! The store holds schemaless JSON documents grouped in collections and keyed
//! by string. Besides point reads and writes it offers live subscriptions on a
//! single document or a whole collection; every subscription receives the
//! current state first and a full snapshot after every change.
//!
//! Two backends implement [`DocumentStore`]:
//! - [`MemoryDocumentStore`], in-process, with the access-rule simulator
//! - [`SupabaseDocumentStore`], PostgREST tables with polling subscriptions

mod error;
mod memory;
mod rules;
mod store;
mod subscription;
mod supabase;

pub use error::{StoreError, StoreResult};
pub use memory::{Fault, MemoryDocumentStore};
pub use rules::{AccessRequest, AccessRules, Operation, Principal, PrincipalSource};
pub use store::{CollectionListener, DocumentListener, DocumentSnapshot, DocumentStore};
pub use subscription::Subscription;
pub use supabase::{SupabaseDocumentStore, TokenSource};
pub use webfront_model::Fields;
