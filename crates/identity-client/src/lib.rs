//! Identity provider clients for WebFront.
//!
//! This crate provides:
//! - The [`IdentityClient`] contract consumed by the session layer
//! - A Supabase GoTrue implementation with an explicit auth state machine
//! - An in-process implementation used by tests and local runs
//!
//! Authentication state is published through a `tokio::sync::watch` channel,
//! so late subscribers always observe the latest state first.

mod auth_fsm;
mod client;
mod error;
mod memory;
mod supabase;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState};
pub use client::{Identity, IdentityClient, IdentityState};
pub use error::{IdentityError, IdentityResult};
pub use memory::{MemoryIdentityProvider, MIN_PASSWORD_LEN};
pub use supabase::SupabaseIdentityClient;
