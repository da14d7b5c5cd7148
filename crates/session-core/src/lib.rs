//! Session layer for the WebFront client portal.
//!
//! This crate provides:
//! - [`SessionResolver`]: identity-provider events to a resolved [`Session`]
//! - [`LiveDataSynchronizer`]: role-scoped live subscriptions
//! - Route guards and the [`RouteGate`] that enforces them
//! - [`MutationGateway`]: every write, each respecting the access rules
//! - [`SessionRuntime`]: the tasks tying these together
//!
//! The session is published through a `tokio::sync::watch` channel held by
//! [`SessionContext`]; the resolver and the synchronizer are its only writers.

mod error;
mod gateway;
mod guards;
mod navigation;
mod resolver;
mod routes;
mod runtime;
mod session_fsm;
mod state;
mod sync;

#[cfg(test)]
mod tests;

pub use error::{ErrorClass, SessionError, SessionResult, CACHE_CLEAR_ALERT};
pub use gateway::{MutationGateway, ProfileUpdate, ProjectUpdate, ProvisionedClient};
pub use guards::{admin_guard, authenticated_guard, evaluate, GuardDecision, RouteGate};
pub use navigation::{MemoryNavigator, NavigationRequest, Navigator, PasswordResetState};
pub use resolver::{ProvisioningGuard, SessionResolver};
pub use routes::{ClientTab, Route, RouteAccess};
pub use runtime::{RuntimeOptions, SessionRuntime};
pub use session_fsm::session_machine;
pub use session_fsm::{ResolutionPhase, SessionMachine, SessionMachineInput, SessionMachineState};
pub use state::{Session, SessionContext};
pub use sync::{LiveDataSynchronizer, SyncScope};
