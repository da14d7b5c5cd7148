//! Session resolution scenarios.
//!
//! Behaviours covered:
//! - the master admin resolves to admin whatever its stored role says
//! - other identities take their stored role, defaulting to client
//! - a signed-in identity without a profile degrades to no session
//! - corrupted local state raises the cache-clear alert; other store
//!   failures only log
//! - a provider that never reports still stops `resolving` after the timeout
//! - an owed password reset forces the reset route with forwarded state
//! - resolution never moves a user away from a deep link

use super::{Harness, MASTER, PASSWORD};
use crate::{ClientTab, Navigator, ResolutionPhase, Route, CACHE_CLEAR_ALERT};
use document_store::Fault;
use identity_client::IdentityClient;
use std::time::Duration;
use webfront_model::Role;

/// The master admin is admin even when its document says client.
#[tokio::test]
async fn master_admin_overrides_stored_role() {
    let h = Harness::new();
    h.seed_account("Boss", MASTER, Some(Role::Client), false).await;

    let session = h.sign_in(MASTER).await;
    assert_eq!(session.role, Some(Role::Admin));
    assert_eq!(session.phase, ResolutionPhase::Active);
    assert_eq!(h.navigator.current_route(), Route::Admin);
}

/// Non-master identities use the stored role.
#[tokio::test]
async fn stored_role_is_used() {
    let h = Harness::new();
    h.seed_account("Ann", "ann@x.com", Some(Role::Admin), false).await;
    h.seed_account("Cal", "cal@x.com", None, false).await;

    let session = h.sign_in("ann@x.com").await;
    assert_eq!(session.role, Some(Role::Admin));

    h.runtime.gateway().sign_out().await.unwrap();
    h.wait(|s| s.identity.is_none()).await;

    let session = h.sign_in("cal@x.com").await;
    assert_eq!(session.role, Some(Role::Client));
    assert_eq!(session.profile.as_ref().unwrap().name, "Cal");
    assert!(session.clients.is_empty());
}

/// A profile-less identity resolves to no session without an alert.
#[tokio::test]
async fn missing_profile_clears_session() {
    let h = Harness::new();
    h.wait(|s| !s.resolving).await;
    let identity = h.identity.add_account("ghost@x.com", PASSWORD).unwrap();
    h.identity.sign_in("ghost@x.com", PASSWORD).await.unwrap();

    h.runtime.resolver().resolve(identity).await;

    let session = h.runtime.session();
    assert!(session.identity.is_none());
    assert!(session.role.is_none());
    assert!(session.profile.is_none());
    assert!(!session.resolving);
    assert!(session.alert.is_none());
    assert_eq!(session.phase, ResolutionPhase::SignedOut);
}

/// Corrupted local state surfaces the blocking alert.
#[tokio::test]
async fn internal_consistency_failure_alerts() {
    let h = Harness::new();
    h.wait(|s| !s.resolving).await;
    let identity = h.seed_account("Cal", "cal@x.com", None, false).await;
    h.identity.sign_in("cal@x.com", PASSWORD).await.unwrap();

    h.backing.set_read_fault(Some(Fault::InternalConsistency));
    h.runtime.resolver().resolve(identity).await;

    let session = h.runtime.session();
    assert_eq!(session.alert.as_deref(), Some(CACHE_CLEAR_ALERT));
    assert!(session.identity.is_none());
    assert!(!session.resolving);

    h.runtime.resolver().dismiss_alert();
    assert!(h.runtime.session().alert.is_none());
}

/// Other fetch failures degrade silently.
#[tokio::test]
async fn unavailable_store_degrades_without_alert() {
    let h = Harness::new();
    h.wait(|s| !s.resolving).await;
    let identity = h.seed_account("Cal", "cal@x.com", None, false).await;
    h.identity.sign_in("cal@x.com", PASSWORD).await.unwrap();

    h.backing.set_read_fault(Some(Fault::Unavailable));
    h.runtime.resolver().resolve(identity).await;

    let session = h.runtime.session();
    assert!(session.alert.is_none());
    assert!(session.identity.is_none());
    assert!(!session.resolving);
}

/// A provider that never reports cannot leave guards loading forever.
#[tokio::test]
async fn resolution_times_out() {
    let h = Harness::stalled(Duration::from_millis(50));
    assert!(h.runtime.session().resolving);

    let session = h.wait(|s| !s.resolving).await;
    assert!(session.identity.is_none());
    assert_eq!(session.phase, ResolutionPhase::SignedOut);
}

/// A provisioned account lands on the reset route carrying its identity.
#[tokio::test]
async fn owed_password_reset_forces_reset_route() {
    let h = Harness::new();
    let identity = h
        .seed_account("Cal", "cal@x.com", Some(Role::Client), true)
        .await;

    let session = h.sign_in("cal@x.com").await;
    assert!(session.requires_password_reset);
    assert_eq!(session.phase, ResolutionPhase::AwaitingPasswordReset);
    assert_eq!(h.navigator.current_route(), Route::ResetPassword);

    let forwarded = h.navigator.forwarded_state().unwrap();
    assert_eq!(forwarded.identity, identity);
    assert_eq!(forwarded.profile.id, identity.uid);
}

/// The master admin never owes a password reset.
#[tokio::test]
async fn master_admin_skips_password_reset() {
    let h = Harness::new();
    h.seed_account("Boss", MASTER, Some(Role::Admin), true).await;

    let session = h.sign_in(MASTER).await;
    assert!(!session.requires_password_reset);
    assert_eq!(h.navigator.current_route(), Route::Admin);
    assert!(h.navigator.forwarded_state().is_none());
}

/// Resolving on a deep link keeps the user there.
#[tokio::test]
async fn deep_link_is_preserved() {
    let h = Harness::restoring_at(Route::Dashboard(ClientTab::Invoices));
    h.seed_account("Cal", "cal@x.com", None, false).await;

    h.sign_in("cal@x.com").await;
    assert_eq!(
        h.navigator.current_route(),
        Route::Dashboard(ClientTab::Invoices)
    );
}
