//! Route guard scenarios driven by the running session.
//!
//! Behaviours covered:
//! - protected routes render a loading state while resolving
//! - a session owing a password reset cannot leave the reset route
//! - clients are sent from admin routes to their dashboard
//! - signing out on a protected route redirects to login

use super::{eventually, Harness, MASTER};
use crate::{ClientTab, GuardDecision, Navigator, Route};
use std::time::Duration;
use webfront_model::Role;

/// Guards wait for resolution instead of redirecting.
#[tokio::test]
async fn loading_while_resolving() {
    let h = Harness::stalled(Duration::from_secs(30));
    assert_eq!(
        h.runtime.navigate(Route::Dashboard(ClientTab::Projects)),
        GuardDecision::Loading
    );
    assert_eq!(
        h.navigator.current_route(),
        Route::Dashboard(ClientTab::Projects)
    );
}

/// An owed reset redirects every protected route back to the reset form.
#[tokio::test]
async fn password_reset_cannot_be_skipped() {
    let h = Harness::new();
    h.seed_account("Cal", "cal@x.com", Some(Role::Client), true).await;
    h.sign_in("cal@x.com").await;

    assert_eq!(
        h.runtime.navigate(Route::Dashboard(ClientTab::Invoices)),
        GuardDecision::Redirect(Route::ResetPassword)
    );
    assert_eq!(h.navigator.current_route(), Route::ResetPassword);
}

/// Clients never render admin routes.
#[tokio::test]
async fn client_is_kept_out_of_admin() {
    let h = Harness::new();
    h.seed_account("Cal", "cal@x.com", None, false).await;
    h.sign_in("cal@x.com").await;

    assert_eq!(
        h.runtime.navigate(Route::AdminClients),
        GuardDecision::Redirect(Route::Dashboard(ClientTab::Overview))
    );
    assert_eq!(
        h.navigator.current_route(),
        Route::Dashboard(ClientTab::Overview)
    );
}

/// Admins render admin routes, including a client's detail page.
#[tokio::test]
async fn admin_renders_admin_routes() {
    let h = Harness::new();
    let cal = h.seed_account("Cal", "cal@x.com", None, false).await;
    h.seed_account("Boss", MASTER, None, false).await;
    h.sign_in(MASTER).await;

    assert_eq!(
        h.runtime.navigate(Route::AdminClient(cal.uid.clone())),
        GuardDecision::Render
    );
}

/// Losing the session on a protected route sends the user to login.
#[tokio::test]
async fn sign_out_redirects_to_login() {
    let h = Harness::new();
    h.seed_account("Cal", "cal@x.com", None, false).await;
    h.sign_in("cal@x.com").await;
    assert_eq!(
        h.navigator.current_route(),
        Route::Dashboard(ClientTab::Overview)
    );

    h.runtime.gateway().sign_out().await.unwrap();
    assert!(eventually(|| h.navigator.current_route() == Route::Login).await);
}
