//! Route guards.
//!
//! Guards are pure functions of the session snapshot and the target route.
//! [`RouteGate`] re-evaluates them on every navigation and session change and
//! performs the redirect.

use crate::navigation::{NavigationRequest, Navigator};
use crate::{ClientTab, Route, RouteAccess, Session, SessionContext};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Resolution has not settled; render a loading state.
    Loading,
    Redirect(Route),
    Render,
}

/// Requires a resolved identity. A session that still owes a password reset
/// may only render the reset route.
pub fn authenticated_guard(session: &Session, target: &Route) -> GuardDecision {
    if session.resolving {
        return GuardDecision::Loading;
    }
    if session.identity.is_none() {
        return GuardDecision::Redirect(Route::Login);
    }
    if session.requires_password_reset && *target != Route::ResetPassword {
        return GuardDecision::Redirect(Route::ResetPassword);
    }
    GuardDecision::Render
}

/// [`authenticated_guard`], then requires the admin role.
pub fn admin_guard(session: &Session, target: &Route) -> GuardDecision {
    match authenticated_guard(session, target) {
        GuardDecision::Render if !session.is_admin() => {
            GuardDecision::Redirect(Route::Dashboard(ClientTab::Overview))
        }
        decision => decision,
    }
}

/// Pick the guard the route's access level calls for.
pub fn evaluate(session: &Session, target: &Route) -> GuardDecision {
    match target.access() {
        RouteAccess::Public => GuardDecision::Render,
        RouteAccess::Authenticated => authenticated_guard(session, target),
        RouteAccess::Admin => admin_guard(session, target),
    }
}

/// Applies guard decisions to a navigator.
pub struct RouteGate {
    context: SessionContext,
    navigator: Arc<dyn Navigator>,
}

impl RouteGate {
    pub fn new(context: SessionContext, navigator: Arc<dyn Navigator>) -> Self {
        Self { context, navigator }
    }

    /// Evaluate the current route, redirecting when the guard says so.
    pub fn enforce(&self) -> GuardDecision {
        let session = self.context.snapshot();
        let route = self.navigator.current_route();
        let decision = evaluate(&session, &route);
        if let GuardDecision::Redirect(target) = &decision {
            if *target != route {
                debug!(from = %route, to = %target, "Guard redirect");
                self.navigator
                    .navigate(NavigationRequest::To(target.clone()));
            }
        }
        decision
    }

    /// Navigate, then enforce guards on the new route.
    pub fn navigate(&self, route: Route) -> GuardDecision {
        self.navigator.navigate(NavigationRequest::To(route));
        self.enforce()
    }

    pub fn current_route(&self) -> Route {
        self.navigator.current_route()
    }
}
