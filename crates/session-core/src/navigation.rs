//! Navigation seam between the session layer and whatever renders routes.

use crate::Route;
use identity_client::Identity;
use std::sync::Mutex;
use tracing::debug;
use webfront_model::Profile;

/// State forwarded to the password-reset flow.
#[derive(Debug, Clone, PartialEq)]
pub struct PasswordResetState {
    pub identity: Identity,
    pub profile: Profile,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationRequest {
    To(Route),
    PasswordReset(PasswordResetState),
}

impl NavigationRequest {
    pub fn route(&self) -> Route {
        match self {
            NavigationRequest::To(route) => route.clone(),
            NavigationRequest::PasswordReset(_) => Route::ResetPassword,
        }
    }
}

pub trait Navigator: Send + Sync {
    fn current_route(&self) -> Route;

    fn navigate(&self, request: NavigationRequest);
}

/// Navigator that records where it has been. Backs the CLI and tests.
pub struct MemoryNavigator {
    current: Mutex<Route>,
    forwarded: Mutex<Option<PasswordResetState>>,
    history: Mutex<Vec<Route>>,
}

impl MemoryNavigator {
    pub fn new(initial: Route) -> Self {
        Self {
            current: Mutex::new(initial.clone()),
            forwarded: Mutex::new(None),
            history: Mutex::new(vec![initial]),
        }
    }

    /// State carried by the most recent password-reset navigation.
    pub fn forwarded_state(&self) -> Option<PasswordResetState> {
        self.forwarded.lock().unwrap().clone()
    }

    pub fn history(&self) -> Vec<Route> {
        self.history.lock().unwrap().clone()
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new(Route::Landing)
    }
}

impl Navigator for MemoryNavigator {
    fn current_route(&self) -> Route {
        self.current.lock().unwrap().clone()
    }

    fn navigate(&self, request: NavigationRequest) {
        let route = request.route();
        debug!(route = %route, "Navigating");
        if let NavigationRequest::PasswordReset(state) = request {
            *self.forwarded.lock().unwrap() = Some(state);
        }
        *self.current.lock().unwrap() = route.clone();
        self.history.lock().unwrap().push(route);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientTab;

    #[test]
    fn records_history_and_forwarded_state() {
        let navigator = MemoryNavigator::default();
        navigator.navigate(NavigationRequest::To(Route::Login));
        navigator.navigate(NavigationRequest::PasswordReset(PasswordResetState {
            identity: Identity::new("u1", None),
            profile: Profile::default(),
        }));

        assert_eq!(navigator.current_route(), Route::ResetPassword);
        assert_eq!(
            navigator.history(),
            vec![Route::Landing, Route::Login, Route::ResetPassword]
        );
        assert_eq!(navigator.forwarded_state().unwrap().identity.uid, "u1");

        navigator.navigate(NavigationRequest::To(Route::Dashboard(ClientTab::Overview)));
        assert_eq!(
            navigator.current_route(),
            Route::Dashboard(ClientTab::Overview)
        );
    }
}
