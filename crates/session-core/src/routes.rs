//! Route table.

use std::fmt;
use webfront_model::Role;

/// Tabs of the client dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientTab {
    Overview,
    Projects,
    Invoices,
    Files,
    Settings,
    Assistant,
}

impl ClientTab {
    pub const ALL: [ClientTab; 6] = [
        ClientTab::Overview,
        ClientTab::Projects,
        ClientTab::Invoices,
        ClientTab::Files,
        ClientTab::Settings,
        ClientTab::Assistant,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            ClientTab::Overview => "overview",
            ClientTab::Projects => "projects",
            ClientTab::Invoices => "invoices",
            ClientTab::Files => "files",
            ClientTab::Settings => "settings",
            ClientTab::Assistant => "assistant",
        }
    }

    fn from_slug(slug: &str) -> Option<ClientTab> {
        ClientTab::ALL.into_iter().find(|tab| tab.slug() == slug)
    }
}

/// Who may render a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Authenticated,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Landing,
    Login,
    Signup,
    ForgotPassword,
    /// Forced for provisioned accounts until a new password is set.
    ResetPassword,
    Dashboard(ClientTab),
    Admin,
    AdminClients,
    AdminClient(String),
    AdminSettings,
    NotFound(String),
}

impl Route {
    pub fn parse(path: &str) -> Route {
        let trimmed = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Route::Landing,
            ["login"] => Route::Login,
            ["signup"] => Route::Signup,
            ["forgot-password"] => Route::ForgotPassword,
            ["reset-password"] => Route::ResetPassword,
            ["dashboard"] => Route::Dashboard(ClientTab::Overview),
            ["dashboard", tab] => match ClientTab::from_slug(tab) {
                Some(tab) => Route::Dashboard(tab),
                None => Route::NotFound(path.to_string()),
            },
            ["admin"] => Route::Admin,
            ["admin", "clients"] => Route::AdminClients,
            ["admin", "clients", id] => Route::AdminClient(id.to_string()),
            ["admin", "settings"] => Route::AdminSettings,
            _ => Route::NotFound(path.to_string()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Landing => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::Signup => "/signup".to_string(),
            Route::ForgotPassword => "/forgot-password".to_string(),
            Route::ResetPassword => "/reset-password".to_string(),
            Route::Dashboard(tab) => format!("/dashboard/{}", tab.slug()),
            Route::Admin => "/admin".to_string(),
            Route::AdminClients => "/admin/clients".to_string(),
            Route::AdminClient(id) => format!("/admin/clients/{}", id),
            Route::AdminSettings => "/admin/settings".to_string(),
            Route::NotFound(path) => path.clone(),
        }
    }

    pub fn access(&self) -> RouteAccess {
        match self {
            Route::Landing
            | Route::Login
            | Route::Signup
            | Route::ForgotPassword
            | Route::NotFound(_) => RouteAccess::Public,
            Route::ResetPassword | Route::Dashboard(_) => RouteAccess::Authenticated,
            Route::Admin | Route::AdminClients | Route::AdminClient(_) | Route::AdminSettings => {
                RouteAccess::Admin
            }
        }
    }

    /// Routes a freshly resolved session may be moved away from.
    pub fn is_public_entry(&self) -> bool {
        matches!(self, Route::Landing | Route::Login | Route::Signup)
    }

    /// Landing route for a resolved role.
    pub fn default_for(role: Role) -> Route {
        match role {
            Role::Admin => Route::Admin,
            Role::Client => Route::Dashboard(ClientTab::Overview),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
