//! Access-rule simulator.
//!
//! Mirrors the rules deployed with the hosted store so the in-process backend
//! rejects the same reads and writes:
//!
//! - profiles: a principal reads its own document, admins read any; only
//!   admins list the collection; a principal creates its own document but may
//!   only claim `admin` when it is the master admin; non-admins never change
//!   `role`; admins write any profile
//! - settings: readable by anyone, writable by admins
//! - anything else: denied
//!
//! The service principal (server-side functions) bypasses every rule.

use std::sync::Arc;
use webfront_model::{collections, fields, is_master_admin, Fields, Role};

/// Who is performing a store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User { uid: String, email: Option<String> },
    /// Privileged server-side access; rules do not apply.
    Service,
}

impl Principal {
    pub fn user(uid: impl Into<String>, email: Option<String>) -> Self {
        Principal::User {
            uid: uid.into(),
            email,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        match self {
            Principal::User { uid, .. } => Some(uid),
            _ => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Principal::User { email, .. } => email.as_deref(),
            _ => None,
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Principal::Service)
    }
}

/// Supplies the principal at the time of each operation. Lets a store handle
/// follow whoever is currently signed in.
pub trait PrincipalSource: Send + Sync {
    fn principal(&self) -> Principal;
}

impl PrincipalSource for Principal {
    fn principal(&self) -> Principal {
        self.clone()
    }
}

impl<T: PrincipalSource + ?Sized> PrincipalSource for Arc<T> {
    fn principal(&self) -> Principal {
        (**self).principal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One operation to authorize.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub operation: Operation,
    pub collection: &'a str,
    pub key: Option<&'a str>,
    /// Current stored document, if any.
    pub existing: Option<&'a Fields>,
    /// Fields being written: the full document for create/replace, the patch
    /// for updates.
    pub incoming: Option<&'a Fields>,
}

#[derive(Debug, Clone, Default)]
pub struct AccessRules {
    master_admin_email: Option<String>,
}

impl AccessRules {
    pub fn new(master_admin_email: Option<String>) -> Self {
        Self { master_admin_email }
    }

    /// Whether the principal acts as an admin: the master email, or a stored
    /// `admin` role on its own profile.
    pub fn is_admin(&self, principal: &Principal, caller_profile: Option<&Fields>) -> bool {
        if is_master_admin(principal.email(), self.master_admin_email.as_deref()) {
            return true;
        }
        caller_profile
            .and_then(|profile| profile.get(fields::ROLE))
            .and_then(|role| role.as_str())
            == Some(Role::Admin.as_str())
    }

    pub fn allows(
        &self,
        principal: &Principal,
        caller_profile: Option<&Fields>,
        request: &AccessRequest<'_>,
    ) -> bool {
        if principal.is_service() {
            return true;
        }
        match request.collection {
            collections::PROFILES => self.allows_profile(principal, caller_profile, request),
            collections::SETTINGS => match request.operation {
                Operation::Get | Operation::List => true,
                _ => self.is_admin(principal, caller_profile),
            },
            _ => false,
        }
    }

    fn allows_profile(
        &self,
        principal: &Principal,
        caller_profile: Option<&Fields>,
        request: &AccessRequest<'_>,
    ) -> bool {
        let Some(uid) = principal.uid() else {
            return false;
        };
        if self.is_admin(principal, caller_profile) {
            return true;
        }

        let own = request.key == Some(uid);
        match request.operation {
            Operation::Get | Operation::Delete => own,
            Operation::List => false,
            Operation::Create => {
                own && request
                    .incoming
                    .and_then(|doc| doc.get(fields::ROLE))
                    .and_then(|role| role.as_str())
                    != Some(Role::Admin.as_str())
            }
            Operation::Update => own && !changes_role(request),
        }
    }
}

fn changes_role(request: &AccessRequest<'_>) -> bool {
    let Some(incoming) = request.incoming else {
        return false;
    };
    let stored = request.existing.and_then(|doc| doc.get(fields::ROLE));
    match incoming.get(fields::ROLE) {
        Some(role) => Some(role) != stored,
        // Dropping the field can only lower the effective role.
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn rules() -> AccessRules {
        AccessRules::new(Some("admin@x.com".to_string()))
    }

    fn request<'a>(
        operation: Operation,
        collection: &'a str,
        key: Option<&'a str>,
        existing: Option<&'a Fields>,
        incoming: Option<&'a Fields>,
    ) -> AccessRequest<'a> {
        AccessRequest {
            operation,
            collection,
            key,
            existing,
            incoming,
        }
    }

    #[test]
    fn client_reads_only_own_profile() {
        let client = Principal::user("c1", Some("c@x.com".into()));
        let own = doc(json!({"role": "client"}));
        let rules = rules();

        assert!(rules.allows(
            &client,
            Some(&own),
            &request(Operation::Get, collections::PROFILES, Some("c1"), None, None)
        ));
        assert!(!rules.allows(
            &client,
            Some(&own),
            &request(Operation::Get, collections::PROFILES, Some("c2"), None, None)
        ));
        assert!(!rules.allows(
            &client,
            Some(&own),
            &request(Operation::List, collections::PROFILES, None, None, None)
        ));
    }

    #[test]
    fn admin_lists_profiles() {
        let admin = Principal::user("a1", Some("ops@x.com".into()));
        let own = doc(json!({"role": "admin"}));
        assert!(rules().allows(
            &admin,
            Some(&own),
            &request(Operation::List, collections::PROFILES, None, None, None)
        ));

        let master = Principal::user("m1", Some("ADMIN@x.com".into()));
        assert!(rules().allows(
            &master,
            None,
            &request(Operation::List, collections::PROFILES, None, None, None)
        ));
    }

    #[test]
    fn only_master_creates_admin_profile() {
        let rules = rules();
        let incoming = doc(json!({"role": "admin", "name": "Eve"}));

        let eve = Principal::user("e1", Some("eve@x.com".into()));
        assert!(!rules.allows(
            &eve,
            None,
            &request(Operation::Create, collections::PROFILES, Some("e1"), None, Some(&incoming))
        ));

        let master = Principal::user("m1", Some("admin@x.com".into()));
        assert!(rules.allows(
            &master,
            None,
            &request(Operation::Create, collections::PROFILES, Some("m1"), None, Some(&incoming))
        ));

        let client_doc = doc(json!({"role": "client"}));
        assert!(rules.allows(
            &eve,
            None,
            &request(Operation::Create, collections::PROFILES, Some("e1"), None, Some(&client_doc))
        ));
        assert!(!rules.allows(
            &eve,
            None,
            &request(Operation::Create, collections::PROFILES, Some("x"), None, Some(&client_doc))
        ));
    }

    #[test]
    fn client_cannot_change_role() {
        let rules = rules();
        let client = Principal::user("c1", Some("c@x.com".into()));
        let existing = doc(json!({"role": "client", "name": "C"}));

        let rename = doc(json!({"name": "New"}));
        assert!(rules.allows(
            &client,
            Some(&existing),
            &request(Operation::Update, collections::PROFILES, Some("c1"), Some(&existing), Some(&rename))
        ));

        let escalate = doc(json!({"role": "admin"}));
        assert!(!rules.allows(
            &client,
            Some(&existing),
            &request(Operation::Update, collections::PROFILES, Some("c1"), Some(&existing), Some(&escalate))
        ));
    }

    #[test]
    fn settings_read_by_anyone_written_by_admin() {
        let rules = rules();
        assert!(rules.allows(
            &Principal::Anonymous,
            None,
            &request(Operation::Get, collections::SETTINGS, Some("admin"), None, None)
        ));

        let client = Principal::user("c1", None);
        let patch = doc(json!({"maintenanceMode": true}));
        assert!(!rules.allows(
            &client,
            Some(&doc(json!({"role": "client"}))),
            &request(Operation::Update, collections::SETTINGS, Some("admin"), None, Some(&patch))
        ));
        assert!(rules.allows(
            &client,
            Some(&doc(json!({"role": "admin"}))),
            &request(Operation::Update, collections::SETTINGS, Some("admin"), None, Some(&patch))
        ));
    }

    #[test]
    fn service_bypasses_and_unknown_collections_denied() {
        let rules = rules();
        assert!(rules.allows(
            &Principal::Service,
            None,
            &request(Operation::List, collections::PROFILES, None, None, None)
        ));
        assert!(!rules.allows(
            &Principal::user("c1", None),
            None,
            &request(Operation::Get, "secrets", Some("k"), None, None)
        ));
    }
}
