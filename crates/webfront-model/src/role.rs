//! Role derivation.
//!
//! The only place the master-admin rule lives. Sign-up, sign-in and the
//! identity-state listener all derive roles through [`resolve_role`].

use serde::{Deserialize, Serialize};

/// Effective role of a signed-in identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Client,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// The other role, used by the admin role toggle.
    pub fn toggled(&self) -> Role {
        match self {
            Role::Client => Role::Admin,
            Role::Admin => Role::Client,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when `email` is the configured master admin address (case-insensitive).
pub fn is_master_admin(email: Option<&str>, master_admin_email: Option<&str>) -> bool {
    match (email, master_admin_email) {
        (Some(email), Some(master)) => {
            let master = master.trim();
            !master.is_empty() && email.trim().eq_ignore_ascii_case(master)
        }
        _ => false,
    }
}

/// Effective role: master admin always wins, otherwise the stored role,
/// defaulting to [`Role::Client`] when absent.
pub fn resolve_role(
    email: Option<&str>,
    stored_role: Option<Role>,
    master_admin_email: Option<&str>,
) -> Role {
    if is_master_admin(email, master_admin_email) {
        Role::Admin
    } else {
        stored_role.unwrap_or_default()
    }
}
