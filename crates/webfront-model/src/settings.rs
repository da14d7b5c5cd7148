use serde::{Deserialize, Serialize};

/// The `settings/admin` singleton. `maintenance_mode` blocks new
/// non-privileged sign-ups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminSettings {
    pub name: String,
    pub email: String,
    pub maintenance_mode: bool,
}
