//! The profile document.
//!
//! Documents are schemaless in the store, so every field defaults when missing
//! and enum-like fields fall back to their default on unknown values instead of
//! failing the whole document.

use crate::attachment::FileAttachment;
use crate::{Fields, ModelError, ModelResult, Role};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

/// Project name given to every newly created account.
pub const DEFAULT_PROJECT_NAME: &str = "WebFront AI System";
const DEFAULT_MILESTONE: &str = "Project Kickoff";
const DEFAULT_DUE_DATE: &str = "TBD";
const DEFAULT_STATUS: &str = "Active";

/// Delivery phase. Transitions are unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Discovery,
    Design,
    Development,
    Testing,
    Live,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Discovery,
        Phase::Design,
        Phase::Development,
        Phase::Testing,
        Phase::Live,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Discovery => "Discovery",
            Phase::Design => "Design",
            Phase::Development => "Development",
            Phase::Testing => "Testing",
            Phase::Live => "Live",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn parse(name: &str) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

/// One audit-trail entry. The sequence is append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub action: String,
    pub date: String,
    pub status: String,
}

impl ActivityEntry {
    pub fn new(action: impl Into<String>, status: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            action: action.into(),
            date: at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            status: status.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Paid,
}

impl InvoiceStatus {
    pub fn toggled(&self) -> InvoiceStatus {
        match self {
            InvoiceStatus::Pending => InvoiceStatus::Paid,
            InvoiceStatus::Paid => InvoiceStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// `INV-<4 digits>`, unique within one profile's sequence by convention only.
    pub id: String,
    pub desc: String,
    /// Currency-formatted amount, e.g. `$1,200.00`.
    pub amount: String,
    pub date: String,
    #[serde(default, deserialize_with = "lenient")]
    pub status: InvoiceStatus,
}

/// Generate an invoice id. Collisions are possible and not checked.
pub fn generate_invoice_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("INV-{}", rng.gen_range(1000..10000))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPrefs {
    pub email: bool,
    pub push: bool,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            email: true,
            push: false,
        }
    }
}

/// Per-identity profile document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    /// Identity reference; the document key, never stored as a field.
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient"
    )]
    pub role: Option<Role>,
    pub project: String,
    #[serde(deserialize_with = "lenient")]
    pub phase: Phase,
    #[serde(deserialize_with = "deserialize_progress")]
    pub progress: u8,
    pub milestone: String,
    pub due_date: String,
    pub status: String,
    pub activity: Vec<ActivityEntry>,
    pub invoices: Vec<Invoice>,
    pub contracts: Vec<FileAttachment>,
    pub client_uploads: Vec<FileAttachment>,
    pub notifications: NotificationPrefs,
    pub requires_password_reset: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Profile {
    /// Profile written atomically alongside a brand-new identity.
    pub fn for_new_account(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            role: Some(role),
            project: DEFAULT_PROJECT_NAME.to_string(),
            phase: Phase::Discovery,
            progress: 0,
            milestone: DEFAULT_MILESTONE.to_string(),
            due_date: DEFAULT_DUE_DATE.to_string(),
            status: DEFAULT_STATUS.to_string(),
            activity: vec![ActivityEntry::new("Account created", "completed", at)],
            invoices: Vec::new(),
            contracts: Vec::new(),
            client_uploads: Vec::new(),
            notifications: NotificationPrefs::default(),
            requires_password_reset: false,
            created_at: Some(at.to_rfc3339()),
        }
    }

    /// Build a profile from a stored document, merging in its key.
    pub fn from_document(id: &str, fields: &Fields) -> ModelResult<Self> {
        let mut profile: Profile =
            serde_json::from_value(serde_json::Value::Object(fields.clone()))?;
        profile.id = id.to_string();
        Ok(profile)
    }

    /// Stored representation (without the key).
    pub fn to_fields(&self) -> ModelResult<Fields> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(ModelError::Json(serde::ser::Error::custom(
                "profile did not serialize to an object",
            ))),
        }
    }

    /// Stored role, or client when absent.
    pub fn stored_role(&self) -> Role {
        self.role.unwrap_or_default()
    }
}

/// Clamp any numeric progress into `[0, 100]`.
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn deserialize_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let numeric = match &value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(numeric.map(clamp_progress).unwrap_or(0))
}
