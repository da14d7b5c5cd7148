//! Document model for the WebFront client portal.
//!
//! Every signed-in identity owns exactly one profile document in the
//! [`collections::PROFILES`] collection, keyed by its identity reference. This
//! crate defines that document's shape, the single role-derivation rule, and
//! the value helpers the session layer writes through the store.

mod attachment;
mod error;
mod finance;
mod profile;
mod role;
mod settings;

pub use attachment::{guess_mime_type, human_size, FileAttachment, MAX_INLINE_UPLOAD_BYTES};
pub use error::{ModelError, ModelResult};
pub use finance::{format_amount, parse_amount, FinancialSummary};
pub use profile::{
    clamp_progress, generate_invoice_id, ActivityEntry, Invoice, InvoiceStatus, NotificationPrefs, Phase, Profile,
    DEFAULT_PROJECT_NAME,
};
pub use role::{is_master_admin, resolve_role, Role};
pub use settings::AdminSettings;

/// JSON object holding a document's fields.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Collection and document keys shared by the portal and the serverless side.
pub mod collections {
    /// One profile document per identity, keyed by identity reference.
    pub const PROFILES: &str = "users";
    /// Singleton configuration documents.
    pub const SETTINGS: &str = "settings";
    /// Key of the admin settings document inside [`SETTINGS`].
    pub const ADMIN_SETTINGS_KEY: &str = "admin";
    /// Key of the chatbot settings document inside [`SETTINGS`].
    pub const CHATBOT_SETTINGS_KEY: &str = "chatbot";
}

/// Stored field names of the profile document.
pub mod fields {
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const ROLE: &str = "role";
    pub const PROJECT: &str = "project";
    pub const PHASE: &str = "phase";
    pub const PROGRESS: &str = "progress";
    pub const MILESTONE: &str = "milestone";
    pub const DUE_DATE: &str = "dueDate";
    pub const STATUS: &str = "status";
    pub const ACTIVITY: &str = "activity";
    pub const INVOICES: &str = "invoices";
    pub const CONTRACTS: &str = "contracts";
    pub const CLIENT_UPLOADS: &str = "clientUploads";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const REQUIRES_PASSWORD_RESET: &str = "requiresPasswordReset";
}
