//! Every write the portal performs goes through [`MutationGateway`].
//!
//! Writes are not optimistic: the session only changes when the store's
//! subscription delivers the new snapshot. Appends to the audit, invoice and
//! attachment arrays use the store's array-union so concurrent appends all
//! land; edits of an existing invoice replace the whole array from the local
//! snapshot and are last-writer-wins.

use crate::navigation::{NavigationRequest, Navigator};
use crate::resolver::SessionResolver;
use crate::{Route, Session, SessionContext, SessionError, SessionResult};
use chrono::Utc;
use document_store::{DocumentStore, Fields};
use identity_client::{Identity, IdentityClient};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use webfront_model::{
    clamp_progress, collections, fields, format_amount, generate_invoice_id, is_master_admin,
    ActivityEntry, AdminSettings, FileAttachment, FinancialSummary, Invoice, InvoiceStatus,
    NotificationPrefs, Phase, Profile, Role,
};

const TEMPORARY_PASSWORD_LEN: usize = 12;

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl ProfileUpdate {
    fn to_fields(&self) -> Fields {
        let mut patch = Fields::new();
        if let Some(name) = &self.name {
            patch.insert(fields::NAME.into(), json!(name.trim()));
        }
        if let Some(email) = &self.email {
            patch.insert(fields::EMAIL.into(), json!(email.trim()));
        }
        patch
    }
}

/// Project-tracking fields an admin edits on a client profile.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub project: Option<String>,
    pub phase: Option<Phase>,
    /// Clamped into `[0, 100]` before writing.
    pub progress: Option<f64>,
    pub milestone: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<String>,
}

impl ProjectUpdate {
    fn to_fields(&self) -> Fields {
        let mut patch = Fields::new();
        if let Some(project) = &self.project {
            patch.insert(fields::PROJECT.into(), json!(project));
        }
        if let Some(phase) = &self.phase {
            patch.insert(fields::PHASE.into(), json!(phase.as_str()));
        }
        if let Some(progress) = self.progress {
            patch.insert(fields::PROGRESS.into(), json!(clamp_progress(progress)));
        }
        if let Some(milestone) = &self.milestone {
            patch.insert(fields::MILESTONE.into(), json!(milestone));
        }
        if let Some(due_date) = &self.due_date {
            patch.insert(fields::DUE_DATE.into(), json!(due_date));
        }
        if let Some(status) = &self.status {
            patch.insert(fields::STATUS.into(), json!(status));
        }
        patch
    }
}

/// Result of an admin creating a client account.
#[derive(Debug, Clone)]
pub struct ProvisionedClient {
    pub identity: Identity,
    pub profile: Profile,
    /// Handed to the invitation mail; the client must replace it on first
    /// sign-in.
    pub temporary_password: String,
}

pub struct MutationGateway {
    identity: Arc<dyn IdentityClient>,
    store: Arc<dyn DocumentStore>,
    context: SessionContext,
    resolver: Arc<SessionResolver>,
    navigator: Arc<dyn Navigator>,
    master_admin_email: Option<String>,
}

impl MutationGateway {
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        store: Arc<dyn DocumentStore>,
        context: SessionContext,
        resolver: Arc<SessionResolver>,
        navigator: Arc<dyn Navigator>,
        master_admin_email: Option<String>,
    ) -> Self {
        Self {
            identity,
            store,
            context,
            resolver,
            navigator,
            master_admin_email,
        }
    }

    // ---- Authentication ----

    /// Create an identity and its profile, then resolve the session.
    ///
    /// Non-master sign-ups are refused while maintenance mode is on, before
    /// the identity provider is contacted.
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> SessionResult<Identity> {
        let name = required("Name", name)?;
        let email = required("Email", email)?;
        if password.is_empty() {
            return Err(SessionError::MissingField("Password"));
        }
        if self.context.snapshot().identity.is_some() {
            return Err(SessionError::AlreadySignedIn);
        }

        let is_master = is_master_admin(Some(email), self.master_admin_email.as_deref());
        if !is_master && self.admin_settings().await?.maintenance_mode {
            info!(email = %email, "Sign-up refused: maintenance mode");
            return Err(SessionError::MaintenanceMode);
        }

        let _provisioning = self.resolver.begin_provisioning();
        let identity = self.identity.sign_up(email, password).await?;

        let role = if is_master { Role::Admin } else { Role::Client };
        let profile = Profile::for_new_account(&identity.uid, name, email, role, Utc::now());
        let written = match profile.to_fields() {
            Ok(data) => self
                .store
                .set_document(collections::PROFILES, &identity.uid, data)
                .await
                .map_err(SessionError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            error!(user_id = %identity.uid, error = %e, "Failed to write profile for new account");
            // No identity may outlive a failed profile write.
            if let Err(delete_err) = self.identity.delete_current_account().await {
                error!(user_id = %identity.uid, error = %delete_err, "Failed to roll back new account");
                if let Err(sign_out_err) = self.identity.sign_out().await {
                    warn!(error = %sign_out_err, "Failed to sign out after sign-up failure");
                }
            }
            return Err(e);
        }

        info!(user_id = %identity.uid, role = %role, "Account created");
        self.resolver.resolve(identity.clone()).await;
        Ok(identity)
    }

    /// Sign in. The session resolves from the identity-state listener.
    pub async fn sign_in(&self, email: &str, password: &str) -> SessionResult<Identity> {
        let email = required("Email", email)?;
        if password.is_empty() {
            return Err(SessionError::MissingField("Password"));
        }
        let identity = self.identity.sign_in(email, password).await?;
        Ok(identity)
    }

    pub async fn sign_out(&self) -> SessionResult<()> {
        self.identity.sign_out().await?;
        Ok(())
    }

    pub async fn request_password_reset(&self, email: &str) -> SessionResult<()> {
        let email = required("Email", email)?;
        self.identity.request_password_reset(email).await?;
        info!(email = %email, "Password reset requested");
        Ok(())
    }

    /// Replace a provisioned account's temporary password and release the
    /// session to its normal landing route.
    pub async fn complete_password_reset(&self, new_password: &str) -> SessionResult<()> {
        if new_password.is_empty() {
            return Err(SessionError::MissingField("Password"));
        }
        let session = self.require_identity()?;
        let identity = session.identity.clone().ok_or(SessionError::NotSignedIn)?;

        self.identity
            .change_password(&identity, new_password)
            .await?;

        let mut patch = Fields::new();
        patch.insert(fields::REQUIRES_PASSWORD_RESET.into(), json!(false));
        self.store
            .update_document(collections::PROFILES, &identity.uid, patch)
            .await?;
        self.append_activity(&identity.uid, "Password updated", "completed")
            .await?;

        let role = self.resolver.complete_password_reset().unwrap_or_default();
        info!(user_id = %identity.uid, "Password reset completed");
        self.navigator
            .navigate(NavigationRequest::To(Route::default_for(role)));
        Ok(())
    }

    /// Delete the caller's profile, then sign out. Both are attempted.
    pub async fn delete_account(&self) -> SessionResult<()> {
        let session = self.require_identity()?;
        let uid = session.uid().unwrap_or_default().to_string();

        let deleted = self
            .store
            .delete_document(collections::PROFILES, &uid)
            .await;
        if let Err(e) = &deleted {
            error!(user_id = %uid, error = %e, "Failed to delete profile");
        }
        let signed_out = self.identity.sign_out().await;
        if let Err(e) = &signed_out {
            error!(user_id = %uid, error = %e, "Failed to sign out deleted account");
        }

        deleted?;
        signed_out?;
        info!(user_id = %uid, "Account deleted");
        Ok(())
    }

    // ---- Own profile ----

    pub async fn update_profile(&self, update: &ProfileUpdate) -> SessionResult<()> {
        let session = self.require_identity()?;
        let patch = update.to_fields();
        if patch.is_empty() {
            return Ok(());
        }
        self.store
            .update_document(collections::PROFILES, session.uid().unwrap_or_default(), patch)
            .await?;
        Ok(())
    }

    pub async fn update_notifications(&self, prefs: NotificationPrefs) -> SessionResult<()> {
        let session = self.require_identity()?;
        let mut patch = Fields::new();
        patch.insert(fields::NOTIFICATIONS.into(), serde_json::to_value(prefs)?);
        self.store
            .update_document(collections::PROFILES, session.uid().unwrap_or_default(), patch)
            .await?;
        Ok(())
    }

    /// Upload a file into the caller's own uploads.
    pub async fn upload_client_file(
        &self,
        file_name: &str,
        mime_type: Option<&str>,
        bytes: &[u8],
    ) -> SessionResult<FileAttachment> {
        let session = self.require_identity()?;
        let uid = session.uid().unwrap_or_default().to_string();
        self.upload(&uid, fields::CLIENT_UPLOADS, file_name, mime_type, bytes)
            .await
    }

    // ---- Admin ----

    /// Append an entry to a profile's audit trail.
    pub async fn append_activity(
        &self,
        uid: &str,
        action: &str,
        status: &str,
    ) -> SessionResult<ActivityEntry> {
        self.require_identity()?;
        let entry = ActivityEntry::new(action, status, Utc::now());
        self.store
            .array_union_append(
                collections::PROFILES,
                uid,
                fields::ACTIVITY,
                serde_json::to_value(&entry)?,
            )
            .await?;
        Ok(entry)
    }

    pub async fn create_invoice(&self, uid: &str, desc: &str, amount: f64) -> SessionResult<Invoice> {
        self.require_admin()?;
        let desc = required("Description", desc)?;
        let invoice = Invoice {
            id: generate_invoice_id(&mut rand::thread_rng()),
            desc: desc.to_string(),
            amount: format_amount(amount),
            date: Utc::now().format("%Y-%m-%d").to_string(),
            status: InvoiceStatus::Pending,
        };
        self.store
            .array_union_append(
                collections::PROFILES,
                uid,
                fields::INVOICES,
                serde_json::to_value(&invoice)?,
            )
            .await?;
        info!(user_id = %uid, invoice_id = %invoice.id, amount = %invoice.amount, "Invoice created");
        Ok(invoice)
    }

    /// Set one invoice's status by position, replacing the whole sequence.
    pub async fn set_invoice_status(
        &self,
        uid: &str,
        index: usize,
        status: InvoiceStatus,
    ) -> SessionResult<()> {
        let session = self.require_admin()?;
        let mut invoices = local_profile(&session, uid)?.invoices.clone();
        let len = invoices.len();
        let invoice = invoices
            .get_mut(index)
            .ok_or(SessionError::InvoiceOutOfRange { index, len })?;
        invoice.status = status;

        let mut patch = Fields::new();
        patch.insert(fields::INVOICES.into(), serde_json::to_value(&invoices)?);
        self.store
            .update_document(collections::PROFILES, uid, patch)
            .await?;
        Ok(())
    }

    pub async fn toggle_invoice_status(&self, uid: &str, index: usize) -> SessionResult<InvoiceStatus> {
        let session = self.require_admin()?;
        let profile = local_profile(&session, uid)?;
        let len = profile.invoices.len();
        let next = profile
            .invoices
            .get(index)
            .ok_or(SessionError::InvoiceOutOfRange { index, len })?
            .status
            .toggled();
        self.set_invoice_status(uid, index, next).await?;
        Ok(next)
    }

    pub async fn upload_contract(
        &self,
        uid: &str,
        file_name: &str,
        mime_type: Option<&str>,
        bytes: &[u8],
    ) -> SessionResult<FileAttachment> {
        self.require_admin()?;
        self.upload(uid, fields::CONTRACTS, file_name, mime_type, bytes)
            .await
    }

    pub async fn update_project(&self, uid: &str, update: &ProjectUpdate) -> SessionResult<()> {
        self.require_admin()?;
        let patch = update.to_fields();
        if patch.is_empty() {
            return Ok(());
        }
        self.store
            .update_document(collections::PROFILES, uid, patch)
            .await?;
        info!(user_id = %uid, "Project updated");
        Ok(())
    }

    /// Flip a profile's stored role between client and admin.
    pub async fn toggle_admin_role(&self, uid: &str) -> SessionResult<Role> {
        let session = self.require_admin()?;
        let next = local_profile(&session, uid)?.stored_role().toggled();
        let mut patch = Fields::new();
        patch.insert(fields::ROLE.into(), json!(next.as_str()));
        self.store
            .update_document(collections::PROFILES, uid, patch)
            .await?;
        info!(user_id = %uid, role = %next, "Role changed");
        Ok(next)
    }

    /// The admin settings singleton; defaults when it has never been saved.
    pub async fn admin_settings(&self) -> SessionResult<AdminSettings> {
        let document = self
            .store
            .get_document(collections::SETTINGS, collections::ADMIN_SETTINGS_KEY)
            .await?;
        Ok(match document {
            Some(document) => serde_json::from_value(Value::Object(document.data))?,
            None => AdminSettings::default(),
        })
    }

    pub async fn update_admin_settings(&self, settings: &AdminSettings) -> SessionResult<()> {
        self.require_admin()?;
        let data = match serde_json::to_value(settings)? {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        self.store
            .set_document(collections::SETTINGS, collections::ADMIN_SETTINGS_KEY, data)
            .await?;
        info!(maintenance_mode = settings.maintenance_mode, "Admin settings saved");
        Ok(())
    }

    /// Create a client identity with a temporary password and a profile
    /// that forces a password reset on first sign-in.
    pub async fn provision_client(&self, name: &str, email: &str) -> SessionResult<ProvisionedClient> {
        let session = self.require_admin()?;
        let name = required("Name", name)?;
        let email = required("Email", email)?;

        let temporary_password = temporary_password();
        let identity = self
            .identity
            .provision_account(email, &temporary_password)
            .await?;

        let now = Utc::now();
        let mut profile = Profile::for_new_account(&identity.uid, name, email, Role::Client, now);
        profile.requires_password_reset = true;
        let provisioned_by = session
            .profile
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "admin".to_string());
        profile.activity.push(ActivityEntry::new(
            format!("Account provisioned by {}", provisioned_by),
            "completed",
            now,
        ));
        self.store
            .set_document(collections::PROFILES, &identity.uid, profile.to_fields()?)
            .await?;

        info!(user_id = %identity.uid, "Client provisioned");
        Ok(ProvisionedClient {
            identity,
            profile,
            temporary_password,
        })
    }

    /// Totals across every synchronized client.
    pub fn financial_summary(&self) -> SessionResult<FinancialSummary> {
        let session = self.require_admin()?;
        Ok(FinancialSummary::from_profiles(&session.clients))
    }

    async fn upload(
        &self,
        uid: &str,
        field: &str,
        file_name: &str,
        mime_type: Option<&str>,
        bytes: &[u8],
    ) -> SessionResult<FileAttachment> {
        let attachment = FileAttachment::inline(file_name, mime_type, bytes, Utc::now())?;
        self.store
            .array_union_append(
                collections::PROFILES,
                uid,
                field,
                serde_json::to_value(&attachment)?,
            )
            .await?;
        info!(user_id = %uid, field, file = %attachment.name, size = %attachment.size, "File uploaded");
        Ok(attachment)
    }

    fn require_identity(&self) -> SessionResult<Session> {
        let session = self.context.snapshot();
        if session.identity.is_none() {
            return Err(SessionError::NotSignedIn);
        }
        Ok(session)
    }

    fn require_admin(&self) -> SessionResult<Session> {
        let session = self.require_identity()?;
        if !session.is_admin() {
            return Err(SessionError::Forbidden);
        }
        Ok(session)
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> SessionResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SessionError::MissingField(field));
    }
    Ok(value)
}

fn local_profile<'a>(session: &'a Session, uid: &str) -> SessionResult<&'a Profile> {
    session
        .find_profile(uid)
        .ok_or_else(|| SessionError::UnknownProfile(uid.to_string()))
}

fn temporary_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMPORARY_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_update_clamps_progress() {
        let update = ProjectUpdate {
            phase: Some(Phase::Testing),
            progress: Some(140.0),
            ..Default::default()
        };
        let patch = update.to_fields();
        assert_eq!(patch[fields::PROGRESS], json!(100));
        assert_eq!(patch[fields::PHASE], json!("Testing"));
        assert!(!patch.contains_key(fields::PROJECT));
    }

    #[test]
    fn profile_update_trims() {
        let update = ProfileUpdate {
            name: Some("  Ada ".into()),
            email: None,
        };
        let patch = update.to_fields();
        assert_eq!(patch[fields::NAME], json!("Ada"));
        assert_eq!(patch.len(), 1);
    }

    #[test]
    fn temporary_passwords_are_alphanumeric() {
        let password = temporary_password();
        assert_eq!(password.len(), TEMPORARY_PASSWORD_LEN);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn required_rejects_blank() {
        assert!(matches!(
            required("Name", "  "),
            Err(SessionError::MissingField("Name"))
        ));
        assert_eq!(required("Name", " Bo ").unwrap(), "Bo");
    }
}
