//! Invitation mail for provisioned clients.

use crate::{CallerContext, FunctionError, FunctionResult};
use async_trait::async_trait;
use document_store::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use webfront_config::MailConfig;
use webfront_model::{collections, resolve_role, Profile, Role};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvitationRequest {
    pub email: String,
    pub name: String,
    pub temp_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_mode: Option<bool>,
}

/// A rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl Invitation {
    pub fn render(request: &InvitationRequest, login_url: &str) -> Self {
        let name = request.name.trim();
        let email = request.email.trim();
        let text = format!(
            "Hi {name},\n\n\
             Your WebFront client portal account is ready.\n\n\
             Sign in at: {login_url}\n\
             Email: {email}\n\
             Temporary password: {password}\n\n\
             You will be asked to choose a new password the first time you sign in.\n",
            name = name,
            login_url = login_url,
            email = email,
            password = request.temp_password,
        );
        let html = format!(
            "<p>Hi {name},</p>\
             <p>Your WebFront client portal account is ready.</p>\
             <p><a href=\"{login_url}\">Sign in to the portal</a></p>\
             <p>Email: <strong>{email}</strong><br>\
             Temporary password: <code>{password}</code></p>\
             <p>You will be asked to choose a new password the first time you sign in.</p>",
            name = escape_html(name),
            login_url = escape_html(login_url),
            email = escape_html(email),
            password = escape_html(&request.temp_password),
        );
        Self {
            to: email.to_string(),
            subject: "Your WebFront portal invitation".to_string(),
            text,
            html,
        }
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, from: &str, invitation: &Invitation) -> FunctionResult<()>;
}

/// Transactional mail over a JSON HTTP API (`{from, to, subject, text, html}`).
pub struct HttpMailTransport {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpMailTransport {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, from: &str, invitation: &Invitation) -> FunctionResult<()> {
        let mut request = self.http.post(&self.api_url).json(&json!({
            "from": from,
            "to": [invitation.to],
            "subject": invitation.subject,
            "text": invitation.text,
            "html": invitation.html,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FunctionError::Internal(format!(
                "Mail API returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

pub struct InvitationSender {
    store: Arc<dyn DocumentStore>,
    transport: Option<Arc<dyn MailTransport>>,
    from_address: String,
    login_url: String,
    master_admin_email: Option<String>,
}

impl InvitationSender {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        transport: Option<Arc<dyn MailTransport>>,
        from_address: impl Into<String>,
        login_url: impl Into<String>,
        master_admin_email: Option<String>,
    ) -> Self {
        Self {
            store,
            transport,
            from_address: from_address.into(),
            login_url: login_url.into(),
            master_admin_email,
        }
    }

    /// Sender using the HTTP mail API when one is configured, test mode
    /// otherwise.
    pub fn from_config(
        store: Arc<dyn DocumentStore>,
        mail: &MailConfig,
        master_admin_email: Option<String>,
    ) -> Self {
        let transport = if mail.is_configured() {
            mail.api_url.as_deref().map(|url| {
                Arc::new(HttpMailTransport::new(url, mail.api_key.clone())) as Arc<dyn MailTransport>
            })
        } else {
            None
        };
        Self::new(
            store,
            transport,
            &mail.from_address,
            &mail.login_url,
            master_admin_email,
        )
    }

    pub async fn handle(
        &self,
        caller: &CallerContext,
        request: InvitationRequest,
    ) -> FunctionResult<InvitationResponse> {
        let auth = caller.auth.as_ref().ok_or_else(|| {
            FunctionError::Unauthenticated("You must be signed in to send invitations".to_string())
        })?;
        self.require_admin(&auth.uid, auth.email.as_deref()).await?;

        if request.email.trim().is_empty()
            || request.name.trim().is_empty()
            || request.temp_password.is_empty()
        {
            return Err(FunctionError::InvalidArgument(
                "email, name and tempPassword are required".to_string(),
            ));
        }

        let invitation = Invitation::render(&request, &self.login_url);
        let Some(transport) = &self.transport else {
            info!(to = %invitation.to, "Mail transport not configured, invitation logged only");
            return Ok(InvitationResponse {
                success: true,
                message: format!("Invitation for {} logged (test mode)", invitation.to),
                test_mode: Some(true),
            });
        };

        transport
            .send(&self.from_address, &invitation)
            .await
            .map_err(|e| {
                error!(to = %invitation.to, error = %e, "Failed to send invitation");
                FunctionError::Internal("Failed to send the invitation email".to_string())
            })?;

        info!(to = %invitation.to, sent_by = %auth.uid, "Invitation sent");
        Ok(InvitationResponse {
            success: true,
            message: format!("Invitation sent to {}", invitation.to),
            test_mode: None,
        })
    }

    async fn require_admin(&self, uid: &str, email: Option<&str>) -> FunctionResult<()> {
        let document = self
            .store
            .get_document(collections::PROFILES, uid)
            .await
            .map_err(|e| {
                warn!(user_id = %uid, error = %e, "Failed to load caller profile");
                FunctionError::Internal("Could not verify the caller".to_string())
            })?;
        let stored_role = document
            .and_then(|doc| Profile::from_document(&doc.id, &doc.data).ok())
            .and_then(|profile| profile.role);

        match resolve_role(email, stored_role, self.master_admin_email.as_deref()) {
            Role::Admin => Ok(()),
            Role::Client => Err(FunctionError::PermissionDenied(
                "Only admins can send invitations".to_string(),
            )),
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
