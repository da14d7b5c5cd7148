//! Supabase GoTrue identity client.
//!
//! Tokens live in memory only; a fresh process starts signed out.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState};
use crate::{Identity, IdentityClient, IdentityError, IdentityResult, IdentityState};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// GoTrue session response (`/token`, and `/signup` when confirmation is off).
#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<UserResponse>,
    /// `/signup` with email confirmation on returns the bare user.
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// GoTrue error body. Newer servers send `error_code`/`msg`, older ones
/// `error`/`error_description`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredSession {
    identity: Identity,
    access_token: String,
    #[allow(dead_code)]
    refresh_token: Option<String>,
}

pub struct SupabaseIdentityClient {
    supabase_url: String,
    supabase_publishable_key: String,
    http_client: Client,
    fsm: Mutex<AuthMachine>,
    session: Mutex<Option<StoredSession>>,
    state_tx: watch::Sender<IdentityState>,
}

impl SupabaseIdentityClient {
    pub fn new(supabase_url: &str, supabase_publishable_key: &str) -> Self {
        let (state_tx, _) = watch::channel(IdentityState::SignedOut);
        Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_publishable_key: supabase_publishable_key.to_string(),
            http_client: Client::new(),
            fsm: Mutex::new(AuthMachine::new()),
            session: Mutex::new(None),
            state_tx,
        }
    }

    /// Access token of the current session, for authenticated REST calls.
    pub fn access_token(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub fn fsm_state(&self) -> AuthMachineState {
        self.fsm.lock().unwrap().state().clone()
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path)
    }

    fn transition(&self, input: &AuthMachineInput) -> IdentityResult<AuthMachineState> {
        let mut fsm = self.fsm.lock().unwrap();
        let old_state = fsm.state().clone();

        fsm.consume(input).map_err(|_| {
            IdentityError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = fsm.state().clone();
        drop(fsm);

        if old_state != new_state {
            debug!(old_state = ?old_state, new_state = ?new_state, "Auth state transition");
        }
        Ok(new_state)
    }

    fn store_session(&self, session: Option<StoredSession>) {
        let state = match &session {
            Some(s) => IdentityState::SignedIn(s.identity.clone()),
            None => IdentityState::SignedOut,
        };
        *self.session.lock().unwrap() = session;
        self.state_tx.send_replace(state);
    }

    async fn password_grant(&self, email: &str, password: &str) -> IdentityResult<SessionResponse> {
        let response = self
            .http_client
            .post(self.auth_url("token?grant_type=password"))
            .header("apikey", &self.supabase_publishable_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    async fn signup_request(&self, email: &str, password: &str) -> IdentityResult<SessionResponse> {
        let response = self
            .http_client
            .post(self.auth_url("signup"))
            .header("apikey", &self.supabase_publishable_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// Run an attempt through the machine, storing the session on success.
    async fn authenticate<F>(
        &self,
        attempt: AuthMachineInput,
        succeeded: AuthMachineInput,
        failed: AuthMachineInput,
        request: F,
    ) -> IdentityResult<Identity>
    where
        F: std::future::Future<Output = IdentityResult<StoredSession>>,
    {
        self.transition(&attempt)?;
        if self.session.lock().unwrap().is_some() {
            self.store_session(None);
        }

        match request.await {
            Ok(session) => {
                let identity = session.identity.clone();
                self.transition(&succeeded)?;
                self.store_session(Some(session));
                Ok(identity)
            }
            Err(e) => {
                self.transition(&failed)?;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl IdentityClient for SupabaseIdentityClient {
    async fn sign_up(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        debug!(email = %email, "Attempting sign-up");
        let identity = self
            .authenticate(
                AuthMachineInput::SignUpAttempt,
                AuthMachineInput::SignUpSucceeded,
                AuthMachineInput::SignUpFailed,
                async {
                    let data = self.signup_request(email, password).await?;
                    match into_session(data) {
                        Ok(session) => Ok(session),
                        // Confirmation-required projects hand back no tokens.
                        Err(_) => into_session(self.password_grant(email, password).await?),
                    }
                },
            )
            .await?;
        info!(user_id = %identity.uid, "Sign-up successful");
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        debug!(email = %email, "Attempting email/password sign-in");
        let identity = self
            .authenticate(
                AuthMachineInput::SignInAttempt,
                AuthMachineInput::SignInSucceeded,
                AuthMachineInput::SignInFailed,
                async { into_session(self.password_grant(email, password).await?) },
            )
            .await?;
        info!(user_id = %identity.uid, "Sign-in successful");
        Ok(identity)
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        let _ = self.transition(&AuthMachineInput::SignOutRequested);

        if let Some(token) = self.access_token() {
            let result = self
                .http_client
                .post(self.auth_url("logout"))
                .header("apikey", &self.supabase_publishable_key)
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
            }
        }

        self.store_session(None);
        let _ = self.transition(&AuthMachineInput::SignOutComplete);
        info!("Signed out");
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> IdentityResult<()> {
        let response = self
            .http_client
            .post(self.auth_url("recover"))
            .header("apikey", &self.supabase_publishable_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        check(response).await?;
        info!(email = %email, "Password reset email requested");
        Ok(())
    }

    async fn change_password(
        &self,
        identity: &Identity,
        new_password: &str,
    ) -> IdentityResult<()> {
        let token = {
            let session = self.session.lock().unwrap();
            match session.as_ref() {
                Some(s) if s.identity.uid == identity.uid => s.access_token.clone(),
                _ => return Err(IdentityError::NotSignedIn),
            }
        };

        let response = self
            .http_client
            .put(self.auth_url("user"))
            .header("apikey", &self.supabase_publishable_key)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "password": new_password }))
            .send()
            .await?;
        check(response).await?;
        info!(user_id = %identity.uid, "Password changed");
        Ok(())
    }

    async fn provision_account(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        // Any session returned for the new account is discarded.
        let data = self.signup_request(email, password).await?;
        let identity = match (data.user, data.id) {
            (Some(user), _) => Identity::new(user.id, user.email),
            (None, Some(id)) => Identity::new(id, data.email),
            (None, None) => {
                return Err(IdentityError::Other(
                    "sign-up response carried no user".to_string(),
                ))
            }
        };
        info!(user_id = %identity.uid, "Provisioned account");
        Ok(identity)
    }

    async fn delete_current_account(&self) -> IdentityResult<()> {
        let (identity, token) = {
            let session = self.session.lock().unwrap();
            match session.as_ref() {
                Some(s) => (s.identity.clone(), s.access_token.clone()),
                None => return Err(IdentityError::NotSignedIn),
            }
        };

        // GoTrue has no self-service delete; the project exposes a
        // security-definer RPC that removes `auth.uid()`.
        let response = self
            .http_client
            .post(format!("{}/rest/v1/rpc/delete_current_user", self.supabase_url))
            .header("apikey", &self.supabase_publishable_key)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({}))
            .send()
            .await?;
        check(response).await?;

        let _ = self.transition(&AuthMachineInput::SignOutRequested);
        self.store_session(None);
        let _ = self.transition(&AuthMachineInput::SignOutComplete);
        info!(user_id = %identity.uid, "Account deleted");
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.identity.clone())
    }

    fn watch_state(&self) -> watch::Receiver<IdentityState> {
        self.state_tx.subscribe()
    }
}

fn into_session(data: SessionResponse) -> IdentityResult<StoredSession> {
    match (data.access_token, data.user) {
        (Some(access_token), Some(user)) => Ok(StoredSession {
            identity: Identity::new(user.id, user.email),
            access_token,
            refresh_token: data.refresh_token,
        }),
        _ => Err(IdentityError::Other(
            "identity provider returned no session".to_string(),
        )),
    }
}

async fn check(response: Response) -> IdentityResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, "Identity provider request failed");
    Err(classify_error(status.as_u16(), &body))
}

/// Map a GoTrue error response onto [`IdentityError`].
fn classify_error(status: u16, body: &str) -> IdentityError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed
        .error_code
        .as_deref()
        .or(parsed.error.as_deref())
        .unwrap_or_default();
    let message = parsed
        .msg
        .or(parsed.error_description)
        .unwrap_or_else(|| body.to_string());

    match code {
        "user_already_exists" | "email_exists" => IdentityError::EmailInUse,
        "weak_password" => IdentityError::WeakPassword(message),
        "email_address_invalid" | "validation_failed" => IdentityError::InvalidEmail(message),
        "invalid_credentials" | "invalid_grant" => IdentityError::InvalidCredential,
        "user_not_found" => IdentityError::UserNotFound,
        _ => IdentityError::Provider { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_new_style_errors() {
        let err = classify_error(
            422,
            r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#,
        );
        assert!(matches!(err, IdentityError::EmailInUse));

        let err = classify_error(
            422,
            r#"{"error_code":"weak_password","msg":"Password should be at least 6 characters."}"#,
        );
        assert!(matches!(err, IdentityError::WeakPassword(m) if m.contains("6 characters")));
    }

    #[test]
    fn test_classify_legacy_errors() {
        let err = classify_error(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert!(matches!(err, IdentityError::InvalidCredential));
    }

    #[test]
    fn test_classify_unknown_error_keeps_body() {
        let err = classify_error(500, "upstream exploded");
        match err {
            IdentityError::Provider { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_into_session_requires_tokens() {
        let data: SessionResponse =
            serde_json::from_str(r#"{"id":"u1","email":"a@x.com"}"#).unwrap();
        assert!(into_session(data).is_err());

        let data: SessionResponse = serde_json::from_str(
            r#"{"access_token":"t","refresh_token":"r","user":{"id":"u1","email":"a@x.com"}}"#,
        )
        .unwrap();
        let session = into_session(data).unwrap();
        assert_eq!(session.identity.uid, "u1");
        assert_eq!(session.access_token, "t");
    }

    #[tokio::test]
    async fn test_new_client_starts_signed_out() {
        let client = SupabaseIdentityClient::new("https://test.supabase.co/", "key");
        assert_eq!(*client.watch_state().borrow(), IdentityState::SignedOut);
        assert_eq!(client.fsm_state(), AuthMachineState::SignedOut);
        assert!(client.access_token().is_none());
        assert_eq!(
            client.auth_url("signup"),
            "https://test.supabase.co/auth/v1/signup"
        );
    }

    #[tokio::test]
    async fn test_delete_requires_session() {
        let client = SupabaseIdentityClient::new("https://test.supabase.co", "key");
        let err = client.delete_current_account().await.unwrap_err();
        assert!(matches!(err, IdentityError::NotSignedIn));
    }

    #[tokio::test]
    async fn test_change_password_requires_matching_session() {
        let client = SupabaseIdentityClient::new("https://test.supabase.co", "key");
        let err = client
            .change_password(&Identity::new("u1", None), "newpass")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::NotSignedIn));
    }
}
