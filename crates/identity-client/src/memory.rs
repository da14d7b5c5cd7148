//! In-process identity provider.
//!
//! Accounts live in a map keyed by lowercased email. Used as the identity
//! provider in tests and for local runs without a Supabase project.

use crate::{Identity, IdentityClient, IdentityError, IdentityResult, IdentityState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: String,
    password: String,
}

impl Account {
    fn identity(&self) -> Identity {
        Identity::new(self.uid.clone(), Some(self.email.clone()))
    }
}

pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<Identity>>,
    reset_requests: Mutex<Vec<String>>,
    calls: AtomicUsize,
    state_tx: watch::Sender<IdentityState>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    /// Provider that has already reported "signed out".
    pub fn new() -> Self {
        Self::with_initial_state(IdentityState::SignedOut)
    }

    /// Provider that never reports until an operation changes its state.
    pub fn restoring() -> Self {
        Self::with_initial_state(IdentityState::Restoring)
    }

    fn with_initial_state(state: IdentityState) -> Self {
        let (state_tx, _) = watch::channel(state);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            reset_requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            state_tx,
        }
    }

    /// Seed an account without signing in and without counting as a call.
    pub fn add_account(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        self.create_account(email, password)
    }

    /// Number of accounts that exist.
    pub fn account_count(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    /// Number of trait operations invoked (state watches excluded).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Emails for which a password reset was requested.
    pub fn reset_requests(&self) -> Vec<String> {
        self.reset_requests.lock().unwrap().clone()
    }

    /// True when `password` signs in `email`.
    pub fn verify_password(&self, email: &str, password: &str) -> bool {
        self.accounts
            .lock()
            .unwrap()
            .get(&normalize(email))
            .map(|a| a.password == password)
            .unwrap_or(false)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn set_current(&self, identity: Option<Identity>) {
        let state = match &identity {
            Some(identity) => IdentityState::SignedIn(identity.clone()),
            None => IdentityState::SignedOut,
        };
        *self.current.lock().unwrap() = identity;
        debug!(state = ?state, "Identity state changed");
        self.state_tx.send_replace(state);
    }

    fn create_account(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        let key = normalize(email);
        if !key.contains('@') || key.starts_with('@') || key.ends_with('@') {
            return Err(IdentityError::InvalidEmail(email.to_string()));
        }
        validate_password(password)?;

        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&key) {
            return Err(IdentityError::EmailInUse);
        }
        let account = Account {
            uid: uuid::Uuid::new_v4().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let identity = account.identity();
        accounts.insert(key, account);
        Ok(identity)
    }
}

#[async_trait]
impl IdentityClient for MemoryIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        self.record_call();
        let identity = self.create_account(email, password)?;
        info!(user_id = %identity.uid, "Sign-up successful");
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        self.record_call();
        let identity = {
            let accounts = self.accounts.lock().unwrap();
            let account = accounts
                .get(&normalize(email))
                .ok_or(IdentityError::UserNotFound)?;
            if account.password != password {
                return Err(IdentityError::InvalidCredential);
            }
            account.identity()
        };
        info!(user_id = %identity.uid, "Sign-in successful");
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        self.record_call();
        self.set_current(None);
        info!("Signed out");
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> IdentityResult<()> {
        self.record_call();
        if !self.accounts.lock().unwrap().contains_key(&normalize(email)) {
            return Err(IdentityError::UserNotFound);
        }
        self.reset_requests
            .lock()
            .unwrap()
            .push(email.trim().to_string());
        Ok(())
    }

    async fn change_password(
        &self,
        identity: &Identity,
        new_password: &str,
    ) -> IdentityResult<()> {
        self.record_call();
        if self.current.lock().unwrap().as_ref() != Some(identity) {
            return Err(IdentityError::NotSignedIn);
        }
        validate_password(new_password)?;

        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .values_mut()
            .find(|a| a.uid == identity.uid)
            .ok_or(IdentityError::UserNotFound)?;
        account.password = new_password.to_string();
        Ok(())
    }

    async fn provision_account(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        self.record_call();
        let identity = self.create_account(email, password)?;
        info!(user_id = %identity.uid, "Provisioned account");
        Ok(identity)
    }

    async fn delete_current_account(&self) -> IdentityResult<()> {
        self.record_call();
        let identity = self
            .current_identity()
            .ok_or(IdentityError::NotSignedIn)?;
        self.accounts
            .lock()
            .unwrap()
            .retain(|_, account| account.uid != identity.uid);
        self.set_current(None);
        info!(user_id = %identity.uid, "Account deleted");
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.current.lock().unwrap().clone()
    }

    fn watch_state(&self) -> watch::Receiver<IdentityState> {
        self.state_tx.subscribe()
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_password(password: &str) -> IdentityResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(IdentityError::WeakPassword(format!(
            "Password should be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
