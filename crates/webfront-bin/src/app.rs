//! Wires the Supabase clients into a session runtime.

use std::sync::Arc;

use document_store::{DocumentStore, SupabaseDocumentStore, TokenSource};
use identity_client::SupabaseIdentityClient;
use session_core::{MemoryNavigator, Route, RuntimeOptions, Session, SessionRuntime};
use webfront_config::Config;

/// Store requests carry the signed-in user's access token.
struct SessionTokens(Arc<SupabaseIdentityClient>);

impl TokenSource for SessionTokens {
    fn access_token(&self) -> Option<String> {
        self.0.access_token()
    }
}

pub struct App {
    pub store: Arc<dyn DocumentStore>,
    pub navigator: Arc<MemoryNavigator>,
    pub runtime: SessionRuntime,
    config: Config,
}

impl App {
    /// Build and start the runtime.
    pub fn start(config: &Config) -> anyhow::Result<Self> {
        let url = config.supabase_url()?;
        let identity = Arc::new(SupabaseIdentityClient::new(
            url.as_str(),
            &config.supabase_publishable_key,
        ));
        let store: Arc<dyn DocumentStore> = Arc::new(
            SupabaseDocumentStore::new(url.as_str(), config.supabase_publishable_key.clone())
                .with_token_source(Arc::new(SessionTokens(identity.clone())))
                .with_poll_interval(config.subscription_poll_interval()),
        );
        let navigator = Arc::new(MemoryNavigator::new(Route::Login));
        let runtime = SessionRuntime::new(
            identity.clone(),
            store.clone(),
            navigator.clone(),
            RuntimeOptions::from_config(config),
        );
        runtime.start();

        Ok(Self {
            store,
            navigator,
            runtime,
            config: config.clone(),
        })
    }

    /// Longest wait for a sign-in to resolve into a session.
    pub fn settle_timeout(&self) -> std::time::Duration {
        self.config.resolve_timeout() * 2
    }

    /// Wait until the session belongs to `uid` and has settled.
    pub async fn resolved_for(&self, uid: &str) -> anyhow::Result<Session> {
        let session = self
            .runtime
            .context()
            .wait_for(
                |s| s.uid() == Some(uid) && !s.resolving && s.phase.is_settled(),
                self.settle_timeout(),
            )
            .await;
        match session {
            Some(session) => Ok(session),
            None => {
                let current = self.runtime.session();
                if let Some(alert) = current.alert {
                    anyhow::bail!(alert);
                }
                anyhow::bail!("Signed in, but no profile could be loaded for this account")
            }
        }
    }
}
