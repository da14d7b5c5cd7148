//! Wires the resolver, synchronizer, guards and gateway around one session.

use crate::gateway::MutationGateway;
use crate::guards::{GuardDecision, RouteGate};
use crate::navigation::Navigator;
use crate::resolver::SessionResolver;
use crate::sync::LiveDataSynchronizer;
use crate::{Route, Session, SessionContext};
use document_store::DocumentStore;
use identity_client::IdentityClient;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use webfront_config::{Config, DEFAULT_RESOLVE_TIMEOUT_MS};

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub master_admin_email: Option<String>,
    /// Upper bound on waiting for the identity provider's first report.
    pub resolve_timeout: Duration,
}

impl RuntimeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            master_admin_email: config.master_admin_email.clone(),
            resolve_timeout: config.resolve_timeout(),
        }
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            master_admin_email: None,
            resolve_timeout: Duration::from_millis(DEFAULT_RESOLVE_TIMEOUT_MS),
        }
    }
}

pub struct SessionRuntime {
    identity: Arc<dyn IdentityClient>,
    context: SessionContext,
    resolver: Arc<SessionResolver>,
    synchronizer: Arc<LiveDataSynchronizer>,
    gateway: Arc<MutationGateway>,
    gate: Arc<RouteGate>,
    options: RuntimeOptions,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionRuntime {
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        store: Arc<dyn DocumentStore>,
        navigator: Arc<dyn Navigator>,
        options: RuntimeOptions,
    ) -> Self {
        let context = SessionContext::new();
        let master = options.master_admin_email.clone();
        let resolver = Arc::new(SessionResolver::new(
            Arc::clone(&store),
            context.clone(),
            Arc::clone(&navigator),
            master.clone(),
        ));
        let synchronizer = Arc::new(LiveDataSynchronizer::new(
            Arc::clone(&store),
            context.clone(),
            master.clone(),
        ));
        let gateway = Arc::new(MutationGateway::new(
            Arc::clone(&identity),
            store,
            context.clone(),
            Arc::clone(&resolver),
            Arc::clone(&navigator),
            master,
        ));
        let gate = Arc::new(RouteGate::new(context.clone(), navigator));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            identity,
            context,
            resolver,
            synchronizer,
            gateway,
            gate,
            options,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start listening. Calling `start` twice is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.is_empty() {
            return;
        }

        // Identity listener: the current state first, then every change.
        let resolver = Arc::clone(&self.resolver);
        let mut states = self.identity.watch_state();
        let mut shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            let initial = states.borrow_and_update().clone();
            resolver.handle_identity_state(initial).await;
            loop {
                tokio::select! {
                    changed = states.changed() => {
                        if changed.is_err() {
                            debug!("Identity state channel closed");
                            break;
                        }
                        let state = states.borrow_and_update().clone();
                        resolver.handle_identity_state(state).await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));

        let resolver = Arc::clone(&self.resolver);
        let timeout = self.options.resolve_timeout;
        let mut shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => resolver.expire(),
                _ = shutdown.changed() => {}
            }
        }));

        // Live data and guards follow every session change.
        let synchronizer = Arc::clone(&self.synchronizer);
        let gate = Arc::clone(&self.gate);
        let mut sessions = self.context.watch();
        let mut shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                let session = sessions.borrow_and_update().clone();
                synchronizer.apply(&session);
                gate.enforce();
                tokio::select! {
                    changed = sessions.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));

        info!(
            resolve_timeout_ms = self.options.resolve_timeout.as_millis() as u64,
            "Session runtime started"
        );
    }

    /// Stop every task and drop the live subscription.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        self.synchronizer.teardown();
        info!("Session runtime stopped");
    }

    pub fn session(&self) -> Session {
        self.context.snapshot()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn gateway(&self) -> &MutationGateway {
        &self.gateway
    }

    pub fn resolver(&self) -> &SessionResolver {
        &self.resolver
    }

    pub fn synchronizer(&self) -> &LiveDataSynchronizer {
        &self.synchronizer
    }

    /// Navigate and apply guards to the destination.
    pub fn navigate(&self, route: Route) -> GuardDecision {
        self.gate.navigate(route)
    }

    pub fn current_route(&self) -> Route {
        self.gate.current_route()
    }

    /// Wait until resolution has settled.
    pub async fn wait_until_resolved(&self, timeout: Duration) -> Option<Session> {
        self.context
            .wait_for(|s| !s.resolving && s.phase.is_settled(), timeout)
            .await
    }
}

impl Drop for SessionRuntime {
    fn drop(&mut self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}
