//! Subcommand implementations. Output goes to stdout; diagnostics go
//! through tracing.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use cloud_functions::{
    wire_response, CallerContext, ChatProxy, ChatRequest, InvitationRequest, InvitationSender,
};
use document_store::SupabaseDocumentStore;
use session_core::{Navigator, Session};
use tracing::{info, warn};
use webfront_config::Config;
use webfront_model::{format_amount, human_size, FinancialSummary, InvoiceStatus};

use crate::app::App;

pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    fn require(&self) -> anyhow::Result<(&str, &str)> {
        let email = self
            .email
            .as_deref()
            .ok_or_else(|| anyhow!("--email (or WEBFRONT_EMAIL) is required"))?;
        let password = self
            .password
            .as_deref()
            .ok_or_else(|| anyhow!("--password (or WEBFRONT_PASSWORD) is required"))?;
        Ok((email, password))
    }
}

pub async fn signup(config: &Config, credentials: &Credentials, name: &str) -> anyhow::Result<()> {
    let (email, password) = credentials.require()?;
    let app = App::start(config)?;

    let identity = app
        .runtime
        .gateway()
        .sign_up(name, email, password)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    let session = app.resolved_for(&identity.uid).await?;
    print_session(&session, &app);

    app.runtime.shutdown().await;
    Ok(())
}

pub async fn login(config: &Config, credentials: &Credentials) -> anyhow::Result<()> {
    let app = App::start(config)?;
    let session = sign_in(&app, credentials).await?;
    print_session(&session, &app);

    app.runtime.shutdown().await;
    Ok(())
}

pub async fn watch(config: &Config, credentials: &Credentials) -> anyhow::Result<()> {
    let app = App::start(config)?;
    let session = sign_in(&app, credentials).await?;
    print_session(&session, &app);

    let mut changes = app.runtime.context().watch();
    changes.borrow_and_update();
    println!("Watching for changes (Ctrl-C to stop)");
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = changes.borrow_and_update().clone();
                println!("---");
                print_session(&session, &app);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    app.runtime.gateway().sign_out().await.ok();
    app.runtime.shutdown().await;
    Ok(())
}

pub async fn clients(config: &Config, credentials: &Credentials) -> anyhow::Result<()> {
    let app = App::start(config)?;
    let session = sign_in(&app, credentials).await?;
    if !session.is_admin() {
        anyhow::bail!("The clients list is only available to admins");
    }

    // The first collection snapshot arrives from the poller.
    let session = app
        .runtime
        .context()
        .wait_for(|s| !s.clients.is_empty(), app.settle_timeout())
        .await
        .unwrap_or(session);

    println!(
        "{:<28} {:<30} {:<8} {:<12} {:>5}  {}",
        "NAME", "EMAIL", "ROLE", "PHASE", "PROG", "INVOICES"
    );
    for client in &session.clients {
        let paid = client
            .invoices
            .iter()
            .filter(|i| i.status == InvoiceStatus::Paid)
            .count();
        println!(
            "{:<28} {:<30} {:<8} {:<12} {:>4}%  {}/{} paid",
            client.name,
            client.email,
            client.stored_role(),
            client.phase.as_str(),
            client.progress,
            paid,
            client.invoices.len()
        );
    }

    let summary = app
        .runtime
        .gateway()
        .financial_summary()
        .unwrap_or_else(|_| FinancialSummary::from_profiles(&session.clients));
    println!();
    println!(
        "Paid: {} ({} invoices)  Pending: {} ({} invoices)  Total: {}",
        format_amount(summary.paid_total),
        summary.paid_count,
        format_amount(summary.pending_total),
        summary.pending_count,
        format_amount(summary.total())
    );

    app.runtime.shutdown().await;
    Ok(())
}

pub async fn reset_password(
    config: &Config,
    credentials: &Credentials,
    new_password: Option<&str>,
) -> anyhow::Result<()> {
    let app = App::start(config)?;

    let Some(new_password) = new_password else {
        let email = credentials
            .email
            .as_deref()
            .ok_or_else(|| anyhow!("--email (or WEBFRONT_EMAIL) is required"))?;
        app.runtime
            .gateway()
            .request_password_reset(email)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;
        println!("If {} has an account, a reset link is on its way.", email);
        app.runtime.shutdown().await;
        return Ok(());
    };

    let session = sign_in(&app, credentials).await?;
    if !session.requires_password_reset {
        warn!("Account does not owe a password reset; updating anyway");
    }
    app.runtime
        .gateway()
        .complete_password_reset(new_password)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    println!("Password updated. Continue at {}", app.runtime.current_route());

    app.runtime.shutdown().await;
    Ok(())
}

pub async fn chat(
    config: &Config,
    message: String,
    system_prompt: Option<String>,
) -> anyhow::Result<()> {
    let url = config.supabase_url()?;
    let store = Arc::new(SupabaseDocumentStore::new(
        url.as_str(),
        config.supabase_publishable_key.clone(),
    ));
    let proxy = ChatProxy::from_config(store, &config.chat);

    let result = proxy
        .handle(ChatRequest {
            message,
            history: Vec::new(),
            custom_system_prompt: system_prompt,
        })
        .await;
    match result {
        Ok(response) => println!("{}", response.text),
        Err(e) => {
            println!("{}", wire_response::<()>(&Err(e)));
            anyhow::bail!("Chat request failed");
        }
    }
    Ok(())
}

pub async fn invite(
    config: &Config,
    credentials: &Credentials,
    client_email: &str,
    client_name: &str,
) -> anyhow::Result<()> {
    let app = App::start(config)?;
    let session = sign_in(&app, credentials).await?;
    let admin = session
        .identity
        .clone()
        .context("session has no identity")?;

    let provisioned = app
        .runtime
        .gateway()
        .provision_client(client_name, client_email)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    println!(
        "Provisioned {} ({})",
        provisioned.profile.name, provisioned.identity.uid
    );

    let sender = InvitationSender::from_config(
        app.store.clone(),
        &config.mail,
        config.master_admin_email.clone(),
    );
    let response = sender
        .handle(
            &CallerContext::authenticated(admin.uid, admin.email),
            InvitationRequest {
                email: client_email.to_string(),
                name: client_name.to_string(),
                temp_password: provisioned.temporary_password.clone(),
            },
        )
        .await;
    match response {
        Ok(response) => {
            println!("{}", response.message);
            if response.test_mode == Some(true) {
                println!("Temporary password: {}", provisioned.temporary_password);
            }
        }
        Err(e) => {
            println!("{}", wire_response::<()>(&Err(e)));
            println!("Temporary password: {}", provisioned.temporary_password);
        }
    }

    app.runtime.shutdown().await;
    Ok(())
}

async fn sign_in(app: &App, credentials: &Credentials) -> anyhow::Result<Session> {
    let (email, password) = credentials.require()?;
    let identity = app
        .runtime
        .gateway()
        .sign_in(email, password)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    app.resolved_for(&identity.uid).await
}

fn print_session(session: &Session, app: &App) {
    let Some(identity) = &session.identity else {
        println!("Signed out");
        return;
    };
    println!("User:      {}", identity.email.as_deref().unwrap_or(&identity.uid));
    if let Some(role) = session.role {
        println!("Role:      {}", role);
    }
    println!("Phase:     {:?}", session.phase);

    println!("Route:     {}", app.navigator.current_route());
    if session.requires_password_reset {
        println!("Action:    set a new password with `webfront reset-password --new-password ...`");
    }

    if let Some(profile) = &session.profile {
        println!("Project:   {} [{}] {}%", profile.project, profile.phase.as_str(), profile.progress);
        println!("Milestone: {} (due {})", profile.milestone, profile.due_date);
        println!("Invoices:  {}", profile.invoices.len());
        for upload in profile.client_uploads.iter().chain(profile.contracts.iter()) {
            let bytes = upload.decode().map(|b| human_size(b.len()));
            println!(
                "File:      {} {} {}",
                upload.name,
                upload.date,
                bytes.unwrap_or_else(|| upload.size.clone())
            );
        }
    }
    if session.is_admin() {
        println!("Clients:   {}", session.clients.len());
    }
    if let Some(alert) = &session.alert {
        println!("ALERT:     {}", alert);
    }
}
