//! WebFront command-line client.

mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use webfront_config::{init_logging, Config, Paths};

/// WebFront client portal from the terminal.
#[derive(Parser)]
#[command(name = "webfront")]
#[command(about = "Sign in, watch your session and manage clients of the WebFront portal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for runtime files (config, logs). Defaults to ~/.webfront
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Account email
    #[arg(long, env = "WEBFRONT_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[arg(long, env = "WEBFRONT_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and its profile
    Signup {
        /// Display name for the new profile
        #[arg(long)]
        name: String,
    },
    /// Sign in and print the resolved session
    Login,
    /// Sign in and print every session change until interrupted
    Watch,
    /// List every client profile with an invoice summary (admins only)
    Clients,
    /// Request a reset mail, or set a new password with --new-password
    ResetPassword {
        /// Replace the temporary password of a provisioned account
        #[arg(long)]
        new_password: Option<String>,
    },
    /// Ask the project assistant a question
    Chat {
        /// The question
        message: String,
        /// Override the configured system prompt
        #[arg(long)]
        system_prompt: Option<String>,
    },
    /// Provision a client account and mail its invitation (admins only)
    Invite {
        /// Client contact email
        #[arg(long)]
        client_email: String,
        /// Client display name
        #[arg(long)]
        client_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    config.validate()?;

    let credentials = commands::Credentials {
        email: cli.email,
        password: cli.password,
    };

    match cli.command {
        Commands::Signup { name } => commands::signup(&config, &credentials, &name).await?,
        Commands::Login => commands::login(&config, &credentials).await?,
        Commands::Watch => commands::watch(&config, &credentials).await?,
        Commands::Clients => commands::clients(&config, &credentials).await?,
        Commands::ResetPassword { new_password } => {
            commands::reset_password(&config, &credentials, new_password.as_deref()).await?
        }
        Commands::Chat {
            message,
            system_prompt,
        } => commands::chat(&config, message, system_prompt).await?,
        Commands::Invite {
            client_email,
            client_name,
        } => commands::invite(&config, &credentials, &client_email, &client_name).await?,
    }

    Ok(())
}
