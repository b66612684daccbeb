use anyhow::{Context, Result};
use dialoguer::Password;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

use quizzard_gateway::{
    auth::{CredentialStore, RegisterRequest, SessionEvent, SessionSignal, SqliteStorage},
    config::{Command, Config, LogFormat},
    http_client::GatewayClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, command) = Config::load()?;
    config.validate()?;

    init_logging(&config);

    tracing::debug!(
        "Quizzard Gateway {} -> {}",
        env!("CARGO_PKG_VERSION"),
        config.base_url
    );
    tracing::debug!("Session database: {}", config.session_db.display());

    let storage = Arc::new(SqliteStorage::open(&config.session_db)?);
    let store = Arc::new(CredentialStore::load(storage, config.token_key.clone()));

    let signal = SessionSignal::new();
    let mut session_events = signal.subscribe();

    let gateway = GatewayClient::from_config(&config, store, Arc::new(signal))?;

    let result = run(&gateway, command).await;

    // The CLI's login surface is a hint on stderr
    if let Ok(SessionEvent::Expired { reason }) = session_events.try_recv() {
        eprintln!();
        eprintln!("🔒 Session expired: {}", reason);
        eprintln!("   Log in again with:");
        eprintln!();
        eprintln!("      quizzard-gateway login --email <email>");
        eprintln!();
    }

    result
}

async fn run(gateway: &GatewayClient, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let password = resolve_password(password)?;
            let auth = gateway.login(&email, &password).await?;
            if let Some(user) = auth.user {
                println!("{}", serde_json::to_string_pretty(&user)?);
            }
            println!("✅ Logged in as {}", email);
        }

        Command::Register {
            name,
            email,
            password,
        } => {
            let password = resolve_password(password)?;
            let auth = gateway
                .register(&RegisterRequest {
                    name,
                    email: email.clone(),
                    password,
                })
                .await?;
            if auth.user_token.is_some() {
                println!("✅ Registered and logged in as {}", email);
            } else {
                println!("✅ Registered {}. Log in to start a session.", email);
            }
        }

        Command::Logout => {
            gateway.logout().await?;
            println!("👋 Logged out");
        }

        Command::Status => {
            if gateway.is_authenticated() {
                println!("Logged in to {}", gateway.base_url());
            } else {
                println!("Not logged in");
            }
        }

        Command::Request { method, path, data } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method: {}", method))?;

            let body = data
                .map(|d| serde_json::from_str::<Value>(&d))
                .transpose()
                .context("--data must be valid JSON")?;

            let value = gateway.send_json(method, &path, body.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

/// Use the given password or prompt for one
fn resolve_password(password: Option<String>) -> Result<String> {
    let password = match password {
        Some(p) => p,
        None => Password::new()
            .with_prompt("Password")
            .interact()
            .context("Failed to read password")?,
    };

    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    Ok(password)
}

/// Initialize logging with the configured level; RUST_LOG wins when set
fn init_logging(config: &Config) {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
