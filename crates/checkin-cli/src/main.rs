//! Check-in CLI - sign in, inspect the session, and call the API.
//!
//! Usage:
//!   checkin login [email]
//!   checkin logout
//!   checkin status
//!   checkin whoami
//!   checkin get <path>
//!   checkin forgot-password <email>

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use checkin_core::api::{ApiClient, HttpAuthTransport};
use checkin_core::auth::{RememberedPasswords, SessionManager};
use checkin_core::{Config, Credentials};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file prefix inside the data directory (rotated daily)
const LOG_FILE_PREFIX: &str = "checkin.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g., RUST_LOG=debug). When a data
/// directory is available, logs are also written to a daily rolling file.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn usage() -> &'static str {
    "Usage: checkin <login [email] | logout | status | whoami | get <path> | forgot-password <email>>"
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    let data_dir = config.data_dir().ok();
    let _guard = init_tracing(data_dir.as_deref());
    info!("Check-in CLI starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", usage());
        return Ok(());
    };

    let transport = Arc::new(HttpAuthTransport::new(&config)?);
    let store = config.open_session_store()?;
    let manager = SessionManager::new(transport.clone(), store, config.clone());
    let api = ApiClient::with_client(
        transport.client(),
        transport.base_url(),
        Arc::new(manager.request_gate()),
        manager.state(),
    );

    match command {
        "login" => {
            let email = match args.get(1) {
                Some(email) => email.clone(),
                None => prompt_email(config.last_email.as_deref())?,
            };
            let password = prompt_password(&email)?;

            match manager.login(&Credentials::new(email.clone(), password.clone())).await {
                Ok(user) => {
                    if let Err(e) = RememberedPasswords::remember(&email, &password) {
                        warn!(error = %e, "Failed to remember password");
                    }
                    config.last_email = Some(email);
                    if let Err(e) = config.save() {
                        warn!(error = %e, "Failed to save config");
                    }
                    println!("Signed in as {}", user.display_name());
                }
                Err(e) => bail!("Login failed: {}", e),
            }
        }
        "logout" => {
            manager.logout().await;
            // Signing out also drops the password remembered at sign-in
            if let Some(email) = config.last_email.as_deref() {
                match RememberedPasswords::forget(email) {
                    Ok(true) => info!("Forgot remembered password"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Failed to forget remembered password"),
                }
            }
            println!("Signed out");
        }
        "status" => {
            let status = manager.status();
            if status.authenticated {
                println!("Signed in");
                println!("  access token expires in {} min", status.minutes_until_access_expiry);
                println!("  refresh token expires in {} min", status.minutes_until_refresh_expiry);
                if status.access_expiring_soon {
                    println!("  access token will be refreshed on the next request");
                }
            } else {
                println!("Not signed in");
            }
        }
        "whoami" => match manager.current_user() {
            Some(user) => println!("{}", serde_json::to_string_pretty(user.fields())?),
            None => bail!("Not signed in"),
        },
        "get" => {
            let Some(path) = args.get(1) else {
                bail!("{}", usage());
            };
            let value: serde_json::Value = api.get(path).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        "forgot-password" => {
            let Some(email) = args.get(1) else {
                bail!("{}", usage());
            };
            api.request_password_reset(email).await?;
            println!("If {} has an account, a reset link is on its way", email);
        }
        other => bail!("Unknown command '{}'. {}", other, usage()),
    }

    info!("Check-in CLI finished");
    Ok(())
}

fn prompt_email(last_email: Option<&str>) -> Result<String> {
    match last_email {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last_email) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => bail!("Email required"),
        (false, _) => Ok(input.to_string()),
    }
}

fn prompt_password(email: &str) -> Result<String> {
    if let Some(remembered) = RememberedPasswords::recall(email) {
        print!("Use remembered password? [Y/n]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if input.trim().to_lowercase() != "n" {
            return Ok(remembered);
        }
    }
    let password = rpassword::prompt_password("Password: ")?;
    Ok(password)
}
