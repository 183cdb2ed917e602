//! quill - command-line client for the quill blog API.
//!
//! Logs in, keeps the session across invocations, and issues authenticated
//! requests. Set `RUST_LOG=debug` to see request and refresh activity.

mod console;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quill_core::auth::{FileTokenStore, KeyringTokenStore, TokenStore};
use quill_core::{Config, Credentials, Hooks, SessionManager, StorageKind};

use console::{ConsoleNavigator, ConsoleNotifier};

#[derive(Parser)]
#[command(name = "quill", version, about = "Command-line client for the quill blog API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        /// Account name (defaults to the last one used)
        #[arg(short, long)]
        account: Option<String>,
    },
    /// End the session, locally and on the server
    Logout,
    /// Show who is signed in and when the token expires
    Status,
    /// Authenticated GET; prints the response payload as JSON
    Get {
        /// API path, e.g. /posts
        path: String,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn token_store(config: &Config) -> Result<Box<dyn TokenStore>> {
    Ok(match config.storage {
        StorageKind::File => Box::new(FileTokenStore::new(config.cache_dir()?)),
        StorageKind::Keyring => Box::new(KeyringTokenStore::new()),
    })
}

fn prompt_account(default: Option<&str>) -> Result<String> {
    match default {
        Some(name) => eprint!("Account [{}]: ", name),
        None => eprint!("Account: "),
    }
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read account name")?;
    let line = line.trim();
    match (line.is_empty(), default) {
        (false, _) => Ok(line.to_string()),
        (true, Some(name)) => Ok(name.to_string()),
        (true, None) => bail!("Account name is required"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::load()?;
    let store = token_store(&config)?;
    let hooks = Hooks::new(Arc::new(ConsoleNotifier), Arc::new(ConsoleNavigator));
    let manager = SessionManager::new(config.clone(), store, hooks)?;
    manager.resume_session();

    let result = run(cli.command, &manager, &mut config).await;

    manager.shutdown();
    result
}

async fn run(command: Command, manager: &SessionManager, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { account } => {
            let account = match account {
                Some(account) => account,
                None => prompt_account(config.last_account.as_deref())?,
            };
            let password = rpassword::prompt_password("Password: ")
                .context("Failed to read password")?;

            // The notifier has already told the user what went wrong.
            let user = manager.login(&Credentials::new(account.clone(), password)).await?;
            info!(user = %user.name, "Login complete");

            config.last_account = Some(account);
            config.save()?;
        }
        Command::Logout => {
            if !manager.is_logged_in() {
                println!("Not logged in.");
                return Ok(());
            }
            manager.logout().await;
        }
        Command::Status => match manager.user() {
            Some(user) => {
                let minutes = manager.minutes_until_expiry().unwrap_or(0);
                println!("Logged in as {} (id {})", user.name, user.id);
                if user.is_admin() {
                    println!("Role: admin");
                } else if !user.roles.is_empty() {
                    println!("Roles: {}", user.roles.join(", "));
                }
                if manager.is_token_expired() {
                    println!("Access token expired; it will be renewed on next use.");
                } else {
                    println!("Access token valid for {} more minute(s).", minutes);
                }
            }
            None => println!("Not logged in."),
        },
        Command::Get { path } => {
            let payload: serde_json::Value = manager.get(&path).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }
    Ok(())
}
