//! Weather Smart CLI - account and session tools.
//!
//! # Usage
//!
//! ```bash
//! # Show who is signed in
//! ws-cli auth status
//!
//! # Sign in or create an account
//! ws-cli auth login -e jo@example.com -p 'correct horse'
//! ws-cli auth register -e jo@example.com -p 'correct horse'
//!
//! # Sign out
//! ws-cli auth logout
//! ```
//!
//! The session is kept in `AUTH_SESSION_FILE` (default
//! `.weather-smart/session.json`) so later commands reuse it.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ws-cli")]
#[command(author, version, about = "Weather Smart CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the signed-in account
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Show the current session
    Status,
    /// Sign in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Create an account
    Register {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ws_cli=info,weather_smart_identity=warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Auth { action } => match action {
            AuthAction::Status => commands::auth::status().await?,
            AuthAction::Login { email, password } => {
                commands::auth::login(&email, &password).await?;
            }
            AuthAction::Register { email, password } => {
                commands::auth::register(&email, &password).await?;
            }
            AuthAction::Logout => commands::auth::logout().await?,
        },
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_login_takes_email_and_password() {
        let cli = Cli::try_parse_from(["ws-cli", "auth", "login", "-e", "a@b.com", "-p", "pw"])
            .unwrap();
        match cli.command {
            Commands::Auth {
                action: AuthAction::Login { email, password },
            } => {
                assert_eq!(email, "a@b.com");
                assert_eq!(password, "pw");
            }
            _ => panic!("expected auth login"),
        }
    }

    #[test]
    fn test_register_requires_password() {
        assert!(Cli::try_parse_from(["ws-cli", "auth", "register", "-e", "a@b.com"]).is_err());
    }
}
