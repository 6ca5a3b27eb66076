//! Account commands.
//!
//! Every command bootstraps the identity from the session file, runs
//! initialization, then acts through the auth facade.
//!
//! # Environment Variables
//!
//! - `AUTH_URL` - Base URL of the hosted identity service
//! - `AUTH_ANON_KEY` - Public API key for the identity service
//! - `AUTH_SESSION_FILE` - Session file (default: `.weather-smart/session.json`)

use std::sync::Arc;

use thiserror::Error;

use weather_smart_core::Session;
use weather_smart_identity::{
    AuthError, CachedIdentity, ConfigError, Identity, IdentityConfig, RemoteCredentialStore,
};

/// Where the session is kept when `AUTH_SESSION_FILE` is unset.
pub const DEFAULT_SESSION_FILE: &str = ".weather-smart/session.json";

/// Errors that can occur while running an account command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Identity configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client for the identity service could not be built.
    #[error("Failed to build identity client: {0}")]
    Client(String),

    /// The stored session could not be restored.
    #[error("{0}")]
    Restore(String),

    /// The identity service refused or failed the request.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Build the identity and resolve the stored session.
async fn bootstrap() -> Result<(Identity, CachedIdentity), CommandError> {
    let config = IdentityConfig::from_env()?.with_default_session_file(DEFAULT_SESSION_FILE);
    let store =
        RemoteCredentialStore::new(&config).map_err(|e| CommandError::Client(e.to_string()))?;

    let identity = Identity::new(Arc::new(store), config.init_timeout);
    let state = identity.initialize().await;
    Ok((identity, state))
}

fn describe(session: &Session) -> String {
    session.user_email().map_or_else(
        || session.user_id().to_string(),
        |email| format!("{email} ({})", session.user_id()),
    )
}

/// Report the current session.
///
/// # Errors
///
/// Returns `CommandError::Restore` if the stored session could not be
/// checked, e.g. because the identity service timed out.
pub async fn status() -> Result<(), CommandError> {
    let (identity, state) = bootstrap().await?;
    identity.shutdown();

    if let Some(error) = state.error {
        return Err(CommandError::Restore(error));
    }

    match &state.user {
        Some(session) => tracing::info!(
            "Signed in as {} until {}",
            describe(session),
            session.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => tracing::info!("Not signed in"),
    }
    Ok(())
}

/// Sign in and store the session.
///
/// # Errors
///
/// Returns `CommandError::Auth` with the identity service's message if the
/// sign-in is refused.
pub async fn login(email: &str, password: &str) -> Result<(), CommandError> {
    let (identity, _) = bootstrap().await?;
    let result = identity.auth().sign_in(email, password).await;
    identity.shutdown();

    match result? {
        Some(session) => tracing::info!("Signed in as {}", describe(&session)),
        None => tracing::warn!("Sign-in accepted but no session was issued"),
    }
    Ok(())
}

/// Create an account, signing in when no confirmation is required.
///
/// # Errors
///
/// Returns `CommandError::Auth` with the identity service's message if the
/// account cannot be created.
pub async fn register(email: &str, password: &str) -> Result<(), CommandError> {
    let (identity, _) = bootstrap().await?;
    let result = identity.auth().sign_up(email, password).await;
    identity.shutdown();

    match result? {
        Some(session) => tracing::info!("Account created, signed in as {}", describe(&session)),
        None => tracing::info!("Account created, check {email} for a confirmation link"),
    }
    Ok(())
}

/// Sign out and remove the stored session.
///
/// # Errors
///
/// Returns `CommandError::Auth` if the identity service could not be told.
/// The local session is removed either way.
pub async fn logout() -> Result<(), CommandError> {
    let (identity, state) = bootstrap().await?;
    if state.user.is_none() {
        tracing::info!("Not signed in");
    }

    let result = identity.auth().sign_out().await;
    identity.shutdown();
    result?;

    tracing::info!("Signed out");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use weather_smart_core::{Email, SessionUser, UserId};

    use super::*;

    fn session(email: Option<&str>) -> Session {
        Session {
            user: SessionUser {
                id: UserId::new("u1"),
                email: email.map(|e| Email::parse(e).unwrap()),
            },
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_describe_prefers_email() {
        assert_eq!(describe(&session(Some("Jo@Example.com"))), "jo@example.com (u1)");
        assert_eq!(describe(&session(None)), "u1");
    }
}
