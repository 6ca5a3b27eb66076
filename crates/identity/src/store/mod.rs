//! Credential Store abstraction.
//!
//! The Credential Store is the identity service of record. The rest of the
//! crate only talks to it through [`CredentialStore`], so the lifecycle can be
//! driven by the hosted service ([`RemoteCredentialStore`]) in production and
//! by scripted stores in tests.

mod persist;
mod remote;

pub use persist::SessionFile;
pub use remote::RemoteCredentialStore;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::broadcast;

use weather_smart_core::{Email, Session, SessionEvent};

/// Capacity of the session-change broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Structured classification of Credential Store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The refresh token is unknown, revoked, already used or expired.
    ///
    /// Expected after long inactivity or a sign-out elsewhere; recovered by
    /// signing out locally.
    InvalidRefreshToken,
    /// Email/password combination was rejected.
    InvalidCredentials,
    /// The service understood the request and refused it.
    Rejected,
    /// The service could not be reached or did not answer in time.
    Network,
    /// The service answered with something we could not interpret.
    Malformed,
}

/// A failure reported by the Credential Store.
///
/// `message` is human-readable text suitable for showing to the user as-is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StoreError {
    /// Classification used for recovery decisions.
    pub kind: StoreErrorKind,
    /// Message reported by the service (or describing the transport failure).
    pub message: String,
}

impl StoreError {
    /// Create a store error.
    #[must_use]
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether this error means the stored refresh token is no longer usable.
    #[must_use]
    pub fn is_invalid_refresh_token(&self) -> bool {
        self.kind == StoreErrorKind::InvalidRefreshToken
    }
}

/// The identity service of record.
///
/// Implementations own the authoritative session and publish every change on
/// the channel returned by [`subscribe`](Self::subscribe).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Return the current session, refreshing it first if it is about to expire.
    async fn get_current_session(&self) -> Result<Option<Session>, StoreError>;

    /// Subscribe to session-change events.
    ///
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Sign in with email and password.
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Option<Session>, StoreError>;

    /// Create an account.
    ///
    /// Returns `Ok(None)` when the account must be confirmed before a session
    /// is issued.
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Option<Session>, StoreError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), StoreError>;
}
