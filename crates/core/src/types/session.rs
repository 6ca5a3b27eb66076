//! Sessions issued by the identity service and the events announcing them.

use core::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Email, UserId};

/// The user a session was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Identifier of the user record.
    pub id: UserId,
    /// Sign-in email, absent for accounts created through other providers.
    pub email: Option<Email>,
}

/// A server-issued proof of authentication.
///
/// Owned by the Credential Store; the application only ever holds a copy.
/// Implements `Debug` manually so tokens never reach logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The authenticated user.
    pub user: SessionUser,
    /// Bearer token for calls made on the user's behalf.
    pub access_token: String,
    /// Long-lived token used to mint a new session.
    pub refresh_token: String,
    /// When the access token was issued.
    pub issued_at: DateTime<Utc>,
    /// When the access token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check whether the session has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check whether the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check whether the session expires within `margin` of now.
    ///
    /// Used to refresh slightly ahead of expiry so in-flight requests do not
    /// race the deadline.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.is_expired_at(Utc::now() + margin)
    }

    /// The user's identifier.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user.id
    }

    /// The user's email, if the identity service returned one.
    #[must_use]
    pub const fn user_email(&self) -> Option<&Email> {
        self.user.email.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What caused a session change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEventKind {
    /// A user signed in or signed up with an immediately active session.
    SignedIn,
    /// The session was ended locally or remotely.
    SignedOut,
    /// The access token was replaced using the refresh token.
    TokenRefreshed,
    /// The user record attached to the session changed.
    UserUpdated,
}

/// A session-change notification published by the Credential Store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Why the session changed.
    pub kind: SessionEventKind,
    /// The session after the change, `None` once signed out.
    pub session: Option<Session>,
}

impl SessionEvent {
    /// Build an event carrying the new session.
    #[must_use]
    pub const fn new(kind: SessionEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    /// Build a sign-out event.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self::new(SessionEventKind::SignedOut, None)
    }
}
