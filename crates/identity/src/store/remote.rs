//! Hosted identity service client.
//!
//! Speaks the token-based REST API of the hosted auth service:
//!
//! 1. `POST auth/v1/token?grant_type=password` signs in
//! 2. `POST auth/v1/signup` creates an account
//! 3. `POST auth/v1/token?grant_type=refresh_token` renews a session
//! 4. `POST auth/v1/logout` revokes the refresh token
//!
//! Every request carries the project's public `apikey` header. The current
//! session is cached in memory (and in the session file when configured) and
//! every change is announced on the broadcast channel.
//!
//! While a session is held, a background task renews it shortly before it
//! expires and announces `TokenRefreshed`, or `SignedOut` when the service no
//! longer accepts the refresh token.

use std::sync::{Arc, PoisonError, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tokio::task::JoinHandle;

use weather_smart_core::{Email, Session, SessionEvent, SessionEventKind, SessionUser, UserId};

use super::{CredentialStore, EVENT_CHANNEL_CAPACITY, SessionFile, StoreError, StoreErrorKind};
use crate::config::IdentityConfig;

/// Refresh sessions this close to expiry instead of handing them out.
const REFRESH_MARGIN_SECONDS: i64 = 60;

/// Wait before retrying a background refresh that failed for a transient reason.
const REFRESH_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(30);

/// Error codes the service uses for unusable refresh tokens.
const REFRESH_TOKEN_ERROR_CODES: &[&str] = &[
    "refresh_token_not_found",
    "refresh_token_already_used",
    "session_not_found",
    "session_expired",
];

/// Message fragments used by deployments that predate `error_code`.
const REFRESH_TOKEN_MESSAGES: &[&str] = &["Invalid Refresh Token", "Refresh Token Not Found"];

const INVALID_CREDENTIALS_CODE: &str = "invalid_credentials";
const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid login credentials";

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Session payload returned by the token and signup endpoints.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
}

/// Signup answers with a session when accounts are auto-confirmed and with a
/// bare user when email confirmation is pending.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    PendingConfirmation(UserResponse),
}

/// Error body. Newer deployments send `error_code`/`msg`, older ones the
/// OAuth-style `error`/`error_description`.
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ErrorResponse {
    fn message(&self) -> Option<&str> {
        self.msg
            .as_deref()
            .or(self.message.as_deref())
            .or(self.error_description.as_deref())
            .or(self.error.as_deref())
    }

    fn kind(&self) -> StoreErrorKind {
        let message = self.message().unwrap_or_default();
        match self.error_code.as_deref() {
            Some(code) if REFRESH_TOKEN_ERROR_CODES.contains(&code) => {
                StoreErrorKind::InvalidRefreshToken
            }
            Some(INVALID_CREDENTIALS_CODE) => StoreErrorKind::InvalidCredentials,
            Some(_) => StoreErrorKind::Rejected,
            None if REFRESH_TOKEN_MESSAGES.iter().any(|m| message.contains(m)) => {
                StoreErrorKind::InvalidRefreshToken
            }
            None if message == INVALID_CREDENTIALS_MESSAGE => StoreErrorKind::InvalidCredentials,
            None => StoreErrorKind::Rejected,
        }
    }
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in));

        Session {
            user: self.user.into_session_user(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            issued_at: now,
            expires_at,
        }
    }
}

impl UserResponse {
    fn into_session_user(self) -> SessionUser {
        SessionUser {
            id: UserId::new(self.id),
            email: self.email.as_deref().and_then(|e| Email::parse(e).ok()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote Credential Store
// ─────────────────────────────────────────────────────────────────────────────

/// Credential Store backed by the hosted identity service.
#[derive(Clone)]
pub struct RemoteCredentialStore {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    client: reqwest::Client,
    config: IdentityConfig,
    file: Option<SessionFile>,
    /// Held across refreshes so concurrent callers never spend a refresh token twice.
    session: Mutex<SessionSlot>,
    events: broadcast::Sender<SessionEvent>,
    /// Pending background refresh for the current session.
    refresher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Drop for RemoteInner {
    fn drop(&mut self) {
        let slot = self.refresher.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = slot.take() {
            task.abort();
        }
    }
}

#[derive(Default)]
struct SessionSlot {
    loaded: bool,
    session: Option<Session>,
}

impl RemoteCredentialStore {
    /// Create a client for the configured identity service.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &IdentityConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("weather-smart/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(RemoteInner {
                client,
                config: config.clone(),
                file: config.session_file.clone().map(SessionFile::new),
                session: Mutex::new(SessionSlot::default()),
                events,
                refresher: std::sync::Mutex::new(None),
            }),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session Slot
    // ─────────────────────────────────────────────────────────────────────────

    /// Lock the session slot, loading the persisted session on first use.
    async fn lock_session(&self) -> MutexGuard<'_, SessionSlot> {
        let mut slot = self.inner.session.lock().await;
        if !slot.loaded {
            slot.loaded = true;
            if let Some(file) = &self.inner.file {
                slot.session = file.load().await;
                tracing::debug!(restored = slot.session.is_some(), "Loaded persisted session");
            }
        }
        slot
    }

    /// Replace the cached session and mirror it to the session file.
    ///
    /// Reschedules the background refresh for the new session, or cancels it
    /// when there is none.
    async fn replace_session(&self, slot: &mut SessionSlot, session: Option<Session>) {
        slot.session = session;
        match &slot.session {
            Some(session) => self.schedule_refresh(session),
            None => self.cancel_refresh(),
        }
        let Some(file) = &self.inner.file else {
            return;
        };

        let result = match &slot.session {
            Some(session) => file.save(session).await,
            None => file.clear().await,
        };
        if let Err(e) = result {
            tracing::warn!(path = %file.path().display(), error = %e, "Failed to update session file");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Background Refresh
    // ─────────────────────────────────────────────────────────────────────────

    fn refresher(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .refresher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh_scheduled(&self) -> bool {
        self.refresher().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Renew `session` once it comes within the refresh margin of expiry.
    fn schedule_refresh(&self, session: &Session) {
        let due = session.expires_at - Duration::seconds(REFRESH_MARGIN_SECONDS);
        let delay = (due - Utc::now()).to_std().unwrap_or_default();
        tracing::debug!(user_id = %session.user_id(), delay_secs = delay.as_secs(), "Scheduled session refresh");
        self.schedule_refresh_in(delay);
    }

    fn schedule_refresh_in(&self, delay: std::time::Duration) {
        let task = tokio::spawn(refresh_when_due(Arc::downgrade(&self.inner), delay));
        if let Some(previous) = self.refresher().replace(task) {
            previous.abort();
        }
    }

    fn cancel_refresh(&self) {
        if let Some(task) = self.refresher().take() {
            task.abort();
        }
    }

    /// Refresh the held session if it is still near expiry.
    async fn refresh_due_session(&self) {
        let mut slot = self.lock_session().await;
        let Some(current) = slot.session.clone() else {
            return;
        };
        if !current.expires_within(Duration::seconds(REFRESH_MARGIN_SECONDS)) {
            // Renewed by a foreground call while this task slept.
            self.schedule_refresh(&current);
            return;
        }

        match self.refresh(&current.refresh_token).await {
            Ok(refreshed) => {
                self.replace_session(&mut slot, Some(refreshed.clone())).await;
                drop(slot);
                tracing::info!(user_id = %refreshed.user_id(), "Session refreshed in background");
                self.publish(SessionEventKind::TokenRefreshed, Some(refreshed));
            }
            Err(e) if e.is_invalid_refresh_token() => {
                self.replace_session(&mut slot, None).await;
                drop(slot);
                tracing::warn!(user_id = %current.user_id(), error = %e, "Refresh token rejected, signing out");
                self.publish(SessionEventKind::SignedOut, None);
            }
            Err(e) => {
                drop(slot);
                tracing::warn!(
                    error = %e,
                    retry_secs = REFRESH_RETRY_DELAY.as_secs(),
                    "Background session refresh failed"
                );
                self.schedule_refresh_in(REFRESH_RETRY_DELAY);
            }
        }
    }

    fn publish(&self, kind: SessionEventKind, session: Option<Session>) {
        // No receivers is fine; nobody is listening yet.
        let receivers = self
            .inner
            .events
            .send(SessionEvent::new(kind, session))
            .unwrap_or(0);
        tracing::debug!(?kind, receivers, "Published session event");
    }

    async fn establish(&self, kind: SessionEventKind, session: Session) -> Session {
        let mut slot = self.lock_session().await;
        self.replace_session(&mut slot, Some(session.clone())).await;
        drop(slot);
        self.publish(kind, Some(session.clone()));
        session
    }

    // ─────────────────────────────────────────────────────────────────────────
    // HTTP
    // ─────────────────────────────────────────────────────────────────────────

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, StoreError> {
        let url = self.inner.config.endpoint(path).map_err(|e| {
            StoreError::new(StoreErrorKind::Malformed, format!("Invalid identity URL: {e}"))
        })?;

        let mut request = self
            .inner
            .client
            .post(url)
            .header("apikey", self.inner.config.anon_key())
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        request.send().await.map_err(transport_error)
    }

    async fn post_for<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, StoreError> {
        let response = ensure_success(self.post(path, body, None).await?).await?;
        response.json::<T>().await.map_err(transport_error)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, StoreError> {
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let token: TokenResponse = self
            .post_for("auth/v1/token?grant_type=refresh_token", &body)
            .await?;
        Ok(token.into_session(Utc::now()))
    }
}

#[async_trait]
impl CredentialStore for RemoteCredentialStore {
    async fn get_current_session(&self) -> Result<Option<Session>, StoreError> {
        let mut slot = self.lock_session().await;
        let Some(current) = slot.session.clone() else {
            return Ok(None);
        };

        if !current.expires_within(Duration::seconds(REFRESH_MARGIN_SECONDS)) {
            // A session restored from the file has no refresh pending yet.
            if !self.refresh_scheduled() {
                self.schedule_refresh(&current);
            }
            return Ok(Some(current));
        }

        tracing::debug!(user_id = %current.user_id(), "Session near expiry, refreshing");
        let refreshed = self.refresh(&current.refresh_token).await?;
        self.replace_session(&mut slot, Some(refreshed.clone())).await;
        drop(slot);

        tracing::info!(user_id = %refreshed.user_id(), "Session refreshed");
        self.publish(SessionEventKind::TokenRefreshed, Some(refreshed.clone()));
        Ok(Some(refreshed))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Option<Session>, StoreError> {
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
        });
        let token: TokenResponse = self
            .post_for("auth/v1/token?grant_type=password", &body)
            .await?;

        let session = self
            .establish(SessionEventKind::SignedIn, token.into_session(Utc::now()))
            .await;
        tracing::info!(user_id = %session.user_id(), "Signed in");
        Ok(Some(session))
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Option<Session>, StoreError> {
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
        });

        match self.post_for::<SignUpResponse>("auth/v1/signup", &body).await? {
            SignUpResponse::Session(token) => {
                let session = self
                    .establish(SessionEventKind::SignedIn, token.into_session(Utc::now()))
                    .await;
                tracing::info!(user_id = %session.user_id(), "Signed up");
                Ok(Some(session))
            }
            SignUpResponse::PendingConfirmation(user) => {
                tracing::info!(user_id = %user.id, "Signed up, awaiting email confirmation");
                Ok(None)
            }
        }
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        let mut slot = self.lock_session().await;
        let previous = slot.session.clone();
        self.replace_session(&mut slot, None).await;
        drop(slot);

        // Local state is gone whatever the service says next.
        self.publish(SessionEventKind::SignedOut, None);

        let Some(previous) = previous else {
            return Ok(());
        };

        let response = self
            .post(
                "auth/v1/logout",
                &serde_json::json!({}),
                Some(&previous.access_token),
            )
            .await?;

        match response.status() {
            // The token was already expired or revoked; nothing left to revoke.
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                tracing::debug!(status = %response.status(), "Session already ended remotely");
                Ok(())
            }
            _ => ensure_success(response).await.map(|_| ()),
        }
    }
}

/// Body of the background refresh task.
///
/// Holds only a weak reference while sleeping so an idle timer never keeps a
/// dropped store alive.
async fn refresh_when_due(inner: Weak<RemoteInner>, delay: std::time::Duration) {
    tokio::time::sleep(delay).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let store = RemoteCredentialStore { inner };
    // Release our own handle first; rescheduling below must not abort this task.
    drop(store.refresher().take());
    store.refresh_due_session().await;
}

/// Turn a non-2xx response into a classified [`StoreError`].
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: ErrorResponse = serde_json::from_str(&text).unwrap_or_default();
    let kind = if status.is_server_error() {
        StoreErrorKind::Network
    } else {
        body.kind()
    };
    let message = body
        .message()
        .map_or_else(|| format!("Identity service returned {status}"), str::to_string);

    tracing::debug!(%status, ?kind, error_code = ?body.error_code, "Identity request failed");
    Err(StoreError::new(kind, message))
}

fn transport_error(error: reqwest::Error) -> StoreError {
    if error.is_decode() {
        StoreError::new(
            StoreErrorKind::Malformed,
            format!("Unexpected response from identity service: {error}"),
        )
    } else {
        StoreError::new(
            StoreErrorKind::Network,
            format!("Could not reach identity service: {error}"),
        )
    }
}
