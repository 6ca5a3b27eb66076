//! Integration test support for the Weather Smart identity lifecycle.
//!
//! Provides [`ScriptedStore`], a [`CredentialStore`] whose answers are set up
//! by each test, and helpers for building sessions.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p weather-smart-integration-tests
//! ```
//!
//! Timeout tests use `#[tokio::test(start_paused = true)]`, so the ten second
//! initialization bound elapses instantly.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::broadcast;

use weather_smart_core::{Email, Session, SessionEvent, SessionEventKind, SessionUser, UserId};
use weather_smart_identity::{CredentialStore, StoreError, StoreErrorKind};

/// Build a session for `user_id` that expires in an hour.
#[must_use]
pub fn live_session(user_id: &str) -> Session {
    let now = Utc::now();
    Session {
        user: SessionUser {
            id: UserId::new(user_id),
            email: Some(Email::parse(&format!("{user_id}@weather-smart.test")).unwrap()),
        },
        access_token: format!("access-{user_id}"),
        refresh_token: format!("refresh-{user_id}"),
        issued_at: now,
        expires_at: now + chrono::Duration::hours(1),
    }
}

/// What a scripted call does once its delay has passed.
#[derive(Debug, Clone)]
enum Outcome {
    Session(Option<Session>),
    Error(StoreError),
    Hang,
    Panic,
}

/// A scripted answer for one kind of store call.
#[derive(Debug, Clone)]
pub struct Reply {
    delay: Duration,
    outcome: Outcome,
}

impl Reply {
    /// Answer with `session`.
    #[must_use]
    pub const fn session(session: Session) -> Self {
        Self::outcome(Outcome::Session(Some(session)))
    }

    /// Answer successfully without a session.
    #[must_use]
    pub const fn no_session() -> Self {
        Self::outcome(Outcome::Session(None))
    }

    /// Fail with `kind` and `message`.
    #[must_use]
    pub fn error(kind: StoreErrorKind, message: &str) -> Self {
        Self::outcome(Outcome::Error(StoreError::new(kind, message)))
    }

    /// Never answer.
    #[must_use]
    pub const fn hang() -> Self {
        Self::outcome(Outcome::Hang)
    }

    /// Panic inside the store.
    #[must_use]
    pub const fn panic() -> Self {
        Self::outcome(Outcome::Panic)
    }

    /// Answer only after `delay`.
    #[must_use]
    pub const fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    const fn outcome(outcome: Outcome) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome,
        }
    }

    async fn play(self) -> Result<Option<Session>, StoreError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.outcome {
            Outcome::Session(session) => Ok(session),
            Outcome::Error(e) => Err(e),
            Outcome::Hang => std::future::pending().await,
            Outcome::Panic => panic!("scripted store panic"),
        }
    }
}

/// A [`CredentialStore`] driven entirely by the test.
///
/// Successful sign-ins and sign-ups announce `SignedIn`, and every sign-out
/// announces `SignedOut`, the way the hosted service does.
pub struct ScriptedStore {
    current: Mutex<Reply>,
    sign_in: Mutex<Reply>,
    sign_up: Mutex<Reply>,
    sign_out: Mutex<Option<StoreError>>,
    events: broadcast::Sender<SessionEvent>,
    current_calls: AtomicUsize,
    sign_in_calls: AtomicUsize,
    sign_up_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl Default for ScriptedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedStore {
    /// A store with no session that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            current: Mutex::new(Reply::no_session()),
            sign_in: Mutex::new(Reply::no_session()),
            sign_up: Mutex::new(Reply::no_session()),
            sign_out: Mutex::new(None),
            events,
            current_calls: AtomicUsize::new(0),
            sign_in_calls: AtomicUsize::new(0),
            sign_up_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    /// Script `get_current_session`.
    #[must_use]
    pub fn with_current_session(self, reply: Reply) -> Self {
        *self.current.lock().unwrap() = reply;
        self
    }

    /// Script `sign_in_with_password`.
    #[must_use]
    pub fn with_sign_in(self, reply: Reply) -> Self {
        *self.sign_in.lock().unwrap() = reply;
        self
    }

    /// Script `sign_up`.
    #[must_use]
    pub fn with_sign_up(self, reply: Reply) -> Self {
        *self.sign_up.lock().unwrap() = reply;
        self
    }

    /// Make `sign_out` fail with `kind` and `message`.
    #[must_use]
    pub fn with_failing_sign_out(self, kind: StoreErrorKind, message: &str) -> Self {
        *self.sign_out.lock().unwrap() = Some(StoreError::new(kind, message));
        self
    }

    /// Announce a session change as if it came from the service.
    pub fn publish(&self, kind: SessionEventKind, session: Option<Session>) {
        let _ = self.events.send(SessionEvent::new(kind, session));
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Calls made to `get_current_session`.
    #[must_use]
    pub fn current_session_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    /// Calls made to `sign_in_with_password`.
    #[must_use]
    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    /// Calls made to `sign_up`.
    #[must_use]
    pub fn sign_up_calls(&self) -> usize {
        self.sign_up_calls.load(Ordering::SeqCst)
    }

    /// Calls made to `sign_out`.
    #[must_use]
    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    fn announce_sign_in(&self, result: &Result<Option<Session>, StoreError>) {
        if let Ok(Some(session)) = result {
            self.publish(SessionEventKind::SignedIn, Some(session.clone()));
        }
    }
}

#[async_trait]
impl CredentialStore for ScriptedStore {
    async fn get_current_session(&self) -> Result<Option<Session>, StoreError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.current.lock().unwrap().clone();
        reply.play().await
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        _email: &Email,
        _password: &SecretString,
    ) -> Result<Option<Session>, StoreError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.sign_in.lock().unwrap().clone();
        let result = reply.play().await;
        self.announce_sign_in(&result);
        result
    }

    async fn sign_up(
        &self,
        _email: &Email,
        _password: &SecretString,
    ) -> Result<Option<Session>, StoreError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.sign_up.lock().unwrap().clone();
        let result = reply.play().await;
        self.announce_sign_in(&result);
        result
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.publish(SessionEventKind::SignedOut, None);
        let failure = self.sign_out.lock().unwrap().clone();
        failure.map_or(Ok(()), Err)
    }
}
