//! Startup session resolution and the persistent change subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use weather_smart_core::{Session, SessionEvent};

use crate::cache::{CachedIdentity, IdentityCache};
use crate::error::TIMEOUT_MESSAGE;
use crate::store::{CredentialStore, StoreError};

/// Establishes the [`CachedIdentity`] once at startup.
pub struct SessionInitializer {
    store: Arc<dyn CredentialStore>,
    cache: IdentityCache,
    timeout: Duration,
    started: AtomicBool,
    subscription: OnceLock<Subscription>,
}

/// How the startup fetch ended.
enum FetchOutcome {
    Completed(Result<Option<Session>, StoreError>),
    Panicked(String),
    TimedOut,
}

impl SessionInitializer {
    /// Create an initializer that bounds the startup fetch by `timeout`.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, cache: IdentityCache, timeout: Duration) -> Self {
        Self {
            store,
            cache,
            timeout,
            started: AtomicBool::new(false),
            subscription: OnceLock::new(),
        }
    }

    /// Resolve the current session and start following session changes.
    ///
    /// Runs at most once; later calls log a warning and return the current
    /// snapshot without touching the store.
    pub async fn initialize(&self) -> CachedIdentity {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Session initialization already ran, ignoring repeat call");
            return self.cache.snapshot();
        }

        // Subscribe before the first await so no change during the fetch is missed.
        let subscription = Subscription::spawn(self.store.subscribe(), self.cache.clone());
        if self.subscription.set(subscription).is_err() {
            tracing::error!("Session subscription installed twice");
        }

        let outcome = self.fetch_with_timeout().await;
        self.apply(outcome).await;

        let state = self.cache.snapshot();
        tracing::info!(
            signed_in = state.user.is_some(),
            error = ?state.error,
            "Session initialized"
        );
        state
    }

    /// Stop following session changes.
    pub fn shutdown(&self) {
        if let Some(subscription) = self.subscription.get() {
            subscription.cancel();
        }
    }

    /// Race the store fetch against the timeout.
    ///
    /// On timeout the fetch keeps running detached; its result is dropped.
    async fn fetch_with_timeout(&self) -> FetchOutcome {
        let store = Arc::clone(&self.store);
        let mut fetch = tokio::spawn(async move { store.get_current_session().await });

        tokio::select! {
            joined = &mut fetch => match joined {
                Ok(result) => FetchOutcome::Completed(result),
                Err(e) => FetchOutcome::Panicked(e.to_string()),
            },
            () = tokio::time::sleep(self.timeout) => FetchOutcome::TimedOut,
        }
    }

    async fn apply(&self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::TimedOut => {
                tracing::warn!(timeout = ?self.timeout, "Session fetch timed out");
                self.cache.update(|state| {
                    state.user = None;
                    state.error = Some(TIMEOUT_MESSAGE.to_string());
                    state.loading = false;
                });
            }
            FetchOutcome::Completed(Ok(session)) => {
                self.cache.update(|state| state.resolve(session));
            }
            FetchOutcome::Completed(Err(e)) if e.is_invalid_refresh_token() => {
                tracing::info!(error = %e, "Stored refresh token rejected, signing out");
                if let Err(e) = self.store.sign_out().await {
                    tracing::warn!(error = %e, "Sign-out after rejected refresh token failed");
                }
                self.cache.update(|state| {
                    state.user = None;
                    state.error = None;
                    state.loading = false;
                });
            }
            FetchOutcome::Completed(Err(e)) => {
                tracing::error!(error = %e, kind = ?e.kind, "Failed to fetch session");
                self.fail(&e.message);
            }
            FetchOutcome::Panicked(detail) => {
                tracing::error!(error = %detail, "Session fetch panicked");
                self.fail(&detail);
            }
        }
    }

    fn fail(&self, message: &str) {
        self.cache.update(|state| {
            state.error = Some(format!("Authentication error: {message}"));
            state.loading = false;
        });
    }
}

/// A running session-change listener. Cancelled on drop.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Forward every store event into `cache` until cancelled or the store goes away.
    #[must_use]
    pub fn spawn(mut events: broadcast::Receiver<SessionEvent>, cache: IdentityCache) -> Self {
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        tracing::debug!(kind = ?event.kind, "Session change received");
                        let applied = cache.update(|state| {
                            state.resolve(event.session);
                            state.error = None;
                        });
                        if !applied {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Session listener lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Session listener stopped");
        });

        Self { task }
    }

    /// Stop listening.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the listener has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
