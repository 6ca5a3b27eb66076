//! Deliberate identity changes: sign-in, sign-up, sign-out.

use std::sync::Arc;

use secrecy::SecretString;

use weather_smart_core::{Email, Session};

use crate::cache::IdentityCache;
use crate::error::AuthError;
use crate::store::{CredentialStore, StoreError};

/// Which credential operation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialAction {
    SignIn,
    SignUp,
}

impl CredentialAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::SignUp => "sign_up",
        }
    }
}

/// Entry point for auth actions taken by the user.
///
/// Every operation leaves `loading == false` behind and reports failures both
/// through its return value and the shared `error` field. Store calls run on
/// their own task so a panic inside the store becomes an
/// [`AuthError::Unexpected`] instead of unwinding through the caller.
#[derive(Clone)]
pub struct AuthFacade {
    store: Arc<dyn CredentialStore>,
    cache: IdentityCache,
}

impl AuthFacade {
    /// Create a facade writing into `cache`.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, cache: IdentityCache) -> Self {
        Self { store, cache }
    }

    /// Sign in with email and password.
    ///
    /// On success the store's result is returned unchanged and the cached
    /// user is set in the same update that clears `loading`, so a snapshot
    /// taken right after this returns already shows the session. The
    /// subscription's later `SignedIn` event writes the same value.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed address,
    /// `AuthError::Store` with the service's message when the store refuses,
    /// and `AuthError::Unexpected` if the store call panics.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError> {
        self.run(CredentialAction::SignIn, email, password).await
    }

    /// Create an account. Same contract as [`sign_in`](Self::sign_in).
    ///
    /// `Ok(None)` means the account awaits email confirmation.
    ///
    /// # Errors
    ///
    /// See [`sign_in`](Self::sign_in).
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError> {
        self.run(CredentialAction::SignUp, email, password).await
    }

    /// Sign out.
    ///
    /// The cached user is cleared even when the store call fails, so the
    /// application never keeps presenting a session it tried to end.
    ///
    /// # Errors
    ///
    /// Returns the store's failure after local state has been cleared.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.cache.update(|state| state.error = None);

        let store = Arc::clone(&self.store);
        let result = join_store_call(tokio::spawn(async move { store.sign_out().await })).await;

        self.cache.update(|state| state.user = None);

        match &result {
            Ok(()) => tracing::info!("Signed out"),
            Err(e) => tracing::warn!(error = %e, "Remote sign-out failed, cleared local session"),
        }
        result
    }

    /// Dismiss the current error.
    pub fn clear_error(&self) {
        self.cache.update(|state| state.error = None);
    }

    async fn run(
        &self,
        action: CredentialAction,
        email: &str,
        password: &str,
    ) -> Result<Option<Session>, AuthError> {
        self.cache.update(|state| {
            state.loading = true;
            state.error = None;
        });

        let result = self.call_store(action, email, password).await;

        self.cache.update(|state| match &result {
            Ok(Some(session)) => state.resolve(Some(session.clone())),
            Ok(None) => state.loading = false,
            Err(e) => {
                state.loading = false;
                state.error = Some(e.to_string());
            }
        });

        if let Err(e) = &result {
            if e.is_user_error() {
                tracing::info!(action = action.as_str(), error = %e, "Auth request refused");
            } else {
                tracing::error!(action = action.as_str(), error = ?e, "Auth request failed");
            }
        }
        result
    }

    async fn call_store(
        &self,
        action: CredentialAction,
        email: &str,
        password: &str,
    ) -> Result<Option<Session>, AuthError> {
        let email = Email::parse(email)?;
        let password = SecretString::from(password);
        let store = Arc::clone(&self.store);

        let task = tokio::spawn(async move {
            match action {
                CredentialAction::SignIn => store.sign_in_with_password(&email, &password).await,
                CredentialAction::SignUp => store.sign_up(&email, &password).await,
            }
        });
        join_store_call(task).await
    }
}

/// Await a spawned store call, turning a panic into [`AuthError::Unexpected`].
async fn join_store_call<T>(
    task: tokio::task::JoinHandle<Result<T, StoreError>>,
) -> Result<T, AuthError> {
    match task.await {
        Ok(result) => result.map_err(AuthError::from),
        Err(e) => Err(AuthError::Unexpected(e.to_string())),
    }
}
