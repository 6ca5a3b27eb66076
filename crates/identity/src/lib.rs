//! Weather Smart identity lifecycle.
//!
//! Establishes, refreshes and propagates the signed-in user for the rest of
//! the application.
//!
//! # Components
//!
//! - [`CredentialStore`] - the identity service of record (trait), with
//!   [`RemoteCredentialStore`] talking to the hosted service
//! - [`IdentityCache`] - the single [`CachedIdentity`] plus change notification
//! - [`SessionInitializer`] - one-shot startup resolution under a timeout and
//!   the persistent session-change subscription
//! - [`AuthFacade`] - sign-in, sign-up, sign-out, clear-error
//!
//! # Example
//!
//! ```rust,ignore
//! let config = IdentityConfig::from_env()?;
//! let store = Arc::new(RemoteCredentialStore::new(&config)?);
//! let identity = Identity::new(store, config.init_timeout);
//!
//! let state = identity.initialize().await;
//! if state.user.is_none() {
//!     identity.auth().sign_in("jo@example.com", "correct horse").await?;
//! }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod error;
pub mod facade;
pub mod initializer;
pub mod store;

pub use cache::{CachedIdentity, IdentityCache, IdentityPhase};
pub use config::{ConfigError, IdentityConfig};
pub use error::AuthError;
pub use facade::AuthFacade;
pub use initializer::{SessionInitializer, Subscription};
pub use store::{
    CredentialStore, RemoteCredentialStore, SessionFile, StoreError, StoreErrorKind,
};

use std::sync::Arc;
use std::time::Duration;

/// The application's identity, built once at bootstrap and shared by reference.
///
/// Cheaply cloneable; clones share the same cache, facade and initializer.
#[derive(Clone)]
pub struct Identity {
    inner: Arc<IdentityInner>,
}

struct IdentityInner {
    cache: IdentityCache,
    auth: AuthFacade,
    initializer: SessionInitializer,
}

impl Identity {
    /// Wire the cache, facade and initializer around `store`.
    ///
    /// `init_timeout` bounds the startup session fetch.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, init_timeout: Duration) -> Self {
        let cache = IdentityCache::new();
        let auth = AuthFacade::new(Arc::clone(&store), cache.clone());
        let initializer = SessionInitializer::new(store, cache.clone(), init_timeout);

        Self {
            inner: Arc::new(IdentityInner {
                cache,
                auth,
                initializer,
            }),
        }
    }

    /// Resolve the startup session. See [`SessionInitializer::initialize`].
    pub async fn initialize(&self) -> CachedIdentity {
        self.inner.initializer.initialize().await
    }

    /// The shared identity cache.
    #[must_use]
    pub fn cache(&self) -> &IdentityCache {
        &self.inner.cache
    }

    /// The auth facade.
    #[must_use]
    pub fn auth(&self) -> &AuthFacade {
        &self.inner.auth
    }

    /// Copy of the current identity state.
    #[must_use]
    pub fn snapshot(&self) -> CachedIdentity {
        self.inner.cache.snapshot()
    }

    /// Tear down: stop the subscription and freeze the cache.
    ///
    /// Any store call still in flight completes without mutating state.
    pub fn shutdown(&self) {
        self.inner.initializer.shutdown();
        self.inner.cache.close();
        tracing::debug!("Identity shut down");
    }
}
