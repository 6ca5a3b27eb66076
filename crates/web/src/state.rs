//! Application state shared across handlers.

use std::sync::Arc;

use weather_smart_identity::Identity;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    identity: Identity,
}

impl AppState {
    /// Create application state around the bootstrapped identity.
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self {
            inner: Arc::new(AppStateInner { identity }),
        }
    }

    /// The application's identity: cache, auth facade and initializer.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }
}
