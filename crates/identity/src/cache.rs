//! Process-local view of the current identity.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use weather_smart_core::Session;

/// The application's local, possibly momentarily stale, view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedIdentity {
    /// The current session, `None` when signed out.
    pub user: Option<Session>,
    /// `true` while initialization or a sign-in/sign-up is in flight.
    pub loading: bool,
    /// The single user-visible error, if any.
    pub error: Option<String>,
}

/// Coarse identity state used by consumers for routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPhase {
    /// Not resolved yet; consumers should wait.
    Loading,
    /// Resolved with a session.
    SignedIn,
    /// Resolved without a session.
    SignedOut,
}

impl CachedIdentity {
    /// State at application start, before initialization finishes.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            user: None,
            loading: true,
            error: None,
        }
    }

    /// Resolve to `session`, dropping it if it has already expired.
    ///
    /// Keeps `loading == false` from ever coexisting with a stale session.
    pub fn resolve(&mut self, session: Option<Session>) {
        self.user = session.filter(|s| {
            let live = !s.is_expired_at(Utc::now());
            if !live {
                tracing::debug!(user_id = %s.user_id(), "Discarding expired session");
            }
            live
        });
        self.loading = false;
    }

    /// This state as seen at `now`: a session that has expired since it was
    /// stored reads as signed out.
    #[must_use]
    pub fn as_of(mut self, now: DateTime<Utc>) -> Self {
        if self.user.as_ref().is_some_and(|s| s.is_expired_at(now)) {
            self.user = None;
        }
        self
    }

    /// Coarse state for routing. An expired session counts as signed out.
    #[must_use]
    pub fn phase(&self) -> IdentityPhase {
        self.phase_at(Utc::now())
    }

    /// Coarse state for routing as of `now`.
    #[must_use]
    pub fn phase_at(&self, now: DateTime<Utc>) -> IdentityPhase {
        let live = self.user.as_ref().is_some_and(|s| !s.is_expired_at(now));
        match (self.loading, live) {
            (true, _) => IdentityPhase::Loading,
            (false, true) => IdentityPhase::SignedIn,
            (false, false) => IdentityPhase::SignedOut,
        }
    }
}

impl Default for CachedIdentity {
    fn default() -> Self {
        Self::initial()
    }
}

/// Holder of the single [`CachedIdentity`], with change notification.
///
/// Cheap to clone; clones share the same state. Writes go through
/// [`update`](Self::update) and are ignored once the cache is closed.
///
/// Reads through [`snapshot`](Self::snapshot) and
/// [`wait_resolved`](Self::wait_resolved) never return an expired session,
/// even if no refresh or sign-out event has arrived yet. Raw watchers from
/// [`subscribe`](Self::subscribe) should use [`CachedIdentity::as_of`].
#[derive(Clone)]
pub struct IdentityCache {
    inner: Arc<IdentityCacheInner>,
}

struct IdentityCacheInner {
    state: watch::Sender<CachedIdentity>,
    closed: AtomicBool,
}

impl IdentityCache {
    /// Create a cache in the initial loading state.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(CachedIdentity::initial());
        Self {
            inner: Arc::new(IdentityCacheInner {
                state,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> CachedIdentity {
        self.inner.state.borrow().clone().as_of(Utc::now())
    }

    /// Watch for state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CachedIdentity> {
        self.inner.state.subscribe()
    }

    /// Wait until nothing is loading and return that state.
    ///
    /// Returns the latest snapshot immediately if the cache has been closed.
    pub async fn wait_resolved(&self) -> CachedIdentity {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        match rx.wait_for(|state| !state.loading || self.is_closed()).await {
            Ok(state) => state.clone().as_of(Utc::now()),
            Err(_) => self.snapshot(),
        }
    }

    /// Apply `mutate` to the state and notify watchers.
    ///
    /// Returns `false` without touching anything once the cache is closed.
    pub fn update(&self, mutate: impl FnOnce(&mut CachedIdentity)) -> bool {
        if self.is_closed() {
            tracing::debug!("Identity cache closed, dropping update");
            return false;
        }
        self.inner.state.send_modify(mutate);
        true
    }

    /// Stop accepting updates. Used when the owning application shuts down.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            // Wake `wait_resolved` callers so they see the closed flag.
            self.inner.state.send_modify(|_| {});
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use weather_smart_core::{SessionUser, UserId};

    use super::*;

    fn session(expires_in: Duration) -> Session {
        let now = Utc::now();
        Session {
            user: SessionUser {
                id: UserId::new("u1"),
                email: None,
            },
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            issued_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn test_starts_loading() {
        let cache = IdentityCache::new();
        let state = cache.snapshot();
        assert!(state.loading);
        assert!(state.user.is_none());
        assert!(state.error.is_none());
        assert_eq!(state.phase(), IdentityPhase::Loading);
    }

    #[test]
    fn test_resolve_drops_expired_session() {
        let mut state = CachedIdentity::initial();
        state.resolve(Some(session(Duration::seconds(-5))));
        assert!(!state.loading);
        assert!(state.user.is_none());
        assert_eq!(state.phase(), IdentityPhase::SignedOut);

        state.resolve(Some(session(Duration::hours(1))));
        assert_eq!(state.phase(), IdentityPhase::SignedIn);
    }

    #[test]
    fn test_update_after_close_is_ignored() {
        let cache = IdentityCache::new();
        assert!(cache.update(|s| s.error = Some("first".to_string())));

        cache.close();
        assert!(!cache.update(|s| s.error = Some("second".to_string())));
        assert_eq!(cache.snapshot().error.as_deref(), Some("first"));
    }

    #[test]
    fn test_session_expiring_after_resolution_reads_as_signed_out() {
        let mut state = CachedIdentity::initial();
        state.resolve(Some(session(Duration::minutes(5))));
        let later = Utc::now() + Duration::minutes(10);

        assert_eq!(state.phase(), IdentityPhase::SignedIn);
        assert_eq!(state.phase_at(later), IdentityPhase::SignedOut);

        let seen = state.as_of(later);
        assert!(seen.user.is_none());
        assert!(!seen.loading);
    }

    #[tokio::test]
    async fn test_snapshot_drops_session_once_expired() {
        let cache = IdentityCache::new();
        cache.update(|s| s.resolve(Some(session(Duration::milliseconds(200)))));
        assert_eq!(cache.snapshot().phase(), IdentityPhase::SignedIn);

        tokio::time::sleep(std::time::Duration::from_millis(400)).await;

        let state = cache.wait_resolved().await;
        assert!(!state.loading);
        assert!(state.user.is_none());
        assert_eq!(state.phase(), IdentityPhase::SignedOut);
        assert!(cache.snapshot().user.is_none());
    }

    #[tokio::test]
    async fn test_wait_resolved_wakes_on_resolution() {
        let cache = IdentityCache::new();
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.wait_resolved().await })
        };

        cache.update(|s| s.resolve(None));
        let state = waiter.await.unwrap();
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_wait_resolved_returns_when_closed() {
        let cache = IdentityCache::new();
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.wait_resolved().await })
        };

        cache.close();
        assert!(waiter.await.unwrap().loading);
    }

    #[test]
    fn test_subscribers_see_updates() {
        let cache = IdentityCache::new();
        let mut rx = cache.subscribe();
        cache.update(|s| s.error = Some("boom".to_string()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().error.as_deref(), Some("boom"));
    }
}
