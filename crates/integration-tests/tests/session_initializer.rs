//! Startup session resolution against a scripted identity service.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use weather_smart_core::SessionEventKind;
use weather_smart_identity::error::TIMEOUT_MESSAGE;
use weather_smart_identity::{CredentialStore, Identity, IdentityPhase, StoreErrorKind};
use weather_smart_integration_tests::{Reply, ScriptedStore, live_session};

const INIT_TIMEOUT: Duration = Duration::from_secs(10);

fn identity(store: &Arc<ScriptedStore>) -> Identity {
    let store: Arc<dyn CredentialStore> = Arc::clone(store) as Arc<dyn CredentialStore>;
    Identity::new(store, INIT_TIMEOUT)
}

/// Let spawned listeners drain their queues.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_valid_session_resolves_signed_in() {
    let store = Arc::new(
        ScriptedStore::new()
            .with_current_session(Reply::session(live_session("u1")).after(Duration::from_secs(1))),
    );
    let identity = identity(&store);

    let state = identity.initialize().await;

    assert_eq!(state.user.as_ref().unwrap().user_id().as_str(), "u1");
    assert!(!state.loading);
    assert!(state.error.is_none());
    assert_eq!(state.phase(), IdentityPhase::SignedIn);
}

#[tokio::test(start_paused = true)]
async fn test_no_session_resolves_signed_out() {
    let store = Arc::new(ScriptedStore::new());
    let identity = identity(&store);

    let state = identity.initialize().await;

    assert!(state.user.is_none());
    assert!(!state.loading);
    assert!(state.error.is_none());
    assert_eq!(store.current_session_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_service_times_out() {
    let store = Arc::new(ScriptedStore::new().with_current_session(Reply::hang()));
    let identity = identity(&store);

    let started = Instant::now();
    let state = identity.initialize().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= INIT_TIMEOUT);
    assert!(elapsed < INIT_TIMEOUT + Duration::from_secs(1));
    assert!(state.user.is_none());
    assert!(!state.loading);
    assert_eq!(state.error.as_deref(), Some(TIMEOUT_MESSAGE));
}

#[tokio::test(start_paused = true)]
async fn test_late_result_after_timeout_is_ignored() {
    let store = Arc::new(
        ScriptedStore::new()
            .with_current_session(Reply::session(live_session("late")).after(Duration::from_secs(15))),
    );
    let identity = identity(&store);

    let state = identity.initialize().await;
    assert_eq!(state.error.as_deref(), Some(TIMEOUT_MESSAGE));

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(identity.snapshot(), state);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_refresh_token_signs_out_once() {
    let store = Arc::new(ScriptedStore::new().with_current_session(Reply::error(
        StoreErrorKind::InvalidRefreshToken,
        "Invalid Refresh Token: Refresh Token Not Found",
    )));
    let identity = identity(&store);

    let state = identity.initialize().await;
    settle().await;

    assert!(state.user.is_none());
    assert!(!state.loading);
    assert!(state.error.is_none());
    assert_eq!(store.sign_out_calls(), 1);
    assert!(identity.snapshot().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_refresh_token_tolerates_failed_sign_out() {
    let store = Arc::new(
        ScriptedStore::new()
            .with_current_session(Reply::error(
                StoreErrorKind::InvalidRefreshToken,
                "Refresh Token Not Found",
            ))
            .with_failing_sign_out(StoreErrorKind::Network, "offline"),
    );
    let identity = identity(&store);

    let state = identity.initialize().await;

    assert!(state.user.is_none());
    assert!(state.error.is_none());
    assert!(!state.loading);
    assert_eq!(store.sign_out_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_other_failure_is_reported() {
    let store = Arc::new(
        ScriptedStore::new()
            .with_current_session(Reply::error(StoreErrorKind::Network, "Network unreachable")),
    );
    let identity = identity(&store);

    let state = identity.initialize().await;

    assert!(!state.loading);
    assert_eq!(
        state.error.as_deref(),
        Some("Authentication error: Network unreachable")
    );
    assert_eq!(store.sign_out_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_store_is_reported() {
    let store = Arc::new(ScriptedStore::new().with_current_session(Reply::panic()));
    let identity = identity(&store);

    let state = identity.initialize().await;

    assert!(!state.loading);
    assert!(
        state
            .error
            .as_deref()
            .unwrap()
            .starts_with("Authentication error: ")
    );
}

#[tokio::test(start_paused = true)]
async fn test_change_during_fetch_is_applied() {
    let store = Arc::new(
        ScriptedStore::new()
            .with_current_session(Reply::session(live_session("u1")).after(Duration::from_secs(5))),
    );
    let identity = identity(&store);

    let init = {
        let identity = identity.clone();
        tokio::spawn(async move { identity.initialize().await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(identity.snapshot().loading);

    store.publish(SessionEventKind::SignedIn, Some(live_session("u1")));
    settle().await;

    let mid = identity.snapshot();
    assert_eq!(mid.user.as_ref().unwrap().user_id().as_str(), "u1");
    assert!(!mid.loading);

    let state = init.await.unwrap();
    assert_eq!(state.user.unwrap().user_id().as_str(), "u1");
}

#[tokio::test(start_paused = true)]
async fn test_changes_after_timeout_are_followed() {
    let store = Arc::new(ScriptedStore::new().with_current_session(Reply::hang()));
    let identity = identity(&store);

    identity.initialize().await;

    store.publish(SessionEventKind::SignedIn, Some(live_session("u7")));
    settle().await;

    let state = identity.snapshot();
    assert_eq!(state.user.unwrap().user_id().as_str(), "u7");
    assert!(state.error.is_none());

    store.publish(SessionEventKind::SignedOut, None);
    settle().await;
    assert_eq!(identity.snapshot().phase(), IdentityPhase::SignedOut);
}

#[tokio::test(start_paused = true)]
async fn test_expired_session_from_event_is_dropped() {
    let store = Arc::new(ScriptedStore::new());
    let identity = identity(&store);
    identity.initialize().await;

    let mut expired = live_session("u1");
    expired.expires_at = chrono::Utc::now() - chrono::Duration::minutes(1);
    store.publish(SessionEventKind::TokenRefreshed, Some(expired));
    settle().await;

    assert!(identity.snapshot().user.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_second_initialize_is_a_no_op() {
    let store = Arc::new(ScriptedStore::new().with_current_session(Reply::session(live_session("u1"))));
    let identity = identity(&store);

    let first = identity.initialize().await;
    let second = identity.initialize().await;

    assert_eq!(first, second);
    assert_eq!(store.current_session_calls(), 1);
    assert_eq!(store.subscriber_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_fetch_leaves_state_untouched() {
    let store = Arc::new(
        ScriptedStore::new()
            .with_current_session(Reply::session(live_session("u1")).after(Duration::from_secs(3))),
    );
    let identity = identity(&store);

    let init = {
        let identity = identity.clone();
        tokio::spawn(async move { identity.initialize().await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    identity.shutdown();

    let state = init.await.unwrap();
    assert!(state.loading);
    assert!(state.user.is_none());

    store.publish(SessionEventKind::SignedIn, Some(live_session("u1")));
    settle().await;

    assert!(identity.snapshot().user.is_none());
    assert_eq!(store.subscriber_count(), 0);
}

/// Runs on real time: the wall clock has to pass the session's expiry.
#[tokio::test]
async fn test_session_expiring_without_events_reads_as_signed_out() {
    let mut short = live_session("u1");
    short.expires_at = chrono::Utc::now() + chrono::Duration::milliseconds(300);
    let store = Arc::new(ScriptedStore::new().with_current_session(Reply::session(short)));
    let identity = identity(&store);

    let state = identity.initialize().await;
    assert_eq!(state.phase(), IdentityPhase::SignedIn);

    tokio::time::sleep(Duration::from_millis(600)).await;

    let state = identity.cache().wait_resolved().await;
    assert!(!state.loading);
    assert!(state.user.is_none());
    assert_eq!(identity.snapshot().phase(), IdentityPhase::SignedOut);
}
