//! Sign-in, sign-up and sign-out through the auth facade.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use weather_smart_identity::error::UNEXPECTED_MESSAGE;
use weather_smart_identity::{AuthError, CredentialStore, Identity, IdentityPhase, StoreErrorKind};
use weather_smart_integration_tests::{Reply, ScriptedStore, live_session};

async fn ready(store: &Arc<ScriptedStore>) -> Identity {
    let dyn_store: Arc<dyn CredentialStore> = Arc::clone(store) as Arc<dyn CredentialStore>;
    let identity = Identity::new(dyn_store, Duration::from_secs(10));
    identity.initialize().await;
    identity
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_wrong_password_surfaces_service_message() {
    let store = Arc::new(ScriptedStore::new().with_sign_in(Reply::error(
        StoreErrorKind::InvalidCredentials,
        "Invalid login credentials",
    )));
    let identity = ready(&store).await;

    let err = identity.auth().sign_in("a@b.com", "wrong").await.unwrap_err();

    assert_eq!(err.store_kind(), Some(StoreErrorKind::InvalidCredentials));
    let state = identity.snapshot();
    assert_eq!(state.error.as_deref(), Some("Invalid login credentials"));
    assert!(!state.loading);
    assert!(state.user.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_success_sets_user_before_returning() {
    let store = Arc::new(ScriptedStore::new().with_sign_in(Reply::session(live_session("u1"))));
    let identity = ready(&store).await;

    let session = identity
        .auth()
        .sign_in("u1@weather-smart.test", "hunter22")
        .await
        .unwrap()
        .unwrap();

    let state = identity.snapshot();
    assert_eq!(state.user, Some(session));
    assert!(state.error.is_none());
    assert!(!state.loading);
    assert_eq!(state.phase(), IdentityPhase::SignedIn);
}

/// On a multi-threaded runtime the subscription listener may not have run by
/// the time `sign_in` returns. The snapshot must still show the user.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_after_sign_in_never_shows_resolved_without_user() {
    for round in 0..100 {
        let user_id = format!("u{round}");
        let store =
            Arc::new(ScriptedStore::new().with_sign_in(Reply::session(live_session(&user_id))));
        let identity = ready(&store).await;

        identity
            .auth()
            .sign_in(&format!("{user_id}@weather-smart.test"), "hunter22")
            .await
            .unwrap();

        let state = identity.snapshot();
        assert!(!state.loading, "round {round}: still loading");
        assert_eq!(
            state.user.as_ref().map(|s| s.user_id().as_str()),
            Some(user_id.as_str()),
            "round {round}: resolved without a user"
        );
        assert_eq!(state.phase(), IdentityPhase::SignedIn);
        identity.shutdown();
    }
}

#[tokio::test(start_paused = true)]
async fn test_loading_while_sign_in_is_pending() {
    let store = Arc::new(ScriptedStore::new().with_sign_in(
        Reply::session(live_session("u1")).after(Duration::from_secs(2)),
    ));
    let identity = ready(&store).await;

    let pending = {
        let identity = identity.clone();
        tokio::spawn(async move { identity.auth().sign_in("a@b.com", "hunter22").await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(identity.snapshot().loading);
    assert_eq!(identity.snapshot().phase(), IdentityPhase::Loading);

    pending.await.unwrap().unwrap();
    assert!(!identity.snapshot().loading);
}

#[tokio::test(start_paused = true)]
async fn test_new_attempt_clears_previous_error() {
    let store = Arc::new(ScriptedStore::new().with_sign_in(
        Reply::error(StoreErrorKind::InvalidCredentials, "Invalid login credentials")
            .after(Duration::from_secs(1)),
    ));
    let identity = ready(&store).await;
    identity.auth().sign_in("a@b.com", "wrong").await.unwrap_err();

    let retry = {
        let identity = identity.clone();
        tokio::spawn(async move { identity.auth().sign_in("a@b.com", "wrong").await })
    };
    settle().await;
    assert!(identity.snapshot().error.is_none());

    retry.await.unwrap().unwrap_err();
    assert_eq!(
        identity.snapshot().error.as_deref(),
        Some("Invalid login credentials")
    );
}

#[tokio::test(start_paused = true)]
async fn test_panicking_sign_in_yields_generic_message() {
    let store = Arc::new(ScriptedStore::new().with_sign_in(Reply::panic()));
    let identity = ready(&store).await;

    let err = identity.auth().sign_in("a@b.com", "hunter22").await.unwrap_err();

    assert!(matches!(err, AuthError::Unexpected(_)));
    assert_eq!(err.to_string(), UNEXPECTED_MESSAGE);
    let state = identity.snapshot();
    assert_eq!(state.error.as_deref(), Some(UNEXPECTED_MESSAGE));
    assert!(!state.loading);
    assert!(state.user.is_none());
    assert_eq!(store.sign_in_calls(), 1);

    // The facade stays usable after a panicking call.
    identity.auth().clear_error();
    assert!(identity.snapshot().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_store_yields_generic_message() {
    let store = Arc::new(ScriptedStore::new().with_sign_up(Reply::panic()));
    let identity = ready(&store).await;

    let err = identity.auth().sign_up("a@b.com", "hunter22").await.unwrap_err();

    assert!(matches!(err, AuthError::Unexpected(_)));
    let state = identity.snapshot();
    assert_eq!(state.error.as_deref(), Some(UNEXPECTED_MESSAGE));
    assert!(!state.loading);
}

#[tokio::test(start_paused = true)]
async fn test_sign_up_awaiting_confirmation() {
    let store = Arc::new(ScriptedStore::new().with_sign_up(Reply::no_session()));
    let identity = ready(&store).await;

    let result = identity.auth().sign_up("new@b.com", "hunter22").await.unwrap();
    settle().await;

    assert!(result.is_none());
    let state = identity.snapshot();
    assert!(state.user.is_none());
    assert!(state.error.is_none());
    assert!(!state.loading);
    assert_eq!(store.sign_up_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_email_never_reaches_store() {
    let store = Arc::new(ScriptedStore::new());
    let identity = ready(&store).await;

    let err = identity.auth().sign_in("not-an-email", "hunter22").await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidEmail(_)));
    assert_eq!(store.sign_in_calls(), 0);
    let state = identity.snapshot();
    assert_eq!(state.error, Some(err.to_string()));
    assert!(!state.loading);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_clears_user_even_when_service_fails() {
    let store = Arc::new(
        ScriptedStore::new()
            .with_current_session(Reply::session(live_session("u1")))
            .with_failing_sign_out(StoreErrorKind::Network, "offline"),
    );
    let identity = ready(&store).await;
    assert_eq!(identity.snapshot().phase(), IdentityPhase::SignedIn);

    let err = identity.auth().sign_out().await.unwrap_err();
    settle().await;

    assert_eq!(err.store_kind(), Some(StoreErrorKind::Network));
    let state = identity.snapshot();
    assert!(state.user.is_none());
    assert!(state.error.is_none());
    assert_eq!(store.sign_out_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_success() {
    let store =
        Arc::new(ScriptedStore::new().with_current_session(Reply::session(live_session("u1"))));
    let identity = ready(&store).await;

    identity.auth().sign_out().await.unwrap();
    settle().await;

    assert_eq!(identity.snapshot().phase(), IdentityPhase::SignedOut);
}

#[tokio::test(start_paused = true)]
async fn test_clear_error() {
    let store = Arc::new(ScriptedStore::new().with_sign_in(Reply::error(
        StoreErrorKind::Rejected,
        "Email not confirmed",
    )));
    let identity = ready(&store).await;
    identity.auth().sign_in("a@b.com", "hunter22").await.unwrap_err();
    assert!(identity.snapshot().error.is_some());

    identity.auth().clear_error();

    let state = identity.snapshot();
    assert!(state.error.is_none());
    assert!(!state.loading);
}
