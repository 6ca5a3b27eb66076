//! JSON auth API over the identity facade.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use weather_smart_core::Session;
use weather_smart_identity::{CachedIdentity, IdentityPhase};

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::state::AppState;

/// Email and password submitted by the client.
#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// The signed-in user as exposed to clients. Tokens never leave the server.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UserView {
    pub id: String,
    pub email: Option<String>,
}

impl From<&Session> for UserView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.user_id().to_string(),
            email: session.user_email().map(|e| e.as_str().to_string()),
        }
    }
}

/// Response body for `GET /api/auth/state`.
#[derive(Debug, Serialize)]
pub struct IdentityView {
    pub phase: IdentityPhase,
    pub user: Option<UserView>,
    pub loading: bool,
    pub error: Option<String>,
}

impl From<&CachedIdentity> for IdentityView {
    fn from(identity: &CachedIdentity) -> Self {
        Self {
            phase: identity.phase(),
            user: identity.user.as_ref().map(UserView::from),
            loading: identity.loading,
            error: identity.error.clone(),
        }
    }
}

/// Response body for sign-in and sign-up.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: Option<UserView>,
    /// `true` when the account exists but the email must be confirmed first.
    pub confirmation_required: bool,
}

fn authenticated(session: Option<&Session>) -> AuthResponse {
    if let Some(session) = session {
        set_sentry_user(
            session.user_id(),
            session.user_email().map(weather_smart_core::Email::as_str),
        );
    }
    AuthResponse {
        user: session.map(UserView::from),
        confirmation_required: session.is_none(),
    }
}

/// GET /api/auth/state
pub async fn state(State(state): State<AppState>) -> Json<IdentityView> {
    Json(IdentityView::from(&state.identity().snapshot()))
}

/// POST /api/auth/sign-in
pub async fn sign_in(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<AuthResponse>> {
    let session = state
        .identity()
        .auth()
        .sign_in(&credentials.email, &credentials.password)
        .await?;
    Ok(Json(authenticated(session.as_ref())))
}

/// POST /api/auth/sign-up
pub async fn sign_up(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<AuthResponse>> {
    let session = state
        .identity()
        .auth()
        .sign_up(&credentials.email, &credentials.password)
        .await?;
    Ok(Json(authenticated(session.as_ref())))
}

/// POST /api/auth/sign-out
///
/// The local session is gone even when this returns an error.
pub async fn sign_out(State(state): State<AppState>) -> Result<StatusCode> {
    let result = state.identity().auth().sign_out().await;
    clear_sentry_user();
    result?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/auth/error
pub async fn clear_error(State(state): State<AppState>) -> StatusCode {
    state.identity().auth().clear_error();
    StatusCode::NO_CONTENT
}
