//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before responding; clients only ever see the
//! user-facing message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use weather_smart_identity::{AuthError, StoreErrorKind};

/// Application-level error type for the web binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// An auth operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Auth(AuthError::InvalidEmail(_)) => StatusCode::BAD_REQUEST,
            Self::Auth(AuthError::Store(e)) => match e.kind {
                StoreErrorKind::InvalidCredentials | StoreErrorKind::InvalidRefreshToken => {
                    StatusCode::UNAUTHORIZED
                }
                StoreErrorKind::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
                StoreErrorKind::Network | StoreErrorKind::Malformed => StatusCode::BAD_GATEWAY,
            },
            Self::Auth(AuthError::Unexpected(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message safe to show to the client.
    ///
    /// Auth errors already carry user-facing text; unexpected failures hide
    /// their detail behind a generic message.
    fn public_message(&self) -> String {
        match self {
            Self::Auth(e) => e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
