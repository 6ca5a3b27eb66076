//! Authentication error types.

use thiserror::Error;

use crate::store::{StoreError, StoreErrorKind};

/// Message shown when the startup session fetch exceeds its bound.
pub const TIMEOUT_MESSAGE: &str = "Connection timeout. Please check your internet connection.";

/// Message shown when an auth operation fails in an unexpected way.
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Errors returned by [`AuthFacade`](crate::AuthFacade) operations.
///
/// `Display` is the text written to the user-visible `error` field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The email address was rejected before contacting the store.
    #[error("{0}")]
    InvalidEmail(#[from] weather_smart_core::EmailError),

    /// The Credential Store reported a failure; shown verbatim.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The store call panicked or was cancelled.
    #[error("An unexpected error occurred. Please try again.")]
    Unexpected(String),
}

impl AuthError {
    /// The store's classification, if this came from the store.
    #[must_use]
    pub const fn store_kind(&self) -> Option<StoreErrorKind> {
        match self {
            Self::Store(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Whether this was caused by the user's input rather than the system.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEmail(_)
                | Self::Store(StoreError {
                    kind: StoreErrorKind::InvalidCredentials | StoreErrorKind::Rejected,
                    ..
                })
        )
    }
}
