//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /                  - Landing page (redirects to /wardrobe when signed in)
//! GET    /wardrobe          - Wardrobe page (redirects to / when signed out)
//! GET    /health            - Health check
//!
//! # Auth API (JSON)
//! GET    /api/auth/state    - Current identity state
//! POST   /api/auth/sign-in  - Sign in with email and password
//! POST   /api/auth/sign-up  - Create an account
//! POST   /api/auth/sign-out - Sign out
//! DELETE /api/auth/error    - Dismiss the current error
//! ```

pub mod auth;
pub mod pages;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Create the auth API router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/state", get(auth::state))
        .route("/sign-in", post(auth::sign_in))
        .route("/sign-up", post(auth::sign_up))
        .route("/sign-out", post(auth::sign_out))
        .route("/error", delete(auth::clear_error))
}

/// Create the application router without state or outer layers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::landing))
        .route("/wardrobe", get(pages::wardrobe))
        .nest("/api/auth", auth_routes())
}
