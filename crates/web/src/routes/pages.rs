//! Page handlers that route visitors by identity.
//!
//! Both pages wait for the identity to resolve before deciding, so a visitor
//! is never bounced while initialization or a sign-in is still running.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};

use weather_smart_identity::IdentityPhase;

use crate::state::AppState;

/// A page that depends on who is signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// Public landing page.
    Landing,
    /// The signed-in user's wardrobe.
    Wardrobe,
}

impl Page {
    const fn path(self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::Wardrobe => "/wardrobe",
        }
    }
}

/// Where `page` should send the visitor instead of rendering, if anywhere.
#[must_use]
pub const fn redirect_target(page: Page, phase: IdentityPhase) -> Option<Page> {
    match (page, phase) {
        (Page::Landing, IdentityPhase::SignedIn) => Some(Page::Wardrobe),
        (Page::Wardrobe, IdentityPhase::SignedOut | IdentityPhase::Loading) => Some(Page::Landing),
        _ => None,
    }
}

/// Landing page template.
#[derive(Template, WebTemplate)]
#[template(path = "landing.html")]
pub struct LandingTemplate {
    pub error: Option<String>,
}

/// Wardrobe page template.
#[derive(Template, WebTemplate)]
#[template(path = "wardrobe.html")]
pub struct WardrobeTemplate {
    pub user_id: String,
    pub email: Option<String>,
}

/// GET / - landing page.
pub async fn landing(State(state): State<AppState>) -> Response {
    let identity = state.identity().cache().wait_resolved().await;

    if let Some(target) = redirect_target(Page::Landing, identity.phase()) {
        return Redirect::to(target.path()).into_response();
    }

    LandingTemplate {
        error: identity.error,
    }
    .into_response()
}

/// GET /wardrobe - the signed-in user's wardrobe.
pub async fn wardrobe(State(state): State<AppState>) -> Response {
    let identity = state.identity().cache().wait_resolved().await;

    match (redirect_target(Page::Wardrobe, identity.phase()), identity.user) {
        (None, Some(session)) => WardrobeTemplate {
            user_id: session.user_id().to_string(),
            email: session.user_email().map(|e| e.as_str().to_string()),
        }
        .into_response(),
        (target, _) => {
            tracing::debug!("No session, sending visitor to landing page");
            Redirect::to(target.unwrap_or(Page::Landing).path()).into_response()
        }
    }
}
