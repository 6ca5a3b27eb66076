//! Weather Smart web server.
//!
//! Serves the landing and wardrobe pages plus the JSON auth API on port 3000.
//!
//! # Startup
//!
//! 1. Load configuration and initialize Sentry and tracing
//! 2. Build the identity around the hosted identity service
//! 3. Resolve the stored session in the background while the listener starts
//!
//! Pages wait for that resolution before routing visitors, so requests that
//! arrive early are held rather than misrouted.
//!
//! # Single-User Model
//!
//! The process holds exactly one identity: the session of whoever signed in
//! on this machine. Every request is served as that user and there are no
//! per-visitor cookies. The server therefore only binds loopback addresses;
//! `WEB_HOST` values such as `0.0.0.0` are rejected at startup.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weather_smart_identity::{Identity, RemoteCredentialStore};
use weather_smart_web::config::WebConfig;
use weather_smart_web::error::set_sentry_user;
use weather_smart_web::state::AppState;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &WebConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let config = WebConfig::from_env().expect("Failed to load configuration");

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "weather_smart_web=info,weather_smart_identity=info,tower_http=debug".into()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let store = RemoteCredentialStore::new(&config.identity)
        .expect("Failed to build identity service client");
    let identity = Identity::new(Arc::new(store), config.identity.init_timeout);

    {
        let identity = identity.clone();
        tokio::spawn(async move {
            let state = identity.initialize().await;
            if let Some(session) = &state.user {
                set_sentry_user(
                    session.user_id(),
                    session.user_email().map(weather_smart_core::Email::as_str),
                );
            }
        });
    }

    let app = weather_smart_web::app(AppState::new(identity.clone()))
        .layer(TraceLayer::new_for_http())
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("web listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    identity.shutdown();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
