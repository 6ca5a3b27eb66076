//! Identity configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `AUTH_URL` - Base URL of the hosted identity service
//! - `AUTH_ANON_KEY` - Public API key sent with every identity request
//!
//! ## Optional
//! - `AUTH_SESSION_FILE` - JSON file that persists the session between runs
//! - `AUTH_INIT_TIMEOUT_SECS` - Startup session fetch bound (default: 10)
//! - `AUTH_REQUEST_TIMEOUT_SECS` - Per-request HTTP timeout (default: 30)

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

/// Default bound on the startup session fetch.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a single identity service request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ANON_KEY_VAR: &str = "AUTH_ANON_KEY";

/// Issued keys are far longer than this; shorter values are typos or stubs.
const MIN_ANON_KEY_LENGTH: usize = 20;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Fragments that only appear in values copied from a sample `.env` (case-insensitive).
const TEMPLATE_MARKERS: &[&str] = &[
    "<",
    ">",
    "{{",
    "your",
    "anon-key",
    "anon_key",
    "changeme",
    "placeholder",
    "example",
    "xxx",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Connection settings for the hosted identity service.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct IdentityConfig {
    /// Base URL of the identity service (e.g. `https://abc.example.co`)
    pub auth_url: Url,
    /// Public API key sent as the `apikey` header
    pub anon_key: SecretString,
    /// Where the session is persisted between runs, if anywhere
    pub session_file: Option<PathBuf>,
    /// Bound on the startup session fetch
    pub init_timeout: Duration,
    /// Bound on each HTTP request to the identity service
    pub request_timeout: Duration,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("auth_url", &self.auth_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("session_file", &self.session_file)
            .field("init_timeout", &self.init_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl IdentityConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the API key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let auth_url = get_required_env("AUTH_URL")?;
        let auth_url = Url::parse(&auth_url)
            .map_err(|e| ConfigError::InvalidEnvVar("AUTH_URL".to_string(), e.to_string()))?;

        Ok(Self {
            auth_url,
            anon_key: get_anon_key()?,
            session_file: get_optional_env("AUTH_SESSION_FILE").map(PathBuf::from),
            init_timeout: get_seconds_or_default("AUTH_INIT_TIMEOUT_SECS", DEFAULT_INIT_TIMEOUT)?,
            request_timeout: get_seconds_or_default(
                "AUTH_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT,
            )?,
        })
    }

    /// Use `path` for session persistence when no file was configured.
    #[must_use]
    pub fn with_default_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        if self.session_file.is_none() {
            self.session_file = Some(path.into());
        }
        self
    }

    /// Build the URL of an identity service endpoint, e.g. `auth/v1/logout`.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if the path cannot be joined onto the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        // Url::join drops the last path segment unless the base ends with '/'.
        let mut base = self.auth_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
    }

    pub(crate) fn anon_key(&self) -> &str {
        self.anon_key.expose_secret()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get a whole number of seconds, or `default` when unset.
fn get_seconds_or_default(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |value| {
        value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Whether `key` has the shape of a signed JWT (`eyJ…` header, three base64url parts).
fn is_jwt_shaped(key: &str) -> bool {
    let segments: Vec<&str> = key.split('.').collect();
    key.starts_with("eyJ")
        && segments.len() == 3
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}

/// Check that the anon key looks like one issued by the identity service.
///
/// Issued keys are either signed JWTs or long random tokens.
fn validate_anon_key(key: &str) -> Result<(), ConfigError> {
    let reject = |reason: String| Err(ConfigError::InsecureSecret(ANON_KEY_VAR.to_string(), reason));

    let lower = key.to_lowercase();
    if let Some(marker) = TEMPLATE_MARKERS.iter().find(|m| lower.contains(*m)) {
        return reject(format!(
            "looks like a template value (contains '{marker}'). Paste the project's anon key from the identity service dashboard."
        ));
    }

    if key.len() < MIN_ANON_KEY_LENGTH {
        return reject(format!(
            "too short for an issued key ({} chars, expected at least {MIN_ANON_KEY_LENGTH})",
            key.len()
        ));
    }

    if is_jwt_shaped(key) {
        return Ok(());
    }

    let entropy = shannon_entropy(key);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return reject(format!(
            "neither a JWT nor a random token ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
        ));
    }

    Ok(())
}

/// Load and validate `AUTH_ANON_KEY`.
fn get_anon_key() -> Result<SecretString, ConfigError> {
    let value = get_required_env(ANON_KEY_VAR)?;
    validate_anon_key(value.trim())?;
    Ok(SecretString::from(value.trim().to_string()))
}
