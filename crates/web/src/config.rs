//! Web server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `WEB_HOST` - Bind address (default: 127.0.0.1). Must be a loopback
//!   address: the server holds one signed-in user's session for the local
//!   machine, so every visitor acts as that user.
//! - `WEB_PORT` - Listen port (default: 3000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name (e.g. `production`)
//!
//! The identity service variables are documented on
//! [`IdentityConfig`](weather_smart_identity::IdentityConfig).

use std::net::{IpAddr, SocketAddr};

use weather_smart_identity::{ConfigError, IdentityConfig};

/// Web application configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
    /// Identity service settings
    pub identity: IdentityConfig,
}

impl WebConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let host = parse_host(&get_env_or_default("WEB_HOST", "127.0.0.1"))?;
        let port = get_env_or_default("WEB_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("WEB_PORT".to_string(), e.to_string()))?;

        Ok(Self {
            host,
            port,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            identity: IdentityConfig::from_env()?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Parse `WEB_HOST`, refusing anything reachable from another machine.
fn parse_host(value: &str) -> Result<IpAddr, ConfigError> {
    let host = value
        .trim()
        .parse::<IpAddr>()
        .map_err(|e| ConfigError::InvalidEnvVar("WEB_HOST".to_string(), e.to_string()))?;
    if !host.is_loopback() {
        return Err(ConfigError::InvalidEnvVar(
            "WEB_HOST".to_string(),
            format!(
                "{host} is not a loopback address; the server holds a single local user's session"
            ),
        ));
    }
    Ok(host)
}

fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
