//! Configuration loading and validation for the web service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Deployment mode derived from `APP_ENV`.
///
/// Only [`Environment::Development`] exposes error detail to clients and
/// forces style-sheet rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Map an `APP_ENV` value to a mode. Anything but `development` is
    /// treated as production-like.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("development") {
            Environment::Development
        } else {
            Environment::Production
        }
    }

    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

/// Validated web service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Deployment mode name (`development`, `production`, ...).
    #[serde(default = "default_app_env")]
    pub app_env: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Secret used to sign session cookies. **Required.**
    pub session_secret: String,

    /// Filesystem path of the SQLite database. **Required.**
    pub database_path: String,

    /// Directory containing `.hbs` view templates and `partials/`.
    #[serde(default = "default_views_dir")]
    pub views_dir: String,

    /// Directory served as static files; also the style-sheet source root.
    #[serde(default = "default_public_dir")]
    pub public_dir: String,

    /// Icon served at `/favicon.ico`.
    #[serde(default = "default_favicon_path")]
    pub favicon_path: String,

    /// Name of the session cookie.
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,

    /// Client-side session lifetime (seconds), refreshed on every request.
    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: u64,

    /// Server-side freshness window of a persisted session (seconds).
    #[serde(default = "default_session_store_ttl")]
    pub session_store_ttl_secs: u64,

    /// How often (seconds) expired session rows are deleted.
    #[serde(default = "default_session_prune_interval")]
    pub session_prune_interval_secs: u64,

    /// Whether the session cookie carries the `Secure` attribute.
    #[serde(default)]
    pub session_cookie_secure: bool,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP collector endpoint. Span export is disabled when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

fn default_app_env() -> String {
    "development".into()
}
fn default_port() -> u16 {
    3000
}
fn default_views_dir() -> String {
    "views".into()
}
fn default_public_dir() -> String {
    "public".into()
}
fn default_favicon_path() -> String {
    "public/images/favicon.ico".into()
}
fn default_session_cookie_name() -> String {
    "sid".into()
}
fn default_session_max_age() -> u64 {
    15 * 24 * 60 * 60
}
fn default_session_store_ttl() -> u64 {
    60 * 60
}
fn default_session_prune_interval() -> u64 {
    600
}
fn default_request_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    pub fn environment(&self) -> Environment {
        Environment::from_name(&self.app_env)
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }

    pub fn session_store_ttl(&self) -> Duration {
        Duration::from_secs(self.session_store_ttl_secs)
    }

    pub fn session_prune_interval(&self) -> Duration {
        Duration::from_secs(self.session_prune_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.session_secret, "SESSION_SECRET")?;
        ensure_non_empty(&self.database_path, "DATABASE_PATH")?;
        ensure_non_empty(&self.session_cookie_name, "SESSION_COOKIE_NAME")?;

        if self.session_max_age_secs == 0 {
            anyhow::bail!("SESSION_MAX_AGE_SECS must be > 0");
        }
        if self.session_store_ttl_secs == 0 {
            anyhow::bail!("SESSION_STORE_TTL_SECS must be > 0");
        }
        if self.session_prune_interval_secs == 0 {
            anyhow::bail!("SESSION_PRUNE_INTERVAL_SECS must be > 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be > 0");
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
