//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Backend selection
//! - `STUDYDESK_BACKEND` - `local` (default), `remote` or `hosted`
//! - `STUDYDESK_USERS_FILE` - Local JSON file (default: users.json)
//! - `STUDYDESK_BACKEND_ENDPOINT` - Remote API base URL (default: <https://api.github.com>),
//!   or the `PostgreSQL` connection string for `hosted` (falls back to `DATABASE_URL`)
//! - `STUDYDESK_BACKEND_KEY` - Remote API token (required for `remote`)
//! - `STUDYDESK_REMOTE_REPO` - `owner/repo` holding the users file (required for `remote`)
//! - `STUDYDESK_REMOTE_PATH` - Path of the users file in the repo (default: users.json)
//! - `STUDYDESK_REMOTE_BRANCH` - Branch to read and commit to (default: main)
//! - `STUDYDESK_BACKEND_TIMEOUT_SECS` - Per-call timeout (default: 10)
//! - `STUDYDESK_BACKEND_MAX_RETRIES` - Retries for transient failures (default: 3)
//!
//! ## Server
//! - `STUDYDESK_HOST` - Bind address (default: 127.0.0.1)
//! - `STUDYDESK_PORT` - Listen port (default: 3000)
//! - `STUDYDESK_BASE_URL` - Public URL (default: <http://localhost:3000>)
//! - `STUDYDESK_AUTH_BURST` - Login/registration burst per client IP (default: 5)
//! - `STUDYDESK_AUTH_REPLENISH_SECS` - Seconds to replenish one request (default: 6)
//! - `STUDYDESK_TRUST_PROXY_HEADERS` - Key the rate limiter on `X-Forwarded-For` /
//!   `X-Real-IP` instead of the peer address; only enable behind a proxy that
//!   overwrites them (default: false)
//!
//! ## Optional
//! - `STUDYDESK_ADMIN_USERNAME` / `STUDYDESK_ADMIN_PASSWORD` - Admin account created at
//!   startup if it does not exist yet
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
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

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Credential store backend
    pub backend: BackendConfig,
    /// Timeout and retry policy for backend calls
    pub resilience: ResilienceConfig,
    /// Admin account to create at startup
    pub bootstrap_admin: Option<AdminBootstrap>,
    /// Rate limit for login and registration
    pub auth_rate_limit: RateLimitConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Which credential store backend to use.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// JSON file on the local filesystem.
    Local {
        /// Path of the users file.
        path: PathBuf,
    },
    /// JSON file in a remote version-controlled repository.
    Remote(RemoteFileConfig),
    /// `users` table in a hosted `PostgreSQL` database.
    Hosted {
        /// `PostgreSQL` connection URL (contains password)
        database_url: SecretString,
    },
}

impl BackendConfig {
    /// Short backend name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Remote(_) => "remote",
            Self::Hosted { .. } => "hosted",
        }
    }
}

/// Remote users-file location and credentials.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct RemoteFileConfig {
    /// API base URL (e.g., <https://api.github.com>)
    pub endpoint: Url,
    /// API token
    pub token: SecretString,
    /// Repository in `owner/repo` form
    pub repo: String,
    /// Path of the users file inside the repository
    pub path: String,
    /// Branch to read and commit to
    pub branch: String,
}

impl std::fmt::Debug for RemoteFileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFileConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("token", &"[REDACTED]")
            .field("repo", &self.repo)
            .field("path", &self.path)
            .field("branch", &self.branch)
            .finish()
    }
}

/// Timeout and retry policy applied to every backend call.
#[derive(Debug, Clone, Copy)]
pub struct ResilienceConfig {
    /// Upper bound for a single backend call.
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Backoff before the first retry; doubled on each further retry.
    pub base_backoff: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
        }
    }
}

/// Admin account created at startup when missing.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct AdminBootstrap {
    /// Admin username
    pub username: String,
    /// Admin password
    pub password: SecretString,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Token-bucket settings for the auth rate limiter.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests allowed in a burst
    pub burst_size: u32,
    /// Seconds to replenish one request
    pub replenish_secs: u64,
    /// Take the client IP from proxy headers rather than the peer address
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst_size: 5,
            replenish_secs: 6,
            trust_proxy_headers: false,
        }
    }
}

/// Environment lookup function.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_env`].
    pub fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let host = get_env_or_default(env, "STUDYDESK_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("STUDYDESK_HOST".to_string(), e.to_string()))?;
        let port = parse_env_or_default::<u16>(env, "STUDYDESK_PORT", 3000)?;
        let base_url = get_env_or_default(env, "STUDYDESK_BASE_URL", "http://localhost:3000");

        let backend = BackendConfig::from_lookup(env)?;
        let resilience = ResilienceConfig::from_lookup(env)?;
        let bootstrap_admin = AdminBootstrap::from_lookup(env)?;
        let auth_rate_limit = RateLimitConfig::from_lookup(env)?;

        Ok(Self {
            host,
            port,
            base_url,
            backend,
            resilience,
            bootstrap_admin,
            auth_rate_limit,
            sentry_dsn: get_optional_env(env, "SENTRY_DSN"),
            sentry_environment: get_optional_env(env, "SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether session cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl BackendConfig {
    /// Load only the backend selection.
    ///
    /// Used by the operator CLI, which needs the store but not the server settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for missing or invalid backend variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let kind = get_env_or_default(env, "STUDYDESK_BACKEND", "local");
        match kind.as_str() {
            "local" => Ok(Self::Local {
                path: PathBuf::from(get_env_or_default(env, "STUDYDESK_USERS_FILE", "users.json")),
            }),
            "remote" => Ok(Self::Remote(RemoteFileConfig::from_lookup(env)?)),
            "hosted" => Ok(Self::Hosted {
                database_url: get_database_url(env, "STUDYDESK_BACKEND_ENDPOINT")?,
            }),
            other => Err(ConfigError::InvalidEnvVar(
                "STUDYDESK_BACKEND".to_string(),
                format!("unknown backend '{other}' (expected local, remote or hosted)"),
            )),
        }
    }
}

impl RemoteFileConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let endpoint = get_env_or_default(env, "STUDYDESK_BACKEND_ENDPOINT", "https://api.github.com");
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            ConfigError::InvalidEnvVar("STUDYDESK_BACKEND_ENDPOINT".to_string(), e.to_string())
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                "STUDYDESK_BACKEND_ENDPOINT".to_string(),
                "expected an http(s) URL".to_string(),
            ));
        }

        let repo = get_required_env(env, "STUDYDESK_REMOTE_REPO")?;
        if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(ConfigError::InvalidEnvVar(
                "STUDYDESK_REMOTE_REPO".to_string(),
                "expected owner/repo".to_string(),
            ));
        }

        Ok(Self {
            endpoint,
            token: get_validated_secret(env, "STUDYDESK_BACKEND_KEY")?,
            repo,
            path: get_env_or_default(env, "STUDYDESK_REMOTE_PATH", "users.json"),
            branch: get_env_or_default(env, "STUDYDESK_REMOTE_BRANCH", "main"),
        })
    }
}

impl ResilienceConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let timeout_secs = parse_env_or_default::<u64>(
            env,
            "STUDYDESK_BACKEND_TIMEOUT_SECS",
            defaults.timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STUDYDESK_BACKEND_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            timeout: Duration::from_secs(timeout_secs),
            max_retries: parse_env_or_default::<u32>(
                env,
                "STUDYDESK_BACKEND_MAX_RETRIES",
                defaults.max_retries,
            )?,
            base_backoff: defaults.base_backoff,
        })
    }
}

impl AdminBootstrap {
    fn from_lookup(env: Lookup<'_>) -> Result<Option<Self>, ConfigError> {
        match (
            get_optional_env(env, "STUDYDESK_ADMIN_USERNAME"),
            get_optional_env(env, "STUDYDESK_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Ok(Some(Self {
                username,
                password: SecretString::from(password),
            })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(ConfigError::MissingEnvVar(
                "STUDYDESK_ADMIN_PASSWORD".to_string(),
            )),
            (None, Some(_)) => Err(ConfigError::MissingEnvVar(
                "STUDYDESK_ADMIN_USERNAME".to_string(),
            )),
        }
    }
}

impl RateLimitConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let burst_size = parse_env_or_default::<u32>(env, "STUDYDESK_AUTH_BURST", defaults.burst_size)?;
        let replenish_secs = parse_env_or_default::<u64>(
            env,
            "STUDYDESK_AUTH_REPLENISH_SECS",
            defaults.replenish_secs,
        )?;
        if burst_size == 0 || replenish_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STUDYDESK_AUTH_BURST".to_string(),
                "burst size and replenish interval must be greater than zero".to_string(),
            ));
        }
        let trust_proxy_headers = parse_env_or_default::<bool>(
            env,
            "STUDYDESK_TRUST_PROXY_HEADERS",
            defaults.trust_proxy_headers,
        )?;
        Ok(Self {
            burst_size,
            replenish_secs,
            trust_proxy_headers,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(env: Lookup<'_>, key: &str) -> Result<String, ConfigError> {
    env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(env: Lookup<'_>, primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Some(value) = env(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Some(value) = env("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(env: Lookup<'_>, key: &str) -> Option<String> {
    env(key).filter(|value| !value.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(env: Lookup<'_>, key: &str, default: &str) -> String {
    env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to a default when unset.
fn parse_env_or_default<T>(env: Lookup<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env(key).map_or(Ok(default), |value| {
        value
            .parse::<T>()
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

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.expose_secret().to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Real API tokens have high entropy
    let entropy = shannon_entropy(secret.expose_secret());
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated token."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(env: Lookup<'_>, key: &str) -> Result<SecretString, ConfigError> {
    let value = SecretString::from(get_required_env(env, key)?);
    validate_secret_strength(&value, key)?;
    Ok(value)
}
