//! Credential storage.
//!
//! # Backends
//!
//! Records live in one of three interchangeable backends, selected by
//! `STUDYDESK_BACKEND`:
//!
//! - `local` - [`LocalFileStore`], a JSON file on disk
//! - `remote` - [`RemoteFileStore`], a JSON file in a repository behind a
//!   contents API (revision-checked commits)
//! - `hosted` - [`HostedTableStore`], a `users` table in `PostgreSQL`
//!
//! Every backend implements the record-level [`UserBackend`] trait and is
//! wrapped in [`Resilient`] for timeouts and retries. Hashing and
//! verification live once, in [`CredentialStore`].
//!
//! # File layout
//!
//! ```json
//! {
//!   "alice": { "password": "$argon2id$v=19$...", "role": "user" },
//!   "bob":   { "password": "20d2fe5e369db54ec7090639a9dc30ec4d608604936239d39e2de07fda09eb0b" }
//! }
//! ```
//!
//! A missing `role` means `user`; a 64-character hex password is a legacy
//! SHA-256 digest that is upgraded on the next successful login.

mod credentials;
pub mod file_format;
pub mod hosted;
pub mod local;
pub mod remote;
pub mod resilient;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use studydesk_core::{Role, Username};

use crate::config::{BackendConfig, ResilienceConfig};

pub use credentials::{CredentialError, CredentialStore};
pub use hosted::HostedTableStore;
pub use local::LocalFileStore;
pub use remote::RemoteFileStore;
pub use resilient::Resilient;

/// A stored credential record.
///
/// Implements `Debug` manually so digests never reach the logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Password digest (Argon2 PHC string or legacy SHA-256 hex).
    pub password: String,
    /// Account role.
    #[serde(default)]
    pub role: Role,
}

impl UserRecord {
    /// Create a record from a digest and role.
    #[must_use]
    pub const fn new(password: String, role: Role) -> Self {
        Self { password, role }
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("password", &"[REDACTED]")
            .field("role", &self.role)
            .finish()
    }
}

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with this username already exists.
    #[error("record already exists")]
    AlreadyExists,

    /// No record with this username exists.
    #[error("record not found")]
    NotFound,

    /// Local file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP transport failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with an unexpected status.
    #[error("unexpected status {status} during {operation}")]
    UnexpectedStatus {
        /// What the store was doing.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// The users file changed between read and write.
    #[error("stale revision: users file changed since it was read")]
    StaleRevision,

    /// The call did not finish in time.
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    /// Stored data could not be decoded.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The backend location cannot be turned into request URLs.
    #[error("invalid backend endpoint: {0}")]
    InvalidEndpoint(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::StaleRevision => true,
            Self::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Database(e) => matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)),
            Self::AlreadyExists
            | Self::NotFound
            | Self::Io(_)
            | Self::DataCorruption(_)
            | Self::InvalidEndpoint(_) => false,
        }
    }
}

/// Record-level access to a credential backend.
///
/// Implementations only move records; they never see clear-text passwords.
/// Mutations of one username must not lose concurrent mutations of another.
#[async_trait]
pub trait UserBackend: Send + Sync {
    /// Short backend name for logs.
    fn kind(&self) -> &'static str;

    /// Look up a record.
    async fn fetch(&self, username: &Username) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a new record.
    ///
    /// Fails with `StoreError::AlreadyExists` if the username is taken.
    async fn insert(&self, username: &Username, record: &UserRecord) -> Result<(), StoreError>;

    /// Replace the digest of an existing record, keeping its role.
    ///
    /// Fails with `StoreError::NotFound` if the username is absent.
    async fn set_password(&self, username: &Username, digest: &str) -> Result<(), StoreError>;

    /// Replace the digest only if it still equals `current`.
    ///
    /// Returns `false` when the record is gone or its digest changed.
    async fn swap_password(
        &self,
        username: &Username,
        current: &str,
        replacement: &str,
    ) -> Result<bool, StoreError>;

    /// Remove a record. Returns whether one existed.
    async fn remove(&self, username: &Username) -> Result<bool, StoreError>;
}

/// Open the configured backend and wrap it in the resilience policy.
///
/// # Errors
///
/// Returns `StoreError` if the backend cannot be reached at startup
/// (database pool creation, HTTP client construction).
pub async fn open(
    backend: &BackendConfig,
    resilience: ResilienceConfig,
) -> Result<CredentialStore, StoreError> {
    let inner: Arc<dyn UserBackend> = match backend {
        BackendConfig::Local { path } => Arc::new(LocalFileStore::new(path.clone())),
        BackendConfig::Remote(remote) => Arc::new(RemoteFileStore::new(remote.clone())?),
        BackendConfig::Hosted { database_url } => {
            let pool = crate::db::create_pool(database_url).await?;
            Arc::new(HostedTableStore::new(pool))
        }
    };

    tracing::info!(backend = inner.kind(), "Credential store opened");
    Ok(CredentialStore::new(Resilient::new(inner, resilience)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_debug_redacts_digest() {
        let record = UserRecord::new("$argon2id$v=19$secretdigest".to_string(), Role::Admin);
        let debug_output = format!("{record:?}");
        assert!(debug_output.contains("Admin"));
        assert!(!debug_output.contains("secretdigest"));
    }

    #[test]
    fn test_record_without_role_is_user() {
        let record: UserRecord = serde_json::from_str(r#"{"password":"abc"}"#).unwrap();
        assert_eq!(record.role, Role::User);
    }

    #[test]
    fn test_transient_errors() {
        assert!(StoreError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(StoreError::StaleRevision.is_transient());
        assert!(
            StoreError::UnexpectedStatus {
                operation: "read",
                status: 503
            }
            .is_transient()
        );
        assert!(
            !StoreError::UnexpectedStatus {
                operation: "read",
                status: 401
            }
            .is_transient()
        );
        assert!(!StoreError::AlreadyExists.is_transient());
        assert!(!StoreError::NotFound.is_transient());
        assert!(!StoreError::DataCorruption("bad".to_string()).is_transient());
    }
}
