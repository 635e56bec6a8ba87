//! Account management commands.
//!
//! # Usage
//!
//! ```bash
//! STUDYDESK_CLI_PASSWORD=... studydesk-cli user create -u root -r admin
//! STUDYDESK_CLI_PASSWORD=... studydesk-cli user reset-password -u alice
//! STUDYDESK_CLI_PASSWORD=... studydesk-cli user check -u alice
//! studydesk-cli user delete -u alice
//! ```
//!
//! # Environment Variables
//!
//! - `STUDYDESK_CLI_PASSWORD` - Password for `create`, `reset-password` and `check`
//! - `STUDYDESK_BACKEND` and the related backend variables, as for the server

use secrecy::{ExposeSecret, SecretString};
use studydesk_core::{Role, Username, UsernameError};
use studydesk_server::config::{BackendConfig, ConfigError, ResilienceConfig};
use studydesk_server::services::auth::{AuthError, validate_new_password};
use studydesk_server::store::{self, CredentialError, CredentialStore, StoreError};
use thiserror::Error;

/// Environment variable holding the password argument.
const PASSWORD_VAR: &str = "STUDYDESK_CLI_PASSWORD";

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum UserError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Invalid username.
    #[error("Invalid username: {0}")]
    InvalidUsername(#[from] UsernameError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: user, admin")]
    InvalidRole(String),

    /// Password rejected by the sign-up rules.
    #[error("Invalid password: {0}")]
    InvalidPassword(AuthError),

    /// Account already exists.
    #[error("Account already exists: {0}")]
    UserExists(String),

    /// Account does not exist.
    #[error("No such account: {0}")]
    NotFound(String),

    /// Backend failure.
    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    /// Password hashing failure.
    #[error("Password hashing failed")]
    PasswordHash,
}

impl UserError {
    fn from_credential(err: CredentialError, username: &Username) -> Self {
        match err {
            CredentialError::AlreadyExists => Self::UserExists(username.to_string()),
            CredentialError::NotFound => Self::NotFound(username.to_string()),
            CredentialError::PasswordHash => Self::PasswordHash,
            CredentialError::Backend(e) => Self::Store(e),
        }
    }
}

/// Create an account with the given role.
pub async fn create(username: &str, role: &str) -> Result<(), UserError> {
    let role: Role = role.parse().map_err(|_| UserError::InvalidRole(role.to_owned()))?;
    let username = Username::parse_for_signup(username)?;
    let password = password_from_env()?;
    validate_new_password(password.expose_secret(), password.expose_secret())
        .map_err(UserError::InvalidPassword)?;

    let store = open_store().await?;
    tracing::info!("Creating account: {} ({})", username, role);
    store
        .register_with_role(&username, password.expose_secret(), role)
        .await
        .map_err(|e| UserError::from_credential(e, &username))?;

    tracing::info!("Account created");
    Ok(())
}

/// Set an account's password.
pub async fn reset_password(username: &str) -> Result<(), UserError> {
    let username = Username::parse(username)?;
    let password = password_from_env()?;
    validate_new_password(password.expose_secret(), password.expose_secret())
        .map_err(UserError::InvalidPassword)?;

    let store = open_store().await?;
    store
        .reset_password(&username, password.expose_secret())
        .await
        .map_err(|e| UserError::from_credential(e, &username))?;

    tracing::info!("Password reset for {}", username);
    Ok(())
}

/// Delete an account.
pub async fn delete(username: &str) -> Result<(), UserError> {
    let username = Username::parse(username)?;
    let store = open_store().await?;

    let existed = store
        .delete(&username)
        .await
        .map_err(|e| UserError::from_credential(e, &username))?;
    if !existed {
        return Err(UserError::NotFound(username.to_string()));
    }

    tracing::info!("Account deleted: {}", username);
    Ok(())
}

/// Check a password. Returns whether it matches.
pub async fn check(username: &str) -> Result<bool, UserError> {
    let username = Username::parse(username)?;
    let password = password_from_env()?;
    let store = open_store().await?;

    let valid = store
        .authenticate(&username, password.expose_secret())
        .await
        .map_err(|e| UserError::from_credential(e, &username))?;

    tracing::info!(valid, "Password checked for {}", username);
    Ok(valid)
}

fn password_from_env() -> Result<SecretString, UserError> {
    std::env::var(PASSWORD_VAR)
        .ok()
        .filter(|value| !value.is_empty())
        .map(SecretString::from)
        .ok_or(UserError::MissingEnvVar(PASSWORD_VAR))
}

async fn open_store() -> Result<CredentialStore, UserError> {
    let backend = BackendConfig::from_env()?;
    tracing::info!(backend = backend.name(), "Opening credential store...");
    Ok(store::open(&backend, ResilienceConfig::default()).await?)
}
