//! Authentication error types.

use thiserror::Error;

use studydesk_core::UsernameError;

use crate::store::{CredentialError, StoreError};

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Submitted form data is invalid.
    #[error("{0}")]
    Validation(String),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid username or password")]
    InvalidCredentials,

    /// User already exists.
    #[error("user already exists")]
    AlreadyExists,

    /// Target user not found.
    #[error("user not found")]
    NotFound,

    /// The session is not logged in.
    #[error("not logged in")]
    NotAuthenticated,

    /// The session is not in admin mode.
    #[error("admin mode required")]
    NotAdmin,

    /// The account behind the session was deleted or changed role.
    #[error("session expired")]
    SessionExpired,

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Credential backend error.
    #[error("backend error: {0}")]
    Backend(StoreError),
}

impl From<CredentialError> for AuthError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::AlreadyExists => Self::AlreadyExists,
            CredentialError::NotFound => Self::NotFound,
            CredentialError::PasswordHash => Self::PasswordHash,
            CredentialError::Backend(e) => Self::Backend(e),
        }
    }
}

impl From<UsernameError> for AuthError {
    fn from(err: UsernameError) -> Self {
        Self::Validation(capitalize(&err.to_string()))
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
