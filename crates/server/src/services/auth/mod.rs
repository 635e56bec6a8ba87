//! Authentication service.
//!
//! Drives the per-session login state machine:
//!
//! ```text
//! anonymous ──login (role=user)──▶ authenticated ──logout / delete_own_account──▶ anonymous
//! anonymous ──login (role=admin)─▶ admin ──exit_admin / logout──▶ anonymous
//!                                  admin ──reset_target_password──▶ admin
//!                          authenticated ──change_password──▶ authenticated
//! ```
//!
//! The caller owns the [`SessionState`] and passes it to every operation;
//! nothing here is global. Privileged operations first re-read the account
//! behind the session and drop the session if it was deleted or changed role.

mod error;

pub use error::AuthError;

use tracing::{debug, info, instrument};

use studydesk_core::{Role, Username};

use crate::models::{Principal, SessionState};
use crate::store::CredentialStore;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Authentication service.
///
/// Handles login, registration and account management for one session at a
/// time.
pub struct AuthController<'a> {
    store: &'a CredentialStore,
}

impl<'a> AuthController<'a> {
    /// Create a new authentication controller.
    #[must_use]
    pub const fn new(store: &'a CredentialStore) -> Self {
        Self { store }
    }

    // =========================================================================
    // Session transitions
    // =========================================================================

    /// Log in with username and password.
    ///
    /// On success the session becomes `Authenticated` or `Admin` depending on
    /// the account's role, replacing whatever it was before. On failure the
    /// session is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` if a field is empty.
    /// Returns `AuthError::InvalidCredentials` if the username is unknown or
    /// the password is wrong.
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        session: &mut SessionState,
        username: &str,
        password: &str,
    ) -> Result<Principal, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Please enter both username and password".to_string(),
            ));
        }

        let username = Username::parse(username).map_err(|_| AuthError::InvalidCredentials)?;
        let principal = self
            .store
            .login(&username, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        *session = SessionState::logged_in(principal.clone());
        info!(
            username = %principal.username,
            admin = principal.is_admin(),
            "User logged in"
        );
        Ok(principal)
    }

    /// Log out. Always succeeds.
    pub fn logout(&self, session: &mut SessionState) {
        if let Some(username) = session.username() {
            info!(username = %username, "User logged out");
        }
        session.reset();
    }

    /// Leave admin mode.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` if nobody is logged in.
    /// Returns `AuthError::NotAdmin` if the session is not in admin mode.
    pub fn exit_admin(&self, session: &mut SessionState) -> Result<(), AuthError> {
        match session {
            SessionState::Admin { username, .. } => {
                info!(username = %username, "Admin mode exited");
                session.reset();
                Ok(())
            }
            SessionState::Authenticated { .. } => Err(AuthError::NotAdmin),
            SessionState::Anonymous => Err(AuthError::NotAuthenticated),
        }
    }

    /// Re-check the account behind the session.
    ///
    /// Resets the session when the account no longer exists or its role no
    /// longer matches the session state.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionExpired` if the session was reset.
    /// Returns `AuthError::Backend` if the account could not be read; the
    /// session is left unchanged.
    pub async fn refresh(&self, session: &mut SessionState) -> Result<(), AuthError> {
        let (Some(username), Some(expected_role)) = (session.username(), session.expected_role())
        else {
            return Ok(());
        };

        let current = self.store.principal(username).await?;
        if current.is_some_and(|p| p.role == expected_role) {
            return Ok(());
        }

        info!(username = %username, "Session invalidated, account deleted or role changed");
        session.reset();
        Err(AuthError::SessionExpired)
    }

    // =========================================================================
    // Account operations
    // =========================================================================

    /// Register a new account with the `user` role.
    ///
    /// Does not change any session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for empty fields, a confirmation
    /// mismatch, an invalid username or a short password.
    /// Returns `AuthError::AlreadyExists` if the username is taken.
    #[instrument(skip_all)]
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Please fill in all fields".to_string(),
            ));
        }
        let username = Username::parse_for_signup(username)?;
        validate_new_password(password, confirm)?;

        self.store.register(&username, password).await?;
        Ok(())
    }

    /// Delete the logged-in account and log out.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` if nobody is logged in.
    /// Returns `AuthError::SessionExpired` if the account was already gone
    /// before the call.
    #[instrument(skip_all)]
    pub async fn delete_own_account(&self, session: &mut SessionState) -> Result<(), AuthError> {
        self.refresh(session).await?;
        let username = session
            .username()
            .cloned()
            .ok_or(AuthError::NotAuthenticated)?;

        // The record existed at refresh; a retried remove whose first attempt
        // landed reports `false`, and the account is gone either way.
        if !self.store.delete(&username).await? {
            debug!(username = %username, "Account already removed");
        }

        info!(username = %username, "Account deleted by owner");
        session.reset();
        Ok(())
    }

    /// Change the logged-in account's password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` if nobody is logged in.
    /// Returns `AuthError::Validation` if the new password is invalid.
    /// Returns `AuthError::InvalidCredentials` if `current` is wrong.
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        session: &mut SessionState,
        current: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        self.refresh(session).await?;
        let username = session
            .username()
            .cloned()
            .ok_or(AuthError::NotAuthenticated)?;

        if current.is_empty() {
            return Err(AuthError::Validation(
                "Please enter your current password".to_string(),
            ));
        }
        validate_new_password(new_password, confirm)?;

        if !self.store.authenticate(&username, current).await? {
            return Err(AuthError::InvalidCredentials);
        }

        self.store.reset_password(&username, new_password).await?;
        info!(username = %username, "Password changed by owner");
        Ok(())
    }

    /// Set another account's password. Admin mode only.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` or `AuthError::NotAdmin` if the
    /// session is not in admin mode.
    /// Returns `AuthError::Validation` if the new password is invalid.
    /// Returns `AuthError::NotFound` if the target does not exist.
    #[instrument(skip_all)]
    pub async fn reset_target_password(
        &self,
        session: &mut SessionState,
        target: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.require_admin(session).await?;

        if target.is_empty() {
            return Err(AuthError::Validation(
                "Please enter the username to reset".to_string(),
            ));
        }
        validate_new_password(new_password, new_password)?;
        let target = Username::parse(target).map_err(|_| AuthError::NotFound)?;

        self.store.reset_password(&target, new_password).await?;
        info!(
            admin = ?session.username().map(Username::as_str),
            target = %target,
            "Password reset by admin"
        );
        Ok(())
    }

    async fn require_admin(&self, session: &mut SessionState) -> Result<(), AuthError> {
        self.refresh(session).await?;
        match session.expected_role() {
            Some(Role::Admin) => Ok(()),
            Some(Role::User) => Err(AuthError::NotAdmin),
            None => Err(AuthError::NotAuthenticated),
        }
    }
}

/// Validate a new password and its confirmation.
///
/// # Errors
///
/// Returns `AuthError::Validation` if the password is empty, too short, or
/// does not match `confirm`.
pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::Validation("Please enter a password".to_string()));
    }
    if password != confirm {
        return Err(AuthError::Validation("Passwords do not match".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}
