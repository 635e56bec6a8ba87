//! Session state extractor.
//!
//! Loads the [`SessionState`] stored in the tower-sessions session so handlers
//! can pass it to the auth controller and write it back afterwards.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::SessionState;
use crate::models::session::keys;

/// The request's session together with its decoded login state.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(State(state): State<AppState>, mut auth: AuthSession) -> Result<()> {
///     state.auth().logout(&mut auth.state);
///     auth.save().await
/// }
/// ```
pub struct AuthSession {
    session: Session,
    /// Login state; changes are persisted by [`AuthSession::save`].
    pub state: SessionState,
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by SessionManagerLayer
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let state = session
            .get::<SessionState>(keys::SESSION_STATE)
            .await?
            .unwrap_or_default();

        Ok(Self { session, state })
    }
}

impl AuthSession {
    /// Persist the current login state.
    ///
    /// A logged-out state removes the key rather than storing `Anonymous`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the session cannot be modified.
    pub async fn save(&self) -> Result<(), AppError> {
        if self.state.is_logged_in() {
            self.session.insert(keys::SESSION_STATE, &self.state).await?;
        } else {
            self.session
                .remove::<SessionState>(keys::SESSION_STATE)
                .await?;
        }
        Ok(())
    }

    /// Issue a new session ID, keeping the data. Called on login.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the session cannot be modified.
    pub async fn cycle_id(&self) -> Result<(), AppError> {
        self.session.cycle_id().await?;
        Ok(())
    }
}
