//! Login, registration and logout routes.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::AuthSession;
use crate::models::SessionView;
use crate::services::auth::AuthError;
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub confirm: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Report the current session.
///
/// A session whose account was deleted or changed role is reset here and
/// reported as logged out.
pub async fn session(
    State(state): State<AppState>,
    mut auth: AuthSession,
) -> Result<Json<SessionView>> {
    let refreshed = state.auth().refresh(&mut auth.state).await;
    auth.save().await?;

    match refreshed {
        Ok(()) | Err(AuthError::SessionExpired) => Ok(Json(SessionView::from(&auth.state))),
        Err(e) => Err(e.into()),
    }
}

/// Handle login.
pub async fn login(
    State(state): State<AppState>,
    mut auth: AuthSession,
    Json(body): Json<LoginRequest>,
) -> Result<Json<SessionView>> {
    let principal = state
        .auth()
        .login(&mut auth.state, &body.username, &body.password)
        .await
        .inspect_err(|e| {
            if matches!(e, AuthError::InvalidCredentials) {
                tracing::warn!("Login failed: invalid credentials");
            }
        })?;

    auth.cycle_id().await?;
    auth.save().await?;
    set_sentry_user(principal.username.as_str());

    Ok(Json(SessionView::from(&auth.state)))
}

/// Handle registration.
///
/// Does not log the new user in.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    state
        .auth()
        .register(&body.username, &body.password, &body.confirm)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Account created, please log in" })),
    ))
}

/// Handle logout.
pub async fn logout(
    State(state): State<AppState>,
    mut auth: AuthSession,
) -> Result<Json<SessionView>> {
    state.auth().logout(&mut auth.state);
    auth.save().await?;
    clear_sentry_user();

    Ok(Json(SessionView::from(&auth.state)))
}
