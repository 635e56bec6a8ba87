//! Admin mode routes.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Result;
use crate::middleware::AuthSession;
use crate::models::SessionView;
use crate::state::AppState;

/// Admin password reset request body.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub target: String,
    pub new_password: String,
}

/// Set another user's password.
pub async fn reset_password(
    State(state): State<AppState>,
    mut auth: AuthSession,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<Value>> {
    let result = state
        .auth()
        .reset_target_password(&mut auth.state, &body.target, &body.new_password)
        .await;
    auth.save().await?;
    result?;

    Ok(Json(json!({ "message": format!("Password reset for {}", body.target) })))
}

/// Leave admin mode.
pub async fn exit(
    State(state): State<AppState>,
    mut auth: AuthSession,
) -> Result<Json<SessionView>> {
    state.auth().exit_admin(&mut auth.state)?;
    auth.save().await?;

    Ok(Json(SessionView::from(&auth.state)))
}
