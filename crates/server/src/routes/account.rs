//! Account self-service routes (requires login).

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{AppError, Result, clear_sentry_user};
use crate::middleware::AuthSession;
use crate::state::AppState;

/// Word the client must echo to delete an account.
pub const DELETE_CONFIRMATION: &str = "DELETE";

/// Password change request body.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current: String,
    pub new: String,
    pub confirm: String,
}

/// Account deletion request body.
#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    pub confirm: String,
}

/// Change the logged-in account's password.
pub async fn change_password(
    State(state): State<AppState>,
    mut auth: AuthSession,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Value>> {
    let result = state
        .auth()
        .change_password(&mut auth.state, &body.current, &body.new, &body.confirm)
        .await;
    // A refresh inside the controller may have reset the session
    auth.save().await?;
    result?;

    Ok(Json(json!({ "message": "Password updated" })))
}

/// Delete the logged-in account.
pub async fn delete_account(
    State(state): State<AppState>,
    mut auth: AuthSession,
    Json(body): Json<DeleteAccountRequest>,
) -> Result<Json<Value>> {
    if body.confirm != DELETE_CONFIRMATION {
        return Err(AppError::BadRequest(format!(
            "Type {DELETE_CONFIRMATION} to confirm account deletion"
        )));
    }

    let result = state.auth().delete_own_account(&mut auth.state).await;
    auth.save().await?;
    result?;
    clear_sentry_user();

    Ok(Json(json!({ "message": "Account deleted" })))
}
