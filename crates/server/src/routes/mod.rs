//! HTTP route handlers for the account service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Health check
//!
//! # Auth
//! GET  /auth/session           - Current session (revalidated against the store)
//! POST /auth/login             - Login action (rate limited)
//! POST /auth/register          - Register action (rate limited)
//! POST /auth/logout            - Logout action
//!
//! # Account (requires login)
//! POST /account/password       - Change own password
//! POST /account/delete         - Delete own account
//!
//! # Admin (requires admin mode)
//! POST /admin/reset-password   - Set another user's password
//! POST /admin/exit             - Leave admin mode
//! ```
//!
//! Every body is JSON. Errors are `{"error": "<message>"}`.

pub mod account;
pub mod admin;
pub mod auth;

use axum::{
    Router,
    routing::{get, post},
};

use crate::config::RateLimitConfig;
use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// Liveness health check endpoint.
pub async fn health() -> &'static str {
    "ok"
}

/// Create the auth routes router.
///
/// Only login and registration are rate limited.
pub fn auth_routes(rate_limit: &RateLimitConfig) -> Router<AppState> {
    let limited = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .layer(auth_rate_limiter(rate_limit));

    Router::new()
        .route("/session", get(auth::session))
        .route("/logout", post(auth::logout))
        .merge(limited)
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/password", post(account::change_password))
        .route("/delete", post(account::delete_account))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/reset-password", post(admin::reset_password))
        .route("/exit", post(admin::exit))
}

/// Create all routes.
pub fn routes(rate_limit: &RateLimitConfig) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth_routes(rate_limit))
        .nest("/account", account_routes())
        .nest("/admin", admin_routes())
}
