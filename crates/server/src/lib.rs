//! StudyDesk account service library.
//!
//! Username/password accounts with an admin role, stored in one of three
//! interchangeable backends (local file, remote repository file, hosted
//! `PostgreSQL` table). The binary in `main.rs` serves the HTTP API; the
//! library is shared with the operator CLI and the integration tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod password;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use axum::{Router, middleware::from_fn};
use secrecy::ExposeSecret;
use studydesk_core::{Role, Username};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::config::AdminBootstrap;
use crate::services::auth::{AuthError, validate_new_password};
use crate::state::AppState;
use crate::store::{CredentialError, CredentialStore};

/// Build the application router.
///
/// Sentry layers are added by the binary so tests can run without a client.
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    routes::routes(&state.config().auth_rate_limit)
        .layer(session_layer)
        .layer(from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        #[allow(clippy::cast_possible_truncation)]
                        span.record("latency_ms", latency.as_millis() as u64);
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// Create the configured admin account if it does not exist yet.
///
/// Returns whether an account was created. An existing account is left
/// untouched, whatever its role or password.
///
/// # Errors
///
/// Returns `AuthError::Validation` if the configured username or password is
/// not acceptable, or `AuthError::Backend` if the store fails.
pub async fn bootstrap_admin(
    store: &CredentialStore,
    admin: &AdminBootstrap,
) -> Result<bool, AuthError> {
    let username = Username::parse(&admin.username)?;
    let password = admin.password.expose_secret();
    validate_new_password(password, password)?;

    match store
        .register_with_role(&username, password, Role::Admin)
        .await
    {
        Ok(()) => {
            tracing::info!(username = %username, "Admin account created");
            Ok(true)
        }
        Err(CredentialError::AlreadyExists) => {
            tracing::debug!(username = %username, "Admin account already exists");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::store::LocalFileStore;

    fn admin(username: &str, password: &str) -> AdminBootstrap {
        AdminBootstrap {
            username: username.to_string(),
            password: SecretString::from(password.to_string()),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_admin_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(LocalFileStore::new(dir.path().join("users.json")));

        assert!(bootstrap_admin(&store, &admin("root", "rootpass1")).await.unwrap());
        assert!(!bootstrap_admin(&store, &admin("root", "otherpass2")).await.unwrap());

        let root = Username::parse("root").unwrap();
        let principal = store.principal(&root).await.unwrap().unwrap();
        assert!(principal.is_admin());
        assert!(store.authenticate(&root, "rootpass1").await.unwrap());
    }

    #[tokio::test]
    async fn test_bootstrap_admin_rejects_short_password() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(LocalFileStore::new(dir.path().join("users.json")));

        let err = bootstrap_admin(&store, &admin("root", "short")).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }
}
