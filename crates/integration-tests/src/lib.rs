//! Integration tests for StudyDesk.
//!
//! # Running Tests
//!
//! ```bash
//! # File-backed scenarios (no external services)
//! cargo test -p studydesk-integration-tests
//!
//! # Hosted backend scenarios
//! DATABASE_URL=postgres://... cargo test -p studydesk-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `account_lifecycle` - Registration, login, password changes, deletion over HTTP
//! - `admin_session` - Admin mode and session invalidation
//! - `concurrency` - Concurrent registrations against one store
//! - `legacy_migration` - SHA-256 digests upgraded on login
//! - `hosted_backend` - `PostgreSQL` backend (ignored without a database)

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use reqwest::{Client, Response};
use serde_json::Value;
use tempfile::TempDir;
use thiserror::Error;

use studydesk_server::config::{ConfigError, ServerConfig};
use studydesk_server::state::AppState;
use studydesk_server::store::{CredentialStore, LocalFileStore};

/// Errors that can occur while starting a test server.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// An account service listening on an ephemeral port, backed by a local
/// users file in a temporary directory.
pub struct TestServer {
    /// Base URL, e.g. `http://127.0.0.1:41234`
    pub base_url: String,
    /// Store shared with the running server, for direct inspection.
    pub store: CredentialStore,
    users_file: PathBuf,
    _dir: TempDir,
}

impl TestServer {
    /// Start a server with an empty users file.
    ///
    /// # Errors
    ///
    /// Returns `SetupError` if the directory, config or listener cannot be created.
    pub async fn start() -> Result<Self, SetupError> {
        Self::start_with_file(None).await
    }

    /// Start a server whose users file initially holds `contents`.
    ///
    /// # Errors
    ///
    /// Returns `SetupError` if the directory, config or listener cannot be created.
    pub async fn start_with_file(contents: Option<&str>) -> Result<Self, SetupError> {
        let dir = tempfile::tempdir()?;
        let users_file = dir.path().join("users.json");
        if let Some(contents) = contents {
            std::fs::write(&users_file, contents)?;
        }

        let vars: HashMap<&str, String> = HashMap::from([
            ("STUDYDESK_USERS_FILE", users_file.display().to_string()),
            ("STUDYDESK_AUTH_BURST", "1000".to_string()),
            ("STUDYDESK_AUTH_REPLENISH_SECS", "1".to_string()),
        ]);
        let config = ServerConfig::from_lookup(&|key| vars.get(key).cloned())?;

        let store = CredentialStore::new(LocalFileStore::new(users_file.clone()));
        let app = studydesk_server::app(AppState::new(config, store.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            store,
            users_file,
            _dir: dir,
        })
    }

    /// A client with its own cookie jar, i.e. its own session.
    ///
    /// # Errors
    ///
    /// Returns `SetupError::Http` if the client cannot be built.
    pub fn client(&self) -> Result<Client, SetupError> {
        Ok(Client::builder().cookie_store(true).build()?)
    }

    /// Full URL for a path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Raw contents of the users file.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be read.
    pub fn users_file(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.users_file)
    }

    /// POST a JSON body.
    ///
    /// # Errors
    ///
    /// Returns the request error if the server cannot be reached.
    pub async fn post(
        &self,
        client: &Client,
        path: &str,
        body: &Value,
    ) -> Result<Response, reqwest::Error> {
        client.post(self.url(path)).json(body).send().await
    }

    /// Current session as reported by `GET /auth/session`.
    ///
    /// # Errors
    ///
    /// Returns the request error if the server cannot be reached or the body
    /// is not JSON.
    pub async fn session(&self, client: &Client) -> Result<Value, reqwest::Error> {
        client
            .get(self.url("/auth/session"))
            .send()
            .await?
            .json()
            .await
    }
}
