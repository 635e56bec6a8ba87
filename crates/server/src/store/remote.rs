//! Remote version-controlled file backend.
//!
//! The users file lives in a repository reachable through a GitHub-style
//! contents API:
//!
//! - `GET  {endpoint}/repos/{repo}/contents/{path}?ref={branch}` returns the
//!   base64 content and the blob `sha`
//! - `PUT  {endpoint}/repos/{repo}/contents/{path}` commits new content; the
//!   request carries the `sha` that was read, and the API answers 409 or 422
//!   if the file changed in the meantime
//!
//! Files over the contents API's inline limit come back with an empty
//! `content` and `encoding: "none"`; their bytes are read from
//! `GET {endpoint}/repos/{repo}/git/blobs/{sha}` so they match the revision
//! that the next commit is checked against.
//!
//! A 404 on read means the file does not exist yet (an empty map). Writes
//! from this process are serialized by a mutex; writes from other processes
//! are caught by the revision check and surface as
//! [`StoreError::StaleRevision`], which the resilience layer retries from a
//! fresh read.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use studydesk_core::Username;

use super::file_format::{self, UserMap};
use super::{StoreError, UserBackend, UserRecord};
use crate::config::RemoteFileConfig;

const USER_AGENT: &str = concat!("studydesk/", env!("CARGO_PKG_VERSION"));

/// Media type asking the API for the raw bytes of a blob.
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// Users file contents as returned by the API.
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    /// `base64`, or `none` when the file is too large to inline.
    #[serde(default)]
    encoding: Option<String>,
}

/// Commit request body.
#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    message: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

/// A decoded users file and the revision it was read at.
struct Snapshot {
    users: UserMap,
    sha: Option<String>,
}

/// Credential records in a JSON file committed to a remote repository.
pub struct RemoteFileStore {
    client: reqwest::Client,
    config: RemoteFileConfig,
    contents_url: Url,
    blobs_url: Url,
    write_lock: Mutex<()>,
}

impl RemoteFileStore {
    /// Create a store for the configured repository file.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Http` if the HTTP client cannot be built, or
    /// `StoreError::InvalidEndpoint` if the endpoint cannot carry a path.
    pub fn new(config: RemoteFileConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()?;

        let contents_url = api_url(&config.endpoint, &config.repo, &["contents"], &config.path)?;
        let blobs_url = api_url(&config.endpoint, &config.repo, &["git", "blobs"], "")?;

        Ok(Self {
            client,
            config,
            contents_url,
            blobs_url,
            write_lock: Mutex::new(()),
        })
    }

    async fn load(&self) -> Result<Snapshot, StoreError> {
        let mut url = self.contents_url.clone();
        url.query_pairs_mut().append_pair("ref", &self.config.branch);
        let response = self
            .client
            .get(url)
            .bearer_auth(self.config.token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Remote users file does not exist yet");
            return Ok(Snapshot {
                users: UserMap::new(),
                sha: None,
            });
        }
        if !status.is_success() {
            return Err(StoreError::UnexpectedStatus {
                operation: "read",
                status: status.as_u16(),
            });
        }

        let contents: ContentsResponse = response.json().await?;
        let bytes = match contents.encoding.as_deref() {
            Some("base64") => {
                let encoded: String = contents
                    .content
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                STANDARD.decode(encoded).map_err(|e| {
                    StoreError::DataCorruption(format!("invalid base64 content: {e}"))
                })?
            }
            Some("none") => self.load_blob(&contents.sha).await?,
            other => {
                return Err(StoreError::DataCorruption(format!(
                    "unsupported content encoding: {}",
                    other.unwrap_or("missing")
                )));
            }
        };
        let text = String::from_utf8(bytes)
            .map_err(|e| StoreError::DataCorruption(format!("users file is not UTF-8: {e}")))?;

        Ok(Snapshot {
            users: file_format::decode(&text)?,
            sha: Some(contents.sha),
        })
    }

    /// Raw bytes of the blob at revision `sha`.
    async fn load_blob(&self, sha: &str) -> Result<Vec<u8>, StoreError> {
        debug!("Users file too large to inline, reading blob");
        let mut url = self.blobs_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::InvalidEndpoint(self.blobs_url.to_string()))?
            .push(sha);

        let response = self
            .client
            .get(url)
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .bearer_auth(self.config.token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::UnexpectedStatus {
                operation: "read blob",
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn commit(&self, snapshot: &Snapshot, message: String) -> Result<(), StoreError> {
        let content = file_format::encode(&snapshot.users)?;
        let body = CommitRequest {
            message,
            content: STANDARD.encode(content),
            sha: snapshot.sha.as_deref(),
            branch: &self.config.branch,
        };

        let response = self
            .client
            .put(self.contents_url.clone())
            .bearer_auth(self.config.token.expose_secret())
            .json(&body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                debug!("Remote users file changed since read");
                Err(StoreError::StaleRevision)
            }
            status => Err(StoreError::UnexpectedStatus {
                operation: "commit",
                status: status.as_u16(),
            }),
        }
    }

    /// Read-modify-commit under the write lock.
    ///
    /// `apply` returns the call's result and whether the map changed; nothing
    /// is committed when it did not.
    async fn modify<T>(
        &self,
        message: String,
        apply: impl FnOnce(&mut UserMap) -> Result<(T, bool), StoreError> + Send,
    ) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot = self.load().await?;
        let (result, changed) = apply(&mut snapshot.users)?;
        if changed {
            self.commit(&snapshot, message).await?;
        }

        Ok(result)
    }
}

/// `{endpoint}/repos/{owner}/{repo}/{section..}/{path..}` with every segment
/// percent-encoded.
fn api_url(endpoint: &Url, repo: &str, section: &[&str], path: &str) -> Result<Url, StoreError> {
    let mut url = endpoint.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| StoreError::InvalidEndpoint(endpoint.to_string()))?;
        segments.pop_if_empty().push("repos");
        segments.extend(repo.split('/').filter(|part| !part.is_empty()));
        segments.extend(section);
        segments.extend(path.split('/').filter(|part| !part.is_empty()));
    }
    Ok(url)
}

#[async_trait]
impl UserBackend for RemoteFileStore {
    fn kind(&self) -> &'static str {
        "remote"
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn fetch(&self, username: &Username) -> Result<Option<UserRecord>, StoreError> {
        let mut snapshot = self.load().await?;
        Ok(snapshot.users.remove(username.as_str()))
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn insert(&self, username: &Username, record: &UserRecord) -> Result<(), StoreError> {
        self.modify(format!("Register {username}"), |users| {
            if users.contains_key(username.as_str()) {
                return Err(StoreError::AlreadyExists);
            }
            users.insert(username.to_string(), record.clone());
            Ok(((), true))
        })
        .await
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn set_password(&self, username: &Username, digest: &str) -> Result<(), StoreError> {
        self.modify(format!("Reset password for {username}"), |users| {
            let record = users
                .get_mut(username.as_str())
                .ok_or(StoreError::NotFound)?;
            digest.clone_into(&mut record.password);
            Ok(((), true))
        })
        .await
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn swap_password(
        &self,
        username: &Username,
        current: &str,
        replacement: &str,
    ) -> Result<bool, StoreError> {
        self.modify(format!("Upgrade password digest for {username}"), |users| {
            match users.get_mut(username.as_str()) {
                Some(record) if record.password == current => {
                    replacement.clone_into(&mut record.password);
                    Ok((true, true))
                }
                _ => Ok((false, false)),
            }
        })
        .await
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn remove(&self, username: &Username) -> Result<bool, StoreError> {
        self.modify(format!("Delete {username}"), |users| {
            let existed = users.remove(username.as_str()).is_some();
            Ok((existed, existed))
        })
        .await
    }
}
