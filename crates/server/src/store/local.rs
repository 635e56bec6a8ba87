//! Local JSON file backend.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::instrument;

use studydesk_core::Username;

use super::file_format::{self, UserMap};
use super::{StoreError, UserBackend, UserRecord};

/// Credential records in a JSON file on local disk.
///
/// All mutations run under one async mutex and replace the file by writing a
/// sibling temporary file and renaming it over the original, so concurrent
/// requests never lose each other's writes and readers never see a partially
/// written file.
pub struct LocalFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalFileStore {
    /// Create a store over `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the users file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<UserMap, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => file_format::decode(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(UserMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, users: &UserMap) -> Result<(), StoreError> {
        let content = file_format::encode(users)?;

        let file_name = self
            .path
            .file_name()
            .map_or_else(|| "users".into(), |name| name.to_string_lossy().into_owned());
        let temp_path = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        let mut file = tokio::fs::File::create(&temp_path).await?;
        let written = async {
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        drop(file);

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Read-modify-write under the write lock.
    ///
    /// `apply` returns the call's result and whether the map changed; the
    /// file is only rewritten when it did.
    async fn modify<T>(
        &self,
        apply: impl FnOnce(&mut UserMap) -> Result<(T, bool), StoreError> + Send,
    ) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut users = self.load().await?;
        let (result, changed) = apply(&mut users)?;
        if changed {
            self.persist(&users).await?;
        }

        Ok(result)
    }
}

#[async_trait]
impl UserBackend for LocalFileStore {
    fn kind(&self) -> &'static str {
        "local"
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn fetch(&self, username: &Username) -> Result<Option<UserRecord>, StoreError> {
        let mut users = self.load().await?;
        Ok(users.remove(username.as_str()))
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn insert(&self, username: &Username, record: &UserRecord) -> Result<(), StoreError> {
        self.modify(|users| {
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
        self.modify(|users| {
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
        self.modify(|users| match users.get_mut(username.as_str()) {
            Some(record) if record.password == current => {
                replacement.clone_into(&mut record.password);
                Ok((true, true))
            }
            _ => Ok((false, false)),
        })
        .await
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn remove(&self, username: &Username) -> Result<bool, StoreError> {
        self.modify(|users| {
            let existed = users.remove(username.as_str()).is_some();
            Ok((existed, existed))
        })
        .await
    }
}
