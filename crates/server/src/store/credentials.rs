//! Credential operations over any backend.

use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::instrument;

use studydesk_core::{Role, Username};

use super::{StoreError, UserBackend, UserRecord};
use crate::models::Principal;
use crate::password::{self, HashError, Verification};

/// Errors from credential operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The username is already registered.
    #[error("user already exists")]
    AlreadyExists,

    /// The username is not registered.
    #[error("user not found")]
    NotFound,

    /// Password hashing failed.
    #[error("password hashing failed")]
    PasswordHash,

    /// The backend failed.
    #[error("backend error: {0}")]
    Backend(StoreError),
}

impl From<StoreError> for CredentialError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists => Self::AlreadyExists,
            StoreError::NotFound => Self::NotFound,
            other => Self::Backend(other),
        }
    }
}

impl From<HashError> for CredentialError {
    fn from(_: HashError) -> Self {
        Self::PasswordHash
    }
}

/// Register, authenticate, reset and delete credentials.
///
/// Clear-text passwords stop here: backends only ever see digests. Argon2
/// runs on the blocking pool so it never stalls the async workers.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn UserBackend>,
}

impl CredentialStore {
    /// Create a store over `backend`.
    #[must_use]
    pub fn new(backend: impl UserBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Name of the underlying backend.
    #[must_use]
    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Register a new user with the `user` role.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::AlreadyExists` if the username is taken.
    pub async fn register(
        &self,
        username: &Username,
        password: &str,
    ) -> Result<(), CredentialError> {
        self.register_with_role(username, password, Role::User).await
    }

    /// Register a new user with an explicit role.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::AlreadyExists` if the username is taken.
    #[instrument(skip_all, fields(username = %username))]
    pub async fn register_with_role(
        &self,
        username: &Username,
        password: &str,
        role: Role,
    ) -> Result<(), CredentialError> {
        let digest = hash(password).await?;
        self.backend
            .insert(username, &UserRecord::new(digest, role))
            .await?;

        tracing::info!(role = %role, "User registered");
        Ok(())
    }

    /// Check a username/password pair.
    ///
    /// An unknown username and a wrong password both yield `false`.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Backend` if the backend fails.
    pub async fn authenticate(
        &self,
        username: &Username,
        password: &str,
    ) -> Result<bool, CredentialError> {
        Ok(self.login(username, password).await?.is_some())
    }

    /// Check a username/password pair and return the principal on success.
    ///
    /// A legacy digest that verifies is replaced with an Argon2 digest. The
    /// upgrade is best effort: if it fails the login still succeeds.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Backend` if the backend fails.
    #[instrument(skip_all, fields(username = %username))]
    pub async fn login(
        &self,
        username: &Username,
        password: &str,
    ) -> Result<Option<Principal>, CredentialError> {
        let Some(record) = self.backend.fetch(username).await? else {
            // Same work as a real check so unknown names are not faster.
            if let Some(dummy) = dummy_hash() {
                verify(password, dummy).await?;
            }
            tracing::debug!("Login for unknown user");
            return Ok(None);
        };

        match verify(password, &record.password).await? {
            Verification::Invalid => {
                tracing::debug!("Login with wrong password");
                Ok(None)
            }
            Verification::Valid => Ok(Some(Principal::new(username.clone(), record.role))),
            Verification::ValidLegacy => {
                self.upgrade_legacy(username, password, &record.password).await;
                Ok(Some(Principal::new(username.clone(), record.role)))
            }
        }
    }

    async fn upgrade_legacy(&self, username: &Username, password: &str, legacy: &str) {
        let digest = match hash(password).await {
            Ok(digest) => digest,
            Err(e) => {
                tracing::warn!(error = %e, "Could not hash password for legacy upgrade");
                return;
            }
        };

        match self.backend.swap_password(username, legacy, &digest).await {
            Ok(true) => tracing::info!("Upgraded legacy password digest"),
            Ok(false) => tracing::debug!("Legacy digest changed before upgrade, skipped"),
            Err(e) => tracing::warn!(error = %e, "Failed to store upgraded password digest"),
        }
    }

    /// Replace a user's password, keeping their role.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::NotFound` if the username is not registered.
    #[instrument(skip_all, fields(username = %username))]
    pub async fn reset_password(
        &self,
        username: &Username,
        new_password: &str,
    ) -> Result<(), CredentialError> {
        let digest = hash(new_password).await?;
        self.backend.set_password(username, &digest).await?;

        tracing::info!("Password reset");
        Ok(())
    }

    /// Delete a user. Returns whether the user existed.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Backend` if the backend fails.
    #[instrument(skip_all, fields(username = %username))]
    pub async fn delete(&self, username: &Username) -> Result<bool, CredentialError> {
        let existed = self.backend.remove(username).await?;
        if existed {
            tracing::info!("User deleted");
        }
        Ok(existed)
    }

    /// Look up the principal for a username without checking a password.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Backend` if the backend fails.
    pub async fn principal(
        &self,
        username: &Username,
    ) -> Result<Option<Principal>, CredentialError> {
        let record = self.backend.fetch(username).await?;
        Ok(record.map(|record| Principal::new(username.clone(), record.role)))
    }
}

/// Digest checked when the username is unknown.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    DUMMY_HASH
        .get_or_init(|| password::hash_password("studydesk-timing-equalizer").ok())
        .as_deref()
}

async fn hash(clear: &str) -> Result<String, CredentialError> {
    let clear = clear.to_owned();
    tokio::task::spawn_blocking(move || password::hash_password(&clear))
        .await
        .map_err(|_| CredentialError::PasswordHash)?
        .map_err(CredentialError::from)
}

async fn verify(clear: &str, stored: &str) -> Result<Verification, CredentialError> {
    let clear = clear.to_owned();
    let stored = stored.to_owned();
    tokio::task::spawn_blocking(move || password::verify_password(&clear, &stored))
        .await
        .map_err(|_| CredentialError::PasswordHash)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::TempDir;

    use super::*;
    use crate::store::LocalFileStore;
    use crate::store::file_format;

    fn open(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(LocalFileStore::new(dir.path().join("users.json")))
    }

    fn name(s: &str) -> Username {
        Username::parse(s).unwrap()
    }

    fn read_file(dir: &TempDir) -> BTreeMap<String, UserRecord> {
        let content = std::fs::read_to_string(dir.path().join("users.json")).unwrap();
        file_format::decode(&content).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.register(&name("alice"), "Secret123").await.unwrap();
        assert!(store.authenticate(&name("alice"), "Secret123").await.unwrap());
        assert!(!store.authenticate(&name("alice"), "Secret124").await.unwrap());
    }

    #[tokio::test]
    async fn test_register_stores_argon2_digest() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.register(&name("alice"), "Secret123").await.unwrap();

        let users = read_file(&dir);
        assert!(users["alice"].password.starts_with("$argon2id$"));
        assert!(!users["alice"].password.contains("Secret123"));
        assert_eq!(users["alice"].role, Role::User);
    }

    #[tokio::test]
    async fn test_duplicate_register() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.register(&name("alice"), "Secret123").await.unwrap();

        let err = store.register(&name("alice"), "Other1234").await.unwrap_err();
        assert!(matches!(err, CredentialError::AlreadyExists));
        assert!(store.authenticate(&name("alice"), "Secret123").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_user_is_false() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert!(!store.authenticate(&name("ghost"), "whatever1").await.unwrap());
        assert!(store.login(&name("ghost"), "whatever1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_password() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .register_with_role(&name("root"), "Rootpass1", Role::Admin)
            .await
            .unwrap();

        store.reset_password(&name("root"), "Newpass99").await.unwrap();
        assert!(store.authenticate(&name("root"), "Newpass99").await.unwrap());
        assert!(!store.authenticate(&name("root"), "Rootpass1").await.unwrap());
        assert_eq!(
            store.principal(&name("root")).await.unwrap().unwrap().role,
            Role::Admin
        );
    }

    #[tokio::test]
    async fn test_reset_password_unknown_user() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let err = store.reset_password(&name("ghost"), "Newpass99").await.unwrap_err();
        assert!(matches!(err, CredentialError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_allows_reregistration() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.register(&name("alice"), "Secret123").await.unwrap();

        assert!(store.delete(&name("alice")).await.unwrap());
        assert!(!store.authenticate(&name("alice"), "Secret123").await.unwrap());
        assert!(!store.delete(&name("alice")).await.unwrap());

        store.register(&name("alice"), "Another99").await.unwrap();
        assert!(store.authenticate(&name("alice"), "Another99").await.unwrap());
    }

    #[tokio::test]
    async fn test_login_returns_principal_role() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .register_with_role(&name("root"), "Rootpass1", Role::Admin)
            .await
            .unwrap();

        let principal = store.login(&name("root"), "Rootpass1").await.unwrap().unwrap();
        assert_eq!(principal.username.as_str(), "root");
        assert!(principal.is_admin());
    }

    #[tokio::test]
    async fn test_legacy_digest_is_upgraded_on_login() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("users.json"),
            format!(
                r#"{{"alice": {{"password": "{}"}}}}"#,
                password::legacy_digest("Secret123")
            ),
        )
        .unwrap();
        let store = open(&dir);

        assert!(!store.authenticate(&name("alice"), "wrong-pass").await.unwrap());
        assert!(password::is_legacy_digest(&read_file(&dir)["alice"].password));

        assert!(store.authenticate(&name("alice"), "Secret123").await.unwrap());
        let upgraded = read_file(&dir);
        assert!(upgraded["alice"].password.starts_with("$argon2id$"));
        assert_eq!(upgraded["alice"].role, Role::User);

        assert!(store.authenticate(&name("alice"), "Secret123").await.unwrap());
    }

    #[tokio::test]
    async fn test_alice_scenario() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let alice = name("alice");

        store.register(&alice, "Secret123").await.unwrap();
        assert!(store.authenticate(&alice, "Secret123").await.unwrap());
        assert!(!store.authenticate(&alice, "secret123").await.unwrap());

        store.reset_password(&alice, "Better456").await.unwrap();
        assert!(!store.authenticate(&alice, "Secret123").await.unwrap());
        assert!(store.authenticate(&alice, "Better456").await.unwrap());

        assert!(store.delete(&alice).await.unwrap());
        assert!(!store.authenticate(&alice, "Better456").await.unwrap());
        assert!(read_file(&dir).is_empty());
    }
}
