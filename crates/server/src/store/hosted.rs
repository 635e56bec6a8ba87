//! Hosted table backend.
//!
//! One row per user in the `users` table. Every operation is a single
//! statement, so the database provides the atomicity; the primary key
//! enforces unique usernames.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use studydesk_core::{Role, Username};

use super::{StoreError, UserBackend, UserRecord};

/// Credential records in a `PostgreSQL` table.
pub struct HostedTableStore {
    pool: PgPool,
}

impl HostedTableStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_role(raw: &str) -> Result<Role, StoreError> {
    raw.parse()
        .map_err(|e: String| StoreError::DataCorruption(format!("invalid role in database: {e}")))
}

#[async_trait]
impl UserBackend for HostedTableStore {
    fn kind(&self) -> &'static str {
        "hosted"
    }

    async fn fetch(&self, username: &Username) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT password, role
            FROM users
            WHERE username = $1
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let password: String = r.try_get("password")?;
                let role: String = r.try_get("role")?;
                Ok(Some(UserRecord::new(password, decode_role(&role)?)))
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, username: &Username, record: &UserRecord) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO users (username, password, role)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(username)
        .bind(&record.password)
        .bind(record.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::AlreadyExists;
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn set_password(&self, username: &Username, digest: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET password = $2
            WHERE username = $1
            ",
        )
        .bind(username)
        .bind(digest)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn swap_password(
        &self,
        username: &Username,
        current: &str,
        replacement: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET password = $3
            WHERE username = $1 AND password = $2
            ",
        )
        .bind(username)
        .bind(current)
        .bind(replacement)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, username: &Username) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
