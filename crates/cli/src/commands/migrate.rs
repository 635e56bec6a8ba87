//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! STUDYDESK_BACKEND=hosted studydesk-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `STUDYDESK_BACKEND_ENDPOINT` or `DATABASE_URL` - `PostgreSQL` connection string

use studydesk_server::config::{BackendConfig, ConfigError};
use studydesk_server::db;
use thiserror::Error;

/// Errors that can occur during migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The configured backend has no database schema.
    #[error("Backend '{0}' has no migrations; set STUDYDESK_BACKEND=hosted")]
    NotHosted(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Run the hosted backend migrations.
pub async fn run() -> Result<(), MigrationError> {
    let backend = BackendConfig::from_env()?;
    let BackendConfig::Hosted { database_url } = &backend else {
        return Err(MigrationError::NotHosted(backend.name()));
    };

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(database_url).await?;

    tracing::info!("Running migrations...");
    db::MIGRATOR.run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
