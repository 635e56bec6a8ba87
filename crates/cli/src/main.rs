//! StudyDesk CLI - Migrations and account management.
//!
//! # Usage
//!
//! ```bash
//! # Create the users table (hosted backend)
//! studydesk-cli migrate
//!
//! # Create an admin account
//! STUDYDESK_CLI_PASSWORD=... studydesk-cli user create -u root -r admin
//!
//! # Set a new password
//! STUDYDESK_CLI_PASSWORD=... studydesk-cli user reset-password -u alice
//!
//! # Check a password
//! STUDYDESK_CLI_PASSWORD=... studydesk-cli user check -u alice
//!
//! # Delete an account
//! studydesk-cli user delete -u alice
//! ```
//!
//! The backend is selected by the same `STUDYDESK_*` variables as the server.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "studydesk-cli")]
#[command(author, version, about = "StudyDesk operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations for the hosted backend
    Migrate,
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new account (password from `STUDYDESK_CLI_PASSWORD`)
    Create {
        /// Username
        #[arg(short, long)]
        username: String,

        /// Account role (`user`, `admin`)
        #[arg(short, long, default_value = "user")]
        role: String,
    },
    /// Set an account's password (password from `STUDYDESK_CLI_PASSWORD`)
    ResetPassword {
        /// Username
        #[arg(short, long)]
        username: String,
    },
    /// Delete an account
    Delete {
        /// Username
        #[arg(short, long)]
        username: String,
    },
    /// Check a password (password from `STUDYDESK_CLI_PASSWORD`)
    Check {
        /// Username
        #[arg(short, long)]
        username: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create { username, role } => {
                commands::user::create(&username, &role).await?;
            }
            UserAction::ResetPassword { username } => {
                commands::user::reset_password(&username).await?;
            }
            UserAction::Delete { username } => commands::user::delete(&username).await?,
            UserAction::Check { username } => {
                if !commands::user::check(&username).await? {
                    return Err("password does not match".into());
                }
            }
        },
    }
    Ok(())
}
