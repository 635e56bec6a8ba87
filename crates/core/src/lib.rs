//! StudyDesk Core - Shared account types.
//!
//! This crate provides the types shared by every StudyDesk component:
//! - `server` - Account service (login, registration, admin operations)
//! - `cli` - Operator tooling for migrations and user management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Validated usernames and account roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
