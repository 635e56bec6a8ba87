//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Login, registration and account management over a session

pub mod auth;
