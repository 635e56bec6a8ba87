//! Core types for StudyDesk accounts.
//!
//! This module provides type-safe wrappers for account concepts.

pub mod role;
pub mod username;

pub use role::Role;
pub use username::{Username, UsernameError};
