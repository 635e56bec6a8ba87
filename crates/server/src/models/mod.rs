//! Domain models for the account service.

pub mod session;
pub mod user;

pub use session::{SessionState, SessionView};
pub use user::Principal;
