//! Session-related types.
//!
//! Per-session login state, stored in the HTTP session and handed to the
//! auth controller by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use studydesk_core::{Role, Username};

use super::user::Principal;

/// Login state of one interactive session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Nobody is logged in.
    #[default]
    Anonymous,
    /// An ordinary user is logged in.
    Authenticated {
        /// Logged-in account.
        username: Username,
        /// When the login happened.
        since: DateTime<Utc>,
    },
    /// An admin principal is logged in and admin mode is active.
    Admin {
        /// Logged-in admin account.
        username: Username,
        /// When the login happened.
        since: DateTime<Utc>,
    },
}

impl SessionState {
    /// State entered after `principal` logs in.
    #[must_use]
    pub fn logged_in(principal: Principal) -> Self {
        let since = Utc::now();
        match principal.role {
            Role::Admin => Self::Admin {
                username: principal.username,
                since,
            },
            Role::User => Self::Authenticated {
                username: principal.username,
                since,
            },
        }
    }

    /// Whether someone is logged in.
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        !matches!(self, Self::Anonymous)
    }

    /// Whether admin mode is active.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin { .. })
    }

    /// The logged-in username, if any.
    #[must_use]
    pub const fn username(&self) -> Option<&Username> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { username, .. } | Self::Admin { username, .. } => Some(username),
        }
    }

    /// Role the backing record must still have for this state to stay valid.
    #[must_use]
    pub const fn expected_role(&self) -> Option<Role> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { .. } => Some(Role::User),
            Self::Admin { .. } => Some(Role::Admin),
        }
    }

    /// Reset to the logged-out state.
    pub fn reset(&mut self) {
        *self = Self::Anonymous;
    }
}

/// Flat view of a session for clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    /// Whether someone is logged in.
    pub logged_in: bool,
    /// Logged-in username, empty when logged out.
    pub username: String,
    /// Whether admin mode is active.
    pub admin_mode: bool,
}

impl From<&SessionState> for SessionView {
    fn from(state: &SessionState) -> Self {
        Self {
            logged_in: state.is_logged_in(),
            username: state.username().map(ToString::to_string).unwrap_or_default(),
            admin_mode: state.is_admin(),
        }
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for the [`SessionState`](super::SessionState) of the session.
    pub const SESSION_STATE: &str = "session_state";
}
