//! Authenticated identities.

use serde::{Deserialize, Serialize};

use studydesk_core::{Role, Username};

/// An authenticated identity: who logged in and with which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Account username.
    pub username: Username,
    /// Role of the backing record.
    pub role: Role,
}

impl Principal {
    /// Create a principal.
    #[must_use]
    pub const fn new(username: Username, role: Role) -> Self {
        Self { username, role }
    }

    /// Whether this principal enters admin mode on login.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
