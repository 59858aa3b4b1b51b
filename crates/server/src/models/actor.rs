//! The authenticated caller.

use serde::{Deserialize, Serialize};

use marketplace_core::{Role, UserId};

/// Identity and role of the caller, as established by the request-handling
/// layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Authenticated user.
    pub user_id: UserId,
    /// Role granted to the user.
    pub role: Role,
}

impl Actor {
    /// Create a new actor.
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Returns `true` if the actor is an admin.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
