//! Acting identity for content operations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Anonymous user UUID (nil UUID).
pub const ANONYMOUS_USER_ID: Uuid = Uuid::nil();

/// Permission that bypasses every capability check.
pub const ADMINISTER_SITE: &str = "administer site";

/// The user on whose behalf an operation runs.
///
/// Callers pass the current session's context; an anonymous context means
/// there is no logged-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// User ID (Uuid::nil() for anonymous).
    pub id: Uuid,
    /// Whether the user is authenticated.
    pub authenticated: bool,
    /// Site-wide permissions held by the user.
    pub permissions: Vec<String>,
}

impl UserContext {
    /// Create context for anonymous user.
    pub fn anonymous() -> Self {
        Self {
            id: ANONYMOUS_USER_ID,
            authenticated: false,
            permissions: Vec::new(),
        }
    }

    /// Create context for authenticated user.
    pub fn authenticated(id: Uuid, permissions: Vec<String>) -> Self {
        Self {
            id,
            authenticated: true,
            permissions,
        }
    }

    /// Check if user has a specific permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Check if user is admin.
    pub fn is_admin(&self) -> bool {
        self.authenticated && self.has_permission(ADMINISTER_SITE)
    }

    /// The identity, or `None` for guests.
    pub fn identity(&self) -> Option<Uuid> {
        self.authenticated.then_some(self.id)
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::anonymous()
    }
}
