//! Relocating content between containers.

use serde::Serialize;
use thiserror::Error;

use crate::permissions::PermissionRequirement;

/// Denial reason when the family does not support moving.
pub const MOVE_DISABLED: &str = "This content type can't be moved.";

/// Denial reason when the actor lacks the family's move permission.
pub const MOVE_NOT_PERMITTED: &str =
    "You are not allowed to move this content to the selected container.";

/// Whether an entity family may be relocated, and under which condition.
#[derive(Debug, Clone, Default)]
pub enum MovePolicy {
    #[default]
    Disabled,
    Enabled,
    /// Enabled when the actor satisfies the requirement on the target container.
    Requires(PermissionRequirement),
}

impl MovePolicy {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// A move that was refused. Returned as a value, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{reason}")]
pub struct MoveDenied {
    pub reason: String,
}

impl MoveDenied {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome of asking whether a move may happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveCheck {
    Allowed,
    Denied(MoveDenied),
}

impl MoveCheck {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied(MoveDenied::new(reason))
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// The denial reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied(denied) => Some(&denied.reason),
        }
    }
}

/// Outcome of a move request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    Denied(MoveDenied),
}

impl MoveOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, Self::Moved)
    }
}
