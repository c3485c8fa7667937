//! Content envelope model.
//!
//! Every content-bearing entity is bound to exactly one envelope. The envelope
//! holds what all content shares: visibility, moderation flags, ownership and
//! the container it lives in. It points back at its owner through the
//! polymorphic `(object_type, object_id)` pair.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::container::{Container, ContainerRef};
use crate::content::movable::{MoveCheck, MoveDenied};
use crate::error::ValidationErrors;
use crate::permissions::{Capability, PermissionResolver};
use crate::session::UserContext;

/// Content visibility.
///
/// Stored as SMALLINT: 0 = private, 1 = public, 2 = owner only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible to container members.
    Private,
    /// Visible to everyone who can see the container.
    Public,
    /// Visible to the creator only.
    OwnerOnly,
}

impl Visibility {
    /// Return the value stored in the database.
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::Private => 0,
            Self::Public => 1,
            Self::OwnerOnly => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Private),
            1 => Some(Self::Public),
            2 => Some(Self::OwnerOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::OwnerOnly => "owner_only",
        }
    }
}

impl TryFrom<i16> for Visibility {
    type Error = anyhow::Error;

    fn try_from(value: i16) -> Result<Self> {
        Self::from_i16(value).ok_or_else(|| anyhow::anyhow!("invalid visibility value: {value}"))
    }
}

impl std::str::FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            "owner_only" => Ok(Self::OwnerOnly),
            _ => Err(anyhow::anyhow!(
                "invalid visibility: {s:?} (expected private, public, or owner_only)"
            )),
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream channel new content surfaces on unless its family says otherwise.
pub const DEFAULT_STREAM_CHANNEL: &str = "default";

/// Content envelope record (`content` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEnvelope {
    /// Unique identifier (UUIDv7).
    pub id: Uuid,

    /// Identity of the owning entity row within its family.
    pub object_id: Option<i64>,

    /// Declared base type of the owning entity family.
    pub object_type: Option<String>,

    /// Owning container. Required before the envelope is persisted.
    pub container: Option<ContainerRef>,

    /// Raw visibility value, see [`Visibility`].
    pub visibility: i16,

    /// Optional display title.
    pub title: Option<String>,

    pub created_by: Option<Uuid>,

    /// Unix timestamp when created.
    pub created_at: i64,

    pub updated_by: Option<Uuid>,

    /// Unix timestamp when last changed.
    pub updated_at: i64,

    pub pinned: bool,

    pub archived: bool,

    /// Feed channel; `None` keeps the content off aggregated streams.
    pub stream_channel: Option<String>,
}

impl ContentEnvelope {
    /// A fresh, unpersisted envelope with private visibility.
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            object_id: None,
            object_type: None,
            container: None,
            visibility: Visibility::Private.as_i16(),
            title: None,
            created_by: None,
            created_at: 0,
            updated_by: None,
            updated_at: 0,
            pinned: false,
            archived: false,
            stream_channel: Some(DEFAULT_STREAM_CHANNEL.to_string()),
        }
    }

    /// Check if this content is pinned.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Check if this content is archived.
    pub fn is_archived(&self) -> bool {
        self.archived
    }

    /// Check if this content is public.
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public.as_i16()
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private.as_i16()
    }

    pub fn is_owner_only(&self) -> bool {
        self.visibility == Visibility::OwnerOnly.as_i16()
    }

    /// Typed visibility, `None` when the raw value is outside the known set.
    pub fn visibility(&self) -> Option<Visibility> {
        Visibility::from_i16(self.visibility)
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility.as_i16();
    }

    /// Set an unchecked value, e.g. from form input. Checked by [`validate`](Self::validate).
    pub fn set_raw_visibility(&mut self, visibility: i16) {
        self.visibility = visibility;
    }

    pub fn pin(&mut self) {
        self.pinned = true;
    }

    pub fn unpin(&mut self) {
        self.pinned = false;
    }

    pub fn archive(&mut self) {
        self.archived = true;
    }

    pub fn unarchive(&mut self) {
        self.archived = false;
    }

    /// Whether the polymorphic pointer has been attached.
    pub fn has_pointer(&self) -> bool {
        self.object_type.is_some() && self.object_id.is_some()
    }

    /// Tag this envelope with a family base type instead of the concrete type.
    pub fn declare_owner_type(&mut self, object_type: impl Into<String>) {
        self.object_type = Some(object_type.into());
    }

    /// Validate visibility for `actor` within `container`.
    ///
    /// Returns the field messages; an empty set means valid. Errors are only
    /// returned when the permission resolver itself fails.
    pub async fn validate(
        &self,
        actor: &UserContext,
        container: &Container,
        resolver: &dyn PermissionResolver,
    ) -> Result<ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match self.visibility() {
            None => errors.add("visibility", "Invalid visibility mode!"),
            Some(Visibility::Public) => {
                if !resolver
                    .can(actor, container, &Capability::CreatePublicContent)
                    .await?
                {
                    errors.add(
                        "visibility",
                        "You are not allowed to create public content.",
                    );
                }
            }
            Some(_) => {}
        }

        Ok(errors)
    }

    /// Reassign the container.
    ///
    /// Proceeds when `force` is set or `check` allowed the move; otherwise the
    /// container is left untouched. Owned sub-entities are not moved here.
    pub fn move_to(
        &mut self,
        target: ContainerRef,
        force: bool,
        check: &MoveCheck,
    ) -> std::result::Result<&ContentEnvelope, MoveDenied> {
        if !force && let MoveCheck::Denied(denied) = check {
            return Err(denied.clone());
        }

        self.container = Some(target);
        Ok(self)
    }
}

impl Default for ContentEnvelope {
    fn default() -> Self {
        Self::new()
    }
}
