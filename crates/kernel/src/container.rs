//! Content containers (spaces and user profiles).
//!
//! Container management lives outside the kernel. The kernel only needs to
//! resolve a [`ContainerRef`] stored on an envelope into a [`Container`] that
//! permission checks can be evaluated against.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to the container an envelope is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerRef(pub Uuid);

impl ContainerRef {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ContainerRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Space,
    Profile,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Space => "space",
            Self::Profile => "profile",
        }
    }
}

/// A resolved container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerRef,
    pub kind: ContainerKind,
    pub name: String,
    /// Space owner or profile user.
    pub owner_id: Option<Uuid>,
}

impl Container {
    /// A space with a fresh reference.
    pub fn space(name: impl Into<String>, owner_id: Option<Uuid>) -> Self {
        Self {
            id: ContainerRef::new(),
            kind: ContainerKind::Space,
            name: name.into(),
            owner_id,
        }
    }

    /// The profile container of a user.
    pub fn profile(user_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: ContainerRef::new(),
            kind: ContainerKind::Profile,
            name: name.into(),
            owner_id: Some(user_id),
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == Some(user_id)
    }
}

/// Resolves container references.
#[async_trait]
pub trait ContainerRegistry: Send + Sync {
    /// Resolve a reference, `None` when the container does not exist.
    async fn resolve(&self, container: ContainerRef) -> Result<Option<Container>>;
}

/// Container registry held in process memory.
#[derive(Clone, Default)]
pub struct MemoryContainerRegistry {
    containers: Arc<DashMap<ContainerRef, Container>>,
}

impl MemoryContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a container.
    pub fn insert(&self, container: Container) {
        self.containers.insert(container.id, container);
    }

    pub fn remove(&self, container: ContainerRef) -> Option<Container> {
        self.containers.remove(&container).map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

#[async_trait]
impl ContainerRegistry for MemoryContainerRegistry {
    async fn resolve(&self, container: ContainerRef) -> Result<Option<Container>> {
        Ok(self.containers.get(&container).map(|c| c.clone()))
    }
}
