//! Parcel test utilities.
//!
//! Sample entity families and a fully wired in-memory service for
//! integration testing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parcel_kernel::config::MissingEnvelopePolicy;
use parcel_kernel::container::{Container, ContainerRef, MemoryContainerRegistry};
use parcel_kernel::content::{
    ContentBearing, ContentRecord, ContentService, ContentTypeRegistry, Label, MovePolicy,
};
use parcel_kernel::error::{ContentResult, ValidationErrors};
use parcel_kernel::follow::MemoryFollowRegistry;
use parcel_kernel::models::Visibility;
use parcel_kernel::permissions::{Capability, PermissionRequirement, StaticPermissionResolver};
use parcel_kernel::session::UserContext;
use parcel_kernel::store::MemoryContentStore;

/// Short text note. Cannot be moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub message: String,
}

impl Note {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ContentRecord for Note {
    const OBJECT_TYPE: &'static str = "note";

    fn content_name(&self) -> String {
        "Note".to_string()
    }

    fn icon(&self) -> Option<&'static str> {
        Some("fa-sticky-note")
    }

    fn description(&self) -> String {
        self.message.chars().take(60).collect()
    }

    fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.message.trim().is_empty() {
            errors.add("message", "Message cannot be blank.");
        }
        errors
    }
}

/// Stream post. Movable where the actor may create posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub message: String,
    /// Last container the post was moved to.
    #[serde(default)]
    pub moved_to: Option<Uuid>,
}

impl Post {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            moved_to: None,
        }
    }
}

#[async_trait]
impl ContentRecord for Post {
    const OBJECT_TYPE: &'static str = "post";

    fn content_name(&self) -> String {
        "Post".to_string()
    }

    fn move_policy(&self) -> MovePolicy {
        MovePolicy::Requires(PermissionRequirement::capability(Capability::CreateContent(
            "post".to_string(),
        )))
    }

    async fn after_move(
        &mut self,
        target: &Container,
        _service: &ContentService,
    ) -> ContentResult<()> {
        self.moved_to = Some(target.id.0);
        Ok(())
    }
}

/// A post subtype sharing the post family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub message: String,
    pub urgent: bool,
}

impl ContentRecord for Announcement {
    const OBJECT_TYPE: &'static str = "announcement";

    fn base_type() -> &'static str {
        Post::OBJECT_TYPE
    }

    fn content_name(&self) -> String {
        "Announcement".to_string()
    }

    fn extra_labels(&self) -> Vec<Label> {
        if self.urgent {
            vec![Label::danger("Urgent").sort_order(150)]
        } else {
            Vec::new()
        }
    }
}

/// Checklist item. Freely movable, created quietly, never auto-followed and
/// kept off the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub summary: String,
    pub done: bool,
}

impl Task {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            done: false,
        }
    }
}

impl ContentRecord for Task {
    const OBJECT_TYPE: &'static str = "task";

    fn stream_channel(&self) -> Option<String> {
        None
    }

    fn auto_follow(&self) -> bool {
        false
    }

    fn silent_creation(&self) -> bool {
        true
    }

    fn move_policy(&self) -> MovePolicy {
        MovePolicy::Enabled
    }

    fn manage_permission(&self) -> Option<PermissionRequirement> {
        None
    }
}

/// Unregistered family, for negative tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub body: String,
}

impl ContentRecord for Draft {
    const OBJECT_TYPE: &'static str = "draft";
}

/// An in-memory content service with its collaborators exposed.
#[derive(Clone)]
pub struct TestHarness {
    pub service: ContentService,
    pub store: MemoryContentStore,
    pub permissions: StaticPermissionResolver,
    pub containers: MemoryContainerRegistry,
    pub follows: MemoryFollowRegistry,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Harness with note, post (with announcement), and task registered.
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let types = ContentTypeRegistry::new();
        types
            .register::<Note>("Note", "Short text notes")
            .expect("register note");
        types
            .register::<Post>("Post", "Stream posts")
            .expect("register post");
        types
            .register::<Announcement>("Announcement", "Highlighted posts")
            .expect("register announcement");
        types
            .register::<Task>("Task", "Checklist items")
            .expect("register task");

        Self::with_types(types, MissingEnvelopePolicy::Report)
    }

    /// Harness over a caller-built registry.
    pub fn with_types(types: ContentTypeRegistry, policy: MissingEnvelopePolicy) -> Self {
        let store = MemoryContentStore::new();
        let permissions = StaticPermissionResolver::new();
        let containers = MemoryContainerRegistry::new();
        let follows = MemoryFollowRegistry::new();

        let service = ContentService::new(
            Arc::new(store.clone()),
            Arc::new(permissions.clone()),
            Arc::new(containers.clone()),
            Arc::new(follows.clone()),
            types,
            policy,
        );

        Self {
            service,
            store,
            permissions,
            containers,
            follows,
        }
    }

    /// Register a space where members may create every sample family.
    pub fn space(&self, name: &str) -> Container {
        let space = Container::space(name, None);
        self.containers.insert(space.clone());

        for family in ["note", "post", "task"] {
            self.permissions
                .grant_members(space.id, &Capability::CreateContent(family.to_string()));
        }

        space
    }

    /// A fresh authenticated user with no site-wide permissions.
    pub fn member(&self) -> UserContext {
        UserContext::authenticated(Uuid::now_v7(), Vec::new())
    }

    /// Allow `user` to publish public content in `container`.
    pub fn allow_public(&self, container: ContainerRef, user: &UserContext) {
        self.permissions
            .grant(container, user.id, &Capability::CreatePublicContent);
    }
}

/// Wrap a record placed in `container`.
pub fn in_space<T: ContentRecord>(
    record: T,
    container: &Container,
    visibility: Visibility,
) -> ContentBearing<T> {
    ContentBearing::in_container(record, container.id, Some(visibility))
}
