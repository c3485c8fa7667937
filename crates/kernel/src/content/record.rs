//! The trait every content-bearing entity family implements.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::container::Container;
use crate::content::labels::Label;
use crate::content::movable::MovePolicy;
use crate::content::service::ContentService;
use crate::error::{ContentResult, ValidationErrors};
use crate::models::DEFAULT_STREAM_CHANNEL;
use crate::permissions::{Capability, PermissionRequirement};

/// Domain fields of a content-bearing entity.
///
/// Implementors carry only their own fields; the envelope binding, identity
/// and persistence are handled by [`ContentBearing`](super::ContentBearing)
/// and [`ContentService`]. Fields are stored as JSON, so they must
/// round-trip through serde.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Note { message: String }
///
/// impl ContentRecord for Note {
///     const OBJECT_TYPE: &'static str = "note";
/// }
/// ```
#[async_trait]
pub trait ContentRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Concrete type tag of this entity type.
    const OBJECT_TYPE: &'static str;

    /// Type tag the envelope is registered under.
    ///
    /// Several concrete types can share one family by returning the same
    /// base type. The tag is persisted, so changing it is a data migration.
    fn base_type() -> &'static str {
        Self::OBJECT_TYPE
    }

    /// Human-readable name of this content type.
    fn content_name(&self) -> String {
        Self::OBJECT_TYPE.to_string()
    }

    /// Icon used next to the content name label.
    fn icon(&self) -> Option<&'static str> {
        None
    }

    /// Short text preview of this particular record.
    fn description(&self) -> String {
        String::new()
    }

    /// Stream channel the envelope is published on; `None` keeps it off feeds.
    fn stream_channel(&self) -> Option<String> {
        Some(DEFAULT_STREAM_CHANNEL.to_string())
    }

    /// Whether the creator follows the record once saved.
    fn auto_follow(&self) -> bool {
        true
    }

    /// Suppress the creation event for sub-content not worth announcing.
    fn silent_creation(&self) -> bool {
        false
    }

    fn move_policy(&self) -> MovePolicy {
        MovePolicy::Disabled
    }

    /// Extra permission that lets non-owners manage the record.
    fn manage_permission(&self) -> Option<PermissionRequirement> {
        Some(PermissionRequirement::Capability(Capability::ManageContent))
    }

    /// Domain field validation, run after the envelope validated.
    fn validate(&self) -> ValidationErrors {
        ValidationErrors::new()
    }

    /// Labels contributed by the family, merged into the sorted label list.
    fn extra_labels(&self) -> Vec<Label> {
        Vec::new()
    }

    /// Called after the envelope moved. Families with owned sub-content move
    /// it here.
    async fn after_move(
        &mut self,
        _target: &Container,
        _service: &ContentService,
    ) -> ContentResult<()> {
        Ok(())
    }
}
