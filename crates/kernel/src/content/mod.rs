//! Content-bearing entities.
//!
//! This module provides:
//! - ContentRecord: the trait entity families implement
//! - ContentBearing: an entity with its lazily created envelope
//! - ContentService: save, delete, load, move and manage checks
//! - PolymorphicQuery: envelope queries scoped to one family
//! - ContentTypeRegistry: the families allowed to persist

mod bearing;
pub mod labels;
pub mod movable;
mod query;
mod record;
mod service;
mod type_registry;

pub use bearing::{BindingState, ContentBearing};
pub use labels::{Label, LabelKind};
pub use movable::{MOVE_DISABLED, MOVE_NOT_PERMITTED, MoveCheck, MoveDenied, MoveOutcome, MovePolicy};
pub use query::{PolymorphicQuery, QueryResults};
pub use record::ContentRecord;
pub use service::ContentService;
pub use type_registry::{ContentFamily, ContentTypeRegistry};
