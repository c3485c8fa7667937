//! Persistence for entity rows and envelopes.
//!
//! Provides the [`ContentStore`] trait and two implementations: PostgreSQL
//! for deployments and an in-process store with the same transactional
//! behavior for tests and embedding.
//!
//! Entity rows are kept generically: one table keyed by
//! `(object_type, id)` with the record's fields as JSON. Ids are allocated per
//! family, so the same id appears in many families and every lookup must carry
//! the type tag.

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryContentStore;
pub use postgres::PgContentStore;

use crate::container::ContainerRef;
use crate::models::{ContentEnvelope, Visibility};

/// A persisted entity row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredRecord {
    /// Declared base type; together with `id` the row's identity.
    pub object_type: String,
    pub id: i64,
    /// Runtime type the row was saved as.
    pub concrete_type: String,
    pub fields: serde_json::Value,
    /// Unix timestamp when created.
    pub created: i64,
    /// Unix timestamp when last changed.
    pub changed: i64,
}

/// Stream channel condition of an envelope query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StreamFilter {
    #[default]
    Any,
    /// Only envelopes with some channel set.
    Surfaced,
    Channel(String),
}

/// Conditions for an envelope query.
///
/// Always scoped to one object type; there is no way to build an unscoped
/// filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeFilter {
    object_type: String,
    pub container: Option<ContainerRef>,
    pub visibility: Option<Visibility>,
    pub created_by: Option<Uuid>,
    pub pinned: Option<bool>,
    pub archived: Option<bool>,
    pub stream: StreamFilter,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl EnvelopeFilter {
    pub fn for_type(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            container: None,
            visibility: None,
            created_by: None,
            pinned: None,
            archived: None,
            stream: StreamFilter::Any,
            limit: None,
            offset: 0,
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Whether an envelope satisfies every condition (ignores limit/offset).
    pub fn matches(&self, envelope: &ContentEnvelope) -> bool {
        if envelope.object_type.as_deref() != Some(self.object_type.as_str()) {
            return false;
        }
        if let Some(container) = self.container
            && envelope.container != Some(container)
        {
            return false;
        }
        if let Some(visibility) = self.visibility
            && envelope.visibility != visibility.as_i16()
        {
            return false;
        }
        if let Some(created_by) = self.created_by
            && envelope.created_by != Some(created_by)
        {
            return false;
        }
        if let Some(pinned) = self.pinned
            && envelope.pinned != pinned
        {
            return false;
        }
        if let Some(archived) = self.archived
            && envelope.archived != archived
        {
            return false;
        }
        match &self.stream {
            StreamFilter::Any => true,
            StreamFilter::Surfaced => envelope.stream_channel.is_some(),
            StreamFilter::Channel(channel) => {
                envelope.stream_channel.as_deref() == Some(channel.as_str())
            }
        }
    }
}

/// Writes performed as one unit. Nothing is visible to other readers until
/// [`commit`](StoreTransaction::commit).
#[async_trait]
pub trait StoreTransaction: Send {
    /// Insert an entity row, allocating the next id of the family.
    async fn insert_record(
        &mut self,
        object_type: &str,
        concrete_type: &str,
        fields: &serde_json::Value,
    ) -> Result<i64>;

    /// Replace an entity row's fields, keeping its concrete type. Returns
    /// false when the row does not exist.
    async fn update_record(
        &mut self,
        object_type: &str,
        id: i64,
        fields: &serde_json::Value,
    ) -> Result<bool>;

    async fn delete_record(&mut self, object_type: &str, id: i64) -> Result<bool>;

    /// Insert or update an envelope by its id.
    ///
    /// Fails when the container is unset or another envelope already holds
    /// the same pointer.
    async fn save_envelope(&mut self, envelope: &ContentEnvelope) -> Result<()>;

    async fn delete_envelope(&mut self, id: Uuid) -> Result<bool>;

    /// Envelope lookup that sees this transaction's own writes.
    async fn find_envelope(
        &mut self,
        object_type: &str,
        object_id: i64,
    ) -> Result<Option<ContentEnvelope>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Content persistence backend.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    async fn find_record(&self, object_type: &str, id: i64) -> Result<Option<StoredRecord>>;

    /// Rows of one family for the given ids, in no particular order.
    async fn find_records(&self, object_type: &str, ids: &[i64]) -> Result<Vec<StoredRecord>>;

    async fn find_envelope(
        &self,
        object_type: &str,
        object_id: i64,
    ) -> Result<Option<ContentEnvelope>>;

    async fn find_envelope_by_id(&self, id: Uuid) -> Result<Option<ContentEnvelope>>;

    /// Envelopes matching the filter, newest first.
    async fn query_envelopes(&self, filter: &EnvelopeFilter) -> Result<Vec<ContentEnvelope>>;

    /// Number of matching envelopes, ignoring limit and offset.
    async fn count_envelopes(&self, filter: &EnvelopeFilter) -> Result<i64>;

    /// Envelopes whose pointer does not resolve to an entity row.
    async fn dangling_envelopes(&self, object_type: Option<&str>) -> Result<Vec<ContentEnvelope>>;

    /// Get the storage scheme (e.g., "postgres", "memory").
    fn scheme(&self) -> &'static str;
}
