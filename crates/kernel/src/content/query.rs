//! Envelope queries scoped to one entity family.

use std::collections::HashMap;
use std::marker::PhantomData;

use anyhow::Context;
use uuid::Uuid;

use crate::container::ContainerRef;
use crate::content::bearing::ContentBearing;
use crate::content::record::ContentRecord;
use crate::error::ContentResult;
use crate::models::{ContentEnvelope, Visibility};
use crate::store::{ContentStore, EnvelopeFilter, StoredRecord, StreamFilter};

/// Whether a stored row can be loaded as `T`.
///
/// Rows load as their own concrete type, or as the family's base type. A
/// base-type view of a subtype row is read-only; see `ContentService::save`.
pub(crate) fn loads_as<T: ContentRecord>(row: &StoredRecord) -> bool {
    row.concrete_type == T::OBJECT_TYPE || T::OBJECT_TYPE == T::base_type()
}

/// Decode a stored row and attach its envelope.
pub(crate) fn hydrate<T: ContentRecord>(
    row: StoredRecord,
    envelope: Option<ContentEnvelope>,
) -> ContentResult<ContentBearing<T>> {
    let record: T = serde_json::from_value(row.fields).with_context(|| {
        format!(
            "failed to decode {} #{} as {}",
            row.object_type,
            row.id,
            T::OBJECT_TYPE
        )
    })?;

    Ok(ContentBearing::from_storage(
        row.id,
        row.concrete_type,
        record,
        envelope,
    ))
}

/// Entities returned by [`PolymorphicQuery::fetch`].
#[derive(Debug)]
pub struct QueryResults<T: ContentRecord> {
    /// Resolved entities in envelope order.
    pub entities: Vec<ContentBearing<T>>,
    /// Envelopes of the family whose entity row no longer exists.
    pub dangling: Vec<ContentEnvelope>,
}

impl<T: ContentRecord> QueryResults<T> {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Query over the envelopes of `T`'s family.
///
/// The `object_type = T::base_type()` condition is part of every query built
/// here and cannot be removed.
pub struct PolymorphicQuery<T: ContentRecord> {
    filter: EnvelopeFilter,
    marker: PhantomData<fn() -> T>,
}

impl<T: ContentRecord> Clone for PolymorphicQuery<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            marker: PhantomData,
        }
    }
}

impl<T: ContentRecord> Default for PolymorphicQuery<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ContentRecord> PolymorphicQuery<T> {
    pub fn new() -> Self {
        Self {
            filter: EnvelopeFilter::for_type(T::base_type()),
            marker: PhantomData,
        }
    }

    pub fn in_container(mut self, container: ContainerRef) -> Self {
        self.filter.container = Some(container);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.filter.visibility = Some(visibility);
        self
    }

    pub fn created_by(mut self, user_id: Uuid) -> Self {
        self.filter.created_by = Some(user_id);
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.filter.pinned = Some(pinned);
        self
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.filter.archived = Some(archived);
        self
    }

    /// Only envelopes surfaced on some stream channel.
    pub fn on_stream(mut self) -> Self {
        self.filter.stream = StreamFilter::Surfaced;
        self
    }

    pub fn in_channel(mut self, channel: impl Into<String>) -> Self {
        self.filter.stream = StreamFilter::Channel(channel.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.filter.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.filter.offset = offset;
        self
    }

    pub fn filter(&self) -> &EnvelopeFilter {
        &self.filter
    }

    /// Matching envelopes, newest first.
    pub async fn envelopes(&self, store: &dyn ContentStore) -> ContentResult<Vec<ContentEnvelope>> {
        Ok(store.query_envelopes(&self.filter).await?)
    }

    /// Number of matching envelopes, ignoring limit and offset.
    pub async fn count(&self, store: &dyn ContentStore) -> ContentResult<i64> {
        Ok(store.count_envelopes(&self.filter).await?)
    }

    /// Resolve matching envelopes to entities.
    ///
    /// Rows saved as another concrete type of the family are skipped unless
    /// `T` is the base type. Envelopes without a row land in `dangling`.
    pub async fn fetch(&self, store: &dyn ContentStore) -> ContentResult<QueryResults<T>> {
        let envelopes = self.envelopes(store).await?;

        let ids: Vec<i64> = envelopes.iter().filter_map(|e| e.object_id).collect();
        let mut rows: HashMap<i64, StoredRecord> = store
            .find_records(T::base_type(), &ids)
            .await?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();

        let mut entities = Vec::with_capacity(envelopes.len());
        let mut dangling = Vec::new();

        for envelope in envelopes {
            let Some(row) = envelope.object_id.and_then(|id| rows.remove(&id)) else {
                dangling.push(envelope);
                continue;
            };

            if !loads_as::<T>(&row) {
                continue;
            }

            entities.push(hydrate(row, Some(envelope))?);
        }

        Ok(QueryResults { entities, dangling })
    }
}
