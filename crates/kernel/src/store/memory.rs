//! In-process content store.
//!
//! Transactions work on a private copy of the committed state and replay
//! their writes onto the shared state on commit, so other readers never see
//! uncommitted rows. Id allocation is not rolled back, matching a database
//! sequence.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{ContentStore, EnvelopeFilter, StoreTransaction, StoredRecord};
use crate::models::ContentEnvelope;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    records: HashMap<(String, i64), StoredRecord>,
    envelopes: HashMap<Uuid, ContentEnvelope>,
}

impl MemoryState {
    fn find_envelope(&self, object_type: &str, object_id: i64) -> Option<&ContentEnvelope> {
        self.envelopes.values().find(|e| {
            e.object_type.as_deref() == Some(object_type) && e.object_id == Some(object_id)
        })
    }

    fn check_envelope(&self, envelope: &ContentEnvelope) -> Result<()> {
        if envelope.container.is_none() {
            bail!("content envelope {} has no container", envelope.id);
        }

        if let (Some(object_type), Some(object_id)) =
            (envelope.object_type.as_deref(), envelope.object_id)
            && let Some(existing) = self.find_envelope(object_type, object_id)
            && existing.id != envelope.id
        {
            bail!("duplicate content envelope for {object_type} #{object_id}");
        }

        Ok(())
    }

    fn apply(&mut self, write: StagedWrite) {
        match write {
            StagedWrite::PutRecord(record) => {
                self.records
                    .insert((record.object_type.clone(), record.id), record);
            }
            StagedWrite::RemoveRecord(object_type, id) => {
                self.records.remove(&(object_type, id));
            }
            StagedWrite::PutEnvelope(envelope) => {
                self.envelopes.insert(envelope.id, envelope);
            }
            StagedWrite::RemoveEnvelope(id) => {
                self.envelopes.remove(&id);
            }
        }
    }
}

#[derive(Debug, Clone)]
enum StagedWrite {
    PutRecord(StoredRecord),
    RemoveRecord(String, i64),
    PutEnvelope(ContentEnvelope),
    RemoveEnvelope(Uuid),
}

/// Content store held in process memory.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    state: Mutex<MemoryState>,
    /// Last allocated id per family.
    sequences: Mutex<HashMap<String, i64>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed entity rows.
    pub fn record_count(&self) -> usize {
        self.inner.state.lock().records.len()
    }

    /// Number of committed envelopes.
    pub fn envelope_count(&self) -> usize {
        self.inner.state.lock().envelopes.len()
    }

    /// Write an envelope directly, bypassing transactions and checks.
    ///
    /// Lets tests and repair tooling set up inconsistent states.
    pub fn put_envelope_unchecked(&self, envelope: ContentEnvelope) {
        self.inner
            .state
            .lock()
            .envelopes
            .insert(envelope.id, envelope);
    }

    /// Remove an envelope directly, bypassing transactions.
    pub fn remove_envelope_unchecked(&self, id: Uuid) -> Option<ContentEnvelope> {
        self.inner.state.lock().envelopes.remove(&id)
    }

    fn next_id(&self, object_type: &str) -> i64 {
        let mut sequences = self.inner.sequences.lock();
        let last = sequences.entry(object_type.to_string()).or_insert(0);
        *last += 1;
        *last
    }
}

fn newest_first(envelopes: &mut [ContentEnvelope]) {
    envelopes.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let working = self.inner.state.lock().clone();
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            working,
            writes: Vec::new(),
        }))
    }

    async fn find_record(&self, object_type: &str, id: i64) -> Result<Option<StoredRecord>> {
        let state = self.inner.state.lock();
        Ok(state.records.get(&(object_type.to_string(), id)).cloned())
    }

    async fn find_records(&self, object_type: &str, ids: &[i64]) -> Result<Vec<StoredRecord>> {
        let state = self.inner.state.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.records.get(&(object_type.to_string(), *id)).cloned())
            .collect())
    }

    async fn find_envelope(
        &self,
        object_type: &str,
        object_id: i64,
    ) -> Result<Option<ContentEnvelope>> {
        let state = self.inner.state.lock();
        Ok(state.find_envelope(object_type, object_id).cloned())
    }

    async fn find_envelope_by_id(&self, id: Uuid) -> Result<Option<ContentEnvelope>> {
        Ok(self.inner.state.lock().envelopes.get(&id).cloned())
    }

    async fn query_envelopes(&self, filter: &EnvelopeFilter) -> Result<Vec<ContentEnvelope>> {
        let mut matched: Vec<ContentEnvelope> = {
            let state = self.inner.state.lock();
            state
                .envelopes
                .values()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect()
        };
        newest_first(&mut matched);

        let offset = usize::try_from(filter.offset).unwrap_or(usize::MAX);
        let limit = filter
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_envelopes(&self, filter: &EnvelopeFilter) -> Result<i64> {
        let state = self.inner.state.lock();
        let count = state.envelopes.values().filter(|e| filter.matches(e)).count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn dangling_envelopes(&self, object_type: Option<&str>) -> Result<Vec<ContentEnvelope>> {
        let mut dangling: Vec<ContentEnvelope> = {
            let state = self.inner.state.lock();
            state
                .envelopes
                .values()
                .filter(|e| object_type.is_none() || e.object_type.as_deref() == object_type)
                .filter(|e| match (&e.object_type, e.object_id) {
                    (Some(t), Some(id)) => !state.records.contains_key(&(t.clone(), id)),
                    _ => true,
                })
                .cloned()
                .collect()
        };
        newest_first(&mut dangling);
        Ok(dangling)
    }

    fn scheme(&self) -> &'static str {
        "memory"
    }
}

/// Transaction over a [`MemoryContentStore`].
struct MemoryTransaction {
    store: MemoryContentStore,
    working: MemoryState,
    writes: Vec<StagedWrite>,
}

impl MemoryTransaction {
    fn stage(&mut self, write: StagedWrite) {
        self.working.apply(write.clone());
        self.writes.push(write);
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_record(
        &mut self,
        object_type: &str,
        concrete_type: &str,
        fields: &serde_json::Value,
    ) -> Result<i64> {
        let id = self.store.next_id(object_type);
        let now = chrono::Utc::now().timestamp();

        self.stage(StagedWrite::PutRecord(StoredRecord {
            object_type: object_type.to_string(),
            id,
            concrete_type: concrete_type.to_string(),
            fields: fields.clone(),
            created: now,
            changed: now,
        }));

        Ok(id)
    }

    async fn update_record(
        &mut self,
        object_type: &str,
        id: i64,
        fields: &serde_json::Value,
    ) -> Result<bool> {
        let Some(current) = self.working.records.get(&(object_type.to_string(), id)) else {
            return Ok(false);
        };

        let updated = StoredRecord {
            fields: fields.clone(),
            changed: chrono::Utc::now().timestamp(),
            ..current.clone()
        };
        self.stage(StagedWrite::PutRecord(updated));
        Ok(true)
    }

    async fn delete_record(&mut self, object_type: &str, id: i64) -> Result<bool> {
        if !self
            .working
            .records
            .contains_key(&(object_type.to_string(), id))
        {
            return Ok(false);
        }

        self.stage(StagedWrite::RemoveRecord(object_type.to_string(), id));
        Ok(true)
    }

    async fn save_envelope(&mut self, envelope: &ContentEnvelope) -> Result<()> {
        self.working.check_envelope(envelope)?;
        self.stage(StagedWrite::PutEnvelope(envelope.clone()));
        Ok(())
    }

    async fn delete_envelope(&mut self, id: Uuid) -> Result<bool> {
        if !self.working.envelopes.contains_key(&id) {
            return Ok(false);
        }

        self.stage(StagedWrite::RemoveEnvelope(id));
        Ok(true)
    }

    async fn find_envelope(
        &mut self,
        object_type: &str,
        object_id: i64,
    ) -> Result<Option<ContentEnvelope>> {
        Ok(self.working.find_envelope(object_type, object_id).cloned())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { store, writes, .. } = *self;
        let mut state = store.inner.state.lock();
        let count = writes.len();

        // Replay onto the latest committed state, re-checking pointers against
        // rows committed since this transaction began.
        let mut next = state.clone();
        for write in writes {
            if let StagedWrite::PutEnvelope(envelope) = &write {
                next.check_envelope(envelope)?;
            }
            next.apply(write);
        }
        *state = next;

        debug!(writes = count, "memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!(writes = self.writes.len(), "memory transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::container::ContainerRef;

    fn linked_envelope(object_type: &str, object_id: i64) -> ContentEnvelope {
        let mut envelope = ContentEnvelope::new();
        envelope.container = Some(ContainerRef::new());
        envelope.declare_owner_type(object_type);
        envelope.object_id = Some(object_id);
        envelope
    }

    #[tokio::test]
    async fn ids_are_allocated_per_family() {
        let store = MemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();
        let fields = serde_json::json!({});

        assert_eq!(tx.insert_record("note", "note", &fields).await.unwrap(), 1);
        assert_eq!(tx.insert_record("note", "note", &fields).await.unwrap(), 2);
        assert_eq!(tx.insert_record("post", "post", &fields).await.unwrap(), 1);
        tx.commit().await.unwrap();

        assert_eq!(store.record_count(), 3);
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = MemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = tx
            .insert_record("note", "note", &serde_json::json!({"message": "hi"}))
            .await
            .unwrap();
        tx.save_envelope(&linked_envelope("note", id)).await.unwrap();

        assert!(store.find_record("note", id).await.unwrap().is_none());
        assert!(tx.find_envelope("note", id).await.unwrap().is_some());
        assert!(store.find_envelope("note", id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert!(store.find_record("note", id).await.unwrap().is_some());
        assert!(store.find_envelope("note", id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_keeps_concrete_type() {
        let store = MemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = tx
            .insert_record("post", "announcement", &serde_json::json!({"urgent": true}))
            .await
            .unwrap();
        assert!(tx
            .update_record("post", id, &serde_json::json!({"urgent": false}))
            .await
            .unwrap());
        assert!(!tx
            .update_record("post", id + 1, &serde_json::json!({}))
            .await
            .unwrap());
        tx.commit().await.unwrap();

        let row = store.find_record("post", id).await.unwrap().unwrap();
        assert_eq!(row.concrete_type, "announcement");
        assert_eq!(row.fields, serde_json::json!({"urgent": false}));
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = MemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_record("note", "note", &serde_json::json!({}))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn envelope_requires_container() {
        let store = MemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut envelope = linked_envelope("note", 1);
        envelope.container = None;

        assert!(tx.save_envelope(&envelope).await.is_err());
    }

    #[tokio::test]
    async fn pointer_is_unique() {
        let store = MemoryContentStore::new();
        store.put_envelope_unchecked(linked_envelope("note", 1));

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .save_envelope(&linked_envelope("note", 1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate content envelope"));

        // Same id in another family is fine.
        tx.save_envelope(&linked_envelope("post", 1)).await.unwrap();
    }

    #[tokio::test]
    async fn commit_rechecks_concurrent_pointer() {
        let store = MemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.save_envelope(&linked_envelope("note", 5)).await.unwrap();

        store.put_envelope_unchecked(linked_envelope("note", 5));
        assert!(tx.commit().await.is_err());
        assert_eq!(store.envelope_count(), 1);
    }

    #[tokio::test]
    async fn query_applies_offset_and_limit() {
        let store = MemoryContentStore::new();
        for id in 1..=5 {
            let mut envelope = linked_envelope("note", id);
            envelope.created_at = id;
            store.put_envelope_unchecked(envelope);
        }

        let mut filter = EnvelopeFilter::for_type("note");
        filter.offset = 1;
        filter.limit = Some(2);

        let found = store.query_envelopes(&filter).await.unwrap();
        let ids: Vec<_> = found.iter().filter_map(|e| e.object_id).collect();
        assert_eq!(ids, vec![4, 3]);
        assert_eq!(store.count_envelopes(&filter).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn dangling_envelopes_are_reported() {
        let store = MemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = tx
            .insert_record("note", "note", &serde_json::json!({}))
            .await
            .unwrap();
        tx.save_envelope(&linked_envelope("note", id)).await.unwrap();
        tx.commit().await.unwrap();

        let orphan = linked_envelope("note", 99);
        store.put_envelope_unchecked(orphan.clone());

        let dangling = store.dangling_envelopes(Some("note")).await.unwrap();
        assert_eq!(dangling, vec![orphan]);
        assert!(store.dangling_envelopes(Some("post")).await.unwrap().is_empty());
    }
}
