//! A content-bearing entity and its envelope binding.

use serde::Serialize;
use uuid::Uuid;

use crate::container::ContainerRef;
use crate::content::labels::{
    ARCHIVED_SORT_ORDER, CONTENT_NAME_SORT_ORDER, Label, PINNED_SORT_ORDER, PUBLIC_SORT_ORDER,
    sort_labels,
};
use crate::content::record::ContentRecord;
use crate::models::{ContentEnvelope, Visibility};
use crate::session::UserContext;

/// Where an entity stands with respect to its envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingState {
    /// No envelope in memory yet.
    Unbound,
    /// Envelope created or loaded in memory, not yet linked by identity.
    Materialized,
    /// Pointer set and both rows persisted.
    Linked,
    /// Both rows removed.
    Deleted,
}

/// A domain record together with its identity and envelope.
///
/// Once an envelope is held it is never replaced by a fresh or re-fetched
/// one, so assignments made before the first save survive the insert.
#[derive(Debug, Clone)]
pub struct ContentBearing<T: ContentRecord> {
    id: Option<i64>,
    record: T,
    /// Concrete type of the persisted row, when there is one.
    stored_type: Option<String>,
    state: BindingState,
    envelope: Option<ContentEnvelope>,
}

impl<T: ContentRecord> ContentBearing<T> {
    /// Wrap a new, unsaved record.
    pub fn new(record: T) -> Self {
        Self {
            id: None,
            record,
            stored_type: None,
            state: BindingState::Unbound,
            envelope: None,
        }
    }

    /// Wrap a new record already placed in a container.
    pub fn in_container(record: T, container: ContainerRef, visibility: Option<Visibility>) -> Self {
        let mut entity = Self::new(record);
        entity.set_container(container);
        if let Some(visibility) = visibility {
            entity.set_visibility(visibility);
        }
        entity
    }

    /// Rebuild a loaded entity. A missing envelope leaves it unbound.
    pub(crate) fn from_storage(
        id: i64,
        stored_type: String,
        record: T,
        envelope: Option<ContentEnvelope>,
    ) -> Self {
        let state = if envelope.is_some() {
            BindingState::Linked
        } else {
            BindingState::Unbound
        };

        Self {
            id: Some(id),
            record,
            stored_type: Some(stored_type),
            state,
            envelope,
        }
    }

    /// Identity within the family, `None` until first saved.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn record(&self) -> &T {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut T {
        &mut self.record
    }

    pub fn into_record(self) -> T {
        self.record
    }

    /// Concrete type tag.
    pub fn object_type(&self) -> &'static str {
        T::OBJECT_TYPE
    }

    /// Declared base type the envelope is tagged with.
    pub fn base_type(&self) -> &'static str {
        T::base_type()
    }

    /// Concrete type the persisted row was written as. A base-type view of a
    /// subtype row reports the subtype here.
    pub fn stored_type(&self) -> Option<&str> {
        self.stored_type.as_deref()
    }

    pub fn binding_state(&self) -> BindingState {
        self.state
    }

    /// The envelope, created in memory on first access.
    ///
    /// Repeated calls return the same cached instance.
    pub fn envelope(&mut self) -> &ContentEnvelope {
        self.envelope_mut()
    }

    /// Mutable access to the envelope, created in memory on first access.
    pub fn envelope_mut(&mut self) -> &mut ContentEnvelope {
        if self.state == BindingState::Unbound {
            self.state = BindingState::Materialized;
        }

        let record = &self.record;
        self.envelope.get_or_insert_with(|| {
            let mut envelope = ContentEnvelope::new();
            envelope.stream_channel = record.stream_channel();
            envelope
        })
    }

    /// The envelope if one is held, without materializing.
    pub fn peek_envelope(&self) -> Option<&ContentEnvelope> {
        self.envelope.as_ref()
    }

    pub fn title(&self) -> Option<&str> {
        self.peek_envelope().and_then(|e| e.title.as_deref())
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.envelope_mut().title = Some(title.into());
    }

    /// Current visibility. An unbound entity reports the default a fresh
    /// envelope would get; an out-of-range raw value reports `None`.
    pub fn visibility(&self) -> Option<Visibility> {
        match self.peek_envelope() {
            Some(envelope) => envelope.visibility(),
            None => Some(Visibility::Private),
        }
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.envelope_mut().set_visibility(visibility);
    }

    pub fn container(&self) -> Option<ContainerRef> {
        self.peek_envelope().and_then(|e| e.container)
    }

    pub fn set_container(&mut self, container: ContainerRef) {
        self.envelope_mut().container = Some(container);
    }

    /// The creator recorded on the envelope.
    pub fn owner(&self) -> Option<Uuid> {
        self.peek_envelope().and_then(|e| e.created_by)
    }

    /// Whether `actor` (or, without one, the session user) created this content.
    ///
    /// A guest session without an explicit actor is never the owner.
    pub fn is_owner(&self, actor: Option<&UserContext>, session: &UserContext) -> bool {
        let identity = match actor {
            Some(actor) => actor.identity(),
            None => session.identity(),
        };

        match (identity, self.owner()) {
            (Some(user), Some(owner)) => user == owner,
            _ => false,
        }
    }

    /// Labels for presentation, sorted by ascending sort order.
    pub fn labels(&self, topics: &[String]) -> Vec<Label> {
        let mut labels = Vec::new();

        if let Some(envelope) = self.peek_envelope() {
            if envelope.is_pinned() {
                labels.push(
                    Label::danger("Pinned")
                        .icon("fa-map-pin")
                        .sort_order(PINNED_SORT_ORDER),
                );
            }

            if envelope.is_archived() {
                labels.push(
                    Label::warning("Archived")
                        .icon("fa-archive")
                        .sort_order(ARCHIVED_SORT_ORDER),
                );
            }

            if envelope.is_public() {
                labels.push(
                    Label::info("Public")
                        .icon("fa-globe")
                        .sort_order(PUBLIC_SORT_ORDER),
                );
            }
        }

        let mut name = Label::default_type(self.record.content_name()).sort_order(CONTENT_NAME_SORT_ORDER);
        if let Some(icon) = self.record.icon() {
            name = name.icon(icon);
        }
        labels.push(name);

        labels.extend(self.record.extra_labels());
        labels.extend(topics.iter().map(Label::topic));

        sort_labels(labels)
    }

    /// Record the identity and persisted envelope after a committed insert or
    /// update.
    pub(crate) fn link(&mut self, id: i64, envelope: ContentEnvelope) {
        self.id = Some(id);
        self.stored_type.get_or_insert_with(|| T::OBJECT_TYPE.to_string());
        self.state = BindingState::Linked;
        self.envelope = Some(envelope);
    }

    /// Replace the held envelope after a committed change, keeping the state.
    pub(crate) fn replace_envelope(&mut self, envelope: ContentEnvelope) {
        if self.state == BindingState::Unbound {
            self.state = BindingState::Materialized;
        }
        self.envelope = Some(envelope);
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.state = BindingState::Deleted;
    }
}
