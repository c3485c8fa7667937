//! Content service.
//!
//! Persists content-bearing entities together with their envelopes. An
//! entity row and its envelope are written in one store transaction: the
//! envelope is validated first, the entity row is written to obtain its
//! identity, the envelope pointer is back-filled and the envelope is saved
//! before commit. Follow side effects run only after commit.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::config::MissingEnvelopePolicy;
use crate::container::{Container, ContainerRef, ContainerRegistry};
use crate::content::bearing::{BindingState, ContentBearing};
use crate::content::movable::{
    MOVE_DISABLED, MOVE_NOT_PERMITTED, MoveCheck, MoveOutcome, MovePolicy,
};
use crate::content::query::{PolymorphicQuery, QueryResults, hydrate, loads_as};
use crate::content::record::ContentRecord;
use crate::content::type_registry::ContentTypeRegistry;
use crate::error::{ContentError, ContentResult, ValidationErrors};
use crate::follow::{FollowRegistry, FollowTarget};
use crate::models::ContentEnvelope;
use crate::permissions::{Capability, PermissionResolver};
use crate::session::UserContext;
use crate::store::{ContentStore, StoreTransaction};

/// Service for content-bearing entities.
#[derive(Clone)]
pub struct ContentService {
    inner: Arc<ContentServiceInner>,
}

struct ContentServiceInner {
    store: Arc<dyn ContentStore>,
    permissions: Arc<dyn PermissionResolver>,
    containers: Arc<dyn ContainerRegistry>,
    follows: Arc<dyn FollowRegistry>,
    types: ContentTypeRegistry,
    missing_envelope_policy: MissingEnvelopePolicy,
}

impl ContentService {
    /// Create a new content service.
    pub fn new(
        store: Arc<dyn ContentStore>,
        permissions: Arc<dyn PermissionResolver>,
        containers: Arc<dyn ContainerRegistry>,
        follows: Arc<dyn FollowRegistry>,
        types: ContentTypeRegistry,
        missing_envelope_policy: MissingEnvelopePolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ContentServiceInner {
                store,
                permissions,
                containers,
                follows,
                types,
                missing_envelope_policy,
            }),
        }
    }

    pub fn store(&self) -> &dyn ContentStore {
        self.inner.store.as_ref()
    }

    pub fn permissions(&self) -> &dyn PermissionResolver {
        self.inner.permissions.as_ref()
    }

    pub fn types(&self) -> &ContentTypeRegistry {
        &self.inner.types
    }

    /// Resolve a container, failing when it does not exist.
    pub async fn resolve_container(&self, container: ContainerRef) -> ContentResult<Container> {
        self.inner
            .containers
            .resolve(container)
            .await?
            .ok_or_else(|| ContentError::configuration(format!("container {container} does not exist")))
    }

    /// Insert or update an entity and its envelope.
    ///
    /// On failure nothing is written and the entity keeps its previous
    /// identity and binding.
    pub async fn save<T: ContentRecord>(
        &self,
        entity: &mut ContentBearing<T>,
        actor: &UserContext,
    ) -> ContentResult<()> {
        if entity.binding_state() == BindingState::Deleted {
            return Err(ContentError::configuration(format!(
                "{} #{} was deleted and cannot be saved",
                T::OBJECT_TYPE,
                entity.id().unwrap_or_default()
            )));
        }

        if !self.inner.types.is_registered(T::OBJECT_TYPE) {
            return Err(ContentError::configuration(format!(
                "content type '{}' is not registered",
                T::OBJECT_TYPE
            )));
        }

        // A base-type view would drop the subtype's fields on write.
        if let Some(stored) = entity.stored_type()
            && stored != T::OBJECT_TYPE
        {
            return Err(ContentError::configuration(format!(
                "{} #{} is stored as {stored} and cannot be saved as {}",
                T::base_type(),
                entity.id().unwrap_or_default(),
                T::OBJECT_TYPE
            )));
        }

        let is_new = entity.is_new();
        let Some(container_ref) = entity.envelope_mut().container else {
            return Err(ContentError::configuration(format!(
                "could not save {} without a content container",
                T::OBJECT_TYPE
            )));
        };

        let mut errors = ValidationErrors::new();
        match self.inner.containers.resolve(container_ref).await? {
            None => errors.add("container", "Invalid content container given!"),
            Some(container) => {
                if is_new {
                    let capability = Capability::CreateContent(T::base_type().to_string());
                    if !self
                        .inner
                        .permissions
                        .can(actor, &container, &capability)
                        .await?
                    {
                        errors.add(
                            "container",
                            format!(
                                "You are not allowed to create {} here.",
                                entity.record().content_name()
                            ),
                        );
                    }
                }

                let envelope_errors = entity
                    .envelope()
                    .validate(actor, &container, self.inner.permissions.as_ref())
                    .await?;
                errors.merge(envelope_errors);
            }
        }

        if is_new && entity.owner().is_none() && actor.identity().is_none() {
            errors.add("created_by", "Content needs an author.");
        }

        if !errors.is_empty() {
            warn!(
                object_type = T::OBJECT_TYPE,
                errors = %errors,
                "content envelope failed validation"
            );
            return Err(ContentError::SaveAborted(errors));
        }

        let record_errors = entity.record().validate();
        if !record_errors.is_empty() {
            return Err(ContentError::Validation(record_errors));
        }

        let channel = entity.record().stream_channel();
        entity.envelope_mut().stream_channel = channel;

        let fields = serde_json::to_value(entity.record())
            .with_context(|| format!("failed to serialize {}", T::OBJECT_TYPE))?;

        // Work on a copy so a failed transaction leaves the entity untouched.
        let mut envelope = entity.envelope().clone();

        let mut tx = self.inner.store.begin().await?;
        let written = write_entity::<T>(tx.as_mut(), entity.id(), &fields, &mut envelope, actor).await;

        let id = match written {
            Ok(id) => id,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "failed to roll back content save");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        entity.link(id, envelope);

        if is_new {
            if entity.record().silent_creation() {
                debug!(object_type = T::base_type(), object_id = id, "content created silently");
            } else {
                info!(
                    object_type = T::base_type(),
                    concrete_type = T::OBJECT_TYPE,
                    object_id = id,
                    "content created"
                );
            }
        } else {
            info!(object_type = T::base_type(), object_id = id, "content updated");
        }

        if entity.record().auto_follow()
            && let Some(creator) = entity.owner()
        {
            let target = FollowTarget::new(T::base_type(), id);
            if let Err(e) = self.inner.follows.follow(creator, &target).await {
                warn!(
                    object_type = T::base_type(),
                    object_id = id,
                    user_id = %creator,
                    error = %e,
                    "failed to follow content"
                );
            }
        }

        Ok(())
    }

    /// Remove an entity row and its envelope in one transaction.
    ///
    /// A missing envelope does not fail the delete.
    pub async fn delete<T: ContentRecord>(
        &self,
        entity: &mut ContentBearing<T>,
        actor: &UserContext,
    ) -> ContentResult<()> {
        if entity.binding_state() == BindingState::Deleted {
            return Err(ContentError::configuration(format!(
                "{} was already deleted",
                T::OBJECT_TYPE
            )));
        }
        let Some(id) = entity.id() else {
            return Err(ContentError::configuration(format!(
                "cannot delete unsaved {}",
                T::OBJECT_TYPE
            )));
        };

        let mut tx = self.inner.store.begin().await?;
        let removed = self.remove_entity::<T>(tx.as_mut(), id).await;

        if let Err(e) = removed {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "failed to roll back content delete");
            }
            return Err(e);
        }
        tx.commit().await?;

        entity.mark_deleted();

        info!(
            object_type = T::base_type(),
            object_id = id,
            user_id = ?actor.identity(),
            "content deleted"
        );
        Ok(())
    }

    async fn remove_entity<T: ContentRecord>(
        &self,
        tx: &mut dyn StoreTransaction,
        id: i64,
    ) -> ContentResult<()> {
        let base = T::base_type();

        if !tx.delete_record(base, id).await? {
            debug!(object_type = %base, object_id = id, "entity row already gone");
        }

        match tx.find_envelope(base, id).await? {
            Some(envelope) => {
                tx.delete_envelope(envelope.id).await?;
            }
            None => match self.inner.missing_envelope_policy {
                MissingEnvelopePolicy::Report => {
                    warn!(object_type = %base, object_id = id, "deleted content had no envelope");
                }
                MissingEnvelopePolicy::Tolerate => {
                    debug!(object_type = %base, object_id = id, "deleted content had no envelope");
                }
            },
        }

        Ok(())
    }

    /// Load an entity by id within its family.
    ///
    /// Returns `None` when no row exists, or the row was saved as another
    /// concrete type and `T` is not the base type.
    pub async fn find<T: ContentRecord>(&self, id: i64) -> ContentResult<Option<ContentBearing<T>>> {
        let base = T::base_type();

        let Some(row) = self.inner.store.find_record(base, id).await? else {
            return Ok(None);
        };
        if !loads_as::<T>(&row) {
            return Ok(None);
        }

        let envelope = self.inner.store.find_envelope(base, id).await?;
        if envelope.is_none() {
            debug!(object_type = %base, object_id = id, "content loaded without envelope");
        }

        hydrate(row, envelope).map(Some)
    }

    /// Load an entity by id, failing when it does not exist.
    pub async fn load<T: ContentRecord>(&self, id: i64) -> ContentResult<ContentBearing<T>> {
        self.find(id).await?.ok_or(ContentError::NotFound)
    }

    /// Start a query over `T`'s family.
    pub fn query<T: ContentRecord>(&self) -> PolymorphicQuery<T> {
        PolymorphicQuery::new()
    }

    /// Run a query against this service's store.
    pub async fn fetch<T: ContentRecord>(
        &self,
        query: &PolymorphicQuery<T>,
    ) -> ContentResult<QueryResults<T>> {
        query.fetch(self.inner.store.as_ref()).await
    }

    /// Whether `actor` may move the entity into `target`.
    ///
    /// A denial is a value, never an error.
    pub async fn can_move<T: ContentRecord>(
        &self,
        entity: &ContentBearing<T>,
        target: &Container,
        actor: &UserContext,
    ) -> ContentResult<MoveCheck> {
        match entity.record().move_policy() {
            MovePolicy::Disabled => Ok(MoveCheck::denied(MOVE_DISABLED)),
            MovePolicy::Enabled => Ok(MoveCheck::Allowed),
            MovePolicy::Requires(requirement) => {
                let allowed = requirement
                    .evaluate(self.inner.permissions.as_ref(), actor, target)
                    .await?;
                if allowed {
                    Ok(MoveCheck::Allowed)
                } else {
                    Ok(MoveCheck::denied(MOVE_NOT_PERMITTED))
                }
            }
        }
    }

    /// Move the entity into `target`.
    ///
    /// Unless `force` is set the move must pass [`can_move`](Self::can_move).
    /// The envelope is persisted when the entity is linked, then the record's
    /// `after_move` hook runs.
    pub async fn move_entity<T: ContentRecord>(
        &self,
        entity: &mut ContentBearing<T>,
        target: &Container,
        force: bool,
        actor: &UserContext,
    ) -> ContentResult<MoveOutcome> {
        if entity.binding_state() == BindingState::Deleted {
            return Err(ContentError::configuration(format!(
                "{} #{} was deleted and cannot be moved",
                T::OBJECT_TYPE,
                entity.id().unwrap_or_default()
            )));
        }

        let check = if force {
            MoveCheck::Allowed
        } else {
            self.can_move(entity, target, actor).await?
        };

        let mut envelope = entity.envelope().clone();
        if let Err(denied) = envelope.move_to(target.id, force, &check) {
            debug!(object_type = T::base_type(), reason = %denied, "content move denied");
            return Ok(MoveOutcome::Denied(denied));
        }

        if entity.binding_state() == BindingState::Linked {
            envelope.updated_by = actor.identity();
            envelope.updated_at = chrono::Utc::now().timestamp();

            let mut tx = self.inner.store.begin().await?;
            if let Err(e) = tx.save_envelope(&envelope).await {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "failed to roll back content move");
                }
                return Err(e.into());
            }
            tx.commit().await?;
        }

        entity.replace_envelope(envelope);
        entity.record_mut().after_move(target, self).await?;

        info!(
            object_type = T::base_type(),
            object_id = ?entity.id(),
            container = %target.id,
            forced = force,
            "content moved"
        );
        Ok(MoveOutcome::Moved)
    }

    /// Whether `actor` may edit or delete the entity.
    ///
    /// Admins and the owner always may; others need the record's manage
    /// permission on the entity's container.
    pub async fn can_manage<T: ContentRecord>(
        &self,
        entity: &ContentBearing<T>,
        actor: &UserContext,
    ) -> ContentResult<bool> {
        if actor.is_admin() || entity.is_owner(Some(actor), actor) {
            return Ok(true);
        }

        let Some(requirement) = entity.record().manage_permission() else {
            return Ok(false);
        };
        let Some(container_ref) = entity.container() else {
            return Ok(false);
        };
        let Some(container) = self.inner.containers.resolve(container_ref).await? else {
            return Ok(false);
        };

        Ok(requirement
            .evaluate(self.inner.permissions.as_ref(), actor, &container)
            .await?)
    }
}

/// Write the entity row and its envelope inside `tx`, returning the id.
async fn write_entity<T: ContentRecord>(
    tx: &mut dyn StoreTransaction,
    id: Option<i64>,
    fields: &serde_json::Value,
    envelope: &mut ContentEnvelope,
    actor: &UserContext,
) -> ContentResult<i64> {
    let base = T::base_type();
    let now = chrono::Utc::now().timestamp();

    let id = match id {
        None => tx.insert_record(base, T::OBJECT_TYPE, fields).await?,
        Some(id) => {
            if !tx.update_record(base, id, fields).await? {
                return Err(ContentError::NotFound);
            }
            id
        }
    };

    // Loaded entities without an envelope get linked here as well.
    if !envelope.has_pointer() {
        envelope.declare_owner_type(base);
        envelope.object_id = Some(id);
    }
    if envelope.created_at == 0 {
        envelope.created_at = now;
    }
    if envelope.created_by.is_none() {
        envelope.created_by = actor.identity();
    }

    envelope.updated_by = actor.identity();
    envelope.updated_at = now;
    tx.save_envelope(envelope).await?;

    Ok(id)
}
