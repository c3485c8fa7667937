//! Capability checks against containers.
//!
//! The kernel asks a [`PermissionResolver`] whether an actor holds a
//! capability within a container. How capabilities are granted (roles, group
//! membership, space settings) is up to the resolver.
//!
//! Entity families describe their extra requirements (moving, managing) as a
//! [`PermissionRequirement`], which is evaluated through one uniform call.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::container::{Container, ContainerRef};
use crate::session::UserContext;

/// A capability token checked against a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Capability {
    /// Create content visible outside the container.
    CreatePublicContent,
    /// Create content of the given family.
    CreateContent(String),
    /// Edit, move, or delete other users' content.
    ManageContent,
    /// Any other named capability.
    Named(String),
}

impl Capability {
    /// The token string resolvers key their grants on.
    pub fn token(&self) -> String {
        match self {
            Self::CreatePublicContent => "create public content".to_string(),
            Self::CreateContent(family) => format!("create {family} content"),
            Self::ManageContent => "manage content".to_string(),
            Self::Named(name) => name.clone(),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Answers capability checks for an actor within a container.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn can(
        &self,
        actor: &UserContext,
        container: &Container,
        capability: &Capability,
    ) -> Result<bool>;
}

/// Custom check supplied by an entity family.
pub type PermissionPredicate = Arc<dyn Fn(&UserContext, &Container) -> bool + Send + Sync>;

/// Structured rules that need no custom code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionRule {
    /// The actor owns the container.
    ContainerOwner,
    /// The actor holds every listed capability.
    AllOf(Vec<Capability>),
    /// The actor holds at least one listed capability.
    AnyOf(Vec<Capability>),
}

/// An extra permission an entity family requires for an operation.
#[derive(Clone)]
pub enum PermissionRequirement {
    Capability(Capability),
    Predicate(PermissionPredicate),
    Rule(PermissionRule),
}

impl PermissionRequirement {
    pub fn capability(capability: Capability) -> Self {
        Self::Capability(capability)
    }

    pub fn predicate<F>(check: F) -> Self
    where
        F: Fn(&UserContext, &Container) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(check))
    }

    /// Evaluate the requirement for an actor on a container.
    pub async fn evaluate(
        &self,
        resolver: &dyn PermissionResolver,
        actor: &UserContext,
        container: &Container,
    ) -> Result<bool> {
        match self {
            Self::Capability(capability) => resolver.can(actor, container, capability).await,
            Self::Predicate(check) => Ok(check(actor, container)),
            Self::Rule(PermissionRule::ContainerOwner) => {
                Ok(actor.authenticated && container.is_owned_by(actor.id))
            }
            Self::Rule(PermissionRule::AllOf(capabilities)) => {
                for capability in capabilities {
                    if !resolver.can(actor, container, capability).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Rule(PermissionRule::AnyOf(capabilities)) => {
                for capability in capabilities {
                    if resolver.can(actor, container, capability).await? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl fmt::Debug for PermissionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capability(capability) => f.debug_tuple("Capability").field(capability).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Rule(rule) => f.debug_tuple("Rule").field(rule).finish(),
        }
    }
}

/// Grant table resolver with DashMap-based lookups.
///
/// - Admin users are granted everything.
/// - Container owners are granted everything within their container.
/// - Otherwise a capability must be granted to the user in that container,
///   or to every authenticated member of the container.
#[derive(Clone, Default)]
pub struct StaticPermissionResolver {
    inner: Arc<StaticPermissionResolverInner>,
}

#[derive(Default)]
struct StaticPermissionResolverInner {
    /// (container, user) -> capability tokens.
    user_grants: DashMap<(ContainerRef, Uuid), HashSet<String>>,

    /// container -> tokens granted to all authenticated users.
    member_grants: DashMap<ContainerRef, HashSet<String>>,
}

impl StaticPermissionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a capability to one user within a container.
    pub fn grant(&self, container: ContainerRef, user_id: Uuid, capability: &Capability) {
        self.inner
            .user_grants
            .entry((container, user_id))
            .or_default()
            .insert(capability.token());
    }

    /// Grant a capability to every authenticated user within a container.
    pub fn grant_members(&self, container: ContainerRef, capability: &Capability) {
        self.inner
            .member_grants
            .entry(container)
            .or_default()
            .insert(capability.token());
    }

    /// Revoke a capability previously granted to one user.
    pub fn revoke(&self, container: ContainerRef, user_id: Uuid, capability: &Capability) {
        if let Some(mut grants) = self.inner.user_grants.get_mut(&(container, user_id)) {
            grants.remove(&capability.token());
        }
    }

    /// Revoke a capability previously granted to all members.
    pub fn revoke_members(&self, container: ContainerRef, capability: &Capability) {
        if let Some(mut grants) = self.inner.member_grants.get_mut(&container) {
            grants.remove(&capability.token());
        }
    }

    /// Drop every grant.
    pub fn clear(&self) {
        self.inner.user_grants.clear();
        self.inner.member_grants.clear();
    }
}

#[async_trait]
impl PermissionResolver for StaticPermissionResolver {
    async fn can(
        &self,
        actor: &UserContext,
        container: &Container,
        capability: &Capability,
    ) -> Result<bool> {
        if actor.is_admin() {
            return Ok(true);
        }

        if !actor.authenticated {
            return Ok(false);
        }

        if container.is_owned_by(actor.id) {
            return Ok(true);
        }

        let token = capability.token();

        if let Some(grants) = self.inner.user_grants.get(&(container.id, actor.id))
            && grants.contains(&token)
        {
            return Ok(true);
        }

        Ok(self
            .inner
            .member_grants
            .get(&container.id)
            .is_some_and(|grants| grants.contains(&token)))
    }
}
