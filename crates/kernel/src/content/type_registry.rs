//! Content type registry.
//!
//! Tracks the entity families the service may persist. A family is keyed by
//! its base type; several concrete types may register into the same family.

use std::sync::Arc;

use anyhow::{Result, bail};
use dashmap::DashMap;
use serde::Serialize;
use tracing::info;

use crate::content::record::ContentRecord;

/// A registered family of content-bearing entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentFamily {
    /// Base type tag stored on envelopes.
    pub object_type: String,
    pub label: String,
    pub description: String,
    /// Concrete types registered into this family.
    pub concrete_types: Vec<String>,
}

/// Registry of content families.
#[derive(Clone, Default)]
pub struct ContentTypeRegistry {
    inner: Arc<ContentTypeRegistryInner>,
}

#[derive(Default)]
struct ContentTypeRegistryInner {
    families: DashMap<String, ContentFamily>,
    /// Concrete type -> base type.
    concrete: DashMap<String, String>,
}

impl ContentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concrete type under its family.
    ///
    /// The first registration of a family sets its label and description.
    /// Registering a concrete type under a second base type fails.
    pub fn register<T: ContentRecord>(&self, label: &str, description: &str) -> Result<()> {
        let concrete = T::OBJECT_TYPE;
        let base = T::base_type();

        if let Some(existing) = self.inner.concrete.get(concrete)
            && existing.value() != base
        {
            bail!(
                "content type '{concrete}' is already registered under '{}', not '{base}'",
                existing.value()
            );
        }

        let mut family = self
            .inner
            .families
            .entry(base.to_string())
            .or_insert_with(|| ContentFamily {
                object_type: base.to_string(),
                label: label.to_string(),
                description: description.to_string(),
                concrete_types: Vec::new(),
            });

        if !family.concrete_types.iter().any(|t| t == concrete) {
            family.concrete_types.push(concrete.to_string());
        }
        drop(family);

        self.inner
            .concrete
            .insert(concrete.to_string(), base.to_string());

        info!(object_type = %base, concrete_type = %concrete, "registered content type");
        Ok(())
    }

    /// Get a family by base type.
    pub fn get(&self, object_type: &str) -> Option<ContentFamily> {
        self.inner.families.get(object_type).map(|r| r.clone())
    }

    /// Check if a family is registered under this base type.
    pub fn exists(&self, object_type: &str) -> bool {
        self.inner.families.contains_key(object_type)
    }

    /// Whether this concrete type was registered.
    pub fn is_registered(&self, concrete_type: &str) -> bool {
        self.inner.concrete.contains_key(concrete_type)
    }

    /// Base type a concrete type was registered under.
    pub fn family_of(&self, concrete_type: &str) -> Option<String> {
        self.inner.concrete.get(concrete_type).map(|r| r.clone())
    }

    /// List all families, ordered by base type.
    pub fn list(&self) -> Vec<ContentFamily> {
        let mut families: Vec<_> = self
            .inner
            .families
            .iter()
            .map(|r| r.value().clone())
            .collect();
        families.sort_by(|a, b| a.object_type.cmp(&b.object_type));
        families
    }

    /// List family base type names.
    pub fn type_names(&self) -> Vec<String> {
        self.list().into_iter().map(|f| f.object_type).collect()
    }

    /// Get the number of registered families.
    pub fn len(&self) -> usize {
        self.inner.families.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.families.is_empty()
    }
}
