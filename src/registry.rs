//! Registry of trusted IdPs keyed by entity ID.
//!
//! Besides the map, the registry tracks a *primary* descriptor for callers
//! that only understand a single IdP. The primary is always the entity most
//! recently added, whatever else the map holds: adding a second IdP keeps the
//! first one registered but moves the primary to the newcomer. Older call
//! sites depend on that behavior, so it must not become "first registered
//! wins".

use std::{collections::HashMap, sync::Arc};

use samael::metadata::EntityDescriptor;

use crate::metadata::{self, MetadataError};

/// Trusted IdP metadata, keyed by entity ID.
#[derive(Debug, Clone, Default)]
pub struct IdpRegistry {
    /// Map of entity_id -> EntityDescriptor
    entries: HashMap<String, Arc<EntityDescriptor>>,
    /// Most recently added descriptor (or the configured initial one)
    primary: Option<Arc<EntityDescriptor>>,
}

impl IdpRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry whose primary descriptor is pre-set.
    ///
    /// The seed is not added to the map.
    pub fn with_primary(primary: Option<EntityDescriptor>) -> Self {
        Self {
            entries: HashMap::new(),
            primary: primary.map(Arc::new),
        }
    }

    /// Register an IdP, replacing any previous entry with the same entity ID,
    /// and make it the primary descriptor.
    ///
    /// Returns the descriptor previously stored under that entity ID.
    pub fn insert(
        &mut self,
        descriptor: EntityDescriptor,
    ) -> Result<Option<Arc<EntityDescriptor>>, MetadataError> {
        let entity_id = metadata::entity_id(&descriptor)
            .ok_or(MetadataError::MissingEntityId)?
            .to_owned();

        let descriptor = Arc::new(descriptor);
        self.primary = Some(Arc::clone(&descriptor));
        Ok(self.entries.insert(entity_id, descriptor))
    }

    /// Look up an IdP by entity ID.
    pub fn get(&self, entity_id: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entries.get(entity_id)
    }

    /// Check whether an entity ID is registered.
    pub fn contains(&self, entity_id: &str) -> bool {
        self.entries.contains_key(entity_id)
    }

    /// The most recently added descriptor.
    pub fn primary(&self) -> Option<&Arc<EntityDescriptor>> {
        self.primary.as_ref()
    }

    /// List all registered entity IDs (unordered).
    pub fn entity_ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Registered IdPs as `(entity ID, descriptor)` pairs, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<EntityDescriptor>)> {
        self.entries.iter().map(|(id, d)| (id.as_str(), d))
    }

    /// Get the number of registered IdPs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
