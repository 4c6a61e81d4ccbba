use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};

use crate::{any::Instance, metadata::ComponentMetadata};

/// Name to component map shared by a container. Entries are never removed.
#[derive(Default)]
pub struct InstanceStore {
    entries: RwLock<BTreeMap<String, Arc<ComponentMetadata>>>,
}

impl InstanceStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ComponentMetadata>> {
        self.entries.read().get(name).cloned()
    }

    /// Realized instance stored under `name`.
    #[must_use]
    pub fn get_instance(&self, name: &str) -> Option<Instance> {
        self.entries.read().get(name).and_then(|metadata| metadata.instance())
    }

    /// Stores `metadata` under `name`, replacing the previous entry.
    pub fn set(&self, name: impl Into<String>, metadata: Arc<ComponentMetadata>) -> Option<Arc<ComponentMetadata>> {
        self.entries.write().insert(name.into(), metadata)
    }

    /// Stores `metadata` under `name` unless the name is taken, and returns the winning entry.
    pub fn get_or_insert(&self, name: impl Into<String>, metadata: Arc<ComponentMetadata>) -> Arc<ComponentMetadata> {
        self.entries.write().entry(name.into()).or_insert(metadata).clone()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Snapshot of every entry, ordered by name.
    #[must_use]
    pub fn items(&self) -> Vec<(String, Arc<ComponentMetadata>)> {
        self.entries
            .read()
            .iter()
            .map(|(name, metadata)| (name.clone(), metadata.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Every realized instance usable as `Cap`, each component reported once even when stored under several names.
    #[must_use]
    pub fn list_by_capability<Cap>(&self) -> Vec<Arc<Cap>>
    where
        Cap: ?Sized + Send + Sync + 'static,
    {
        let entries = self.entries.read();
        let mut seen: Vec<&Arc<ComponentMetadata>> = Vec::new();
        let mut list = Vec::new();

        for metadata in entries.values() {
            if seen.iter().any(|other| Arc::ptr_eq(other, metadata)) {
                continue;
            }
            seen.push(metadata);

            if let Some(value) = metadata.cast::<Cap>() {
                list.push(value);
            }
        }
        list
    }
}
