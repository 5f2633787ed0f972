use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

use crate::error::{BridgeError, Result};
use crate::models::EngineEntityId;
use crate::store::MappingStore;

/// In-memory index of workflow id to engine entity id.
///
/// Written by the background entity-link jobs and read by handoff and
/// recovery. The mapping store stays the source of truth; [`rehydrate`]
/// rebuilds this index from it.
///
/// [`rehydrate`]: EntityMapCache::rehydrate
#[derive(Debug, Default)]
pub struct EntityMapCache {
    entries: RwLock<HashMap<String, EngineEntityId>>,
}

impl EntityMapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entity id. Re-recording the same id is a no-op; a different
    /// id for a known workflow is refused.
    pub fn record(&self, workflow_id: &str, entity_id: EngineEntityId) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get(workflow_id) {
            Some(existing) if *existing != entity_id => Err(BridgeError::EntityConflict {
                workflow_id: workflow_id.to_string(),
                existing: *existing,
                requested: entity_id,
            }),
            Some(_) => Ok(()),
            None => {
                entries.insert(workflow_id.to_string(), entity_id);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, workflow_id: &str) -> Option<EngineEntityId> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(workflow_id)
            .copied()
    }

    /// Load every persisted entity mapping. Returns the number of entries loaded.
    pub async fn rehydrate(&self, store: &MappingStore) -> Result<usize> {
        let mappings = store.list_entity_mappings().await?;
        let loaded = mappings.len();

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.extend(mappings);
        drop(entries);

        info!(entries = loaded, "Rehydrated engine entity cache");
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
