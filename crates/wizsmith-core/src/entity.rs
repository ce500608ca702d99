//! Host entity state.
//!
//! The bridge treats the host as a queryable registry of named entities
//! with a string state, key-value attributes and a last-change timestamp.
//! Snapshots are read fresh on every export cycle and never retained.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Point-in-time view of a single host entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Full entity id, `{domain}.{object_id}`.
    pub entity_id: String,
    pub domain: String,
    pub object_id: String,
    /// Current state rendered as a string (host convention).
    pub state: String,
    pub attributes: HashMap<String, Value>,
    pub last_changed: DateTime<Utc>,
}

impl EntitySnapshot {
    /// Build a snapshot from a full entity id like `sensor.temp`.
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Result<Self> {
        let entity_id = entity_id.into();
        let (domain, object_id) = entity_id
            .split_once('.')
            .filter(|(d, o)| !d.is_empty() && !o.is_empty())
            .ok_or_else(|| Error::InvalidEntityId(entity_id.clone()))?;

        Ok(Self {
            domain: domain.to_string(),
            object_id: object_id.to_string(),
            entity_id,
            state: state.into(),
            attributes: HashMap::new(),
            last_changed: Utc::now(),
        })
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_last_changed(mut self, at: DateTime<Utc>) -> Self {
        self.last_changed = at;
        self
    }
}

/// Read access to the host's entity state.
#[async_trait]
pub trait EntityRegistry: Send + Sync {
    /// Snapshot every known entity.
    async fn snapshot_all(&self) -> Vec<EntitySnapshot>;
}

/// In-memory registry backing the standalone agent and tests.
#[derive(Default)]
pub struct InMemoryRegistry {
    entities: RwLock<HashMap<String, EntitySnapshot>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert or replace an entity, keyed by its entity id.
    pub async fn upsert(&self, snapshot: EntitySnapshot) {
        self.entities
            .write()
            .await
            .insert(snapshot.entity_id.clone(), snapshot);
    }

    pub async fn remove(&self, entity_id: &str) -> Option<EntitySnapshot> {
        self.entities.write().await.remove(entity_id)
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

#[async_trait]
impl EntityRegistry for InMemoryRegistry {
    async fn snapshot_all(&self) -> Vec<EntitySnapshot> {
        self.entities.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_splits_into_domain_and_object() {
        let snapshot = EntitySnapshot::new("binary_sensor.front_door", "off").unwrap();
        assert_eq!(snapshot.domain, "binary_sensor");
        assert_eq!(snapshot.object_id, "front_door");
        assert_eq!(snapshot.entity_id, "binary_sensor.front_door");
    }

    #[test]
    fn malformed_entity_ids_are_rejected() {
        assert!(EntitySnapshot::new("nodomain", "on").is_err());
        assert!(EntitySnapshot::new(".object", "on").is_err());
        assert!(EntitySnapshot::new("domain.", "on").is_err());
    }

    #[tokio::test]
    async fn registry_upsert_replaces_by_entity_id() {
        let registry = InMemoryRegistry::new();
        registry
            .upsert(EntitySnapshot::new("sensor.temp", "20.1").unwrap())
            .await;
        registry
            .upsert(EntitySnapshot::new("sensor.temp", "21.5").unwrap())
            .await;

        let all = registry.snapshot_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state, "21.5");
    }
}
