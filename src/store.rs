//! The authoritative synchronized store.
//!
//! Three keyed collections (events, markets, contracts) with
//! get-or-create-then-merge upserts and cascading removes. Every mutation
//! is followed by a durable snapshot write; a refused write is logged and
//! swallowed, leaving the in-memory state authoritative for the rest of
//! the process lifetime.
//!
//! The store is not reentrant-safe against overlapping writers; the hub
//! worker is the single serialization point.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::entity::{
    Contract, ContractKey, Entity, EntityKey, EntityKind, Event, Market, MarketKey,
};
use crate::error::{SyncResult, ValidationError};
use crate::storage::{codec, SnapshotBackend, SnapshotKey};

/// The single authoritative, durable, keyed collection of entities.
pub struct SyncStore {
    events: BTreeMap<String, Event>,
    markets: BTreeMap<MarketKey, Market>,
    contracts: BTreeMap<ContractKey, Contract>,
    backend: Arc<dyn SnapshotBackend>,
}

impl std::fmt::Debug for SyncStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStore")
            .field("events", &self.events.len())
            .field("markets", &self.markets.len())
            .field("contracts", &self.contracts.len())
            .finish_non_exhaustive()
    }
}

fn load_entry<T: DeserializeOwned>(backend: &dyn SnapshotBackend, key: SnapshotKey) -> Vec<T> {
    let bytes = match backend.get(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(entry = %key, error = %e, "failed to read snapshot entry, starting empty");
            return Vec::new();
        }
    };

    match codec::decode(&bytes) {
        Ok(records) => records,
        Err(e) => {
            warn!(entry = %key, error = %e, "snapshot entry unusable, starting empty");
            Vec::new()
        }
    }
}

impl SyncStore {
    /// Opens the store, loading all three collections from the backend.
    ///
    /// A missing entry is an empty collection; a corrupt or unreadable one
    /// is logged and degraded to empty. Startup never fails on bad durable
    /// state.
    #[must_use]
    pub fn open(backend: Arc<dyn SnapshotBackend>) -> Self {
        let events: Vec<Event> = load_entry(backend.as_ref(), SnapshotKey::Events);
        let markets: Vec<Market> = load_entry(backend.as_ref(), SnapshotKey::Markets);
        let contracts: Vec<Contract> = load_entry(backend.as_ref(), SnapshotKey::Contracts);

        Self {
            events: events.into_iter().map(|e| (e.id.clone(), e)).collect(),
            markets: markets
                .into_iter()
                .map(|m| (MarketKey::new(&m.id, &m.event_id), m))
                .collect(),
            contracts: contracts
                .into_iter()
                .map(|c| (ContractKey::new(&c.id, &c.market_id, &c.event_id), c))
                .collect(),
            backend,
        }
    }

    /// Get-or-create-then-merge.
    ///
    /// Looks up by the kind's uniqueness key; when found, fields present in
    /// `data` overwrite the stored record (last write wins per field),
    /// absent fields are retained; when not found, `data` becomes a new
    /// record with defaults for its optional fields. On success the touched
    /// collection is persisted. The store is untouched on error.
    pub fn upsert(&mut self, kind: EntityKind, data: &Map<String, Value>) -> SyncResult<Entity> {
        let key = EntityKey::from_data(kind, data).ok_or_else(|| ValidationError::InvalidShape {
            reason: format!("{kind} data is missing its key fields"),
        })?;

        let merged = match self.get(&key) {
            Some(existing) => {
                let mut map = existing.to_json_map();
                for (field, value) in data {
                    map.insert(field.clone(), value.clone());
                }
                map
            }
            None => data.clone(),
        };

        let entity = Entity::from_data(kind, &merged)?;
        match entity.clone() {
            Entity::Event(e) => {
                self.events.insert(e.id.clone(), e);
            }
            Entity::Market(m) => {
                self.markets.insert(MarketKey::new(&m.id, &m.event_id), m);
            }
            Entity::Contract(c) => {
                self.contracts
                    .insert(ContractKey::new(&c.id, &c.market_id, &c.event_id), c);
            }
        }

        self.persist(&[snapshot_key(kind)]);
        debug!(kind = %kind, "entity upserted");
        Ok(entity)
    }

    /// Removes the entity at `key`, cascading for events and markets.
    ///
    /// Cascade matching compares every composite key field exactly; an
    /// unrelated entity sharing only part of the key is never touched. The
    /// in-memory mutation completes first; a single persist call then
    /// covers all three collections if a cascade removed anything,
    /// otherwise only the modified one. Returns true if the root entity
    /// existed.
    pub fn remove(&mut self, key: &EntityKey) -> bool {
        match key {
            EntityKey::Event(id) => {
                let existed = self.events.remove(id).is_some();
                let markets_before = self.markets.len();
                let contracts_before = self.contracts.len();
                self.markets.retain(|k, _| k.event_id != *id);
                self.contracts.retain(|k, _| k.event_id != *id);

                let cascaded = self.markets.len() != markets_before
                    || self.contracts.len() != contracts_before;
                if cascaded {
                    self.persist(&SnapshotKey::ALL);
                } else {
                    self.persist(&[SnapshotKey::Events]);
                }
                existed
            }
            EntityKey::Market(mk) => {
                let existed = self.markets.remove(mk).is_some();
                let contracts_before = self.contracts.len();
                self.contracts
                    .retain(|k, _| !(k.market_id == mk.id && k.event_id == mk.event_id));

                if self.contracts.len() != contracts_before {
                    self.persist(&[SnapshotKey::Markets, SnapshotKey::Contracts]);
                } else {
                    self.persist(&[SnapshotKey::Markets]);
                }
                existed
            }
            EntityKey::Contract(ck) => {
                let existed = self.contracts.remove(ck).is_some();
                self.persist(&[SnapshotKey::Contracts]);
                existed
            }
        }
    }

    /// Looks up one entity by key.
    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<Entity> {
        match key {
            EntityKey::Event(id) => self.events.get(id).cloned().map(Entity::Event),
            EntityKey::Market(mk) => self.markets.get(mk).cloned().map(Entity::Market),
            EntityKey::Contract(ck) => self.contracts.get(ck).cloned().map(Entity::Contract),
        }
    }

    /// True if an entity with `key` is live.
    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.get(key).is_some()
    }

    /// All entities of `kind` matching `predicate`, in key order.
    pub fn query(&self, kind: EntityKind, predicate: impl Fn(&Entity) -> bool) -> Vec<Entity> {
        let all: Vec<Entity> = match kind {
            EntityKind::Event => self.events.values().cloned().map(Entity::Event).collect(),
            EntityKind::Market => self.markets.values().cloned().map(Entity::Market).collect(),
            EntityKind::Contract => self
                .contracts
                .values()
                .cloned()
                .map(Entity::Contract)
                .collect(),
        };
        all.into_iter().filter(|e| predicate(e)).collect()
    }

    /// The collection of `kind` as JSON objects, for field-wise matching.
    #[must_use]
    pub fn collection_json(&self, kind: EntityKind) -> Vec<Map<String, Value>> {
        self.query(kind, |_| true)
            .iter()
            .map(Entity::to_json_map)
            .collect()
    }

    /// All live events, in key order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    /// All live markets, in key order.
    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    /// All live contracts, in key order.
    pub fn contracts(&self) -> impl Iterator<Item = &Contract> {
        self.contracts.values()
    }

    /// Number of live entities of `kind`.
    #[must_use]
    pub fn len(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Event => self.events.len(),
            EntityKind::Market => self.markets.len(),
            EntityKind::Contract => self.contracts.len(),
        }
    }

    /// True if all three collections are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.markets.is_empty() && self.contracts.is_empty()
    }

    /// Empties all three collections and their durable entries.
    pub fn clear(&mut self) {
        self.events.clear();
        self.markets.clear();
        self.contracts.clear();

        for key in SnapshotKey::ALL {
            if let Err(e) = self.backend.remove(key) {
                warn!(entry = %key, error = %e, "failed to remove snapshot entry");
            }
        }
    }

    /// Rewrites the given durable entries wholesale.
    ///
    /// Collections are persisted in key order, so the durable layout is
    /// independent of insertion order. Refused writes are logged and
    /// swallowed; the in-memory state stays authoritative.
    fn persist(&self, keys: &[SnapshotKey]) {
        for &key in keys {
            let result = match key {
                SnapshotKey::Events => self.persist_entry(key, &self.events),
                SnapshotKey::Markets => self.persist_entry(key, &self.markets),
                SnapshotKey::Contracts => self.persist_entry(key, &self.contracts),
            };
            if let Err(e) = result {
                warn!(entry = %key, error = %e, "durable write refused, in-memory state stays authoritative");
            }
        }
    }

    fn persist_entry<K, T: Serialize>(
        &self,
        key: SnapshotKey,
        collection: &BTreeMap<K, T>,
    ) -> Result<(), crate::storage::StorageError> {
        let records: Vec<&T> = collection.values().collect();
        let frame = codec::encode(&records)?;
        self.backend.set(key, &frame)
    }
}

fn snapshot_key(kind: EntityKind) -> SnapshotKey {
    match kind {
        EntityKind::Event => SnapshotKey::Events,
        EntityKind::Market => SnapshotKey::Markets,
        EntityKind::Contract => SnapshotKey::Contracts,
    }
}
