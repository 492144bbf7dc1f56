//! The entity store.
//!
//! Reads take a shared lock and clone an `Arc`, so a reader holds either
//! the record as it was before a write or the one after it, never a mix.
//! Writes for all keys go through one write lock, which is where the
//! version check, the write-through to persistence, the index update and
//! eviction happen together.

use crate::config::{StoreConfig, TtlPolicy};
use crate::persistence::{NoopPersistence, Persistence, SqliteStorage};
use crate::similarity::{ExactIndex, SearchHit, SimilarityIndex};
use crate::StoreError;
use chrono::{DateTime, Utc};
use fb_types::{CacheRecord, Entity, EntityKey, EntityKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A shared, immutable snapshot of one record.
pub type Record = Arc<CacheRecord<Entity>>;

/// Result of a successful [`EntityStore::put`].
#[derive(Debug, Clone)]
pub struct PutOutcome {
    /// The record now stored under the key.
    pub record: Record,

    /// Version that was replaced, if any.
    pub previous_version: Option<u64>,

    /// Keys evicted to get back under capacity.
    pub evicted: Vec<EntityKey>,
}

/// Keeps a key safe from eviction until dropped.
#[derive(Debug)]
pub struct PinGuard {
    key: EntityKey,
    pins: Arc<Mutex<HashMap<EntityKey, usize>>>,
}

impl PinGuard {
    pub fn key(&self) -> &EntityKey {
        &self.key
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        let mut pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = pins.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&self.key);
            }
        }
    }
}

struct Inner {
    records: HashMap<EntityKey, Record>,
    index: Box<dyn SimilarityIndex>,
    /// Highest version ever committed per key. Outlives eviction.
    versions: HashMap<EntityKey, u64>,
}

/// Freshness-aware keyed store with similarity search.
///
/// # Example
///
/// ```rust
/// use fb_store::{EntityStore, StoreConfig};
/// use fb_types::{Entity, EntityKey, Team, TeamStats};
/// use chrono::Utc;
///
/// let store = EntityStore::new(StoreConfig::default());
/// let team = Team {
///     id: "66".into(),
///     name: "Manchester United FC".into(),
///     short_name: None,
///     tla: Some("MUN".into()),
///     league_id: Some("PL".into()),
///     stats: TeamStats::from_results(&[(2, 1)]),
///     last_updated: Utc::now(),
/// };
///
/// store.put(EntityKey::team("66"), Entity::Team(team), 1, Utc::now()).unwrap();
/// assert_eq!(store.get(&EntityKey::team("66")).unwrap().version, 1);
///
/// // Same version again is rejected.
/// assert!(store.put_entity(store.get(&EntityKey::team("66")).unwrap().entity.clone(), 1, Utc::now()).is_err());
/// ```
pub struct EntityStore {
    inner: RwLock<Inner>,
    pins: Arc<Mutex<HashMap<EntityKey, usize>>>,
    persistence: Box<dyn Persistence>,
    ttl: TtlPolicy,
    capacity: usize,
}

impl EntityStore {
    /// An in-memory store.
    pub fn new(config: StoreConfig) -> Self {
        Self::empty(&config, Box::new(NoopPersistence))
    }

    /// Open the store described by `config`: SQLite-backed when a path is
    /// set, in-memory otherwise.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        match &config.path {
            Some(path) => {
                let storage = SqliteStorage::open(path)?;
                tracing::info!("Opened entity store at {}", path.display());
                Self::with_persistence(config, Box::new(storage))
            }
            None => Ok(Self::new(config)),
        }
    }

    /// A store over an explicit backend, reloading everything it holds.
    pub fn with_persistence(
        config: StoreConfig,
        persistence: Box<dyn Persistence>,
    ) -> Result<Self, StoreError> {
        let records = persistence.load_all()?;
        let versions = persistence.load_versions()?;
        let store = Self::empty(&config, persistence);
        let loaded = records.len();
        {
            let mut inner = store.write();
            inner.versions = versions;
            for record in records {
                raise(&mut inner.versions, &record.key, record.version);
                if let Some(vector) = record.embedding.clone() {
                    inner.index.insert(record.key.clone(), vector);
                }
                inner.records.insert(record.key.clone(), Arc::new(record));
            }
            let evicted = store.evict_over_capacity(&mut inner, None);
            if !evicted.is_empty() {
                tracing::info!("Evicted {} reloaded records over capacity", evicted.len());
            }
        }
        tracing::info!("Reloaded {} records", loaded);
        Ok(store)
    }

    fn empty(config: &StoreConfig, persistence: Box<dyn Persistence>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: HashMap::new(),
                index: Box::new(ExactIndex::new(config.metric)),
                versions: HashMap::new(),
            }),
            pins: Arc::new(Mutex::new(HashMap::new())),
            persistence,
            ttl: config.ttl,
            capacity: config.capacity.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Local lookup. Never touches the network or the backend.
    pub fn get(&self, key: &EntityKey) -> Option<Record> {
        self.read().records.get(key).cloned()
    }

    /// Current version of `key`, if stored.
    pub fn version_of(&self, key: &EntityKey) -> Option<u64> {
        self.read().records.get(key).map(|r| r.version)
    }

    /// Highest version ever committed for `key`, including records since
    /// evicted.
    pub fn high_water(&self, key: &EntityKey) -> Option<u64> {
        self.read().versions.get(key).copied()
    }

    /// The version the next write for `key` should carry.
    pub fn next_version(&self, key: &EntityKey) -> u64 {
        self.high_water(key).map_or(1, |v| v + 1)
    }

    /// Replace the record under `key` if `version` is newer than any
    /// version committed for it, evicted ones included.
    ///
    /// The freshness window comes from the store's [`TtlPolicy`] and the
    /// embedding from [`Entity::embedding`].
    ///
    /// # Errors
    ///
    /// - [`StoreError::StaleWrite`] if `version` is not greater than the
    ///   key's [`high_water`](Self::high_water) (equal versions: the first
    ///   write wins)
    /// - [`StoreError::KeyMismatch`] if `entity` belongs to another key
    /// - [`StoreError::Storage`] if the backend write fails; memory is
    ///   left unchanged in that case
    pub fn put(
        &self,
        key: EntityKey,
        entity: Entity,
        version: u64,
        fetched_at: DateTime<Utc>,
    ) -> Result<PutOutcome, StoreError> {
        if entity.key() != key {
            return Err(StoreError::KeyMismatch {
                key: key.to_string(),
                actual: entity.key().to_string(),
            });
        }

        let record = Arc::new(CacheRecord {
            ttl: self.ttl.for_kind(key.kind()),
            embedding: entity.embedding(),
            key: key.clone(),
            entity,
            fetched_at,
            version,
        });

        let mut inner = self.write();
        let previous_version = inner.records.get(&key).map(|r| r.version);
        if let Some(&current) = inner.versions.get(&key) {
            if version <= current {
                return Err(StoreError::StaleWrite {
                    key: key.to_string(),
                    current,
                    attempted: version,
                });
            }
        }

        self.persistence.upsert(&record)?;

        match &record.embedding {
            Some(vector) => inner.index.insert(key.clone(), vector.clone()),
            None => inner.index.remove(&key),
        }
        inner.records.insert(key.clone(), record.clone());
        raise(&mut inner.versions, &key, version);
        let evicted = self.evict_over_capacity(&mut inner, Some(&key));
        drop(inner);

        tracing::debug!("Stored {} v{}", key, version);
        Ok(PutOutcome {
            record,
            previous_version,
            evicted,
        })
    }

    /// [`put`](Self::put) under the entity's own key.
    pub fn put_entity(
        &self,
        entity: Entity,
        version: u64,
        fetched_at: DateTime<Utc>,
    ) -> Result<PutOutcome, StoreError> {
        self.put(entity.key(), entity, version, fetched_at)
    }

    /// Up to `k` stored entities closest to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        self.read().index.query(query, k)
    }

    /// [`search`](Self::search) restricted to one kind.
    pub fn search_kind(&self, query: &[f32], k: usize, kind: EntityKind) -> Vec<SearchHit> {
        self.read().index.query_kind(query, k, Some(kind))
    }

    /// Protect `key` from eviction while the guard lives.
    pub fn pin(&self, key: &EntityKey) -> PinGuard {
        let mut pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        *pins.entry(key.clone()).or_default() += 1;
        PinGuard {
            key: key.clone(),
            pins: self.pins.clone(),
        }
    }

    pub fn is_pinned(&self, key: &EntityKey) -> bool {
        self.pins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record count per kind.
    pub fn count_by_kind(&self) -> HashMap<EntityKind, usize> {
        let inner = self.read();
        let mut counts = HashMap::new();
        for key in inner.records.keys() {
            *counts.entry(key.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Stored keys of one kind, sorted.
    pub fn keys_of_kind(&self, kind: EntityKind) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = self
            .read()
            .records
            .keys()
            .filter(|k| k.kind() == kind)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Evict lowest version, then oldest fetch, until within capacity.
    /// Pinned keys and `keep` are never chosen.
    fn evict_over_capacity(&self, inner: &mut Inner, keep: Option<&EntityKey>) -> Vec<EntityKey> {
        let mut evicted = Vec::new();
        if inner.records.len() <= self.capacity {
            return evicted;
        }

        let pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        while inner.records.len() > self.capacity {
            let victim = inner
                .records
                .values()
                .filter(|r| Some(&r.key) != keep && !pins.contains_key(&r.key))
                .min_by(|a, b| {
                    (a.version, a.fetched_at, &a.key).cmp(&(b.version, b.fetched_at, &b.key))
                })
                .map(|r| r.key.clone());

            let Some(victim) = victim else {
                tracing::warn!(
                    "Store over capacity ({} > {}) but every record is pinned",
                    inner.records.len(),
                    self.capacity
                );
                break;
            };

            inner.records.remove(&victim);
            inner.index.remove(&victim);
            // A row left behind is replaced by the next write: versions only
            // grow past the high-water mark.
            if let Err(e) = self.persistence.delete(&victim) {
                tracing::warn!("Failed to delete evicted {} from storage: {}", victim, e);
            }
            tracing::debug!("Evicted {}", victim);
            evicted.push(victim);
        }
        evicted
    }
}

fn raise(versions: &mut HashMap<EntityKey, u64>, key: &EntityKey, version: u64) {
    let mark = versions.entry(key.clone()).or_insert(version);
    *mark = (*mark).max(version);
}
