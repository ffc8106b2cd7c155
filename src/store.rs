//! Canonical record collection for a session.
//!
//! A [`Collection`] is an immutable snapshot: records sorted by id plus the
//! search index built from exactly those records. Refreshing builds a new
//! snapshot off to the side and swaps the `Arc` in one step, so readers see
//! either the old collection or the new one, never a mix.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::model::Record;
use crate::op::{OpError, VaultCli};
use crate::search::tantivy::{RecordIndex, SearchError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Op(#[from] OpError),

    #[error("malformed vault payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("vault returned duplicate record id {0}")]
    DuplicateId(String),

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl StoreError {
    /// Decode-class failures will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Op(_))
    }

    pub fn as_op(&self) -> Option<&OpError> {
        match self {
            Self::Op(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Collection {
    records: Vec<Record>,
    index: RecordIndex,
}

impl Collection {
    /// Sort by id, reject duplicates and index the titles.
    pub fn from_records(mut records: Vec<Record>) -> Result<Self, StoreError> {
        records.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(pair) = records.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(StoreError::DuplicateId(pair[0].id.clone()));
        }
        let index = RecordIndex::build(&records)?;
        Ok(Self { records, index })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn index(&self) -> &RecordIndex {
        &self.index
    }

    /// O(log n) lookup by id.
    pub fn find(&self, id: &str) -> Option<&Record> {
        self.records
            .binary_search_by(|r| r.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub ttl: Duration,
    /// Background sweep cadence; `None` leaves eviction to reads.
    pub sweep_interval: Option<Duration>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(15 * 60),
            sweep_interval: Some(Duration::from_secs(5 * 60)),
        }
    }
}

pub struct RecordStore {
    cli: Arc<dyn VaultCli>,
    current: RwLock<Option<Arc<Collection>>>,
    list_cache: TtlCache<(), Arc<Collection>>,
    item_cache: TtlCache<String, Arc<Record>>,
    refresh_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(cli: Arc<dyn VaultCli>, options: &StoreOptions, clock: Arc<dyn Clock>) -> Self {
        let list_cache = TtlCache::new(options.ttl, clock.clone());
        let item_cache = TtlCache::new(options.ttl, clock);
        if let Some(interval) = options.sweep_interval {
            for spawned in [
                list_cache.spawn_janitor(interval),
                item_cache.spawn_janitor(interval),
            ] {
                if let Err(e) = spawned {
                    warn!(error = %e, "cache janitor not started");
                }
            }
        }
        Self {
            cli,
            current: RwLock::new(None),
            list_cache,
            item_cache,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Last successfully refreshed collection, fresh or not.
    pub fn snapshot(&self) -> Option<Arc<Collection>> {
        self.current.read().clone()
    }

    /// Cached collection if fresh, otherwise refresh.
    ///
    /// While another refresh is running, the previous snapshot is served
    /// instead of waiting; only the very first load waits.
    pub fn records(&self, token: &str) -> Result<Arc<Collection>, StoreError> {
        if let Some(collection) = self.list_cache.get(&()) {
            return Ok(collection);
        }
        if let Some(guard) = self.refresh_lock.try_lock() {
            return self.refresh_locked(token, guard);
        }
        if let Some(collection) = self.snapshot() {
            debug!("refresh in flight, serving previous snapshot");
            return Ok(collection);
        }
        let guard = self.refresh_lock.lock();
        if let Some(collection) = self.list_cache.get(&()) {
            return Ok(collection);
        }
        self.refresh_locked(token, guard)
    }

    /// Always fetch the list from the vault and rebuild the index.
    pub fn refresh_list(&self, token: &str) -> Result<Arc<Collection>, StoreError> {
        let guard = self.refresh_lock.lock();
        self.refresh_locked(token, guard)
    }

    fn refresh_locked(
        &self,
        token: &str,
        _guard: MutexGuard<'_, ()>,
    ) -> Result<Arc<Collection>, StoreError> {
        let started = Instant::now();
        let raw = self.cli.list_items(token)?;
        let records: Vec<Record> = serde_json::from_slice(&raw)?;
        let collection = Arc::new(Collection::from_records(records)?);

        *self.current.write() = Some(Arc::clone(&collection));
        self.list_cache.set_default((), Arc::clone(&collection));
        info!(
            count = collection.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "records_refreshed"
        );
        Ok(collection)
    }

    /// One record with details, from its own cache entry when fresh.
    pub fn get_one(&self, token: &str, id: &str) -> Result<Arc<Record>, StoreError> {
        if let Some(record) = self.item_cache.get(&id.to_string()) {
            return Ok(record);
        }
        let raw = self.cli.get_item(token, id)?;
        let record: Record = serde_json::from_slice(&raw)?;
        if record.id != id {
            warn!(requested = id, returned = %record.id, "vault returned a different record id");
        }
        let record = Arc::new(record);
        self.item_cache.set_default(id.to_string(), Arc::clone(&record));
        Ok(record)
    }

    /// Forget cached responses; the current snapshot stays searchable.
    pub fn invalidate(&self) {
        self.list_cache.clear();
        self.item_cache.clear();
    }
}
