//! Typed key/value cache with per-entry expiry.
//!
//! Entries are visible only while `now < expires_at`. Expired entries are
//! dropped lazily on read and periodically by a janitor thread
//! ([`TtlCache::spawn_janitor`]) so memory stays bounded between reads.
//!
//! The cache is purely an optimization: every miss must be satisfiable by
//! re-deriving the value from its source.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::clock::Clock;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    /// `None` when the TTL overflowed the clock; such entries never expire.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Debug)]
struct Inner<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash, V> Inner<K, V> {
    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

/// Cheaply cloneable handle; clones share the same entries.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                default_ttl,
                clock,
            }),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Returns the value if it was set and its TTL has not elapsed.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.inner.clock.now();
        {
            let entries = self.inner.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }
        // Expired: evict unless a writer refreshed it in between.
        let mut entries = self.inner.entries.write();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
            trace!("cache_evict_on_read");
        }
        None
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self.inner.clock.now().checked_add(ttl);
        self.inner
            .entries
            .write()
            .insert(key, Entry { value, expires_at });
    }

    pub fn set_default(&self, key: K, value: V) {
        self.set(key, value, self.inner.default_ttl);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.entries.write().remove(key).map(|e| e.value)
    }

    pub fn clear(&self) {
        self.inner.entries.write().clear();
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Sweep expired entries every `interval` until the last handle is dropped.
    pub fn spawn_janitor(&self, interval: Duration) -> std::io::Result<JoinHandle<()>> {
        let weak: Weak<Inner<K, V>> = Arc::downgrade(&self.inner);
        std::thread::Builder::new()
            .name("cache-janitor".into())
            .spawn(move || {
                loop {
                    std::thread::sleep(interval);
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    let removed = inner.sweep();
                    if removed > 0 {
                        debug!(removed, "cache_sweep");
                    }
                }
            })
    }
}
