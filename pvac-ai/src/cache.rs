//! In-memory cache of validated per-image results
//!
//! Keyed by image id. Only records that passed final validation are
//! stored, so a hit can be returned without re-checking.

use crate::types::PerImageRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    store: HashMap<String, PerImageRecord>,
    stats: CacheStats,
}

/// Per-image result cache, shared across concurrent tasks via `Arc`
#[derive(Debug, Default)]
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    /// Log every hit and miss at debug level
    verbose: bool,
}

impl ResultCache {
    pub fn new(verbose: bool) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            verbose,
        }
    }

    /// Cached record for `key`, counting the hit or miss
    pub fn get(&self, key: &str) -> Option<PerImageRecord> {
        let mut inner = self.lock();
        let found = inner.store.get(key).cloned();

        if found.is_some() {
            inner.stats.hits += 1;
            if self.verbose {
                debug!("Cache hit: {}", key);
            }
        } else {
            inner.stats.misses += 1;
            if self.verbose {
                debug!("Cache miss: {}", key);
            }
        }

        found
    }

    /// Store a validated record
    pub fn set(&self, key: impl Into<String>, record: PerImageRecord) {
        self.lock().store.insert(key.into(), record);
    }

    /// Drop all entries and reset counters
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.store.clear();
        inner.stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // Contents stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
