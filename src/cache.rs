//! # Snapshot Cache Module
//!
//! ## Purpose
//! Caches full-collection snapshots between batch operations so that every
//! create, sequence computation, and duplicate scan does not re-list the
//! whole store. Entries expire on a TTL and are invalidated explicitly
//! after every write.
//!
//! ## Input/Output Specification
//! - **Input**: Collection name plus an async loader for cache misses
//! - **Output**: Shared snapshot (`Arc<Vec<StoredCase>>`), cache statistics
//! - **Expiry**: TTL in seconds, plus explicit invalidation on writes
//!
//! ## Key Features
//! - Read-through: callers never observe the cache as a separate step
//! - Invalidation after writes is what keeps renumbering from planning
//!   against a snapshot that no longer matches the store
//! - Hit/miss/invalidation counters for the stats endpoint

use crate::config::CacheConfig;
use crate::errors::Result;
use crate::StoredCase;
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Snapshot {
    cases: Arc<Vec<StoredCase>>,
    fetched_at: Instant,
}

/// TTL cache for collection snapshots, keyed by collection name.
pub struct SnapshotCache {
    entries: DashMap<String, Snapshot>,
    ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

/// Counters exposed through the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub ttl_seconds: u64,
}

impl SnapshotCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_secs(config.ttl_seconds),
            enabled: config.enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Returns the cached snapshot for `collection`, or runs `loader` and
    /// caches its result. Loader errors are returned as-is and cache
    /// nothing.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        collection: &str,
        loader: F,
    ) -> Result<Arc<Vec<StoredCase>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<StoredCase>>>,
    {
        if self.enabled {
            if let Some(cases) = self.lookup(collection) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cases);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let fresh = Arc::new(loader().await?);
        if self.enabled {
            self.entries.insert(
                collection.to_string(),
                Snapshot {
                    cases: fresh.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        Ok(fresh)
    }

    /// Drops the snapshot for one collection. Must be called after every
    /// write to that collection; a stale snapshot would hand the planners a
    /// peer list that no longer matches the store.
    pub fn invalidate(&self, collection: &str) {
        if self.entries.remove(collection).is_some() {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drops every snapshot.
    pub fn invalidate_all(&self) {
        let dropped = self.entries.len() as u64;
        self.entries.clear();
        if dropped > 0 {
            self.invalidations.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.enabled,
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    // Guard is confined here so no map reference is held across an await.
    fn lookup(&self, collection: &str) -> Option<Arc<Vec<StoredCase>>> {
        let entry = self.entries.get(collection)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.cases.clone())
        } else {
            None
        }
    }
}
