//! In-memory list cache with stale-while-revalidate semantics.
//!
//! Entries never expire on a timer; they only become stale when a write to
//! their resource flags them. A stale entry keeps serving its rows until a
//! background refresh replaces them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;

use super::query::Record;

struct ListEntry {
    resource: String,
    rows: Arc<Vec<Record>>,
    fetched_at: DateTime<Utc>,
    stale: bool,
    /// Guards against a thundering herd of refreshes for one key.
    refreshing: bool,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub invalidations: u64,
    pub entries: usize,
}

pub(crate) struct ListCache {
    entries: DashMap<String, ListEntry>,
    /// Per-resource write generation. Bumped by every invalidation so a
    /// fetch that started before a write can be detected when its rows come
    /// back: the snapshot is stored, but never as fresh.
    generations: DashMap<String, u64>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_hits: AtomicU64,
    invalidations: AtomicU64,
}

impl ListCache {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_hits: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Current write generation of a resource. Capture this before fetching
    /// rows and pass it back to [`store`](Self::store).
    pub(crate) fn generation(&self, resource: &str) -> u64 {
        self.generations.get(resource).map(|g| *g).unwrap_or(0)
    }

    /// Look up a key. Returns the cached rows and whether they are stale.
    pub(crate) fn lookup(&self, key: &str) -> Option<(Arc<Vec<Record>>, bool)> {
        match self.entries.get(key) {
            Some(entry) => {
                if entry.stale {
                    self.stale_hits.fetch_add(1, Ordering::Relaxed);
                    counter!("fieldgate_cache_stale_hits_total").increment(1);
                } else {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    counter!("fieldgate_cache_hits_total").increment(1);
                }
                Some((Arc::clone(&entry.rows), entry.stale))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!("fieldgate_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Claim the refresh slot for a key. Returns `false` when the key is
    /// gone or another refresh is already in flight.
    pub(crate) fn begin_refresh(&self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.refreshing => {
                entry.refreshing = true;
                true
            }
            _ => false,
        }
    }

    /// Release the refresh slot after a failed refresh, leaving the stale
    /// rows in place.
    pub(crate) fn abort_refresh(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.refreshing = false;
        }
    }

    /// Insert or replace an entry with rows fetched at `generation`. If a
    /// write bumped the resource's generation while the fetch was in flight,
    /// the snapshot predates that write: it is stored stale so the next read
    /// re-fetches, never allowed to overwrite the staleness flag.
    pub(crate) fn store(&self, key: &str, resource: &str, rows: Vec<Record>, generation: u64) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict_one();
        }
        let stale = self.generation(resource) != generation;
        self.entries.insert(
            key.to_string(),
            ListEntry {
                resource: resource.to_string(),
                rows: Arc::new(rows),
                fetched_at: Utc::now(),
                stale,
                refreshing: false,
            },
        );
    }

    /// Flag every entry belonging to a resource stale and bump the
    /// resource's write generation. Returns how many entries were flagged.
    pub(crate) fn mark_resource_stale(&self, resource: &str) -> usize {
        *self.generations.entry(resource.to_string()).or_insert(0) += 1;

        let mut flagged = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.resource == resource && !entry.stale {
                entry.stale = true;
                flagged += 1;
            }
        }
        if flagged > 0 {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            counter!("fieldgate_cache_invalidations_total").increment(1);
        }
        flagged
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    /// Drop the oldest entry, preferring stale ones.
    fn evict_one(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| (!e.stale, e.fetched_at))
            .map(|e| e.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
