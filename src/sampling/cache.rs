// Starling: Contact-Plan Scheduling for Satellite Constellations
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Per-link memoization of sampled contact windows, with TTL and invalidation hooks.

use std::collections::HashMap;
use std::sync::RwLock;

use time::{Duration, OffsetDateTime};

use crate::types::{ContactWindow, LinkId};

/// Observable cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of `get` calls answered from a fresh entry.
    pub hits: u64,
    /// Number of `get` calls that found no fresh entry.
    pub misses: u64,
    /// Number of explicit invalidations.
    pub invalidations: u64,
}

/// A cached window set together with its freshness stamp.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// The cached windows, sorted by start time.
    windows: Vec<ContactWindow>,
    /// When the entry was last written.
    updated_at: OffsetDateTime,
}

/// Interior state of the cache, guarded by one reader/writer lock.
#[derive(Debug, Default)]
struct CacheInner {
    /// All cached entries, indexed by link.
    entries: HashMap<LinkId, CacheEntry>,
    /// Running statistics. Mutated under the writer lock to avoid torn reads.
    stats: CacheStats,
}

/// TTL'd cache of sampled contact windows.
///
/// `get` returns an owned copy; callers may mutate the result freely without affecting the
/// cache. Readers and writers are independently safe.
#[derive(Debug)]
pub struct ContactCache {
    /// Time after which a cached entry no longer counts as fresh.
    ttl: Duration,
    /// The guarded cache state.
    inner: RwLock<CacheInner>,
}

impl ContactCache {
    /// Create an empty cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(CacheInner::default()),
        }
    }

    /// The TTL of the cache.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a copy of the cached windows for `link` if the entry is still fresh. A stale or
    /// absent entry counts as a miss.
    pub fn get(&self, link: &LinkId) -> Option<Vec<ContactWindow>> {
        let now = OffsetDateTime::now_utc();
        // counters mutate on every access, so take the writer lock directly
        let mut inner = self.inner.write().unwrap();
        match inner.entries.get(link) {
            Some(entry) if now - entry.updated_at <= self.ttl => {
                let windows = entry.windows.clone();
                inner.stats.hits += 1;
                Some(windows)
            }
            _ => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Store a copy of `windows` for `link`, stamping the entry with the current time. The
    /// windows are sorted by start time before storing.
    pub fn update(&self, link: &LinkId, windows: &[ContactWindow]) {
        let mut windows = windows.to_vec();
        windows.sort_by_key(|w| w.start);
        let mut inner = self.inner.write().unwrap();
        inner.entries.insert(
            link.clone(),
            CacheEntry {
                windows,
                updated_at: OffsetDateTime::now_utc(),
            },
        );
    }

    /// Remove the entry for `link` and count the invalidation.
    pub fn invalidate(&self, link: &LinkId) {
        let mut inner = self.inner.write().unwrap();
        inner.entries.remove(link);
        inner.stats.invalidations += 1;
    }

    /// Remove all entries and count one invalidation per removed entry.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.write().unwrap();
        let removed = inner.entries.len() as u64;
        inner.entries.clear();
        inner.stats.invalidations += removed;
    }

    /// Read the current statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.read().unwrap().stats
    }

    /// Number of entries currently stored, fresh or stale.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    /// Returns `true` if the cache holds no entry at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
