// crates/faas-core/src/runtime/cache.rs
// ============================================================================
// Module: FaaS Function Cache
// Description: UID-keyed cache of function records.
// Purpose: Avoid repeated store round-trips for hot functions.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The cache is write-through on registration and read-through on invocation.
//! It is owned by the engine and only touched inside the engine's critical
//! section, so it carries no locking of its own.
//!
//! Without a capacity the cache never evicts and entries live as long as the
//! engine. With a capacity, the least recently used entry is evicted once the
//! cache is full.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use crate::core::FunctionRecord;
use crate::core::FunctionUid;

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Cached record plus its recency stamp.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached function record.
    record: FunctionRecord,
    /// Monotonic access stamp.
    last_access: u64,
}

/// UID to function record cache.
///
/// # Invariants
/// - With `Some(capacity)`, `len() <= capacity` after every insert.
/// - A capacity of zero disables caching.
#[derive(Debug, Clone, Default)]
pub struct FunctionCache {
    /// Entries keyed by UID.
    entries: HashMap<FunctionUid, CacheEntry>,
    /// Optional maximum number of entries.
    capacity: Option<usize>,
    /// Access counter used as a recency clock.
    tick: u64,
}

impl FunctionCache {
    /// Creates a cache; `None` means unbounded.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            tick: 0,
        }
    }

    /// Returns a cached record and marks it recently used.
    pub fn get(&mut self, uid: &FunctionUid) -> Option<FunctionRecord> {
        self.tick = self.tick.wrapping_add(1);
        let tick = self.tick;
        self.entries.get_mut(uid).map(|entry| {
            entry.last_access = tick;
            entry.record.clone()
        })
    }

    /// Inserts or replaces a record, evicting the least recently used entry when full.
    pub fn insert(&mut self, uid: FunctionUid, record: FunctionRecord) {
        if self.capacity == Some(0) {
            return;
        }
        self.tick = self.tick.wrapping_add(1);
        if let Some(capacity) = self.capacity
            && !self.entries.contains_key(&uid)
            && self.entries.len() >= capacity
        {
            self.evict_one();
        }
        self.entries.insert(
            uid,
            CacheEntry {
                record,
                last_access: self.tick,
            },
        );
    }

    /// Returns whether the cache holds `uid` without touching recency.
    #[must_use]
    pub fn contains(&self, uid: &FunctionUid) -> bool {
        self.entries.contains_key(uid)
    }

    /// Returns the number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Evicts the least recently used entry.
    fn evict_one(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(uid, _)| uid.clone());
        if let Some(uid) = oldest {
            self.entries.remove(&uid);
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
