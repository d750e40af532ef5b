//! Fixed-capacity concurrent tables for the aggregation state
//!
//! Every table is sized once at startup and never grows past its capacity.
//! Writers on different CPUs upsert concurrently; each upsert runs under the
//! owning shard's lock, so get-or-insert-then-mutate is one atomic step.
//!
//! Capacity policy:
//! - updating an existing key always succeeds
//! - inserting a new key into a full table is dropped silently and only
//!   counted in [`AggregateTable::dropped`]

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Outcome of a single upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    /// New key refused because the table is full
    Dropped,
}

/// Bounded key/value table with an atomic upsert primitive.
///
/// Aggregators only talk to this trait, so the concurrency scheme behind it
/// can change without touching the aggregation logic.
pub trait AggregateTable<K, V: Clone> {
    /// Mutate the record for `key` with `update`, or create it with `init`
    /// if it is absent. Exactly one of the two closures runs, unless the
    /// key is new and the table is full, in which case neither does.
    fn upsert<I, U>(&self, key: K, init: I, update: U) -> Upsert
    where
        I: FnOnce() -> V,
        U: FnOnce(&mut V);

    fn get(&self, key: &K) -> Option<V>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;

    /// Number of new-key inserts refused because the table was full.
    fn dropped(&self) -> u64;

    /// Visit every entry. Consistency is weak: concurrent writers may be
    /// observed mid-stream.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);

    /// Remove every entry, returning how many were removed. This is a
    /// reader-side policy; the event path never deletes.
    fn clear(&self) -> usize;
}

/// Lock-sharded [`AggregateTable`] on top of `DashMap`.
///
/// Admission of new keys goes through an atomic slot counter so the
/// capacity bound holds across shards without a global lock.
pub struct BoundedTable<K, V> {
    name: &'static str,
    entries: DashMap<K, V>,
    capacity: usize,
    occupied: AtomicUsize,
    dropped: AtomicU64,
}

impl<K, V> BoundedTable<K, V>
where
    K: Eq + Hash,
{
    /// Create a table and reserve storage for `capacity` entries up front.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        debug!("Reserving {} entries for table {}", capacity, name);

        Self {
            name,
            entries: DashMap::with_capacity(capacity),
            capacity,
            occupied: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Snapshot of the table's fill level for exporters.
    pub fn usage(&self) -> TableUsage {
        TableUsage {
            table: self.name,
            entries: self.entries.len(),
            capacity: self.capacity,
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn try_reserve_slot(&self) -> bool {
        self.occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.capacity).then_some(used + 1)
            })
            .is_ok()
    }
}

impl<K, V> AggregateTable<K, V> for BoundedTable<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn upsert<I, U>(&self, key: K, init: I, update: U) -> Upsert
    where
        I: FnOnce() -> V,
        U: FnOnce(&mut V),
    {
        match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                update(entry.get_mut());
                Upsert::Updated
            }
            Entry::Vacant(entry) => {
                if !self.try_reserve_slot() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return Upsert::Dropped;
                }
                entry.insert(init());
                Upsert::Inserted
            }
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for entry in self.entries.iter() {
            f(entry.key(), entry.value());
        }
    }

    fn clear(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, _| {
            removed += 1;
            false
        });
        self.occupied.fetch_sub(removed, Ordering::AcqRel);

        debug!("Cleared {} entries from table {}", removed, self.name);
        removed
    }
}

/// Fill level and saturation counter of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableUsage {
    pub table: &'static str,
    pub entries: usize,
    pub capacity: usize,
    pub dropped: u64,
}
