//! Directed handoff counting
//!
//! Every switch between two real entities on a CPU is one observation of
//! `prev` being displaced by `next`. Pairs are directional.

use crate::table::AggregateTable;
use hotspot_common::ContentionKey;

pub struct ContentionTracker<T> {
    table: T,
}

impl<T> ContentionTracker<T>
where
    T: AggregateTable<ContentionKey, u64>,
{
    pub fn new(table: T) -> Self {
        Self { table }
    }

    /// Count one handoff from `victim` to `aggressor`. Pairs involving
    /// entity 0 are ignored.
    pub fn record_contention(&self, victim: u32, aggressor: u32) {
        let key = match ContentionKey::new(victim, aggressor) {
            Some(key) => key,
            None => return,
        };

        self.table.upsert(key, || 1, |count| *count = count.wrapping_add(1));
    }
}

impl<T> ContentionTracker<T> {
    pub fn table(&self) -> &T {
        &self.table
    }
}
