//! Per-entity page fault counting

use crate::identity::{fill_group_path, refresh_group_path, ExecutionContext, IdentityResolver};
use crate::table::AggregateTable;
use hotspot_common::FaultStat;

pub struct FaultAggregator<T, R> {
    table: T,
    resolver: R,
}

impl<T, R> FaultAggregator<T, R>
where
    T: AggregateTable<u32, FaultStat>,
    R: IdentityResolver,
{
    pub fn new(table: T, resolver: R) -> Self {
        Self { table, resolver }
    }

    /// Count one fault for `entity_id`, attributing it to the cgroup of the
    /// faulting context. Entity 0 is ignored.
    pub fn record_fault<C>(&self, ctx: &C, entity_id: u32)
    where
        C: ExecutionContext,
    {
        if entity_id == 0 {
            return;
        }

        self.table.upsert(
            entity_id,
            || {
                let mut stat = FaultStat {
                    faults: 1,
                    ..FaultStat::default()
                };
                fill_group_path(&self.resolver, ctx, &mut stat.cgroup);
                stat
            },
            |stat| {
                stat.faults = stat.faults.wrapping_add(1);
                refresh_group_path(&self.resolver, ctx, &mut stat.cgroup);
            },
        );
    }
}

impl<T, R> FaultAggregator<T, R> {
    pub fn table(&self) -> &T {
        &self.table
    }
}
