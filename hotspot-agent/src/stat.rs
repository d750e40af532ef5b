//! Per-entity CPU time accounting
//!
//! On every context switch the unit's scratch slot tells us who was running
//! and since when. The outgoing entity is charged the elapsed time, and its
//! name and cgroup are captured while it is still the current task.

use crate::identity::{fill_group_path, refresh_group_path, ExecutionContext, IdentityResolver};
use crate::table::AggregateTable;
use crate::unit_state::PerUnitState;
use hotspot_common::PidStat;

pub struct StatAggregator<T, R> {
    units: PerUnitState,
    table: T,
    resolver: R,
}

impl<T, R> StatAggregator<T, R>
where
    T: AggregateTable<u32, PidStat>,
    R: IdentityResolver,
{
    pub fn new(units: PerUnitState, table: T, resolver: R) -> Self {
        Self {
            units,
            table,
            resolver,
        }
    }

    /// Account a switch on `unit` at `timestamp_ns` to `next_entity`.
    ///
    /// The unit's slot is always advanced. If the previous occupant was a
    /// real entity, `timestamp_ns - prev_ts` is added to its record.
    pub fn record_switch<C>(&self, ctx: &C, unit: u32, timestamp_ns: u64, next_entity: u32)
    where
        C: ExecutionContext,
    {
        let prev = match self.units.read_and_update(unit, next_entity, timestamp_ns) {
            Some(prev) => prev,
            None => return,
        };
        if prev.entity_id == 0 {
            return;
        }

        // Timestamps are monotonic per unit; no clamping.
        let delta = timestamp_ns.wrapping_sub(prev.timestamp_ns);

        self.table.upsert(
            prev.entity_id,
            || {
                let mut stat = PidStat {
                    cpu_time_ns: delta,
                    ..PidStat::default()
                };
                ctx.current_comm(&mut stat.comm);
                fill_group_path(&self.resolver, ctx, &mut stat.cgroup);
                stat
            },
            |stat| {
                stat.cpu_time_ns = stat.cpu_time_ns.wrapping_add(delta);
                refresh_group_path(&self.resolver, ctx, &mut stat.cgroup);
                if stat.comm.is_empty() {
                    ctx.current_comm(&mut stat.comm);
                }
            },
        );
    }
}

impl<T, R> StatAggregator<T, R> {
    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn units(&self) -> &PerUnitState {
        &self.units
    }
}
