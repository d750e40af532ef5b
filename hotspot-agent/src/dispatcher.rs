//! Entry points invoked by the event source
//!
//! Two hooks feed the aggregation state:
//! - `on_context_switch` for `sched:sched_switch`
//! - `on_page_fault` for `handle_mm_fault`
//!
//! Both run synchronously on the CPU that raised the event, may run in
//! parallel on every CPU, and never fail: capacity and resolution problems
//! are absorbed into the tables as described in [`crate::table`] and
//! [`crate::identity`].

use crate::contention::ContentionTracker;
use crate::fault::FaultAggregator;
use crate::identity::{ExecutionContext, HierarchyResolver, IdentityResolver};
use crate::stat::StatAggregator;
use crate::table::{BoundedTable, TableUsage};
use crate::unit_state::PerUnitState;
use hotspot_common::{
    ContentionKey, FaultStat, PidStat, CONTENTION_CAPACITY, FAULT_CAPACITY, PID_STATS_CAPACITY,
};
use log::info;
use serde::{Deserialize, Serialize};

pub type PidStatTable = BoundedTable<u32, PidStat>;
pub type ContentionTable = BoundedTable<ContentionKey, u64>;
pub type FaultTable = BoundedTable<u32, FaultStat>;

/// Maximum entry count of each aggregation table. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableCapacities {
    pub pid_stats: usize,
    pub contention: usize,
    pub faults: usize,
}

impl Default for TableCapacities {
    fn default() -> Self {
        Self {
            pid_stats: PID_STATS_CAPACITY,
            contention: CONTENTION_CAPACITY,
            faults: FAULT_CAPACITY,
        }
    }
}

/// Owns the process-wide aggregation state and routes events into it.
pub struct EventDispatcher<R = HierarchyResolver> {
    contention: ContentionTracker<ContentionTable>,
    stats: StatAggregator<PidStatTable, R>,
    faults: FaultAggregator<FaultTable, R>,
}

impl<R> EventDispatcher<R>
where
    R: IdentityResolver + Clone,
{
    /// Allocate all tables and one state slot per unit.
    pub fn new(units: usize, capacities: TableCapacities, resolver: R) -> Self {
        info!(
            "Initializing aggregation tables: units={}, pid_stats={}, contention={}, faults={}",
            units, capacities.pid_stats, capacities.contention, capacities.faults
        );

        Self {
            contention: ContentionTracker::new(BoundedTable::new(
                "contention",
                capacities.contention,
            )),
            stats: StatAggregator::new(
                PerUnitState::new(units),
                BoundedTable::new("pid_stats", capacities.pid_stats),
                resolver.clone(),
            ),
            faults: FaultAggregator::new(
                BoundedTable::new("faults", capacities.faults),
                resolver,
            ),
        }
    }

    /// Handle a context switch on `unit` from `prev_entity` to `next_entity`.
    ///
    /// `ctx` must still describe the outgoing task: the name and cgroup of
    /// the entity being charged are captured from it.
    pub fn on_context_switch<C>(
        &self,
        ctx: &C,
        unit: u32,
        timestamp_ns: u64,
        prev_entity: u32,
        next_entity: u32,
    ) where
        C: ExecutionContext,
    {
        if prev_entity != 0 && next_entity != 0 {
            self.contention.record_contention(prev_entity, next_entity);
        }
        self.stats.record_switch(ctx, unit, timestamp_ns, next_entity);
    }

    /// Handle a page fault raised by the task current in `ctx`.
    pub fn on_page_fault<C>(&self, ctx: &C)
    where
        C: ExecutionContext,
    {
        let entity_id = ctx.current_entity_id();
        if entity_id == 0 {
            return;
        }
        self.faults.record_fault(ctx, entity_id);
    }
}

impl EventDispatcher<HierarchyResolver> {
    /// Dispatcher with the reference capacities and the live hierarchy walk.
    pub fn with_defaults(units: usize) -> Self {
        Self::new(units, TableCapacities::default(), HierarchyResolver)
    }
}

impl<R> EventDispatcher<R> {
    pub fn pid_stats(&self) -> &PidStatTable {
        self.stats.table()
    }

    pub fn contention_counts(&self) -> &ContentionTable {
        self.contention.table()
    }

    pub fn fault_counts(&self) -> &FaultTable {
        self.faults.table()
    }

    pub fn units(&self) -> &PerUnitState {
        self.stats.units()
    }

    /// Fill level and dropped-insert counters of every table.
    pub fn usage(&self) -> [TableUsage; 3] {
        [
            self.pid_stats().usage(),
            self.contention_counts().usage(),
            self.fault_counts().usage(),
        ]
    }
}
