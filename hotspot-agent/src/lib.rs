//! Per-CPU aggregation core for hotspot
//!
//! Responsibilities:
//! - Track which entity each execution unit is running and since when
//! - Charge CPU time to the outgoing entity on every context switch
//! - Count directed handoffs between entities
//! - Count page faults per entity
//! - Resolve the cgroup each entity belongs to
//! - Snapshot, rank, and reset the tables at the end of a window

pub mod collector;
pub mod contention;
pub mod dispatcher;
pub mod fault;
pub mod identity;
pub mod procfs;
pub mod stat;
pub mod table;
pub mod unit_state;

#[cfg(test)]
mod test_support;

pub use collector::{Collector, CommSource, ContentionStat, CpuStat, PageFaultStat, ProcComms};
pub use dispatcher::{EventDispatcher, TableCapacities};
pub use identity::{
    ExecutionContext, GroupMembership, GroupNode, HierarchyResolver, IdentityResolver, TaskView,
};
pub use procfs::ProcFs;
pub use table::{AggregateTable, BoundedTable, TableUsage, Upsert};
pub use unit_state::PerUnitState;
