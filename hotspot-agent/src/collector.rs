//! Read side of the aggregation tables
//!
//! Snapshots the tables at the end of a sampling window, labels entities,
//! ranks them, and clears the tables for the next window. Reads run
//! concurrently with writers and see weakly consistent values.

use crate::dispatcher::EventDispatcher;
use crate::procfs::ProcFs;
use crate::table::{AggregateTable, TableUsage};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// CPU time consumed by one entity during a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuStat {
    pub pid: u32,
    pub comm: String,
    pub cgroup: String,
    pub ns: u64,
}

/// How often one entity was displaced by another during a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentionStat {
    pub victim_pid: u32,
    pub victim_comm: String,
    pub aggressor_pid: u32,
    pub aggressor_comm: String,
    pub count: u64,
}

/// Page faults taken by one entity during a window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageFaultStat {
    pub pid: u32,
    pub comm: String,
    pub cgroup: String,
    pub faults: u64,
    pub faults_per_sec: f64,
}

/// Source of display names for entities that have no name in the table.
pub trait CommSource {
    fn comm_for(&mut self, pid: u32) -> String;
}

/// Names from `/proc/<pid>/comm`, cached for the lifetime of the value.
pub struct ProcComms {
    procfs: ProcFs,
    cache: HashMap<u32, String>,
}

impl ProcComms {
    pub fn new(procfs: ProcFs) -> Self {
        Self {
            procfs,
            cache: HashMap::new(),
        }
    }
}

impl CommSource for ProcComms {
    fn comm_for(&mut self, pid: u32) -> String {
        self.procfs.comm_for_pid(pid, &mut self.cache)
    }
}

/// Snapshot and reset helper over a dispatcher's tables.
pub struct Collector<'a, R> {
    dispatcher: &'a EventDispatcher<R>,
}

impl<'a, R> Collector<'a, R> {
    pub fn new(dispatcher: &'a EventDispatcher<R>) -> Self {
        Self { dispatcher }
    }

    /// Top `limit` CPU consumers (all of them if `limit` is 0).
    pub fn cpu_snapshot(&self, limit: usize) -> Vec<CpuStat> {
        let mut stats = Vec::new();
        self.dispatcher.pid_stats().for_each(|pid, stat| {
            if stat.cpu_time_ns == 0 {
                return;
            }
            stats.push(CpuStat {
                pid: *pid,
                comm: stat.comm.to_string_lossy(),
                cgroup: stat.cgroup.to_string_lossy(),
                ns: stat.cpu_time_ns,
            });
        });

        stats.sort_by(|a, b| b.ns.cmp(&a.ns).then(a.pid.cmp(&b.pid)));
        truncate(&mut stats, limit);
        stats
    }

    /// Busiest victim/aggressor pairs, labelled through `comms`.
    pub fn contention<S: CommSource>(&self, limit: usize, comms: &mut S) -> Vec<ContentionStat> {
        let mut pairs = Vec::new();
        self.dispatcher.contention_counts().for_each(|key, count| {
            if *count > 0 {
                pairs.push((*key, *count));
            }
        });

        // Label after iterating so no shard lock is held during lookups.
        let mut stats: Vec<ContentionStat> = pairs
            .into_iter()
            .map(|(key, count)| ContentionStat {
                victim_pid: key.victim(),
                victim_comm: comms.comm_for(key.victim()),
                aggressor_pid: key.aggressor(),
                aggressor_comm: comms.comm_for(key.aggressor()),
                count,
            })
            .collect();

        stats.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.victim_pid.cmp(&b.victim_pid))
                .then(a.aggressor_pid.cmp(&b.aggressor_pid))
        });
        truncate(&mut stats, limit);
        stats
    }

    /// Busiest faulting entities with their rate over `window`.
    ///
    /// A zero window is treated as one second.
    pub fn page_faults<S: CommSource>(
        &self,
        limit: usize,
        window: Duration,
        comms: &mut S,
    ) -> Vec<PageFaultStat> {
        let mut entries = Vec::new();
        self.dispatcher.fault_counts().for_each(|pid, stat| {
            if stat.faults > 0 {
                entries.push((*pid, stat.faults, stat.cgroup.to_string_lossy()));
            }
        });

        let window_secs = match window.as_secs_f64() {
            secs if secs > 0.0 => secs,
            _ => 1.0,
        };

        let mut stats: Vec<PageFaultStat> = entries
            .into_iter()
            .map(|(pid, faults, cgroup)| PageFaultStat {
                pid,
                comm: comms.comm_for(pid),
                cgroup,
                faults,
                faults_per_sec: faults as f64 / window_secs,
            })
            .collect();

        stats.sort_by(|a, b| b.faults.cmp(&a.faults).then(a.pid.cmp(&b.pid)));
        truncate(&mut stats, limit);
        stats
    }

    /// Fill level and dropped-insert counters of every table.
    pub fn saturation(&self) -> [TableUsage; 3] {
        self.dispatcher.usage()
    }

    /// Clear all tables so the next window starts from zero.
    ///
    /// Per-unit scratch state is kept: the entity running across the window
    /// boundary is charged in the next window.
    pub fn reset(&self) {
        let pids = self.dispatcher.pid_stats().clear();
        let pairs = self.dispatcher.contention_counts().clear();
        let faults = self.dispatcher.fault_counts().clear();

        debug!(
            "Reset window: cleared {} pid stats, {} contention pairs, {} fault entries",
            pids, pairs, faults
        );
    }
}

fn truncate<T>(rows: &mut Vec<T>, limit: usize) {
    if limit > 0 && rows.len() > limit {
        rows.truncate(limit);
    }
}
