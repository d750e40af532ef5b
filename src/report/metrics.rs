//! Per-process rows merged from one window's snapshots

use crate::report::diagnosis::Diagnosis;
use hotspot_agent::{ContentionStat, CpuStat, PageFaultStat};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// CPU, memory, and contention figures for one process during a window
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProcMetrics {
    pub pid: u32,
    pub comm: String,
    pub cgroup: String,
    pub cpu_ns: u64,
    pub cpu_ms: f64,
    pub cpu_percent: f64,
    pub rss_mb: f64,
    pub rss_ratio: f64,
    pub faults: u64,
    pub faults_per_sec: f64,
    pub cpu_cost_per_fault: f64,
    pub preempted: u64,
    pub preempts_others: u64,
    pub diagnosis: Diagnosis,
}

/// Shape of the window the snapshots were taken over
#[derive(Debug, Clone, Copy)]
pub struct WindowShape {
    pub window: Duration,
    /// Execution units sharing the window; CPU% is relative to all of them
    pub units: usize,
}

/// Merge snapshots into one row per pid, sorted by pid.
///
/// pid 0 is never reported. `rss` holds resident bytes for the pids it
/// knows; `total_memory_bytes` of 0 is treated as 1.
pub fn build_proc_metrics(
    cpu: &[CpuStat],
    faults: &[PageFaultStat],
    contention: &[ContentionStat],
    shape: WindowShape,
    rss: &HashMap<u32, u64>,
    total_memory_bytes: u64,
) -> Vec<ProcMetrics> {
    let mut rows: HashMap<u32, ProcMetrics> = HashMap::new();
    let total_memory = total_memory_bytes.max(1) as f64;
    let total_capacity_ns = shape.window.as_nanos() as f64 * shape.units as f64;
    let window_secs = match shape.window.as_secs_f64() {
        secs if secs > 0.0 => secs,
        _ => 1.0,
    };

    for stat in cpu {
        if let Some(row) = ensure(&mut rows, stat.pid) {
            row.comm = stat.comm.clone();
            if row.cgroup.is_empty() {
                row.cgroup = stat.cgroup.clone();
            }
            row.cpu_ns = stat.ns;
            row.cpu_ms = stat.ns as f64 / 1e6;
            if total_capacity_ns > 0.0 {
                row.cpu_percent = 100.0 * stat.ns as f64 / total_capacity_ns;
            }
        }
    }

    for stat in faults {
        if let Some(row) = ensure(&mut rows, stat.pid) {
            if row.comm.is_empty() {
                row.comm = stat.comm.clone();
            }
            if row.cgroup.is_empty() {
                row.cgroup = stat.cgroup.clone();
            }
            row.faults = stat.faults;
            row.faults_per_sec = stat.faults_per_sec;
        }
    }

    for pair in contention {
        if let Some(victim) = ensure(&mut rows, pair.victim_pid) {
            if victim.comm.is_empty() {
                victim.comm = pair.victim_comm.clone();
            }
            victim.preempted += pair.count;
        }
        if let Some(aggressor) = ensure(&mut rows, pair.aggressor_pid) {
            if aggressor.comm.is_empty() {
                aggressor.comm = pair.aggressor_comm.clone();
            }
            aggressor.preempts_others += pair.count;
        }
    }

    let mut result: Vec<ProcMetrics> = rows
        .into_values()
        .map(|mut row| {
            if let Some(bytes) = rss.get(&row.pid) {
                row.rss_mb = *bytes as f64 / BYTES_PER_MB;
            }
            row.rss_ratio = row.rss_mb * BYTES_PER_MB / total_memory;

            let cpu_ms_per_sec = row.cpu_ms / window_secs;
            let fault_rate = if row.faults_per_sec == 0.0 && row.faults > 0 {
                row.faults as f64 / window_secs
            } else {
                row.faults_per_sec
            };
            row.cpu_cost_per_fault = cpu_ms_per_sec / (fault_rate + 1.0);
            row.diagnosis = Diagnosis::classify(&row);
            row
        })
        .collect();

    result.sort_by_key(|row| row.pid);
    result
}

/// Rows keyed by pid.
pub fn index_by_pid(rows: &[ProcMetrics]) -> HashMap<u32, &ProcMetrics> {
    rows.iter().map(|row| (row.pid, row)).collect()
}

fn ensure(rows: &mut HashMap<u32, ProcMetrics>, pid: u32) -> Option<&mut ProcMetrics> {
    if pid == 0 {
        return None;
    }
    Some(rows.entry(pid).or_insert_with(|| ProcMetrics {
        pid,
        ..ProcMetrics::default()
    }))
}
