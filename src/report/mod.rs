//! Turns one window of aggregated tables into a ranked, diagnosed report

pub mod diagnosis;
pub mod filter;
pub mod metrics;
pub mod rank;

pub use diagnosis::{focus_summary, Diagnosis};
pub use filter::{filter_contention_rows, filter_metrics, is_kernel_thread, FilterConfig};
pub use metrics::{build_proc_metrics, index_by_pid, ProcMetrics, WindowShape};
pub use rank::{cpu_cost_rows, cpu_usage_rows, select_focus_candidate};

use crate::config::ReportConfig;
use hotspot_agent::{Collector, CommSource, ContentionStat, CpuStat, PageFaultStat, TableUsage};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Raw table contents read at the end of a window
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub cpu: Vec<CpuStat>,
    pub faults: Vec<PageFaultStat>,
    pub contention: Vec<ContentionStat>,
    pub saturation: Vec<TableUsage>,
}

impl Snapshot {
    /// Read the tables, keeping enough rows per table that `top_k` rows
    /// per section survive filtering.
    pub fn collect<R, S>(
        collector: &Collector<'_, R>,
        top_k: usize,
        window: Duration,
        comms: &mut S,
    ) -> Self
    where
        S: CommSource,
    {
        let top_k = top_k.max(1);
        Self {
            cpu: collector.cpu_snapshot(top_k * 3),
            contention: collector.contention(top_k * 4, comms),
            faults: collector.page_faults(top_k * 3, window, comms),
            saturation: collector.saturation().to_vec(),
        }
    }

    /// Every non-zero pid mentioned by any table.
    pub fn pids(&self) -> Vec<u32> {
        let mut pids = BTreeSet::new();
        pids.extend(self.cpu.iter().map(|stat| stat.pid));
        pids.extend(self.faults.iter().map(|stat| stat.pid));
        for pair in &self.contention {
            pids.insert(pair.victim_pid);
            pids.insert(pair.aggressor_pid);
        }
        pids.remove(&0);
        pids.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Focus {
    pub pid: u32,
    pub comm: String,
    pub diagnosis: Diagnosis,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Interval position when a trace is replayed in fixed intervals
    pub window_index: u64,
    /// Interval start, relative to the first switch in the trace
    pub window_start_ns: u64,
    pub window_ns: u64,
    pub units: usize,
    pub top_k: usize,
    pub hide_kernel: bool,
    pub cgroup_filter: Option<String>,
    pub focus: Option<Focus>,
    /// Every row that passed the filters, by pid
    pub rows: Vec<ProcMetrics>,
    pub cpu: Vec<ProcMetrics>,
    pub contention: Vec<ContentionStat>,
    pub cpu_cost: Vec<ProcMetrics>,
    pub saturation: Vec<TableUsage>,
}

impl Report {
    pub fn build(
        snapshot: Snapshot,
        shape: WindowShape,
        rss: &HashMap<u32, u64>,
        total_memory_bytes: u64,
        config: &ReportConfig,
    ) -> Self {
        let top_k = config.top_k.max(1);
        let filter = FilterConfig::from(config);

        let all_rows = build_proc_metrics(
            &snapshot.cpu,
            &snapshot.faults,
            &snapshot.contention,
            shape,
            rss,
            total_memory_bytes,
        );
        let index = index_by_pid(&all_rows);
        let contention = filter_contention_rows(&snapshot.contention, &filter, &index, top_k);

        let rows = filter_metrics(&all_rows, &filter);
        let focus = select_focus_candidate(&rows).map(|row| Focus {
            pid: row.pid,
            comm: row.comm.clone(),
            diagnosis: row.diagnosis,
            summary: focus_summary(&row),
        });

        Self {
            window_index: 0,
            window_start_ns: 0,
            window_ns: u64::try_from(shape.window.as_nanos()).unwrap_or(u64::MAX),
            units: shape.units,
            top_k,
            hide_kernel: filter.hide_kernel,
            cgroup_filter: filter.cgroup_filter.clone(),
            focus,
            cpu: cpu_usage_rows(&rows, top_k),
            cpu_cost: cpu_cost_rows(&rows, top_k * 2),
            contention,
            rows,
            saturation: snapshot.saturation,
        }
    }

    /// Inserts rejected by any table since the tables were created.
    pub fn dropped_inserts(&self) -> u64 {
        self.saturation.iter().map(|usage| usage.dropped).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            cpu: vec![
                CpuStat {
                    pid: 1,
                    comm: "api".to_string(),
                    cgroup: "pod-api".to_string(),
                    ns: 900_000_000,
                },
                CpuStat {
                    pid: 2,
                    comm: "kworker/0:1".to_string(),
                    cgroup: "n/a".to_string(),
                    ns: 50_000_000,
                },
                CpuStat {
                    pid: 3,
                    comm: "batch".to_string(),
                    cgroup: "pod-batch".to_string(),
                    ns: 10_000_000,
                },
            ],
            faults: vec![],
            contention: vec![ContentionStat {
                victim_pid: 3,
                victim_comm: "batch".to_string(),
                aggressor_pid: 1,
                aggressor_comm: "api".to_string(),
                count: 150,
            }],
            saturation: vec![TableUsage {
                table: "pid_stats",
                entries: 3,
                capacity: 3,
                dropped: 4,
            }],
        }
    }

    fn shape() -> WindowShape {
        WindowShape {
            window: Duration::from_secs(1),
            units: 1,
        }
    }

    #[test]
    fn test_build_report() {
        let report = Report::build(
            snapshot(),
            shape(),
            &HashMap::new(),
            1 << 30,
            &ReportConfig::default(),
        );

        assert_eq!(report.window_ns, 1_000_000_000);
        assert_eq!(
            report.rows.iter().map(|r| r.pid).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(
            report.cpu.iter().map(|r| r.pid).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(report.contention.len(), 1);
        assert_eq!(report.dropped_inserts(), 4);

        let batch = report.rows.iter().find(|r| r.pid == 3).expect("batch row");
        assert_eq!(batch.diagnosis, Diagnosis::Starved);
        let api = report.rows.iter().find(|r| r.pid == 1).expect("api row");
        assert_eq!(api.diagnosis, Diagnosis::CpuBound);

        let focus = report.focus.expect("focus chosen");
        assert_eq!(focus.pid, 3);
        assert_eq!(focus.diagnosis, Diagnosis::Starved);
        assert_eq!(focus.summary, "preempted 150x, only 1.0% CPU");
    }

    #[test]
    fn test_cgroup_filter_and_top_k() {
        let config = ReportConfig {
            top_k: 1,
            cgroup_filter: Some("POD-API".to_string()),
            ..ReportConfig::default()
        };
        let report = Report::build(snapshot(), shape(), &HashMap::new(), 1 << 30, &config);

        assert_eq!(report.cgroup_filter.as_deref(), Some("pod-api"));
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.cpu.len(), 1);
        // The aggressor end matches the filter.
        assert_eq!(report.contention.len(), 1);
    }

    #[test]
    fn test_snapshot_pids() {
        let mut snap = snapshot();
        snap.contention.push(ContentionStat {
            victim_pid: 7,
            victim_comm: String::new(),
            aggressor_pid: 0,
            aggressor_comm: String::new(),
            count: 1,
        });
        assert_eq!(snap.pids(), vec![1, 2, 3, 7]);
    }
}
