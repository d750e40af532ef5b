//! Row filters applied before ranking

use crate::config::ReportConfig;
use crate::report::metrics::ProcMetrics;
use hotspot_agent::ContentionStat;
use std::collections::HashMap;

const KERNEL_THREAD_PREFIXES: &[&str] = &[
    "kworker",
    "ksoftirqd",
    "kthreadd",
    "migration",
    "watchdog",
    "rcu",
    "irq/",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub hide_kernel: bool,
    /// Lowercased substring the cgroup path must contain
    pub cgroup_filter: Option<String>,
}

impl FilterConfig {
    pub fn new(hide_kernel: bool, cgroup_filter: Option<&str>) -> Self {
        Self {
            hide_kernel,
            cgroup_filter: cgroup_filter
                .map(|filter| filter.trim().to_lowercase())
                .filter(|filter| !filter.is_empty()),
        }
    }

    fn matches_cgroup(&self, cgroup: &str) -> bool {
        match &self.cgroup_filter {
            Some(filter) => cgroup.to_lowercase().contains(filter.as_str()),
            None => true,
        }
    }

    fn passes(&self, row: &ProcMetrics) -> bool {
        if self.hide_kernel && is_kernel_thread(row) {
            return false;
        }
        self.matches_cgroup(&row.cgroup)
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::new(true, None)
    }
}

impl From<&ReportConfig> for FilterConfig {
    fn from(config: &ReportConfig) -> Self {
        Self::new(config.hide_kernel, config.cgroup_filter.as_deref())
    }
}

pub fn is_kernel_thread(row: &ProcMetrics) -> bool {
    if row.pid == 0 {
        return true;
    }
    let name = row.comm.to_lowercase();
    KERNEL_THREAD_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

pub fn filter_metrics(rows: &[ProcMetrics], filter: &FilterConfig) -> Vec<ProcMetrics> {
    rows.iter()
        .filter(|row| filter.passes(row))
        .cloned()
        .collect()
}

/// Contention pairs whose ends are both known rows and survive the filters.
///
/// The kernel-thread filter applies to both ends; the cgroup filter needs
/// only one end to match. At most `top_k` pairs are kept when it is
/// non-zero.
pub fn filter_contention_rows(
    entries: &[ContentionStat],
    filter: &FilterConfig,
    index: &HashMap<u32, &ProcMetrics>,
    top_k: usize,
) -> Vec<ContentionStat> {
    let mut rows: Vec<ContentionStat> = entries
        .iter()
        .filter(|entry| {
            let (victim, aggressor) = match (
                index.get(&entry.victim_pid),
                index.get(&entry.aggressor_pid),
            ) {
                (Some(victim), Some(aggressor)) => (victim, aggressor),
                _ => return false,
            };
            if filter.hide_kernel && (is_kernel_thread(victim) || is_kernel_thread(aggressor)) {
                return false;
            }
            filter.matches_cgroup(&victim.cgroup) || filter.matches_cgroup(&aggressor.cgroup)
        })
        .cloned()
        .collect();

    if top_k > 0 && rows.len() > top_k {
        rows.truncate(top_k);
    }
    rows
}
