//! Runtime configuration
//!
//! Settings come from an optional YAML file and are then overridden by
//! command line flags.

use crate::error::{HotspotError, Result};
use hotspot_agent::TableCapacities;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rows shown per report section unless configured otherwise
pub const DEFAULT_TOP_K: usize = 5;

/// Largest accepted entry count for any aggregation table
pub const MAX_TABLE_CAPACITY: usize = 1 << 20;

/// procfs mount point used for names and memory sizes not found in a trace
pub const DEFAULT_PROCFS_ROOT: &str = "/proc";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capacities: TableCapacities,
    pub report: ReportConfig,
    pub procfs_root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_k: usize,
    pub hide_kernel: bool,
    /// Case-insensitive substring the cgroup path must contain
    pub cgroup_filter: Option<String>,
    /// Host memory size used for RSS ratios; read from procfs when unset
    pub total_memory_bytes: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacities: TableCapacities::default(),
            report: ReportConfig::default(),
            procfs_root: PathBuf::from(DEFAULT_PROCFS_ROOT),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            hide_kernel: true,
            cgroup_filter: None,
            total_memory_bytes: None,
        }
    }
}

/// Command line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub top_k: Option<usize>,
    pub show_kernel: bool,
    pub cgroup_filter: Option<String>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            HotspotError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(data)
            .map_err(|e| HotspotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config.normalized())
    }

    /// File settings if `path` is given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(top_k) = overrides.top_k {
            self.report.top_k = top_k;
        }
        if overrides.show_kernel {
            self.report.hide_kernel = false;
        }
        if overrides.cgroup_filter.is_some() {
            self.report.cgroup_filter = overrides.cgroup_filter;
        }
        self.normalized()
    }

    pub fn validate(&self) -> Result<()> {
        validate_capacities(&self.capacities)
    }

    fn normalized(mut self) -> Self {
        self.report.top_k = self.report.top_k.max(1);
        self.report.cgroup_filter = self
            .report
            .cgroup_filter
            .take()
            .map(|filter| filter.trim().to_lowercase())
            .filter(|filter| !filter.is_empty());
        self
    }
}

/// Reject table sizes that are empty or too large to allocate up front.
pub fn validate_capacities(caps: &TableCapacities) -> Result<()> {
    for (name, capacity) in [
        ("pid_stats", caps.pid_stats),
        ("contention", caps.contention),
        ("faults", caps.faults),
    ] {
        if capacity == 0 {
            return Err(HotspotError::Config(format!(
                "capacity of table {} must be greater than zero",
                name
            )));
        }
        if capacity > MAX_TABLE_CAPACITY {
            return Err(HotspotError::Config(format!(
                "capacity of table {} is {}, the limit is {}",
                name, capacity, MAX_TABLE_CAPACITY
            )));
        }
    }
    Ok(())
}
