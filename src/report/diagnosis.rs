//! Per-process classification of one window's behaviour

use crate::report::metrics::ProcMetrics;
use serde::Serialize;
use std::fmt;

/// RSS above which a process counts as large
const BIG_PROCESS_MB: f64 = 1000.0;
/// Share of host memory above which a process counts as large
const HIGH_RSS_RATIO: f64 = 0.3;
/// Fault rate that makes a large process an OOM candidate
const OOM_FAULTS_PER_SEC: f64 = 200.0;

const CPU_BOUND_PERCENT: f64 = 50.0;
const THRASHING_CPU_PERCENT: f64 = 20.0;
const STARVED_PREEMPTIONS: u64 = 100;
const STARVED_CPU_PERCENT: f64 = 10.0;
const NOISY_PREEMPTIONS: u64 = 100;
const NOISY_CPU_PERCENT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    OomRisk,
    CpuBound,
    MemThrashing,
    Starved,
    NoisyNeighbor,
    #[default]
    Ok,
}

impl Diagnosis {
    /// Classify a row. The first matching rule wins.
    pub fn classify(row: &ProcMetrics) -> Self {
        let costly_faults = row.cpu_cost_per_fault > 0.1 && row.faults > 0;
        let very_costly_faults = row.cpu_cost_per_fault > 0.5 && row.faults > 0;

        let big_process = row.rss_mb > BIG_PROCESS_MB || row.rss_ratio > HIGH_RSS_RATIO;
        if big_process && row.faults_per_sec > OOM_FAULTS_PER_SEC {
            return Diagnosis::OomRisk;
        }

        if row.cpu_percent > CPU_BOUND_PERCENT && row.faults_per_sec < 1.0 && row.preempted == 0 {
            return Diagnosis::CpuBound;
        }

        if row.cpu_percent < THRASHING_CPU_PERCENT
            && ((row.faults_per_sec > 1000.0 && very_costly_faults)
                || (row.faults_per_sec > 500.0 && costly_faults))
        {
            return Diagnosis::MemThrashing;
        }

        if row.preempted > STARVED_PREEMPTIONS && row.cpu_percent < STARVED_CPU_PERCENT {
            return Diagnosis::Starved;
        }
        if row.preempts_others > NOISY_PREEMPTIONS && row.cpu_percent > NOISY_CPU_PERCENT {
            return Diagnosis::NoisyNeighbor;
        }

        Diagnosis::Ok
    }

    /// Weight used when picking the process to put in focus.
    ///
    /// OOM risk is reported per row but does not outrank scheduler findings.
    pub fn severity(self) -> u32 {
        match self {
            Diagnosis::MemThrashing => 4,
            Diagnosis::Starved => 3,
            Diagnosis::NoisyNeighbor => 2,
            Diagnosis::CpuBound => 1,
            Diagnosis::OomRisk | Diagnosis::Ok => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Diagnosis::OomRisk => "OOM risk - memory growth",
            Diagnosis::CpuBound => "CPU-bound",
            Diagnosis::MemThrashing => "Mem-thrashing",
            Diagnosis::Starved => "Starved",
            Diagnosis::NoisyNeighbor => "Noisy neighbor",
            Diagnosis::Ok => "OK",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One-line explanation of a row's diagnosis.
pub fn focus_summary(row: &ProcMetrics) -> String {
    match row.diagnosis {
        Diagnosis::MemThrashing => format!(
            "{:.0} faults/sec, {:.1}% CPU, preempted {}x",
            row.faults_per_sec, row.cpu_percent, row.preempted
        ),
        Diagnosis::Starved => format!(
            "preempted {}x, only {:.1}% CPU",
            row.preempted, row.cpu_percent
        ),
        Diagnosis::NoisyNeighbor => format!(
            "steals CPU {}x, running at {:.1}%",
            row.preempts_others, row.cpu_percent
        ),
        Diagnosis::CpuBound => format!(
            "{:.1}% CPU, faults/sec {:.0}",
            row.cpu_percent, row.faults_per_sec
        ),
        Diagnosis::OomRisk => format!(
            "OOM risk - {:.1} GB RSS, {:.0} faults/sec",
            row.rss_mb / 1024.0,
            row.faults_per_sec
        ),
        Diagnosis::Ok => format!(
            "{:.1}% CPU, {:.0} faults/sec",
            row.cpu_percent, row.faults_per_sec
        ),
    }
}
