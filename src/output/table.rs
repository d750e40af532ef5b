//! Plain-text rendering of a report

use crate::report::Report;
use std::fmt::Write;
use std::time::Duration;

/// Spaces between columns
const COLUMN_GAP: usize = 2;

pub fn banner() -> String {
    format!(
        "hotspot v{}  |  CPU time, contention and page-fault hotspots\n",
        crate::VERSION
    )
}

pub fn render(report: &Report) -> String {
    let window = Duration::from_nanos(report.window_ns);
    let mut out = String::new();

    out.push_str(&banner());
    let _ = writeln!(
        out,
        "Window {}: {:?} from +{:?} | Units: {}\n",
        report.window_index,
        window,
        Duration::from_nanos(report.window_start_ns),
        report.units
    );

    match &report.focus {
        Some(focus) => {
            let _ = writeln!(out, "[!] Focus: {} (pid {})", focus.comm, focus.pid);
            let _ = writeln!(out, "   Reason: {} - {}\n", focus.diagnosis, focus.summary);
        }
        None if report.rows.is_empty() => {
            let _ = writeln!(
                out,
                "[!] No processes matched current filters (topk={}, hide-kernel={})\n",
                report.top_k, report.hide_kernel
            );
        }
        None => {}
    }

    let _ = writeln!(out, "[Top {} CPU, window {:?}]", report.top_k, window);
    if report.cpu.is_empty() {
        out.push_str("No CPU samples for this window\n");
    } else {
        let mut table = TextTable::new(&["PID", "COMM", "CGROUP", "CPU(ms)", "CPU(%)", "Diag"]);
        for row in &report.cpu {
            table.row(vec![
                row.pid.to_string(),
                row.comm.clone(),
                row.cgroup.clone(),
                format!("{:.2}", row.cpu_ms),
                format!("{:.2}", row.cpu_percent),
                row.diagnosis.to_string(),
            ]);
        }
        table.render_into(&mut out);
    }

    let _ = writeln!(out, "\n[CPU Contention - last {:?}]", window);
    if report.contention.is_empty() {
        out.push_str("No preemptions recorded in this window\n");
    } else {
        let mut table = TextTable::new(&["PID", "COMM", "PREEMPTED BY", "TIMES"]);
        for pair in &report.contention {
            table.row(vec![
                pair.victim_pid.to_string(),
                pair.victim_comm.clone(),
                format!("{} ({})", pair.aggressor_pid, pair.aggressor_comm),
                pair.count.to_string(),
            ]);
        }
        table.render_into(&mut out);
    }

    out.push_str("\n[CPU Cost per Fault - CPU vs Page Faults]\n");
    if report.cpu_cost.is_empty() {
        out.push_str("No page faults recorded in this window\n");
    } else {
        let mut table = TextTable::new(&[
            "PID",
            "COMM",
            "CGROUP",
            "CPU(ms)",
            "RSS(MB)",
            "Faults",
            "Faults/sec",
            "CPU Cost per Fault (ms)",
            "Diagnosis",
        ]);
        for row in &report.cpu_cost {
            table.row(vec![
                row.pid.to_string(),
                row.comm.clone(),
                row.cgroup.clone(),
                format!("{:.2}", row.cpu_ms),
                format!("{:.1}", row.rss_mb),
                row.faults.to_string(),
                format!("{:.1}", row.faults_per_sec),
                format!("{:.2}", row.cpu_cost_per_fault),
                row.diagnosis.to_string(),
            ]);
        }
        table.render_into(&mut out);
    }

    out.push_str("\n[Table saturation]\n");
    let mut table = TextTable::new(&["TABLE", "ENTRIES", "CAPACITY", "DROPPED"]);
    for usage in &report.saturation {
        table.row(vec![
            usage.table.to_string(),
            usage.entries.to_string(),
            usage.capacity.to_string(),
            usage.dropped.to_string(),
        ]);
    }
    table.render_into(&mut out);

    out
}

/// Left-aligned columns padded to the widest cell
struct TextTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|cell| cell.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn render_into(&self, out: &mut String) {
        let mut widths: Vec<usize> = self
            .header
            .iter()
            .map(|cell| cell.chars().count())
            .collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let width = cell.chars().count();
                match widths.get_mut(i) {
                    Some(current) => *current = (*current).max(width),
                    None => widths.push(width),
                }
            }
        }

        for row in std::iter::once(&self.header).chain(self.rows.iter()) {
            let mut line = String::new();
            for (i, cell) in row.iter().enumerate() {
                line.push_str(cell);
                if i + 1 < row.len() {
                    let pad = widths[i] - cell.chars().count() + COLUMN_GAP;
                    line.extend(std::iter::repeat(' ').take(pad));
                }
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }
}
