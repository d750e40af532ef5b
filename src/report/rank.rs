//! Orderings used by the report sections

use crate::report::metrics::ProcMetrics;
use std::cmp::Ordering;

/// Rows with CPU time, busiest first.
pub fn cpu_usage_rows(rows: &[ProcMetrics], top_k: usize) -> Vec<ProcMetrics> {
    let mut candidates: Vec<ProcMetrics> =
        rows.iter().filter(|row| row.cpu_ns > 0).cloned().collect();
    candidates.sort_by(|a, b| b.cpu_ns.cmp(&a.cpu_ns).then(a.pid.cmp(&b.pid)));
    limit(&mut candidates, top_k);
    candidates
}

/// Rows with faults or CPU time, cheapest CPU cost per fault first.
///
/// Ties go to the higher fault rate.
pub fn cpu_cost_rows(rows: &[ProcMetrics], top_k: usize) -> Vec<ProcMetrics> {
    let mut candidates: Vec<ProcMetrics> = rows
        .iter()
        .filter(|row| row.faults > 0 || row.cpu_ms > 0.0)
        .cloned()
        .collect();
    candidates.sort_by(|a, b| match a.cpu_cost_per_fault.total_cmp(&b.cpu_cost_per_fault) {
        Ordering::Equal => b.faults_per_sec.total_cmp(&a.faults_per_sec),
        other => other,
    });
    limit(&mut candidates, top_k);
    candidates
}

/// The process most worth an operator's attention.
///
/// Rows that are healthy and nearly idle are skipped; among the rest the
/// highest `severity * 1000 + cpu%` wins. If every row was skipped, the
/// busiest row is returned.
pub fn select_focus_candidate(rows: &[ProcMetrics]) -> Option<ProcMetrics> {
    let mut best: Option<(&ProcMetrics, f64)> = None;
    for row in rows {
        let severity = row.diagnosis.severity();
        if severity == 0 && row.cpu_percent < 1.0 && row.faults_per_sec < 1.0 {
            continue;
        }
        let score = f64::from(severity) * 1000.0 + row.cpu_percent;
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((row, score)),
        }
    }

    if let Some((row, _)) = best {
        return Some(row.clone());
    }

    let mut busiest = rows.first()?;
    for row in &rows[1..] {
        if row.cpu_percent > busiest.cpu_percent {
            busiest = row;
        }
    }
    Some(busiest.clone())
}

fn limit(rows: &mut Vec<ProcMetrics>, top_k: usize) {
    if top_k > 0 && rows.len() > top_k {
        rows.truncate(top_k);
    }
}
