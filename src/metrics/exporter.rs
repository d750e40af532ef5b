use crate::error::{HotspotError, Result};
use crate::report::Report;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

/// Renders a report in the Prometheus text exposition format
pub struct PrometheusExporter {
    registry: Registry,
    cpu_time: IntGaugeVec,
    page_faults: IntGaugeVec,
    contention: IntGaugeVec,
    dropped_inserts: IntGaugeVec,
    table_entries: IntGaugeVec,
}

impl PrometheusExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cpu_time = gauge(
            &registry,
            "hotspot_cpu_time_ns",
            "CPU time charged to a process during the window",
            &["pid", "comm", "cgroup"],
        )?;
        let page_faults = gauge(
            &registry,
            "hotspot_page_faults",
            "Page faults taken by a process during the window",
            &["pid", "cgroup"],
        )?;
        let contention = gauge(
            &registry,
            "hotspot_contention_total",
            "Times the victim was switched out in favour of the aggressor",
            &["victim", "aggressor"],
        )?;
        let dropped_inserts = gauge(
            &registry,
            "hotspot_table_dropped_inserts",
            "New keys rejected because the table was full",
            &["table"],
        )?;
        let table_entries = gauge(
            &registry,
            "hotspot_table_entries",
            "Entries held by an aggregation table",
            &["table"],
        )?;

        Ok(Self {
            registry,
            cpu_time,
            page_faults,
            contention,
            dropped_inserts,
            table_entries,
        })
    }

    pub fn record(&self, report: &Report) {
        for row in &report.rows {
            let pid = row.pid.to_string();
            if row.cpu_ns > 0 {
                self.cpu_time
                    .with_label_values(&[pid.as_str(), row.comm.as_str(), row.cgroup.as_str()])
                    .set(saturating_i64(row.cpu_ns));
            }
            if row.faults > 0 {
                self.page_faults
                    .with_label_values(&[pid.as_str(), row.cgroup.as_str()])
                    .set(saturating_i64(row.faults));
            }
        }

        for pair in &report.contention {
            let victim = pair.victim_pid.to_string();
            let aggressor = pair.aggressor_pid.to_string();
            self.contention
                .with_label_values(&[victim.as_str(), aggressor.as_str()])
                .set(saturating_i64(pair.count));
        }

        for usage in &report.saturation {
            self.dropped_inserts
                .with_label_values(&[usage.table])
                .set(saturating_i64(usage.dropped));
            self.table_entries
                .with_label_values(&[usage.table])
                .set(saturating_i64(usage.entries as u64));
        }
    }

    pub fn encode(&self) -> Result<String> {
        let families = self.registry.gather();
        debug!("Encoding {} metric families", families.len());

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| HotspotError::Metrics(e.to_string()))
    }

    /// Exposition text for a single report.
    pub fn render(report: &Report) -> Result<String> {
        let exporter = Self::new()?;
        exporter.record(report);
        exporter.encode()
    }
}

fn gauge(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<IntGaugeVec> {
    let gauge = IntGaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
