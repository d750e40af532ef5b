//! Report rendering and delivery

pub mod table;

use crate::error::Result;
use crate::metrics::PrometheusExporter;
use crate::report::Report;
use clap::ValueEnum;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
    Prometheus,
}

pub fn render(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::render(report)),
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(report)?;
            text.push('\n');
            Ok(text)
        }
        OutputFormat::Yaml => Ok(serde_yaml::to_string(report)?),
        OutputFormat::Prometheus => PrometheusExporter::render(report),
    }
}

/// Render consecutive interval reports as one document.
///
/// Tables are printed one after another; JSON and YAML become a list.
/// Prometheus exposition has no notion of history, so only the latest
/// interval is exported.
pub fn render_windows(reports: &[Report], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(reports
            .iter()
            .map(table::render)
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(reports)?;
            text.push('\n');
            Ok(text)
        }
        OutputFormat::Yaml => Ok(serde_yaml::to_string(reports)?),
        OutputFormat::Prometheus => match reports.last() {
            Some(report) => PrometheusExporter::render(report),
            None => Ok(String::new()),
        },
    }
}

/// Write `contents` to `path`, or to stdout when no path is given.
pub fn emit(contents: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, contents)?;
            info!("Report written to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(contents.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotspot_agent::TableUsage;
    use tempfile::TempDir;

    fn report() -> Report {
        Report {
            window_index: 0,
            window_start_ns: 0,
            window_ns: 1_000,
            units: 1,
            top_k: 5,
            hide_kernel: true,
            cgroup_filter: Some("pod".to_string()),
            focus: None,
            rows: vec![],
            cpu: vec![],
            contention: vec![],
            cpu_cost: vec![],
            saturation: vec![TableUsage {
                table: "contention",
                entries: 2,
                capacity: 2048,
                dropped: 1,
            }],
        }
    }

    #[test]
    fn test_json_output() {
        let text = render(&report(), OutputFormat::Json).expect("json renders");
        let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");

        assert_eq!(value["window_ns"], 1_000);
        assert_eq!(value["cgroup_filter"], "pod");
        assert_eq!(value["saturation"][0]["table"], "contention");
        assert_eq!(value["saturation"][0]["dropped"], 1);
        assert!(value["focus"].is_null());
    }

    #[test]
    fn test_yaml_output() {
        let text = render(&report(), OutputFormat::Yaml).expect("yaml renders");
        let value: serde_yaml::Value = serde_yaml::from_str(&text).expect("valid yaml");

        assert_eq!(value["units"].as_u64(), Some(1));
        assert_eq!(value["saturation"][0]["capacity"].as_u64(), Some(2048));
    }

    #[test]
    fn test_table_and_prometheus_output() {
        let table = render(&report(), OutputFormat::Table).expect("table renders");
        assert!(table.contains("[Table saturation]"));

        let metrics = render(&report(), OutputFormat::Prometheus).expect("metrics render");
        assert!(metrics.contains(r#"hotspot_table_dropped_inserts{table="contention"} 1"#));
    }

    #[test]
    fn test_render_windows() {
        let mut second = report();
        second.window_index = 1;
        second.window_start_ns = 1_000;
        second.saturation[0].dropped = 0;
        let reports = vec![report(), second];

        let text = render_windows(&reports, OutputFormat::Json).expect("json renders");
        let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        assert_eq!(value[1]["window_index"], 1);
        assert_eq!(value[1]["window_start_ns"], 1_000);

        let table = render_windows(&reports, OutputFormat::Table).expect("table renders");
        assert_eq!(table.matches("[Table saturation]").count(), 2);
        assert!(table.contains("Window 1: 1µs from +1µs"));

        let metrics = render_windows(&reports, OutputFormat::Prometheus).expect("renders");
        assert!(metrics.contains(r#"hotspot_table_dropped_inserts{table="contention"} 0"#));

        assert!(render_windows(&[], OutputFormat::Prometheus)
            .expect("renders")
            .is_empty());
    }

    #[test]
    fn test_emit_to_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("report.txt");

        emit("hello\n", Some(&path)).expect("written");
        assert_eq!(fs::read_to_string(&path).expect("readable"), "hello\n");
    }
}
