pub mod exporter;

pub use exporter::PrometheusExporter;
