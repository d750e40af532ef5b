use thiserror::Error;

#[derive(Error, Debug)]
pub enum HotspotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Trace error at line {line}: {message}")]
    Trace { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Collector error: {0}")]
    Collector(String),
}

impl From<serde_json::Error> for HotspotError {
    fn from(err: serde_json::Error) -> Self {
        HotspotError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for HotspotError {
    fn from(err: serde_yaml::Error) -> Self {
        HotspotError::Serialization(err.to_string())
    }
}

impl From<prometheus::Error> for HotspotError {
    fn from(err: prometheus::Error) -> Self {
        HotspotError::Metrics(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HotspotError>;
