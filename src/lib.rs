pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod output;
pub mod replay;
pub mod report;

pub use error::{HotspotError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
