pub mod commands;

use crate::output::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hotspot")]
#[command(author = "srodi")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Per-CPU CPU time, contention and page-fault hotspot analysis",
    long_about = None
)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Aggregate a recorded scheduler trace and report hotspots")]
    Replay(ReplayArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ReplayArgs {
    #[arg(help = "Trace file in JSON Lines format")]
    pub trace: PathBuf,

    #[arg(long, help = "Number of execution units (default: highest unit in the trace + 1)")]
    pub units: Option<usize>,

    #[arg(
        long,
        value_name = "DURATION_MS",
        help = "Window length in milliseconds (default: span of switch timestamps)"
    )]
    pub window: Option<u64>,

    #[arg(
        long,
        value_name = "DURATION_MS",
        conflicts_with = "window",
        help = "Report and reset the tables every DURATION_MS of trace time"
    )]
    pub interval: Option<u64>,

    #[arg(long, help = "Number of processes to display per section")]
    pub topk: Option<usize>,

    #[arg(long, help = "Show kernel threads such as kworker and ksoftirqd")]
    pub show_kernel: bool,

    #[arg(
        long,
        help = "Only show processes whose cgroup contains this substring (case-insensitive)"
    )]
    pub cgroup_filter: Option<String>,

    #[arg(
        short,
        long,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Output format"
    )]
    pub format: OutputFormat,

    #[arg(short, long, help = "Output file path")]
    pub output: Option<PathBuf>,

    #[arg(short, long, help = "YAML configuration file")]
    pub config: Option<PathBuf>,
}
