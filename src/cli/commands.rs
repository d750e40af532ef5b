use crate::cli::{Commands, ReplayArgs};
use crate::config::{Config, Overrides};
use crate::output;
use crate::replay::{self, Replayer, Trace, TraceComms};
use crate::report::{Report, Snapshot, WindowShape};
use crate::Result;
use hotspot_agent::{Collector, EventDispatcher, ProcComms, ProcFs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Replay(args) => handle_replay(args).await,
    }
}

async fn handle_replay(args: ReplayArgs) -> Result<()> {
    info!("Replay requested - trace: {}", args.trace.display());

    let config = Config::load(args.config.as_deref())?.with_overrides(Overrides {
        top_k: args.topk,
        show_kernel: args.show_kernel,
        cgroup_filter: args.cgroup_filter.clone(),
    });
    if let Some(filter) = &config.report.cgroup_filter {
        info!("Cgroup filter: {}", filter);
    }

    let text = match args.interval {
        Some(interval) => {
            let interval = Duration::from_millis(interval);
            let reports = build_reports(&args.trace, &config, args.units, interval).await?;
            output::render_windows(&reports, args.format)?
        }
        None => {
            let window = args.window.map(Duration::from_millis);
            let report = build_report(&args.trace, &config, args.units, window).await?;
            output::render(&report, args.format)?
        }
    };
    output::emit(&text, args.output.as_deref())
}

/// Replay `trace_path` as a single window and build its report.
pub async fn build_report(
    trace_path: &Path,
    config: &Config,
    units: Option<usize>,
    window: Option<Duration>,
) -> Result<Report> {
    let trace = Trace::from_path(trace_path)?;
    let window = window.unwrap_or_else(|| trace.switch_span());
    let replayer = Replayer::for_trace(&trace, units, config.capacities)?;
    let events = replayer.feed(trace.events).await?;
    info!("Replayed {} events over a {:?} window", events, window);

    let procfs = ProcFs::with_root(config.procfs_root.clone());
    let total_memory_bytes = total_memory(config, &procfs);
    Ok(window_report(&replayer, config, &procfs, window, total_memory_bytes))
}

/// Replay `trace_path` in consecutive intervals, reporting and clearing the
/// tables after each one.
pub async fn build_reports(
    trace_path: &Path,
    config: &Config,
    units: Option<usize>,
    interval: Duration,
) -> Result<Vec<Report>> {
    let trace = Trace::from_path(trace_path)?;
    let replayer = Replayer::for_trace(&trace, units, config.capacities)?;
    let windows = replay::split_windows(trace.events, interval)?;
    info!(
        "Replaying {} intervals of {:?} with {} declared tasks",
        windows.len(),
        interval,
        replayer.tasks.len()
    );

    let procfs = ProcFs::with_root(config.procfs_root.clone());
    let total_memory_bytes = total_memory(config, &procfs);

    let mut reports = Vec::with_capacity(windows.len());
    for window in windows {
        let events = replayer.feed(window.events).await?;
        debug!("Interval {} replayed {} events", window.index, events);

        let mut report = window_report(&replayer, config, &procfs, interval, total_memory_bytes);
        report.window_index = window.index;
        report.window_start_ns = u64::try_from(window.start.as_nanos()).unwrap_or(u64::MAX);
        reports.push(report);
    }
    Ok(reports)
}

/// Snapshot the tables, build the report for `window`, then clear the
/// tables for the next one. Per-unit state is kept.
fn window_report(
    replayer: &Replayer,
    config: &Config,
    procfs: &ProcFs,
    window: Duration,
    total_memory_bytes: u64,
) -> Report {
    let dispatcher: &EventDispatcher = &replayer.dispatcher;
    let collector = Collector::new(dispatcher);
    let mut comms = TraceComms::new(&replayer.tasks, ProcComms::new(procfs.clone()));
    let snapshot = Snapshot::collect(&collector, config.report.top_k, window, &mut comms);

    let mut rss = replayer.tasks.rss_bytes();
    let missing: Vec<u32> = snapshot
        .pids()
        .into_iter()
        .filter(|pid| !rss.contains_key(pid))
        .collect();
    rss.extend(procfs.rss_for_pids(&missing));

    let dropped: u64 = snapshot.saturation.iter().map(|usage| usage.dropped).sum();
    if dropped > 0 {
        warn!("{} inserts were dropped by full tables", dropped);
    }

    let report = Report::build(
        snapshot,
        WindowShape {
            window,
            units: replayer.units,
        },
        &rss,
        total_memory_bytes,
        &config.report,
    );
    collector.reset();
    report
}

fn total_memory(config: &Config, procfs: &ProcFs) -> u64 {
    match config.report.total_memory_bytes {
        Some(bytes) => bytes,
        None => procfs.total_memory_bytes().unwrap_or_else(|e| {
            warn!("Total memory unavailable, RSS ratios disabled: {}", e);
            1
        }),
    }
}
