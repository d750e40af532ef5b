//! Drives the aggregation core from a recorded trace
//!
//! Events are split by execution unit. Each unit's events are replayed in
//! file order on its own blocking worker, so switches on one unit stay
//! ordered while table updates from different units interleave freely.
//!
//! A trace can be replayed as one window or cut into fixed intervals. The
//! [`Replayer`] keeps its per-unit state between intervals, so an entity
//! that is running when an interval closes is charged in the next one.

pub mod tasks;
pub mod trace;

pub use tasks::{ReplayContext, TaskTable, TraceComms};
pub use trace::{FaultEvent, SwitchEvent, TaskSpec, Trace, TraceEvent, MAX_UNITS};

use crate::config::validate_capacities;
use crate::error::{HotspotError, Result};
use futures::future::join_all;
use hotspot_agent::{EventDispatcher, HierarchyResolver, IdentityResolver, TableCapacities};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Execution unit count; derived from the highest unit in the trace
    /// when unset.
    pub units: Option<usize>,
    /// Window length; the span of switch timestamps when unset.
    pub window: Option<Duration>,
    pub capacities: TableCapacities,
}

/// Aggregation state after a full replay.
pub struct Replay {
    pub dispatcher: Arc<EventDispatcher>,
    pub tasks: Arc<TaskTable>,
    pub units: usize,
    pub window: Duration,
    pub events: usize,
}

/// Events of one interval, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceWindow {
    /// Position of the interval counted from the first switch
    pub index: u64,
    /// Offset of the interval start from the first switch
    pub start: Duration,
    pub events: Vec<TraceEvent>,
}

/// Dispatcher and task table that outlive individual windows.
pub struct Replayer {
    pub dispatcher: Arc<EventDispatcher>,
    pub tasks: Arc<TaskTable>,
    pub units: usize,
}

impl Replayer {
    pub fn new(tasks: &[TaskSpec], units: usize, capacities: TableCapacities) -> Result<Self> {
        if units == 0 {
            return Err(HotspotError::Config(
                "unit count must be greater than zero".to_string(),
            ));
        }
        if units > MAX_UNITS as usize {
            return Err(HotspotError::Config(format!(
                "unit count {} exceeds the supported {}",
                units, MAX_UNITS
            )));
        }
        validate_capacities(&capacities)?;

        Ok(Self {
            dispatcher: Arc::new(EventDispatcher::new(units, capacities, HierarchyResolver)),
            tasks: Arc::new(TaskTable::from_specs(tasks)),
            units,
        })
    }

    /// Replayer sized for `trace`: `units` if given, else one past its
    /// highest unit.
    pub fn for_trace(
        trace: &Trace,
        units: Option<usize>,
        capacities: TableCapacities,
    ) -> Result<Self> {
        let units = match units {
            Some(units) => units,
            None => trace.max_unit().map_or(1, |unit| unit as usize + 1),
        };
        Self::new(&trace.tasks, units, capacities)
    }

    /// Replay `events` into the tables, one blocking worker per unit.
    pub async fn feed(&self, events: Vec<TraceEvent>) -> Result<usize> {
        let mut partitions: BTreeMap<u32, Vec<TraceEvent>> = BTreeMap::new();
        for event in events {
            partitions.entry(event.unit()).or_default().push(event);
        }

        let stray: Vec<u32> = partitions
            .keys()
            .copied()
            .filter(|unit| *unit as usize >= self.units)
            .collect();
        if !stray.is_empty() {
            warn!(
                "Trace references units {:?} beyond the configured {}; their switches are ignored",
                stray, self.units
            );
        }

        let workers = partitions.into_iter().map(|(unit, events)| {
            let dispatcher = Arc::clone(&self.dispatcher);
            let tasks = Arc::clone(&self.tasks);
            tokio::task::spawn_blocking(move || {
                let count = replay_unit(&*dispatcher, &tasks, &events);
                debug!("Unit {} replayed {} events", unit, count);
                count
            })
        });

        let mut replayed = 0;
        for result in join_all(workers).await {
            replayed += result.map_err(|e| {
                HotspotError::Collector(format!("replay worker failed: {}", e))
            })?;
        }
        Ok(replayed)
    }
}

pub async fn run(trace: Trace, options: ReplayOptions) -> Result<Replay> {
    let replayer = Replayer::for_trace(&trace, options.units, options.capacities)?;
    let window = options.window.unwrap_or_else(|| trace.switch_span());

    info!(
        "Replaying {} events with {} declared tasks",
        trace.events.len(),
        replayer.tasks.len()
    );
    let replayed = replayer.feed(trace.events).await?;
    info!("Replayed {} events over a {:?} window", replayed, window);

    Ok(Replay {
        dispatcher: replayer.dispatcher,
        tasks: replayer.tasks,
        units: replayer.units,
        window,
        events: replayed,
    })
}

/// Cut `events` into consecutive intervals of `interval` measured from the
/// earliest switch timestamp.
///
/// A switch falls in the interval containing its timestamp. A fault carries
/// no timestamp and joins the interval of the last switch seen on its unit,
/// or the first interval if none was. Intervals without events are skipped.
pub fn split_windows(events: Vec<TraceEvent>, interval: Duration) -> Result<Vec<TraceWindow>> {
    let step = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX);
    if step == 0 {
        return Err(HotspotError::Config(
            "interval must be greater than zero".to_string(),
        ));
    }

    let origin = events
        .iter()
        .filter_map(|event| match event {
            TraceEvent::Switch(switch) => Some(switch.ts),
            TraceEvent::Fault(_) => None,
        })
        .min()
        .unwrap_or(0);

    let mut current: HashMap<u32, u64> = HashMap::new();
    let mut windows: BTreeMap<u64, Vec<TraceEvent>> = BTreeMap::new();
    for event in events {
        let index = match event {
            TraceEvent::Switch(switch) => {
                let index = (switch.ts - origin) / step;
                current.insert(switch.unit, index);
                index
            }
            TraceEvent::Fault(fault) => current.get(&fault.unit).copied().unwrap_or(0),
        };
        windows.entry(index).or_default().push(event);
    }

    Ok(windows
        .into_iter()
        .map(|(index, events)| TraceWindow {
            index,
            start: Duration::from_nanos(index.saturating_mul(step)),
            events,
        })
        .collect())
}

/// Feed one unit's events to the dispatcher in order.
///
/// The context for a switch is the outgoing task, for a fault the faulting
/// one.
pub fn replay_unit<R>(
    dispatcher: &EventDispatcher<R>,
    tasks: &TaskTable,
    events: &[TraceEvent],
) -> usize
where
    R: IdentityResolver + Clone,
{
    for event in events {
        match *event {
            TraceEvent::Switch(switch) => dispatcher.on_context_switch(
                &tasks.context(switch.prev),
                switch.unit,
                switch.ts,
                switch.prev,
                switch.next,
            ),
            TraceEvent::Fault(fault) => dispatcher.on_page_fault(&tasks.context(fault.pid)),
        }
    }
    events.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotspot_agent::AggregateTable;
    use std::io::Cursor;

    const TWO_UNITS: &str = r#"
{"kind":"task","pid":10,"comm":"api","cgroup":["kubepods","pod-api"]}
{"kind":"task","pid":20,"comm":"batch","cgroup":["kubepods","pod-batch"]}
{"kind":"switch","unit":0,"ts":1000,"prev":0,"next":10}
{"kind":"switch","unit":1,"ts":1000,"prev":0,"next":20}
{"kind":"switch","unit":0,"ts":1600,"prev":10,"next":20}
{"kind":"switch","unit":1,"ts":1900,"prev":20,"next":10}
{"kind":"fault","unit":1,"pid":10}
{"kind":"switch","unit":0,"ts":2000,"prev":20,"next":0}
"#;

    fn trace(text: &str) -> Trace {
        Trace::parse(Cursor::new(text)).expect("valid trace")
    }

    #[tokio::test]
    async fn test_replay_partitions_by_unit() {
        let replay = run(trace(TWO_UNITS), ReplayOptions::default())
            .await
            .expect("replay succeeds");

        assert_eq!(replay.units, 2);
        assert_eq!(replay.events, 6);
        assert_eq!(replay.window, Duration::from_nanos(1000));

        let stats = replay.dispatcher.pid_stats();
        let api = stats.get(&10).expect("api charged");
        assert_eq!(api.cpu_time_ns, 600);
        assert_eq!(api.comm.as_bytes(), b"api");
        assert_eq!(api.cgroup.as_bytes(), b"pod-api");

        // 900 on unit 1 plus 400 on unit 0
        let batch = stats.get(&20).expect("batch charged");
        assert_eq!(batch.cpu_time_ns, 1300);
        assert_eq!(batch.cgroup.as_bytes(), b"pod-batch");

        assert_eq!(
            replay.dispatcher.fault_counts().get(&10).map(|s| s.faults),
            Some(1)
        );
        assert_eq!(replay.dispatcher.contention_counts().len(), 2);
    }

    #[tokio::test]
    async fn test_replay_overrides() {
        let replay = run(
            trace(TWO_UNITS),
            ReplayOptions {
                units: Some(1),
                window: Some(Duration::from_secs(1)),
                capacities: TableCapacities::default(),
            },
        )
        .await
        .expect("replay succeeds");

        assert_eq!(replay.units, 1);
        assert_eq!(replay.window, Duration::from_secs(1));

        // Unit 1 is out of range: its switches are absorbed, faults still count.
        let stats = replay.dispatcher.pid_stats();
        assert_eq!(stats.get(&10).map(|s| s.cpu_time_ns), Some(600));
        assert_eq!(stats.get(&20).map(|s| s.cpu_time_ns), Some(400));
        assert_eq!(
            replay.dispatcher.fault_counts().get(&10).map(|s| s.faults),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_zero_units_rejected() {
        let result = run(
            trace(TWO_UNITS),
            ReplayOptions {
                units: Some(0),
                ..ReplayOptions::default()
            },
        )
        .await;
        assert!(matches!(result, Err(HotspotError::Config(_))));
    }

    #[tokio::test]
    async fn test_oversized_replay_rejected() {
        let result = run(
            trace(TWO_UNITS),
            ReplayOptions {
                units: Some(MAX_UNITS as usize + 1),
                ..ReplayOptions::default()
            },
        )
        .await;
        assert!(matches!(result, Err(HotspotError::Config(_))));

        let result = run(
            trace(TWO_UNITS),
            ReplayOptions {
                capacities: TableCapacities {
                    faults: usize::MAX,
                    ..TableCapacities::default()
                },
                ..ReplayOptions::default()
            },
        )
        .await;
        assert!(matches!(result, Err(HotspotError::Config(_))));
    }

    #[test]
    fn test_split_windows_by_switch_time() {
        let trace = trace(
            r#"
{"kind":"fault","unit":0,"pid":1}
{"kind":"switch","unit":0,"ts":1000,"prev":0,"next":1}
{"kind":"fault","unit":0,"pid":1}
{"kind":"switch","unit":1,"ts":1500,"prev":0,"next":2}
{"kind":"switch","unit":0,"ts":2100,"prev":1,"next":2}
{"kind":"fault","unit":1,"pid":2}
{"kind":"fault","unit":0,"pid":2}
{"kind":"switch","unit":0,"ts":4000,"prev":2,"next":0}
"#,
        );

        let windows = split_windows(trace.events, Duration::from_nanos(1000))
            .expect("splits");
        let shape: Vec<(u64, Duration, usize)> = windows
            .iter()
            .map(|w| (w.index, w.start, w.events.len()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (0, Duration::ZERO, 5),
                (1, Duration::from_nanos(1000), 2),
                (3, Duration::from_nanos(3000), 1),
            ]
        );
        // The unit 1 fault follows unit 1's last switch, not the file neighbour.
        assert_eq!(
            windows[0].events[4],
            TraceEvent::Fault(FaultEvent { unit: 1, pid: 2 })
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = split_windows(trace(TWO_UNITS).events, Duration::ZERO);
        assert!(matches!(result, Err(HotspotError::Config(_))));
    }

    #[tokio::test]
    async fn test_replayer_keeps_unit_state_across_feeds() {
        let trace = trace(TWO_UNITS);
        let replayer = Replayer::for_trace(&trace, None, TableCapacities::default())
            .expect("replayer builds");
        let windows = split_windows(trace.events, Duration::from_nanos(500))
            .expect("splits");
        assert_eq!(windows.len(), 3);

        let mut windows = windows.into_iter();
        let first = windows.next().expect("first window");
        replayer.feed(first.events).await.expect("fed");
        assert!(replayer.dispatcher.pid_stats().is_empty());

        // api ran from 1000 to 1600 across the interval boundary.
        let second = windows.next().expect("second window");
        replayer.feed(second.events).await.expect("fed");
        assert_eq!(
            replayer.dispatcher.pid_stats().get(&10).map(|s| s.cpu_time_ns),
            Some(600)
        );
    }

    #[test]
    fn test_undeclared_task_gets_sentinel_group() {
        let dispatcher = EventDispatcher::with_defaults(1);
        let tasks = TaskTable::new();
        let events = [
            TraceEvent::Switch(SwitchEvent {
                unit: 0,
                ts: 0,
                prev: 0,
                next: 5,
            }),
            TraceEvent::Switch(SwitchEvent {
                unit: 0,
                ts: 50,
                prev: 5,
                next: 0,
            }),
        ];

        assert_eq!(replay_unit(&dispatcher, &tasks, &events), 2);
        let stat = dispatcher.pid_stats().get(&5).expect("entity 5 charged");
        assert_eq!(stat.cpu_time_ns, 50);
        assert!(stat.comm.is_empty());
        assert!(stat.cgroup.is_sentinel());
    }
}
