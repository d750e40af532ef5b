//! Recorded scheduler trace in JSON Lines form
//!
//! One record per line, discriminated by `kind`:
//!
//! ```text
//! {"kind":"task","pid":42,"comm":"db","cgroup":["system.slice","db.service"],"rss_bytes":1048576}
//! {"kind":"switch","unit":0,"ts":1500,"prev":7,"next":42}
//! {"kind":"fault","unit":0,"pid":42}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use crate::error::{HotspotError, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Highest number of execution units a trace may span.
pub const MAX_UNITS: u32 = 4096;

/// Declaration of a task that may appear in events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskSpec {
    pub pid: u32,
    #[serde(default)]
    pub comm: String,
    /// Group path from root to leaf. `null` or absent means the task has no
    /// membership at all; an empty list means no default-hierarchy node; an
    /// empty component is a node without a name.
    #[serde(default)]
    pub cgroup: Option<Vec<String>>,
    #[serde(default)]
    pub rss_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SwitchEvent {
    pub unit: u32,
    pub ts: u64,
    pub prev: u32,
    pub next: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FaultEvent {
    pub unit: u32,
    pub pid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Switch(SwitchEvent),
    Fault(FaultEvent),
}

impl TraceEvent {
    pub fn unit(&self) -> u32 {
        match self {
            TraceEvent::Switch(event) => event.unit,
            TraceEvent::Fault(event) => event.unit,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Record {
    Task(TaskSpec),
    Switch(SwitchEvent),
    Fault(FaultEvent),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub tasks: Vec<TaskSpec>,
    pub events: Vec<TraceEvent>,
}

impl Trace {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let trace = Self::parse(BufReader::new(file))?;
        debug!(
            "Parsed {}: {} tasks, {} events",
            path.display(),
            trace.tasks.len(),
            trace.events.len()
        );
        Ok(trace)
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut trace = Trace::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = index + 1;
            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let record: Record = serde_json::from_str(text).map_err(|e| HotspotError::Trace {
                line: line_no,
                message: e.to_string(),
            })?;

            match record {
                Record::Task(task) => {
                    if task.pid == 0 {
                        return Err(HotspotError::Trace {
                            line: line_no,
                            message: "pid 0 is reserved for the idle task".to_string(),
                        });
                    }
                    trace.tasks.push(task);
                }
                Record::Switch(event) => {
                    check_unit(event.unit, line_no)?;
                    trace.events.push(TraceEvent::Switch(event));
                }
                Record::Fault(event) => {
                    check_unit(event.unit, line_no)?;
                    trace.events.push(TraceEvent::Fault(event));
                }
            }
        }

        Ok(trace)
    }

    /// Highest unit id referenced by any event.
    pub fn max_unit(&self) -> Option<u32> {
        self.events.iter().map(TraceEvent::unit).max()
    }

    /// Time between the earliest and the latest switch timestamp.
    pub fn switch_span(&self) -> Duration {
        let mut bounds: Option<(u64, u64)> = None;
        for event in &self.events {
            if let TraceEvent::Switch(switch) = event {
                bounds = Some(match bounds {
                    Some((lo, hi)) => (lo.min(switch.ts), hi.max(switch.ts)),
                    None => (switch.ts, switch.ts),
                });
            }
        }

        match bounds {
            Some((lo, hi)) => Duration::from_nanos(hi - lo),
            None => Duration::ZERO,
        }
    }
}

fn check_unit(unit: u32, line: usize) -> Result<()> {
    if unit >= MAX_UNITS {
        return Err(HotspotError::Trace {
            line,
            message: format!("unit {} is beyond the supported {} units", unit, MAX_UNITS),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<Trace> {
        Trace::parse(Cursor::new(text))
    }

    #[test]
    fn test_parses_all_record_kinds() {
        let trace = parse(
            r#"# scenario
{"kind":"task","pid":42,"comm":"db","cgroup":["system.slice","db.service"],"rss_bytes":4096}

{"kind":"switch","unit":1,"ts":150,"prev":0,"next":42}
{"kind":"fault","unit":1,"pid":42}
"#,
        )
        .expect("valid trace");

        assert_eq!(trace.tasks.len(), 1);
        assert_eq!(trace.tasks[0].comm, "db");
        assert_eq!(
            trace.tasks[0].cgroup.as_deref(),
            Some(&["system.slice".to_string(), "db.service".to_string()][..])
        );
        assert_eq!(trace.tasks[0].rss_bytes, Some(4096));
        assert_eq!(
            trace.events,
            vec![
                TraceEvent::Switch(SwitchEvent {
                    unit: 1,
                    ts: 150,
                    prev: 0,
                    next: 42
                }),
                TraceEvent::Fault(FaultEvent { unit: 1, pid: 42 }),
            ]
        );
        assert_eq!(trace.max_unit(), Some(1));
    }

    #[test]
    fn test_task_defaults() {
        let trace = parse(r#"{"kind":"task","pid":3}"#).expect("valid trace");
        assert_eq!(trace.tasks[0].comm, "");
        assert!(trace.tasks[0].cgroup.is_none());
        assert!(trace.tasks[0].rss_bytes.is_none());
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parse("{\"kind\":\"task\",\"pid\":1}\n\n{\"kind\":\"switch\",\"unit\":0}\n")
            .unwrap_err();
        match err {
            HotspotError::Trace { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {}", other),
        }

        let err = parse(r#"{"kind":"warp","unit":0}"#).unwrap_err();
        assert!(matches!(err, HotspotError::Trace { line: 1, .. }));
    }

    #[test]
    fn test_idle_task_declaration_rejected() {
        let err = parse(r#"{"kind":"task","pid":0,"comm":"swapper"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("idle"));
    }

    #[test]
    fn test_out_of_range_unit_rejected() {
        let err = parse(
            "{\"kind\":\"switch\",\"unit\":0,\"ts\":0,\"prev\":0,\"next\":1}\n\
             {\"kind\":\"switch\",\"unit\":4294967295,\"ts\":10,\"prev\":0,\"next\":1}\n",
        )
        .unwrap_err();
        match err {
            HotspotError::Trace { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("4294967295"));
            }
            other => panic!("unexpected error: {}", other),
        }

        let err = parse(&format!(
            "{{\"kind\":\"fault\",\"unit\":{},\"pid\":1}}",
            MAX_UNITS
        ))
        .unwrap_err();
        assert!(matches!(err, HotspotError::Trace { line: 1, .. }));

        let last = format!(
            "{{\"kind\":\"fault\",\"unit\":{},\"pid\":1}}",
            MAX_UNITS - 1
        );
        assert_eq!(
            parse(&last).expect("valid trace").max_unit(),
            Some(MAX_UNITS - 1)
        );
    }

    #[test]
    fn test_switch_span() {
        let trace = parse(
            r#"{"kind":"switch","unit":0,"ts":100,"prev":0,"next":1}
{"kind":"switch","unit":1,"ts":50,"prev":0,"next":2}
{"kind":"fault","unit":0,"pid":1}
{"kind":"switch","unit":0,"ts":400,"prev":1,"next":2}
"#,
        )
        .expect("valid trace");
        assert_eq!(trace.switch_span(), Duration::from_nanos(350));

        assert_eq!(Trace::default().switch_span(), Duration::ZERO);
        assert_eq!(Trace::default().max_unit(), None);
    }
}
