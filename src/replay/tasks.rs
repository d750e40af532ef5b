//! In-memory execution context model for replayed events
//!
//! Each declared task carries an `Arc`-linked chain of group nodes so the
//! aggregation core can walk it exactly as it walks live kernel objects.
//! Tasks sharing a path prefix share the prefix nodes.

use crate::replay::trace::TaskSpec;
use hotspot_agent::{CommSource, ExecutionContext, GroupMembership, GroupNode, ProcComms, TaskView};
use hotspot_common::Comm;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct ReplayGroup {
    name: String,
    parent: Option<Arc<ReplayGroup>>,
}

impl GroupNode for ReplayGroup {
    fn name(&self) -> Option<&[u8]> {
        if self.name.is_empty() {
            None
        } else {
            Some(self.name.as_bytes())
        }
    }

    fn parent(&self) -> Option<&Self> {
        self.parent.as_deref()
    }
}

#[derive(Debug)]
pub struct ReplayMembership {
    leaf: Option<Arc<ReplayGroup>>,
}

impl GroupMembership for ReplayMembership {
    type Node = ReplayGroup;

    fn default_group(&self) -> Option<&ReplayGroup> {
        self.leaf.as_deref()
    }
}

#[derive(Debug)]
pub struct ReplayTask {
    pid: u32,
    comm: String,
    membership: Option<ReplayMembership>,
    rss_bytes: Option<u64>,
}

impl ReplayTask {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn comm(&self) -> &str {
        &self.comm
    }

    pub fn rss_bytes(&self) -> Option<u64> {
        self.rss_bytes
    }
}

impl TaskView for ReplayTask {
    type Membership = ReplayMembership;

    fn membership(&self) -> Option<&ReplayMembership> {
        self.membership.as_ref()
    }
}

/// The CPU state seen by a hook: which task is current.
///
/// A pid with no declaration is still a real entity, but without a name or
/// any group membership.
#[derive(Debug, Clone, Copy)]
pub struct ReplayContext<'a> {
    entity_id: u32,
    task: Option<&'a ReplayTask>,
}

impl ExecutionContext for ReplayContext<'_> {
    type Task = ReplayTask;

    fn current_task(&self) -> Option<&ReplayTask> {
        self.task
    }

    fn current_entity_id(&self) -> u32 {
        self.entity_id
    }

    fn current_comm(&self, out: &mut Comm) {
        match self.task {
            Some(task) => {
                out.write_truncated(task.comm.as_bytes());
            }
            None => out.clear(),
        }
    }
}

/// Declared tasks by pid.
#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: HashMap<u32, ReplayTask>,
    groups: HashMap<Vec<String>, Arc<ReplayGroup>>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs<'a, I>(specs: I) -> Self
    where
        I: IntoIterator<Item = &'a TaskSpec>,
    {
        let mut table = Self::new();
        for spec in specs {
            table.insert(spec);
        }
        table
    }

    /// Declare a task. A later declaration of the same pid replaces the
    /// earlier one.
    pub fn insert(&mut self, spec: &TaskSpec) {
        let membership = spec.cgroup.as_ref().map(|path| ReplayMembership {
            leaf: self.group_chain(path),
        });

        let task = ReplayTask {
            pid: spec.pid,
            comm: spec.comm.clone(),
            membership,
            rss_bytes: spec.rss_bytes,
        };
        if self.tasks.insert(spec.pid, task).is_some() {
            debug!("Task {} redeclared, keeping the latest declaration", spec.pid);
        }
    }

    pub fn get(&self, pid: u32) -> Option<&ReplayTask> {
        self.tasks.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Context in which `pid` is the current task. pid 0 is the idle task.
    pub fn context(&self, pid: u32) -> ReplayContext<'_> {
        ReplayContext {
            entity_id: pid,
            task: if pid == 0 { None } else { self.tasks.get(&pid) },
        }
    }

    /// Declared resident set sizes.
    pub fn rss_bytes(&self) -> HashMap<u32, u64> {
        self.tasks
            .values()
            .filter_map(|task| task.rss_bytes.map(|rss| (task.pid, rss)))
            .collect()
    }

    fn group_chain(&mut self, path: &[String]) -> Option<Arc<ReplayGroup>> {
        let mut parent: Option<Arc<ReplayGroup>> = None;
        for depth in 1..=path.len() {
            let prefix = &path[..depth];
            let node = match self.groups.get(prefix).cloned() {
                Some(node) => node,
                None => {
                    let node = Arc::new(ReplayGroup {
                        name: prefix[depth - 1].clone(),
                        parent: parent.take(),
                    });
                    self.groups.insert(prefix.to_vec(), Arc::clone(&node));
                    node
                }
            };
            parent = Some(node);
        }
        parent
    }
}

/// Task names from the declarations, falling back to procfs for pids the
/// trace does not name.
pub struct TraceComms<'a> {
    tasks: &'a TaskTable,
    fallback: ProcComms,
}

impl<'a> TraceComms<'a> {
    pub fn new(tasks: &'a TaskTable, fallback: ProcComms) -> Self {
        Self { tasks, fallback }
    }
}

impl CommSource for TraceComms<'_> {
    fn comm_for(&mut self, pid: u32) -> String {
        match self.tasks.get(pid) {
            Some(task) if !task.comm.is_empty() => task.comm.clone(),
            _ => self.fallback.comm_for(pid),
        }
    }
}
