//! In-memory identity graph and resolver doubles for unit tests

use crate::identity::{ExecutionContext, GroupMembership, GroupNode, IdentityResolver, TaskView};
use hotspot_common::{Comm, GroupPath};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct FakeNode {
    name: Option<Vec<u8>>,
    parent: Option<Box<FakeNode>>,
}

impl FakeNode {
    pub fn named(name: &str, parent: Option<FakeNode>) -> Self {
        Self {
            name: Some(name.as_bytes().to_vec()),
            parent: parent.map(Box::new),
        }
    }

    pub fn unnamed(parent: Option<FakeNode>) -> Self {
        Self {
            name: None,
            parent: parent.map(Box::new),
        }
    }

    /// Chain built root first; the last component is the leaf.
    pub fn chain(path: &[&str]) -> Option<Self> {
        path.iter()
            .fold(None, |parent, name| Some(FakeNode::named(name, parent)))
    }
}

impl GroupNode for FakeNode {
    fn name(&self) -> Option<&[u8]> {
        self.name.as_deref()
    }

    fn parent(&self) -> Option<&Self> {
        self.parent.as_deref()
    }
}

pub struct FakeMembership {
    default_group: Option<FakeNode>,
}

impl GroupMembership for FakeMembership {
    type Node = FakeNode;

    fn default_group(&self) -> Option<&FakeNode> {
        self.default_group.as_ref()
    }
}

pub struct FakeTask {
    membership: Option<FakeMembership>,
}

impl TaskView for FakeTask {
    type Membership = FakeMembership;

    fn membership(&self) -> Option<&FakeMembership> {
        self.membership.as_ref()
    }
}

pub struct FakeContext {
    pid: u32,
    comm: Vec<u8>,
    task: Option<FakeTask>,
}

impl FakeContext {
    pub fn idle() -> Self {
        Self {
            pid: 0,
            comm: b"swapper/0".to_vec(),
            task: None,
        }
    }

    pub fn without_membership(pid: u32, comm: &str) -> Self {
        Self {
            pid,
            comm: comm.as_bytes().to_vec(),
            task: Some(FakeTask { membership: None }),
        }
    }

    pub fn without_default_group(pid: u32, comm: &str) -> Self {
        Self {
            pid,
            comm: comm.as_bytes().to_vec(),
            task: Some(FakeTask {
                membership: Some(FakeMembership {
                    default_group: None,
                }),
            }),
        }
    }

    pub fn with_leaf(pid: u32, comm: &str, leaf: FakeNode) -> Self {
        Self {
            pid,
            comm: comm.as_bytes().to_vec(),
            task: Some(FakeTask {
                membership: Some(FakeMembership {
                    default_group: Some(leaf),
                }),
            }),
        }
    }

    pub fn with_path(pid: u32, comm: &str, path: &[&str]) -> Self {
        match FakeNode::chain(path) {
            Some(leaf) => Self::with_leaf(pid, comm, leaf),
            None => Self::without_default_group(pid, comm),
        }
    }

    pub fn nameless(pid: u32) -> Self {
        Self {
            pid,
            comm: Vec::new(),
            task: None,
        }
    }
}

impl ExecutionContext for FakeContext {
    type Task = FakeTask;

    fn current_task(&self) -> Option<&FakeTask> {
        self.task.as_ref()
    }

    fn current_entity_id(&self) -> u32 {
        self.pid
    }

    fn current_comm(&self, out: &mut Comm) {
        out.write_truncated(&self.comm);
    }
}

/// Resolver that follows a fixed success/failure script, repeating the last
/// outcome once the script runs out.
pub struct ScriptedResolver {
    script: Vec<bool>,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    pub const RESOLVED: &'static [u8] = b"scripted.slice";

    pub fn new(script: &[bool]) -> Self {
        Self {
            script: script.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IdentityResolver for ScriptedResolver {
    fn resolve<C: ExecutionContext>(&self, _ctx: &C, out: &mut GroupPath) -> bool {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let succeed = self
            .script
            .get(call)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(false);

        if succeed {
            out.write_truncated(Self::RESOLVED);
        } else {
            out.clear();
        }
        succeed
    }
}
