//! Resource-group (cgroup) attribution for the current execution context
//!
//! The walk mirrors the kernel object graph:
//! context -> task -> css_set membership -> default-hierarchy cgroup node -> name
//!
//! Any link may be missing depending on kernel configuration and the moment
//! the event fires, so every hop yields an `Option` and the walk gives up at
//! the first gap. If the leaf node has no usable name, its parent is tried
//! once.

use hotspot_common::{Comm, GroupPath};
use std::sync::Arc;

/// A node of the resource-group tree.
pub trait GroupNode {
    /// Raw node name. `None` or an empty name counts as unusable.
    fn name(&self) -> Option<&[u8]>;

    fn parent(&self) -> Option<&Self>;
}

/// The set of group memberships a task belongs to.
pub trait GroupMembership {
    type Node: GroupNode;

    /// Leaf node on the default (unified) hierarchy.
    fn default_group(&self) -> Option<&Self::Node>;
}

/// Task-level view of the identity graph.
pub trait TaskView {
    type Membership: GroupMembership;

    fn membership(&self) -> Option<&Self::Membership>;
}

/// Ambient state of the CPU on which an event fires.
///
/// For a context-switch event the current task is still the outgoing one;
/// for a page fault it is the faulting task.
pub trait ExecutionContext {
    type Task: TaskView;

    fn current_task(&self) -> Option<&Self::Task>;

    /// Process id of the acting entity, 0 when idle or unknown.
    fn current_entity_id(&self) -> u32;

    /// Copy the current task name into `out`, truncated to its width.
    fn current_comm(&self, out: &mut Comm);
}

/// Group path lookup for an execution context.
///
/// Implementations write into `out` and return `true` on success. They never
/// write a fallback value themselves; see [`fill_group_path`].
pub trait IdentityResolver {
    fn resolve<C: ExecutionContext>(&self, ctx: &C, out: &mut GroupPath) -> bool;
}

impl<R: IdentityResolver> IdentityResolver for &R {
    fn resolve<C: ExecutionContext>(&self, ctx: &C, out: &mut GroupPath) -> bool {
        (**self).resolve(ctx, out)
    }
}

impl<R: IdentityResolver> IdentityResolver for Arc<R> {
    fn resolve<C: ExecutionContext>(&self, ctx: &C, out: &mut GroupPath) -> bool {
        (**self).resolve(ctx, out)
    }
}

/// Leaf-then-parent walk over the live group hierarchy.
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyResolver;

impl IdentityResolver for HierarchyResolver {
    fn resolve<C: ExecutionContext>(&self, ctx: &C, out: &mut GroupPath) -> bool {
        out.clear();

        let leaf = match ctx
            .current_task()
            .and_then(|task| task.membership())
            .and_then(|membership| membership.default_group())
        {
            Some(node) => node,
            None => return false,
        };

        if copy_name(leaf, out) {
            return true;
        }

        match leaf.parent() {
            Some(parent) => copy_name(parent, out),
            None => false,
        }
    }
}

fn copy_name<N: GroupNode>(node: &N, out: &mut GroupPath) -> bool {
    match node.name() {
        Some(name) => out.write_truncated(name) > 0,
        None => false,
    }
}

/// Resolve into `out`, writing the `"n/a"` sentinel on failure.
pub fn fill_group_path<R, C>(resolver: &R, ctx: &C, out: &mut GroupPath)
where
    R: IdentityResolver,
    C: ExecutionContext,
{
    if !resolver.resolve(ctx, out) {
        out.write_sentinel();
    }
}

/// Fill `out` only while it is still empty. Once any value is present,
/// including the sentinel, it stays frozen.
pub fn refresh_group_path<R, C>(resolver: &R, ctx: &C, out: &mut GroupPath)
where
    R: IdentityResolver,
    C: ExecutionContext,
{
    if out.is_empty() {
        fill_group_path(resolver, ctx, out);
    }
}
