// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Server-side rendering-context table.
//!
//! For every live context the server keeps two mirrors of the owner's model
//! tree:
//!
//! - the **presentation** store holds the committed target values, exactly
//!   as of the last applied commit;
//! - the **render** store holds what is on screen: presentation values with
//!   any running interpolations sampled in.
//!
//! Commits arrive through [`ContextTable::submit`] and wait in the context's
//! staged queue until the compositor applies them. Staged commits are never
//! visible, so a reader of either store sees a whole commit or none of it.
//!
//! A commit is checked against the presentation tree before any of its ops
//! run; one that would fail part way is refused whole. A refused or
//! discarded commit takes everything staged behind it on its context with
//! it, along with the other parts of every transaction that lost a part,
//! since the sender built those on top of it.

use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::vec;
use alloc::vec::Vec;

use crate::animation::Animation;
use crate::commit::{Commit, NodeOp};
use crate::error::{Error, Result};
use crate::handle::{Arena, ContextId, FenceId, ProcessId, TransactionId};
use crate::node::{FrameChanges, INVALID, NodeId, NodeStore, Property};
use crate::time::HostTime;

/// A submitted commit waiting to be applied.
#[derive(Clone, Debug)]
pub struct StagedCommit {
    /// The commit.
    pub commit: Commit,
    /// First tick at which the compositor saw this commit blocked by an
    /// uncleared fence.
    pub held_since: Option<HostTime>,
}

/// Summary of one applied commit, reported for completion tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppliedCommit {
    /// Context the commit targeted.
    pub context: ContextId,
    /// Sending process.
    pub process: ProcessId,
    /// Transaction the commit belongs to.
    pub transaction: TransactionId,
    /// Total commits in that transaction.
    pub parts: u32,
    /// Sequence number of the commit.
    pub seq: u64,
    /// Whether the sender asked for a completion notification.
    pub notify_completion: bool,
    /// Fence the commit was gated on.
    pub fence: Option<FenceId>,
}

#[derive(Clone, Copy, Debug)]
struct RunningAnimation {
    animation: Animation,
    origin: TransactionId,
}

/// One rendering context as seen by the server.
#[derive(Debug)]
pub struct ContextState {
    owner: ProcessId,
    presentation: NodeStore,
    render: NodeStore,
    staged: VecDeque<StagedCommit>,
    last_seq: u64,
    applied_seq: u64,
    revision: u64,
    animations: BTreeMap<(NodeId, Property), RunningAnimation>,
}

impl ContextState {
    fn new(owner: ProcessId) -> Self {
        Self {
            owner,
            presentation: NodeStore::with_root(),
            render: NodeStore::with_root(),
            staged: VecDeque::new(),
            last_seq: 0,
            applied_seq: 0,
            revision: 0,
            animations: BTreeMap::new(),
        }
    }

    /// The owning process.
    #[must_use]
    pub fn owner(&self) -> ProcessId {
        self.owner
    }

    /// Committed target values as of the last applied commit.
    #[must_use]
    pub fn presentation(&self) -> &NodeStore {
        &self.presentation
    }

    /// On-screen values, including sampled interpolations.
    #[must_use]
    pub fn render(&self) -> &NodeStore {
        &self.render
    }

    /// Mutable access to the render store for evaluation.
    pub fn render_mut(&mut self) -> &mut NodeStore {
        &mut self.render
    }

    /// Commits submitted but not yet applied, oldest first.
    #[must_use]
    pub fn staged(&self) -> &VecDeque<StagedCommit> {
        &self.staged
    }

    /// Mutable access to the staged queue.
    pub fn staged_mut(&mut self) -> &mut VecDeque<StagedCommit> {
        &mut self.staged
    }

    /// Sequence number of the newest applied commit, or zero.
    #[must_use]
    pub fn applied_seq(&self) -> u64 {
        self.applied_seq
    }

    /// Number of interpolations currently running.
    #[must_use]
    pub fn running_animations(&self) -> usize {
        self.animations.len()
    }

    /// Whether any interpolation started by `transaction` is still running.
    #[must_use]
    pub fn is_animating(&self, transaction: TransactionId) -> bool {
        self.animations.values().any(|a| a.origin == transaction)
    }

    /// Counts changes to the render tree: bumped by every applied commit and
    /// every evaluation that found something dirty.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Checks the oldest staged commit against the presentation tree
    /// without applying it.
    pub fn check_front(&self) -> Result<()> {
        match self.staged.front() {
            Some(staged) => Preflight::new(&self.presentation).check(&staged.commit.ops),
            None => Ok(()),
        }
    }

    /// Pops the oldest staged commit and applies it to both mirrors.
    ///
    /// Interpolated writes start from the value currently in the render
    /// store, so replacing a running animation never snaps. Returns `None`
    /// when nothing is staged. A commit that fails
    /// [`check_front`](Self::check_front) stays staged and neither mirror
    /// changes.
    pub fn apply_front(&mut self, now: HostTime) -> Result<Option<AppliedCommit>> {
        self.check_front()?;
        let Some(staged) = self.staged.pop_front() else {
            return Ok(None);
        };
        let commit = staged.commit;
        for op in &commit.ops {
            self.apply_op(op, commit.transaction, now)?;
        }
        self.applied_seq = commit.seq;
        self.revision += 1;
        Ok(Some(AppliedCommit {
            context: commit.context,
            process: commit.process,
            transaction: commit.transaction,
            parts: commit.parts,
            seq: commit.seq,
            notify_completion: commit.notify_completion,
            fence: commit.fence,
        }))
    }

    fn apply_op(&mut self, op: &NodeOp, origin: TransactionId, now: HostTime) -> Result<()> {
        op.apply_to(&mut self.presentation)?;
        match *op {
            NodeOp::Set {
                node,
                value,
                animation,
            } => {
                let property = value.property();
                match animation.filter(|s| s.is_animated() && property.is_animatable()) {
                    Some(spec) => {
                        let from = self.render.get(node, property)?;
                        self.animations.insert(
                            (node, property),
                            RunningAnimation {
                                animation: Animation {
                                    from,
                                    to: value,
                                    spec,
                                    begin: now,
                                },
                                origin,
                            },
                        );
                    }
                    None => {
                        self.animations.remove(&(node, property));
                        self.render.set(node, value)?;
                    }
                }
            }
            NodeOp::Destroy { node } => {
                self.render.destroy_node(node)?;
                self.animations.retain(|(n, _), _| *n != node);
            }
            _ => op.apply_to(&mut self.render)?,
        }
        Ok(())
    }

    /// Evaluates the render tree into `changes`.
    pub fn evaluate_into(&mut self, changes: &mut FrameChanges) {
        self.render.evaluate_into(changes);
        if !changes.is_empty() {
            self.revision += 1;
        }
    }

    /// Ops that rebuild, from an empty store, the tree this context will
    /// hold once everything still staged has landed: every live
    /// presentation node with all of its properties, every parent edge in
    /// child order, then the ops of each staged commit.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NodeOp> {
        let store = &self.presentation;
        let live: Vec<NodeId> = (0..store.len)
            .filter(|&idx| store.alive[idx as usize])
            .map(|idx| store.node_at(idx))
            .collect();
        let mut ops = Vec::new();
        for &node in &live {
            ops.push(NodeOp::Create {
                node,
                kind: store.kind_at(node.idx),
            });
            for property in Property::ALL {
                if let Ok(value) = store.get(node, property) {
                    ops.push(NodeOp::Set {
                        node,
                        value,
                        animation: None,
                    });
                }
            }
        }
        for &parent in &live {
            if let Ok(children) = store.children(parent) {
                ops.extend(children.map(|child| NodeOp::AddChild { parent, child }));
            }
        }
        for staged in &self.staged {
            ops.extend(staged.commit.ops.iter().map(|op| match *op {
                NodeOp::Set { node, value, .. } => NodeOp::Set {
                    node,
                    value,
                    animation: None,
                },
                other => other,
            }));
        }
        ops
    }

    /// Samples every running interpolation at `now` into the render store
    /// and drops the finished ones. Returns how many are still running.
    pub fn sample(&mut self, now: HostTime) -> usize {
        let Self {
            animations, render, ..
        } = self;
        let mut finished = Vec::new();
        for (&(node, property), running) in animations.iter() {
            let sample = running.animation.sample(now);
            if render.set(node, sample.value).is_err() || sample.finished {
                finished.push((node, property));
            }
        }
        for key in finished {
            animations.remove(&key);
        }
        animations.len()
    }

}

/// Dry run of a commit against a presentation tree.
///
/// Tracks only the slots the ops touch and reads everything else through
/// to the store, mirroring the checks [`NodeStore`] makes.
struct Preflight<'a> {
    store: &'a NodeStore,
    len: u32,
    live: BTreeMap<u32, Option<u32>>,
    parent: BTreeMap<u32, u32>,
    children: BTreeMap<u32, usize>,
}

impl<'a> Preflight<'a> {
    fn new(store: &'a NodeStore) -> Self {
        Self {
            store,
            len: store.len,
            live: BTreeMap::new(),
            parent: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    fn check(mut self, ops: &[NodeOp]) -> Result<()> {
        for op in ops {
            self.step(op)?;
        }
        Ok(())
    }

    fn step(&mut self, op: &NodeOp) -> Result<()> {
        match *op {
            NodeOp::Create { node, .. } => {
                if !NodeStore::slot_in_reach(self.len, node.idx) || self.generation(node.idx).is_some()
                {
                    return Err(Error::InvalidState);
                }
                self.live.insert(node.idx, Some(node.generation));
                self.parent.insert(node.idx, INVALID);
                self.children.insert(node.idx, 0);
                self.len = self.len.max(node.idx + 1);
            }
            NodeOp::Destroy { node } => {
                let n = self.validate(node)?;
                if self.child_count(n) > 0 {
                    return Err(Error::InvalidState);
                }
                let p = self.parent_of(n);
                if p != INVALID {
                    self.adjust_children(p, false);
                }
                self.live.insert(n, None);
                self.parent.insert(n, INVALID);
            }
            NodeOp::Set { node, .. } => {
                self.validate(node)?;
            }
            NodeOp::AddChild { parent, child } => {
                let p = self.validate(parent)?;
                let c = self.validate(child)?;
                self.attach(c, p)?;
            }
            NodeOp::InsertBefore { child, sibling } => {
                let c = self.validate(child)?;
                let s = self.validate(sibling)?;
                let p = self.parent_of(s);
                if p == INVALID {
                    return Err(Error::InvalidState);
                }
                self.attach(c, p)?;
            }
            NodeOp::RemoveFromParent { child } => {
                let c = self.validate(child)?;
                let p = self.parent_of(c);
                if p == INVALID {
                    return Err(Error::InvalidState);
                }
                self.parent.insert(c, INVALID);
                self.adjust_children(p, false);
            }
        }
        Ok(())
    }

    fn attach(&mut self, c: u32, p: u32) -> Result<()> {
        if self.parent_of(c) != INVALID || self.is_ancestor_or_self(c, p) {
            return Err(Error::InvalidState);
        }
        self.parent.insert(c, p);
        self.adjust_children(p, true);
        Ok(())
    }

    fn generation(&self, idx: u32) -> Option<u32> {
        match self.live.get(&idx) {
            Some(generation) => *generation,
            None => (idx < self.store.len && self.store.alive[idx as usize])
                .then(|| self.store.generation[idx as usize]),
        }
    }

    fn validate(&self, id: NodeId) -> Result<u32> {
        if self.generation(id.idx) == Some(id.generation) {
            Ok(id.idx)
        } else {
            Err(Error::StaleReference)
        }
    }

    fn parent_of(&self, idx: u32) -> u32 {
        match self.parent.get(&idx) {
            Some(&p) => p,
            None if idx < self.store.len => self.store.parent[idx as usize],
            None => INVALID,
        }
    }

    fn child_count(&self, idx: u32) -> usize {
        if let Some(&n) = self.children.get(&idx) {
            return n;
        }
        let mut n = 0;
        if idx < self.store.len {
            let mut c = self.store.first_child[idx as usize];
            while c != INVALID {
                n += 1;
                c = self.store.next_sibling[c as usize];
            }
        }
        n
    }

    fn adjust_children(&mut self, idx: u32, added: bool) {
        let n = self.child_count(idx);
        let n = if added { n + 1 } else { n.saturating_sub(1) };
        self.children.insert(idx, n);
    }

    fn is_ancestor_or_self(&self, ancestor: u32, mut idx: u32) -> bool {
        while idx != INVALID {
            if idx == ancestor {
                return true;
            }
            idx = self.parent_of(idx);
        }
        false
    }
}

/// Server-owned arena of live rendering contexts.
#[derive(Debug, Default)]
pub struct ContextTable {
    contexts: Arena<ContextState>,
}

impl ContextTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            contexts: Arena::new(),
        }
    }

    /// Allocates a context with an empty tree (just its root) owned by
    /// `owner`.
    pub fn create(&mut self, owner: ProcessId) -> ContextId {
        ContextId(self.contexts.insert(ContextState::new(owner)))
    }

    /// Destroys a context, returning its final state.
    pub fn destroy(&mut self, context: ContextId) -> Result<ContextState> {
        self.contexts.remove(context.0)
    }

    /// Looks up a context.
    pub fn get(&self, context: ContextId) -> Result<&ContextState> {
        self.contexts.get(context.0)
    }

    /// Looks up a context mutably.
    pub fn get_mut(&mut self, context: ContextId) -> Result<&mut ContextState> {
        self.contexts.get_mut(context.0)
    }

    /// Whether the handle names a live context.
    #[must_use]
    pub fn contains(&self, context: ContextId) -> bool {
        self.contexts.contains(context.0)
    }

    /// Returns the owner of a context.
    pub fn owner(&self, context: ContextId) -> Result<ProcessId> {
        Ok(self.get(context)?.owner)
    }

    /// Stages a commit on its context.
    ///
    /// Fails with [`Error::StaleReference`] if the context is gone,
    /// [`Error::NotOwner`] if the sender does not own it, and
    /// [`Error::InvalidState`] if the sequence number does not advance.
    pub fn submit(&mut self, commit: Commit) -> Result<()> {
        let state = self.contexts.get_mut(commit.context.0)?;
        if state.owner != commit.process {
            return Err(Error::NotOwner);
        }
        if commit.seq <= state.last_seq {
            return Err(Error::InvalidState);
        }
        state.last_seq = commit.seq;
        state.staged.push_back(StagedCommit {
            commit,
            held_since: None,
        });
        Ok(())
    }

    /// Iterates live contexts in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (ContextId, &ContextState)> + '_ {
        self.contexts.iter().map(|(h, s)| (ContextId(h), s))
    }

    /// Iterates live contexts mutably in handle order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ContextId, &mut ContextState)> + '_ {
        self.contexts.iter_mut().map(|(h, s)| (ContextId(h), s))
    }

    /// Returns the contexts owned by `process`.
    #[must_use]
    pub fn owned_by(&self, process: ProcessId) -> Vec<ContextId> {
        self.iter()
            .filter(|(_, s)| s.owner == process)
            .map(|(id, _)| id)
            .collect()
    }

    /// Whether any staged commit is gated on `fence`.
    #[must_use]
    pub fn gates_fence(&self, fence: FenceId) -> bool {
        self.iter()
            .any(|(_, s)| s.staged.iter().any(|c| c.commit.fence == Some(fence)))
    }

    /// Returns the contexts whose front commits together make up the whole
    /// transaction at the front of `context`, or `None` if some part is not
    /// at the front of its queue yet.
    #[must_use]
    pub fn front_batch(&self, context: ContextId) -> Option<Vec<ContextId>> {
        let front = &self.get(context).ok()?.staged.front()?.commit;
        if front.parts <= 1 {
            return Some(vec![context]);
        }
        let key = (front.process, front.transaction);
        let batch: Vec<ContextId> = self
            .iter()
            .filter(|(_, s)| {
                s.staged
                    .front()
                    .is_some_and(|f| (f.commit.process, f.commit.transaction) == key)
            })
            .map(|(id, _)| id)
            .collect();
        u32::try_from(batch.len())
            .is_ok_and(|n| n == front.parts)
            .then_some(batch)
    }

    /// Drops every staged commit gated on `fence`, with everything that
    /// depends on them. Returns the dropped commits.
    pub fn discard_gated(&mut self, fence: FenceId) -> Vec<Commit> {
        let doomed = self
            .iter()
            .flat_map(|(_, s)| s.staged.iter())
            .filter(|c| c.commit.fence == Some(fence))
            .map(|c| (c.commit.process, c.commit.transaction))
            .collect();
        self.discard_transactions(doomed)
    }

    /// Drops every staged part of the `doomed` transactions, everything
    /// staged behind a dropped part on the same context, and the other
    /// parts of any transaction that loses one. Returns the dropped
    /// commits in context order.
    pub fn discard_transactions(
        &mut self,
        mut doomed: BTreeSet<(ProcessId, TransactionId)>,
    ) -> Vec<Commit> {
        loop {
            let mut grew = false;
            for (_, state) in self.iter() {
                let mut tail = false;
                for staged in &state.staged {
                    let key = (staged.commit.process, staged.commit.transaction);
                    tail |= doomed.contains(&key);
                    if tail {
                        grew |= doomed.insert(key);
                    }
                }
            }
            if !grew {
                break;
            }
        }
        let mut dropped = Vec::new();
        for (_, state) in self.iter_mut() {
            let keep = state
                .staged
                .iter()
                .position(|s| doomed.contains(&(s.commit.process, s.commit.transaction)))
                .unwrap_or(state.staged.len());
            dropped.extend(state.staged.drain(keep..).map(|s| s.commit));
        }
        dropped
    }

    /// Number of live contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no contexts are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::animation::{AnimationSpec, TimingCurve};
    use crate::handle::RawHandle;
    use crate::node::{ContentKind, PropertyValue, ROOT_NODE};
    use crate::time::Duration;

    const OWNER: ProcessId = ProcessId(7);

    fn commit(context: ContextId, seq: u64, ops: Vec<NodeOp>) -> Commit {
        Commit {
            process: OWNER,
            context,
            transaction: TransactionId(RawHandle::from_parts(u32::try_from(seq).unwrap(), 0)),
            parts: 1,
            seq,
            fence: None,
            notify_completion: false,
            ops,
        }
    }

    fn opacity(store: &NodeStore, node: NodeId) -> f32 {
        store.opacity(node).unwrap()
    }

    #[test]
    fn staged_commit_is_invisible_until_applied() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        table
            .submit(commit(
                ctx,
                1,
                vec![NodeOp::Set {
                    node: ROOT_NODE,
                    value: PropertyValue::Opacity(0.5),
                    animation: None,
                }],
            ))
            .unwrap();
        let state = table.get_mut(ctx).unwrap();
        assert_eq!(opacity(state.presentation(), ROOT_NODE), 1.0);

        let applied = state.apply_front(HostTime(0)).unwrap().unwrap();
        assert_eq!(applied.seq, 1);
        assert_eq!(opacity(state.presentation(), ROOT_NODE), 0.5);
        assert_eq!(opacity(state.render(), ROOT_NODE), 0.5);
        assert_eq!(state.applied_seq(), 1);
    }

    #[test]
    fn submit_checks_owner_and_sequence() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        let mut foreign = commit(ctx, 1, vec![]);
        foreign.process = ProcessId(8);
        assert_eq!(table.submit(foreign), Err(Error::NotOwner));

        table.submit(commit(ctx, 2, vec![])).unwrap();
        assert_eq!(table.submit(commit(ctx, 2, vec![])), Err(Error::InvalidState));
        assert_eq!(table.submit(commit(ctx, 1, vec![])), Err(Error::InvalidState));
        assert_eq!(table.get(ctx).unwrap().staged().len(), 1);
    }

    #[test]
    fn submit_to_destroyed_context_is_stale() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        table.destroy(ctx).unwrap();
        assert_eq!(table.submit(commit(ctx, 1, vec![])), Err(Error::StaleReference));
    }

    #[test]
    fn structural_ops_mirror_both_stores() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        let child = NodeId::from_parts(1, 0);
        table
            .submit(commit(
                ctx,
                1,
                vec![
                    NodeOp::Create {
                        node: child,
                        kind: ContentKind::Image,
                    },
                    NodeOp::AddChild {
                        parent: ROOT_NODE,
                        child,
                    },
                ],
            ))
            .unwrap();
        let state = table.get_mut(ctx).unwrap();
        state.apply_front(HostTime(0)).unwrap();
        assert_eq!(state.presentation().parent(child), Ok(Some(ROOT_NODE)));
        assert_eq!(state.render().kind(child), Ok(ContentKind::Image));
    }

    #[test]
    fn animation_starts_from_rendered_value() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        let spec = Some(AnimationSpec::new(Duration(100), TimingCurve::Linear));
        let fade = |seq, to| {
            commit(
                ctx,
                seq,
                vec![NodeOp::Set {
                    node: ROOT_NODE,
                    value: PropertyValue::Opacity(to),
                    animation: spec,
                }],
            )
        };
        table.submit(fade(1, 0.0)).unwrap();
        let state = table.get_mut(ctx).unwrap();
        state.apply_front(HostTime(0)).unwrap();
        assert_eq!(state.sample(HostTime(50)), 1);
        assert!((opacity(state.render(), ROOT_NODE) - 0.5).abs() < 1e-6);
        assert_eq!(opacity(state.presentation(), ROOT_NODE), 0.0);

        // Retarget mid-flight: the new animation begins at 0.5, not 0.0.
        table.submit(fade(2, 1.0)).unwrap();
        let state = table.get_mut(ctx).unwrap();
        state.apply_front(HostTime(50)).unwrap();
        state.sample(HostTime(100));
        assert!((opacity(state.render(), ROOT_NODE) - 0.75).abs() < 1e-6);

        assert_eq!(state.sample(HostTime(150)), 0);
        assert_eq!(opacity(state.render(), ROOT_NODE), 1.0);
    }

    #[test]
    fn plain_set_cancels_running_animation() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        let spec = Some(AnimationSpec::new(Duration(100), TimingCurve::Linear));
        table
            .submit(commit(
                ctx,
                1,
                vec![NodeOp::Set {
                    node: ROOT_NODE,
                    value: PropertyValue::Opacity(0.0),
                    animation: spec,
                }],
            ))
            .unwrap();
        table
            .submit(commit(
                ctx,
                2,
                vec![NodeOp::Set {
                    node: ROOT_NODE,
                    value: PropertyValue::Opacity(0.3),
                    animation: None,
                }],
            ))
            .unwrap();
        let state = table.get_mut(ctx).unwrap();
        state.apply_front(HostTime(0)).unwrap();
        let first = TransactionId(RawHandle::from_parts(1, 0));
        assert!(state.is_animating(first));
        state.apply_front(HostTime(0)).unwrap();
        assert!(!state.is_animating(first));
        assert_eq!(state.sample(HostTime(10)), 0);
        assert!((opacity(state.render(), ROOT_NODE) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn discard_gated_removes_only_that_fence() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        let other = table.create(OWNER);
        let fence = FenceId(RawHandle::from_parts(0, 0));
        let mut gated = commit(ctx, 1, vec![]);
        gated.fence = Some(fence);
        table.submit(gated).unwrap();
        table.submit(commit(other, 2, vec![])).unwrap();
        assert!(table.gates_fence(fence));

        let dropped = table.discard_gated(fence);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].seq, 1);
        assert!(!table.gates_fence(fence));
        assert!(table.get(ctx).unwrap().staged().is_empty());
        assert_eq!(table.get(other).unwrap().staged().len(), 1);
    }

    #[test]
    fn discard_takes_later_commits_and_sibling_parts() {
        let mut table = ContextTable::new();
        let a = table.create(OWNER);
        let b = table.create(OWNER);
        let c = table.create(OWNER);
        let fence = FenceId(RawHandle::from_parts(0, 0));
        let mut gated = commit(a, 1, vec![]);
        gated.fence = Some(fence);
        table.submit(gated).unwrap();
        // Transaction 2 spans a and b; its part on b must go with the part
        // queued behind the gated commit on a.
        let mut on_a = commit(a, 2, vec![]);
        on_a.parts = 2;
        let mut on_b = commit(b, 2, vec![]);
        on_b.parts = 2;
        table.submit(on_a).unwrap();
        table.submit(on_b).unwrap();
        table.submit(commit(c, 3, vec![])).unwrap();

        let dropped = table.discard_gated(fence);
        assert_eq!(dropped.len(), 3);
        assert!(table.get(a).unwrap().staged().is_empty());
        assert!(table.get(b).unwrap().staged().is_empty());
        assert_eq!(table.get(c).unwrap().staged().len(), 1);
    }

    #[test]
    fn failing_commit_leaves_both_mirrors_untouched() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        let ghost = NodeId::from_parts(1, 0);
        table
            .submit(commit(
                ctx,
                1,
                vec![
                    NodeOp::Set {
                        node: ROOT_NODE,
                        value: PropertyValue::Opacity(0.3),
                        animation: None,
                    },
                    NodeOp::Set {
                        node: ghost,
                        value: PropertyValue::Opacity(0.3),
                        animation: None,
                    },
                ],
            ))
            .unwrap();
        let state = table.get_mut(ctx).unwrap();
        assert_eq!(state.apply_front(HostTime(0)), Err(Error::StaleReference));
        assert_eq!(opacity(state.presentation(), ROOT_NODE), 1.0);
        assert_eq!(opacity(state.render(), ROOT_NODE), 1.0);
        assert_eq!(state.applied_seq(), 0);
        assert_eq!(state.revision(), 0);
        assert_eq!(state.staged().len(), 1);
    }

    #[test]
    fn far_slot_create_is_refused_whole() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        let near = NodeId::from_parts(1, 0);
        let far = NodeId::from_parts(20_000_000, 0);
        table
            .submit(commit(
                ctx,
                1,
                vec![
                    NodeOp::Create {
                        node: near,
                        kind: ContentKind::Plain,
                    },
                    NodeOp::Create {
                        node: far,
                        kind: ContentKind::Plain,
                    },
                ],
            ))
            .unwrap();
        let state = table.get_mut(ctx).unwrap();
        assert_eq!(state.apply_front(HostTime(0)), Err(Error::InvalidState));
        assert_eq!(state.presentation().len, 1);
        assert_eq!(state.render().len, 1);
        assert!(!state.presentation().is_alive(near));
    }

    #[test]
    fn dry_run_tracks_earlier_ops_in_the_commit() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        let child = NodeId::from_parts(1, 0);
        table
            .submit(commit(
                ctx,
                1,
                vec![
                    NodeOp::Create {
                        node: child,
                        kind: ContentKind::Plain,
                    },
                    NodeOp::AddChild {
                        parent: ROOT_NODE,
                        child,
                    },
                    NodeOp::RemoveFromParent { child },
                    NodeOp::Destroy { node: child },
                ],
            ))
            .unwrap();
        // Root cannot go while it still has the child attached.
        table
            .submit(commit(
                ctx,
                2,
                vec![
                    NodeOp::Create {
                        node: child,
                        kind: ContentKind::Plain,
                    },
                    NodeOp::AddChild {
                        parent: ROOT_NODE,
                        child,
                    },
                    NodeOp::Destroy { node: ROOT_NODE },
                ],
            ))
            .unwrap();
        let state = table.get_mut(ctx).unwrap();
        assert!(state.apply_front(HostTime(0)).unwrap().is_some());
        assert!(!state.presentation().is_alive(child));
        assert_eq!(state.check_front(), Err(Error::InvalidState));
        assert_eq!(state.apply_front(HostTime(0)), Err(Error::InvalidState));
        assert!(state.presentation().is_alive(ROOT_NODE));
    }

    #[test]
    fn front_batch_waits_for_every_part() {
        let mut table = ContextTable::new();
        let a = table.create(OWNER);
        let b = table.create(OWNER);
        let mut first = commit(a, 1, vec![]);
        first.parts = 2;
        table.submit(first).unwrap();
        assert_eq!(table.front_batch(a), None);

        let mut second = commit(b, 1, vec![]);
        second.parts = 2;
        table.submit(second).unwrap();
        assert_eq!(table.front_batch(a), Some(vec![a, b]));
        assert_eq!(table.front_batch(b), Some(vec![a, b]));
    }

    #[test]
    fn snapshot_rebuilds_presentation() {
        let mut table = ContextTable::new();
        let ctx = table.create(OWNER);
        let child = NodeId::from_parts(1, 0);
        table
            .submit(commit(
                ctx,
                1,
                vec![
                    NodeOp::Create {
                        node: child,
                        kind: ContentKind::Image,
                    },
                    NodeOp::AddChild {
                        parent: ROOT_NODE,
                        child,
                    },
                    NodeOp::Set {
                        node: child,
                        value: PropertyValue::Opacity(0.25),
                        animation: None,
                    },
                ],
            ))
            .unwrap();
        let state = table.get_mut(ctx).unwrap();
        state.apply_front(HostTime(0)).unwrap();

        let mut rebuilt = NodeStore::new();
        for op in state.snapshot() {
            op.apply_to(&mut rebuilt).unwrap();
        }
        assert_eq!(rebuilt.parent(child), Ok(Some(ROOT_NODE)));
        assert_eq!(rebuilt.kind(child), Ok(ContentKind::Image));
        assert_eq!(opacity(&rebuilt, child), 0.25);
    }

    #[test]
    fn owned_by_lists_contexts() {
        let mut table = ContextTable::new();
        let a = table.create(OWNER);
        let _other = table.create(ProcessId(9));
        let b = table.create(OWNER);
        assert_eq!(table.owned_by(OWNER), vec![a, b]);
    }
}
