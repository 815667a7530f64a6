// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Synchronized groups.
//!
//! A group is a set of sub-operations that become visible together. It owns
//! one fence; the server acquires one reference per sub-operation and
//! releases it when that sub-operation reports ready. Participants gate
//! their final commits on the same fence. Scene-settings diffs belonging to
//! the group are staged here and applied by the server in the tick that
//! first observes the fence cleared, the same tick the gated commits are
//! applied.

use lamina_core::error::{Error, Result};
use lamina_core::fence::FenceTable;
use lamina_core::handle::{Arena, FenceId, GroupId, ProcessId, SceneId};
use lamina_core::time::HostTime;

use crate::scene::ServerSettingsDiff;

/// One sub-operation of a synchronized group.
#[derive(Clone, Debug, PartialEq)]
pub enum GroupOp {
    /// A process launch; ready once the launched process reports in.
    Launch {
        /// The launching process.
        process: ProcessId,
    },
    /// A scene-settings update, applied when the group completes.
    SceneSettings {
        /// Target scene.
        scene: SceneId,
        /// Change to apply.
        diff: ServerSettingsDiff,
    },
}

/// A group in flight.
#[derive(Clone, Debug)]
pub struct SyncGroup {
    fence: FenceId,
    ops: Vec<GroupOp>,
    ready: Vec<bool>,
    started: HostTime,
}

impl SyncGroup {
    /// The group's shared fence.
    #[must_use]
    pub fn fence(&self) -> FenceId {
        self.fence
    }

    /// Sub-operations, in submission order.
    #[must_use]
    pub fn ops(&self) -> &[GroupOp] {
        &self.ops
    }

    /// Whether sub-operation `index` has reported ready.
    #[must_use]
    pub fn is_ready(&self, index: usize) -> bool {
        self.ready.get(index).copied().unwrap_or(false)
    }

    /// When the group began.
    #[must_use]
    pub fn started(&self) -> HostTime {
        self.started
    }

    /// Whether `process` participates through a launch op.
    #[must_use]
    pub fn launches(&self, process: ProcessId) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, GroupOp::Launch { process: p } if *p == process))
    }

    /// Whether `scene` is the target of a staged settings diff.
    #[must_use]
    pub fn touches(&self, scene: SceneId) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, GroupOp::SceneSettings { scene: s, .. } if *s == scene))
    }
}

/// In-flight synchronized groups.
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: Arena<SyncGroup>,
}

impl GroupTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a group: creates its fence and acquires one server reference
    /// per sub-operation. A group with no sub-operations is created with its
    /// fence already cleared.
    pub fn begin(&mut self, ops: Vec<GroupOp>, fences: &mut FenceTable, now: HostTime) -> Result<(GroupId, FenceId)> {
        let fence = fences.create();
        for _ in &ops {
            fences.acquire(fence, ProcessId::SERVER)?;
        }
        if ops.is_empty() {
            fences.trigger(fence)?;
        }
        let ready = vec![false; ops.len()];
        let id = GroupId(self.groups.insert(SyncGroup {
            fence,
            ops,
            ready,
            started: now,
        }));
        Ok((id, fence))
    }

    /// Marks one sub-operation ready and releases its fence reference.
    ///
    /// Fails with [`Error::InvalidState`] if the index is out of range or
    /// already reported.
    pub fn report_ready(&mut self, group: GroupId, index: usize, fences: &mut FenceTable) -> Result<()> {
        let g = self.groups.get_mut(group.0)?;
        match g.ready.get_mut(index) {
            Some(ready) if !*ready => *ready = true,
            _ => return Err(Error::InvalidState),
        }
        // A force-cleared fence no longer counts references.
        if !fences.is_cleared(g.fence)? {
            fences.release(g.fence, ProcessId::SERVER)?;
        }
        Ok(())
    }

    /// Removes a group without applying anything. Returns it so the caller
    /// can discard gated work and clear the fence.
    pub fn remove(&mut self, group: GroupId) -> Result<SyncGroup> {
        self.groups.remove(group.0)
    }

    /// Looks up a group.
    pub fn get(&self, group: GroupId) -> Result<&SyncGroup> {
        self.groups.get(group.0)
    }

    /// Removes and returns every group whose fence is open.
    pub fn take_completed(&mut self, fences: &FenceTable) -> Vec<(GroupId, SyncGroup)> {
        let done: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|(_, g)| fences.is_open(g.fence))
            .map(|(h, _)| GroupId(h))
            .collect();
        done.into_iter()
            .filter_map(|id| self.groups.remove(id.0).ok().map(|g| (id, g)))
            .collect()
    }

    /// Groups started at or before `deadline` whose fence is still closed.
    #[must_use]
    pub fn overdue(&self, deadline: HostTime, fences: &FenceTable) -> Vec<GroupId> {
        self.groups
            .iter()
            .filter(|(_, g)| g.started <= deadline && !fences.is_open(g.fence))
            .map(|(h, _)| GroupId(h))
            .collect()
    }

    /// Groups a dying process was launching.
    #[must_use]
    pub fn launched_by(&self, process: ProcessId) -> Vec<GroupId> {
        self.groups
            .iter()
            .filter(|(_, g)| g.launches(process))
            .map(|(h, _)| GroupId(h))
            .collect()
    }

    /// Whether any in-flight group owns `fence`.
    #[must_use]
    pub fn uses_fence(&self, fence: FenceId) -> bool {
        self.groups.iter().any(|(_, g)| g.fence == fence)
    }

    /// Number of groups in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no group is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use lamina_core::handle::RawHandle;

    use super::*;

    fn ops() -> Vec<GroupOp> {
        vec![
            GroupOp::Launch {
                process: ProcessId(7),
            },
            GroupOp::SceneSettings {
                scene: SceneId(RawHandle::from_parts(0, 0)),
                diff: ServerSettingsDiff::default(),
            },
        ]
    }

    #[test]
    fn fence_clears_after_every_op_is_ready() {
        let mut fences = FenceTable::new();
        let mut groups = GroupTable::new();
        let (group, fence) = groups.begin(ops(), &mut fences, HostTime(0)).unwrap();
        assert_eq!(fences.get(fence).unwrap().refs_held_by(ProcessId::SERVER), 2);

        groups.report_ready(group, 1, &mut fences).unwrap();
        assert!(groups.take_completed(&fences).is_empty());
        assert_eq!(
            groups.report_ready(group, 1, &mut fences),
            Err(Error::InvalidState),
            "reported twice"
        );
        assert_eq!(
            groups.report_ready(group, 5, &mut fences),
            Err(Error::InvalidState)
        );
        groups.report_ready(group, 0, &mut fences).unwrap();
        assert_eq!(fences.is_cleared(fence), Ok(true));
        let done = groups.take_completed(&fences);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, group);
        assert!(groups.is_empty());
    }

    #[test]
    fn empty_group_is_immediately_complete() {
        let mut fences = FenceTable::new();
        let mut groups = GroupTable::new();
        let (_, fence) = groups.begin(Vec::new(), &mut fences, HostTime(0)).unwrap();
        assert!(fences.is_open(fence));
        assert_eq!(groups.take_completed(&fences).len(), 1);
    }

    #[test]
    fn overdue_and_launch_queries() {
        let mut fences = FenceTable::new();
        let mut groups = GroupTable::new();
        let (group, fence) = groups.begin(ops(), &mut fences, HostTime(100)).unwrap();
        assert!(groups.overdue(HostTime(99), &fences).is_empty());
        assert_eq!(groups.overdue(HostTime(100), &fences), vec![group]);
        assert_eq!(groups.launched_by(ProcessId(7)), vec![group]);
        assert!(groups.launched_by(ProcessId(8)).is_empty());
        assert!(groups.uses_fence(fence));
        assert!(groups.get(group).unwrap().touches(SceneId(RawHandle::from_parts(0, 0))));
    }
}
