// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cross-process release-counted fences.
//!
//! A fence starts uncleared with no references. Parties [`acquire`] it before
//! submitting gated commits and [`release`] it once they are ready. The fence
//! clears when the last reference is released, when it is explicitly
//! [`trigger`]ed, or when the compositor force-clears it after a timeout.
//! These three paths are independent and all idempotent; none can
//! un-clear a fence.
//!
//! References are counted per party so that a process death releases
//! exactly what that process held ([`FenceTable::release_all`]).
//!
//! [`acquire`]: FenceTable::acquire
//! [`release`]: FenceTable::release
//! [`trigger`]: FenceTable::trigger

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::handle::{Arena, FenceId, ProcessId};

/// State of one fence.
#[derive(Clone, Debug, Default)]
pub struct Fence {
    refs: BTreeMap<ProcessId, u32>,
    cleared: bool,
    forced: bool,
}

impl Fence {
    /// Total outstanding references across all parties.
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.refs.values().sum()
    }

    /// References held by one party.
    #[must_use]
    pub fn refs_held_by(&self, party: ProcessId) -> u32 {
        self.refs.get(&party).copied().unwrap_or(0)
    }

    /// Whether the fence has cleared.
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    /// Whether the fence was cleared by the timeout path.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.forced
    }
}

/// Server-owned table of live fences.
#[derive(Clone, Debug, Default)]
pub struct FenceTable {
    fences: Arena<Fence>,
}

impl FenceTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fences: Arena::new(),
        }
    }

    /// Allocates a fence with no references.
    pub fn create(&mut self) -> FenceId {
        FenceId(self.fences.insert(Fence::default()))
    }

    /// Adds one reference held by `party`.
    ///
    /// Fails with [`Error::InvalidState`] once the fence has cleared.
    pub fn acquire(&mut self, fence: FenceId, party: ProcessId) -> Result<()> {
        let f = self.fences.get_mut(fence.0)?;
        if f.cleared {
            return Err(Error::InvalidState);
        }
        *f.refs.entry(party).or_insert(0) += 1;
        Ok(())
    }

    /// Drops one reference held by `party`. Returns `true` if this release
    /// cleared the fence.
    ///
    /// Fails with [`Error::InvalidState`] if `party` holds no reference.
    pub fn release(&mut self, fence: FenceId, party: ProcessId) -> Result<bool> {
        let f = self.fences.get_mut(fence.0)?;
        let held = f.refs.get_mut(&party).ok_or(Error::InvalidState)?;
        *held -= 1;
        if *held == 0 {
            f.refs.remove(&party);
        }
        Ok(Self::clear_if_unreferenced(f))
    }

    /// Clears the fence regardless of outstanding references. Returns `true`
    /// if the fence was not already cleared.
    pub fn trigger(&mut self, fence: FenceId) -> Result<bool> {
        let f = self.fences.get_mut(fence.0)?;
        let newly = !f.cleared;
        f.cleared = true;
        Ok(newly)
    }

    /// Clears the fence on the timeout path, recording that it was forced.
    /// Returns `true` if the fence was not already cleared.
    pub fn force_clear(&mut self, fence: FenceId) -> Result<bool> {
        let f = self.fences.get_mut(fence.0)?;
        if f.cleared {
            return Ok(false);
        }
        f.cleared = true;
        f.forced = true;
        Ok(true)
    }

    /// Whether the fence has cleared.
    pub fn is_cleared(&self, fence: FenceId) -> Result<bool> {
        Ok(self.fences.get(fence.0)?.cleared)
    }

    /// Whether a commit gated on `fence` may become visible.
    ///
    /// Collected fences were necessarily cleared, so a stale handle does not
    /// hold anything back.
    #[must_use]
    pub fn is_open(&self, fence: FenceId) -> bool {
        match self.fences.get(fence.0) {
            Ok(f) => f.cleared,
            Err(_) => true,
        }
    }

    /// Looks up a fence.
    pub fn get(&self, fence: FenceId) -> Result<&Fence> {
        self.fences.get(fence.0)
    }

    /// Whether the handle refers to a live fence.
    #[must_use]
    pub fn contains(&self, fence: FenceId) -> bool {
        self.fences.contains(fence.0)
    }

    /// Drops every reference `party` holds. Returns the fences this cleared.
    pub fn release_all(&mut self, party: ProcessId) -> Vec<FenceId> {
        let mut cleared = Vec::new();
        for (handle, f) in self.fences.iter_mut() {
            if f.refs.remove(&party).is_some() && Self::clear_if_unreferenced(f) {
                cleared.push(FenceId(handle));
            }
        }
        cleared
    }

    /// Removes cleared fences for which `in_use` returns `false`. Returns the
    /// removed handles.
    pub fn collect(&mut self, mut in_use: impl FnMut(FenceId) -> bool) -> Vec<FenceId> {
        let dead: Vec<FenceId> = self
            .fences
            .iter()
            .filter(|(h, f)| f.cleared && !in_use(FenceId(*h)))
            .map(|(h, _)| FenceId(h))
            .collect();
        for fence in &dead {
            let removed = self.fences.remove(fence.0);
            debug_assert!(removed.is_ok(), "collected fences were live a moment ago");
        }
        dead
    }

    /// Number of live fences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    /// Whether no fences are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    fn clear_if_unreferenced(f: &mut Fence) -> bool {
        if !f.cleared && f.refs.is_empty() {
            f.cleared = true;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ProcessId = ProcessId(1);
    const B: ProcessId = ProcessId(2);

    #[test]
    fn clears_when_last_reference_released() {
        let mut fences = FenceTable::new();
        let f = fences.create();
        fences.acquire(f, A).unwrap();
        fences.acquire(f, B).unwrap();
        assert_eq!(fences.release(f, B), Ok(false));
        assert_eq!(fences.is_cleared(f), Ok(false));
        assert_eq!(fences.release(f, A), Ok(true));
        assert_eq!(fences.is_cleared(f), Ok(true));
        assert!(!fences.get(f).unwrap().is_forced());
    }

    #[test]
    fn new_fence_is_not_cleared() {
        let mut fences = FenceTable::new();
        let f = fences.create();
        assert_eq!(fences.is_cleared(f), Ok(false));
        assert!(!fences.is_open(f));
    }

    #[test]
    fn release_without_acquire_is_invalid() {
        let mut fences = FenceTable::new();
        let f = fences.create();
        fences.acquire(f, A).unwrap();
        assert_eq!(fences.release(f, B), Err(Error::InvalidState));
        assert_eq!(fences.get(f).unwrap().ref_count(), 1);
    }

    #[test]
    fn cleared_fence_never_reverts() {
        let mut fences = FenceTable::new();
        let f = fences.create();
        fences.acquire(f, A).unwrap();
        assert_eq!(fences.trigger(f), Ok(true));
        assert_eq!(fences.acquire(f, B), Err(Error::InvalidState));
        // Releasing the outstanding reference after a trigger is harmless.
        assert_eq!(fences.release(f, A), Ok(false));
        assert_eq!(fences.trigger(f), Ok(false));
        assert_eq!(fences.force_clear(f), Ok(false));
        assert_eq!(fences.is_cleared(f), Ok(true));
    }

    #[test]
    fn force_clear_records_forced() {
        let mut fences = FenceTable::new();
        let f = fences.create();
        fences.acquire(f, A).unwrap();
        assert_eq!(fences.force_clear(f), Ok(true));
        assert!(fences.get(f).unwrap().is_forced());
    }

    #[test]
    fn release_all_drops_only_that_party() {
        let mut fences = FenceTable::new();
        let shared = fences.create();
        let solo = fences.create();
        fences.acquire(shared, A).unwrap();
        fences.acquire(shared, A).unwrap();
        fences.acquire(shared, B).unwrap();
        fences.acquire(solo, A).unwrap();

        let cleared = fences.release_all(A);
        assert_eq!(cleared, alloc::vec![solo]);
        assert_eq!(fences.get(shared).unwrap().ref_count(), 1);
        assert_eq!(fences.get(shared).unwrap().refs_held_by(B), 1);
    }

    #[test]
    fn collect_keeps_in_use_fences() {
        let mut fences = FenceTable::new();
        let busy = fences.create();
        let idle = fences.create();
        let pending = fences.create();
        fences.trigger(busy).unwrap();
        fences.trigger(idle).unwrap();

        let removed = fences.collect(|f| f == busy);
        assert_eq!(removed, alloc::vec![idle]);
        assert!(fences.contains(busy));
        assert!(fences.contains(pending), "uncleared fences are never collected");
        assert_eq!(fences.is_cleared(idle), Err(Error::StaleReference));
        assert!(fences.is_open(idle));
    }
}
