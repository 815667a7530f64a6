// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory event recording.
//!
//! [`RecorderSink`] implements [`TraceSink`] and appends every event to a
//! `Vec<RecordedEvent>` for later inspection or export.
//!
//! Rich events ([`on_node_changes`](TraceSink::on_node_changes),
//! [`on_damage_rects`](TraceSink::on_damage_rects)) store only the count.

use lamina_core::trace::{
    CommitEvent, DamageRect, FenceClearedEvent, FenceTimeoutEvent, FrameSummary, NodeChange,
    PhaseBeginEvent, PhaseEndEvent, TickEvent, TraceSink,
};

/// One recorded event.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`TickEvent`].
    Tick(TickEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A commit accepted into a staged queue.
    CommitStaged(CommitEvent),
    /// A commit first seen blocked by its fence.
    CommitHeld(CommitEvent),
    /// A commit that became visible.
    CommitApplied(CommitEvent),
    /// A [`FenceClearedEvent`].
    FenceCleared(FenceClearedEvent),
    /// A [`FenceTimeoutEvent`].
    FenceTimeout(FenceTimeoutEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
    /// Node-change count for a frame.
    NodeChangesCount {
        /// Frame counter.
        frame_index: u64,
        /// Number of node changes.
        count: u32,
    },
    /// Damage-rect count for a frame.
    DamageRectsCount {
        /// Frame counter.
        frame_index: u64,
        /// Number of damage rects.
        count: u32,
    },
}

impl RecordedEvent {
    /// Frame counter the event belongs to.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        match self {
            Self::Tick(e) => e.frame_index,
            Self::PhaseBegin(e) => e.frame_index,
            Self::PhaseEnd(e) => e.frame_index,
            Self::CommitStaged(e) | Self::CommitHeld(e) | Self::CommitApplied(e) => {
                e.frame_index
            }
            Self::FenceCleared(e) => e.frame_index,
            Self::FenceTimeout(e) => e.frame_index,
            Self::FrameSummary(s) => s.frame_index,
            Self::NodeChangesCount { frame_index, .. }
            | Self::DamageRectsCount { frame_index, .. } => *frame_index,
        }
    }
}

/// A [`TraceSink`] that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecorderSink {
    events: Vec<RecordedEvent>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, oldest first.
    #[must_use]
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Consumes the recorder and returns its events.
    #[must_use]
    pub fn into_events(self) -> Vec<RecordedEvent> {
        self.events
    }

    /// Drops every recorded event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Frame summaries recorded so far.
    pub fn summaries(&self) -> impl Iterator<Item = &FrameSummary> + '_ {
        self.events.iter().filter_map(|e| match e {
            RecordedEvent::FrameSummary(s) => Some(s),
            _ => None,
        })
    }

    fn push(&mut self, event: RecordedEvent) {
        self.events.push(event);
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl TraceSink for RecorderSink {
    fn on_tick(&mut self, e: &TickEvent) {
        self.push(RecordedEvent::Tick(*e));
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.push(RecordedEvent::PhaseBegin(*e));
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.push(RecordedEvent::PhaseEnd(*e));
    }

    fn on_commit_staged(&mut self, e: &CommitEvent) {
        self.push(RecordedEvent::CommitStaged(*e));
    }

    fn on_commit_held(&mut self, e: &CommitEvent) {
        self.push(RecordedEvent::CommitHeld(*e));
    }

    fn on_commit_applied(&mut self, e: &CommitEvent) {
        self.push(RecordedEvent::CommitApplied(*e));
    }

    fn on_fence_cleared(&mut self, e: &FenceClearedEvent) {
        self.push(RecordedEvent::FenceCleared(*e));
    }

    fn on_fence_timeout(&mut self, e: &FenceTimeoutEvent) {
        self.push(RecordedEvent::FenceTimeout(*e));
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.push(RecordedEvent::FrameSummary(*s));
    }

    fn on_node_changes(&mut self, frame_index: u64, changes: &[NodeChange]) {
        self.push(RecordedEvent::NodeChangesCount {
            frame_index,
            count: count(changes.len()),
        });
    }

    fn on_damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        self.push(RecordedEvent::DamageRectsCount {
            frame_index,
            count: count(rects.len()),
        });
    }
}

#[cfg(test)]
mod tests {
    use lamina_core::context::ContextTable;
    use lamina_core::fence::FenceTable;
    use lamina_core::time::HostTime;
    use lamina_core::timing::FrameTick;
    use lamina_core::trace::{PhaseKind, Tracer};
    use lamina_render::{Compositor, CompositorConfig, RetainLast};

    use super::*;

    #[test]
    fn records_a_full_pass_in_order() {
        let mut rec = RecorderSink::new();
        let mut compositor = Compositor::new(CompositorConfig::hz60());
        compositor.run(
            &FrameTick::new(3, HostTime(1_000)),
            &mut ContextTable::new(),
            &mut FenceTable::new(),
            &[],
            &mut RetainLast::new(),
            &mut Tracer::new(&mut rec),
        );

        let events = rec.events();
        assert!(matches!(events[0], RecordedEvent::Tick(_)), "tick first");
        assert!(
            matches!(events.last(), Some(RecordedEvent::FrameSummary(_))),
            "summary last"
        );
        let begins: Vec<PhaseKind> = events
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::PhaseBegin(b) => Some(b.phase),
                _ => None,
            })
            .collect();
        assert_eq!(begins, PhaseKind::ALL.to_vec());
        assert!(events.iter().all(|e| e.frame_index() == 3));
        assert_eq!(rec.summaries().count(), 1);
    }

    #[test]
    fn rich_events_keep_counts() {
        let mut rec = RecorderSink::new();
        rec.on_damage_rects(
            2,
            &[DamageRect {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            }],
        );
        match &rec.events()[0] {
            RecordedEvent::DamageRectsCount { frame_index, count } => {
                assert_eq!((*frame_index, *count), (2, 1));
            }
            other => panic!("expected DamageRectsCount, got {other:?}"),
        }
        rec.clear();
        assert!(rec.events().is_empty());
    }
}
