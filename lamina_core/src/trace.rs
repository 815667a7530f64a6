// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the compositor pass.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! the compositor calls at each stage of a tick. All method bodies default
//! to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! [`FrameSummaryBuilder`] collects phase timestamps and per-tick counters
//! and produces a [`FrameSummary`] at the end of the pass.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`): gates [`NodeChange`] and [`DamageRect`]
//!   events plus the corresponding `TraceSink` methods.

use crate::display::DisplayId;
use crate::handle::{ContextId, FenceId, ProcessId, TransactionId};
use crate::time::{Duration, HostTime};
use crate::timing::FrameTick;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of the compositor pass is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Display layout resolution into context placements.
    Resolve,
    /// Fence checks and application of staged commits.
    Apply,
    /// Interpolation sampling and tree evaluation.
    Sample,
    /// Building the render plan.
    Paint,
    /// Handing the plan to the output stage.
    Output,
}

impl PhaseKind {
    /// Every phase, in pass order.
    pub const ALL: [Self; 5] = [
        Self::Resolve,
        Self::Apply,
        Self::Sample,
        Self::Paint,
        Self::Output,
    ];

    /// Short lowercase name, for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Apply => "apply",
            Self::Sample => "sample",
            Self::Paint => "paint",
            Self::Output => "output",
        }
    }
}

/// Coarse description of a frame's damage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DamageSummary {
    /// Nothing changed on screen.
    #[default]
    None,
    /// This many rectangles changed.
    Partial(u32),
    /// The whole display must be redrawn.
    Full,
}

/// Which aspect of a node changed.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeField {
    /// World transform or frame.
    Geometry,
    /// Effective opacity.
    Opacity,
    /// Clip, corner radius or mask.
    Appearance,
    /// Backing surface or content kind.
    Content,
    /// Parent/child relationships or z-order.
    Topology,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a display refresh tick starts a compositor pass.
#[derive(Clone, Copy, Debug)]
pub struct TickEvent {
    /// Monotonic frame counter.
    pub frame_index: u64,
    /// Which display this tick targets.
    pub display: DisplayId,
    /// Host time of the tick.
    pub now: HostTime,
    /// Refresh interval, if known.
    pub refresh_interval: Option<Duration>,
}

impl From<&FrameTick> for TickEvent {
    fn from(tick: &FrameTick) -> Self {
        Self {
            frame_index: tick.frame_index,
            display: tick.display,
            now: tick.now,
            refresh_interval: tick.refresh_interval,
        }
    }
}

/// Marks the beginning of a compositor phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a compositor phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// A commit moving through the staged queue.
///
/// The same payload is used for staged, held and applied notifications.
#[derive(Clone, Copy, Debug)]
pub struct CommitEvent {
    /// Frame counter (or the last frame seen, for commits staged between
    /// ticks).
    pub frame_index: u64,
    /// Target context.
    pub context: ContextId,
    /// Sending process.
    pub process: ProcessId,
    /// Transaction the commit belongs to.
    pub transaction: TransactionId,
    /// Per-context sequence number.
    pub seq: u64,
    /// Gate, if any.
    pub fence: Option<FenceId>,
}

/// Emitted when the compositor observes a fence cleared.
#[derive(Clone, Copy, Debug)]
pub struct FenceClearedEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// The fence.
    pub fence: FenceId,
    /// Whether the clear came from the timeout path.
    pub forced: bool,
}

/// Emitted when a held commit outlives the fence timeout.
#[derive(Clone, Copy, Debug)]
pub struct FenceTimeoutEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// The fence that was force-cleared.
    pub fence: FenceId,
    /// Context whose commit waited longest.
    pub context: ContextId,
    /// First tick that saw the commit held.
    pub held_since: HostTime,
    /// Tick at which the timeout fired.
    pub now: HostTime,
}

/// Per-frame summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u64,
    /// Which display.
    pub display: DisplayId,
    /// Host time of the tick.
    pub now: HostTime,
    /// Commits applied this tick.
    pub commits_applied: u32,
    /// Commits still held at the end of the tick.
    pub commits_held: u32,
    /// Fences force-cleared this tick.
    pub fences_forced: u32,
    /// Interpolations still running after sampling.
    pub animations_running: u32,
    /// Items in the render plan.
    pub items_painted: u32,
    /// Damage for this frame.
    pub damage: DamageSummary,
    /// Duration of each phase in ticks, indexed like [`PhaseKind::ALL`]
    /// (0 if not measured).
    pub phase_ticks: [u64; 5],
}

impl FrameSummary {
    /// Duration of one phase in ticks.
    #[must_use]
    pub fn phase(&self, phase: PhaseKind) -> u64 {
        self.phase_ticks[phase_index(phase)]
    }
}

/// A per-frame node change record.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct NodeChange {
    /// Context the node belongs to.
    pub context: ContextId,
    /// Slot index of the node that changed.
    pub node_index: u32,
    /// Which field changed.
    pub field: NodeField,
}

/// An axis-aligned damage rectangle in display pixels.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct DamageRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the compositor.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a display tick starts a pass.
    fn on_tick(&mut self, e: &TickEvent) {
        _ = e;
    }

    /// Called at the beginning of a phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called when a commit is accepted into a staged queue.
    fn on_commit_staged(&mut self, e: &CommitEvent) {
        _ = e;
    }

    /// Called the first time a commit is seen blocked by its fence.
    fn on_commit_held(&mut self, e: &CommitEvent) {
        _ = e;
    }

    /// Called when a commit becomes visible.
    fn on_commit_applied(&mut self, e: &CommitEvent) {
        _ = e;
    }

    /// Called when a fence gating staged commits is observed cleared.
    fn on_fence_cleared(&mut self, e: &FenceClearedEvent) {
        _ = e;
    }

    /// Called when a fence is force-cleared by the timeout policy.
    fn on_fence_timeout(&mut self, e: &FenceTimeoutEvent) {
        _ = e;
    }

    /// Called with the per-frame summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }

    /// Called with per-frame node changes (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_node_changes(&mut self, frame_index: u64, changes: &[NodeChange]) {
        _ = (frame_index, changes);
    }

    /// Called with per-frame damage rectangles (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        _ = (frame_index, rects);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $e:expr) => {{
        #[cfg(feature = "trace")]
        if let Some(s) = &mut $self.sink {
            s.$method($e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = $e;
        }
    }};
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`TickEvent`].
    #[inline]
    pub fn tick(&mut self, e: &TickEvent) {
        dispatch!(self, on_tick, e);
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&mut self, e: &PhaseBeginEvent) {
        dispatch!(self, on_phase_begin, e);
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&mut self, e: &PhaseEndEvent) {
        dispatch!(self, on_phase_end, e);
    }

    /// Emits a staged [`CommitEvent`].
    #[inline]
    pub fn commit_staged(&mut self, e: &CommitEvent) {
        dispatch!(self, on_commit_staged, e);
    }

    /// Emits a held [`CommitEvent`].
    #[inline]
    pub fn commit_held(&mut self, e: &CommitEvent) {
        dispatch!(self, on_commit_held, e);
    }

    /// Emits an applied [`CommitEvent`].
    #[inline]
    pub fn commit_applied(&mut self, e: &CommitEvent) {
        dispatch!(self, on_commit_applied, e);
    }

    /// Emits a [`FenceClearedEvent`].
    #[inline]
    pub fn fence_cleared(&mut self, e: &FenceClearedEvent) {
        dispatch!(self, on_fence_cleared, e);
    }

    /// Emits a [`FenceTimeoutEvent`].
    #[inline]
    pub fn fence_timeout(&mut self, e: &FenceTimeoutEvent) {
        dispatch!(self, on_fence_timeout, e);
    }

    /// Emits a [`FrameSummary`].
    #[inline]
    pub fn frame_summary(&mut self, s: &FrameSummary) {
        dispatch!(self, on_frame_summary, s);
    }

    /// Emits node changes (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn node_changes(&mut self, frame_index: u64, changes: &[NodeChange]) {
        if let Some(s) = &mut self.sink {
            s.on_node_changes(frame_index, changes);
        }
    }

    /// Emits damage rectangles (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        if let Some(s) = &mut self.sink {
            s.on_damage_rects(frame_index, rects);
        }
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps and counters during a pass and produces a
/// [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    tick: TickEvent,
    phase_starts: [Option<HostTime>; 5],
    phase_ends: [Option<HostTime>; 5],
    commits_applied: u32,
    commits_held: u32,
    fences_forced: u32,
    animations_running: u32,
    items_painted: u32,
    damage: DamageSummary,
}

impl FrameSummaryBuilder {
    /// Starts building a summary for the given tick.
    #[must_use]
    pub fn new(tick: &TickEvent) -> Self {
        Self {
            tick: *tick,
            phase_starts: [None; 5],
            phase_ends: [None; 5],
            commits_applied: 0,
            commits_held: 0,
            fences_forced: 0,
            animations_running: 0,
            items_painted: 0,
            damage: DamageSummary::None,
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Counts one applied commit.
    pub fn commit_applied(&mut self) {
        self.commits_applied += 1;
    }

    /// Sets how many commits remain held.
    pub fn set_commits_held(&mut self, n: u32) {
        self.commits_held = n;
    }

    /// Counts one force-cleared fence.
    pub fn fence_forced(&mut self) {
        self.fences_forced += 1;
    }

    /// Sets how many interpolations are still running.
    pub fn set_animations_running(&mut self, n: u32) {
        self.animations_running = n;
    }

    /// Sets how many items were painted.
    pub fn set_items_painted(&mut self, n: u32) {
        self.items_painted = n;
    }

    /// Sets the frame's damage.
    pub fn set_damage(&mut self, damage: DamageSummary) {
        self.damage = damage;
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self) -> FrameSummary {
        let mut phase_ticks = [0; 5];
        for phase in PhaseKind::ALL {
            phase_ticks[phase_index(phase)] = self.phase_duration(phase);
        }
        FrameSummary {
            frame_index: self.tick.frame_index,
            display: self.tick.display,
            now: self.tick.now,
            commits_applied: self.commits_applied,
            commits_held: self.commits_held,
            fences_forced: self.fences_forced,
            animations_running: self.animations_running,
            items_painted: self.items_painted,
            damage: self.damage,
            phase_ticks,
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).ticks(),
            _ => 0,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::Resolve => 0,
        PhaseKind::Apply => 1,
        PhaseKind::Sample => 2,
        PhaseKind::Paint => 3,
        PhaseKind::Output => 4,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tick() -> TickEvent {
        TickEvent {
            frame_index: 42,
            display: DisplayId::MAIN,
            now: HostTime(1_000_000),
            refresh_interval: Some(Duration(16_666_667)),
        }
    }

    #[test]
    fn tick_event_from_frame_tick() {
        let tick = FrameTick::new(7, HostTime(100));
        let evt = TickEvent::from(&tick);
        assert_eq!(evt.frame_index, 7);
        assert_eq!(evt.display, DisplayId::MAIN);
        assert_eq!(evt.now, HostTime(100));
        assert_eq!(evt.refresh_interval, None);
    }

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        sink.on_tick(&sample_tick());
        sink.on_frame_summary(&FrameSummaryBuilder::new(&sample_tick()).finish());
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.tick(&sample_tick());
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index: 0,
            phase: PhaseKind::Apply,
            timestamp: HostTime(0),
        });
    }

    #[test]
    fn summary_builder_computes_durations_and_counts() {
        let mut builder = FrameSummaryBuilder::new(&sample_tick());
        builder.phase_begin(PhaseKind::Apply, HostTime(1_000_000));
        builder.phase_end(PhaseKind::Apply, HostTime(1_000_400));
        builder.phase_begin(PhaseKind::Paint, HostTime(1_000_400));
        builder.phase_end(PhaseKind::Paint, HostTime(1_001_900));
        builder.commit_applied();
        builder.commit_applied();
        builder.fence_forced();
        builder.set_commits_held(3);
        builder.set_items_painted(12);
        builder.set_damage(DamageSummary::Partial(2));

        let summary = builder.finish();
        assert_eq!(summary.phase(PhaseKind::Apply), 400);
        assert_eq!(summary.phase(PhaseKind::Paint), 1500);
        assert_eq!(summary.phase(PhaseKind::Resolve), 0, "unmeasured phase");
        assert_eq!(summary.commits_applied, 2);
        assert_eq!(summary.commits_held, 3);
        assert_eq!(summary.fences_forced, 1);
        assert_eq!(summary.items_painted, 12);
        assert_eq!(summary.damage, DamageSummary::Partial(2));
        assert_eq!(summary.frame_index, 42);
    }

    #[test]
    fn phase_names_are_unique() {
        for (i, a) in PhaseKind::ALL.iter().enumerate() {
            assert_eq!(phase_index(*a), i, "ALL is in index order");
            for b in &PhaseKind::ALL[i + 1..] {
                assert_ne!(a.name(), b.name(), "duplicate phase name");
            }
        }
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        use alloc::vec::Vec;

        struct RecordingSink {
            ticks: Vec<u64>,
            forced: Vec<bool>,
        }
        impl TraceSink for RecordingSink {
            fn on_tick(&mut self, e: &TickEvent) {
                self.ticks.push(e.frame_index);
            }
            fn on_fence_cleared(&mut self, e: &FenceClearedEvent) {
                self.forced.push(e.forced);
            }
        }

        let mut sink = RecordingSink {
            ticks: Vec::new(),
            forced: Vec::new(),
        };
        let mut tracer = Tracer::new(&mut sink);
        tracer.tick(&sample_tick());
        tracer.fence_cleared(&FenceClearedEvent {
            frame_index: 42,
            fence: FenceId(crate::handle::RawHandle::from_parts(0, 0)),
            forced: true,
        });
        drop(tracer);
        assert_eq!(sink.ticks, &[42]);
        assert_eq!(sink.forced, &[true]);
    }
}
