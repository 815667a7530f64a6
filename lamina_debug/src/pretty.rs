// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use lamina_core::time::{HostTime, Timebase};
use lamina_core::trace::{
    CommitEvent, DamageRect, DamageSummary, FenceClearedEvent, FenceTimeoutEvent, FrameSummary,
    NodeChange, PhaseBeginEvent, PhaseEndEvent, PhaseKind, TickEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn ticks_to_us(&self, ticks: u64) -> f64 {
        self.timebase.ticks_to_nanos(ticks) as f64 / 1000.0
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.ticks_to_us(t.ticks())
    }

    fn commit(&mut self, tag: &str, e: &CommitEvent) {
        let _ = writeln!(
            self.writer,
            "[{tag}] frame={} ctx={:?} txn={:?} seq={} fence={}",
            e.frame_index,
            e.context,
            e.transaction,
            e.seq,
            e.fence.map_or_else(|| "-".to_owned(), |f| format!("{f:?}")),
        );
    }
}

fn damage_label(damage: DamageSummary) -> String {
    match damage {
        DamageSummary::None => "none".to_owned(),
        DamageSummary::Partial(n) => format!("{n}rects"),
        DamageSummary::Full => "full".to_owned(),
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_tick(&mut self, e: &TickEvent) {
        let _ = writeln!(
            self.writer,
            "[tick] frame={} display={} now={:.1}µs",
            e.frame_index,
            e.display.0,
            self.host_us(e.now),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] frame={} {} at {:.1}µs",
            e.frame_index,
            e.phase.name(),
            self.host_us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] frame={} {} at {:.1}µs",
            e.frame_index,
            e.phase.name(),
            self.host_us(e.timestamp),
        );
    }

    fn on_commit_staged(&mut self, e: &CommitEvent) {
        self.commit("staged", e);
    }

    fn on_commit_held(&mut self, e: &CommitEvent) {
        self.commit("held", e);
    }

    fn on_commit_applied(&mut self, e: &CommitEvent) {
        self.commit("applied", e);
    }

    fn on_fence_cleared(&mut self, e: &FenceClearedEvent) {
        let how = if e.forced { "FORCED" } else { "ok" };
        let _ = writeln!(
            self.writer,
            "[fence] frame={} {:?} cleared={how}",
            e.frame_index, e.fence,
        );
    }

    fn on_fence_timeout(&mut self, e: &FenceTimeoutEvent) {
        let _ = writeln!(
            self.writer,
            "[timeout] frame={} {:?} ctx={:?} held={:.1}µs",
            e.frame_index,
            e.fence,
            e.context,
            self.ticks_to_us(e.now.ticks().saturating_sub(e.held_since.ticks())),
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let _ = writeln!(
            self.writer,
            "[summary] frame={} applied={} held={} forced={} anims={} items={} damage={} \
             resolve={:.1}µs apply={:.1}µs sample={:.1}µs paint={:.1}µs output={:.1}µs",
            s.frame_index,
            s.commits_applied,
            s.commits_held,
            s.fences_forced,
            s.animations_running,
            s.items_painted,
            damage_label(s.damage),
            self.ticks_to_us(s.phase(PhaseKind::Resolve)),
            self.ticks_to_us(s.phase(PhaseKind::Apply)),
            self.ticks_to_us(s.phase(PhaseKind::Sample)),
            self.ticks_to_us(s.phase(PhaseKind::Paint)),
            self.ticks_to_us(s.phase(PhaseKind::Output)),
        );
    }

    fn on_node_changes(&mut self, frame_index: u64, changes: &[NodeChange]) {
        let _ = writeln!(
            self.writer,
            "[nodes] frame={frame_index} changes={}",
            changes.len(),
        );
    }

    fn on_damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        let _ = writeln!(
            self.writer,
            "[damage] frame={frame_index} rects={}",
            rects.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_core::display::DisplayId;

    #[test]
    fn pretty_print_tick() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::NANOS);
        sink.on_tick(&TickEvent {
            frame_index: 1,
            display: DisplayId::MAIN,
            now: HostTime(1_000_000),
            refresh_interval: None,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.contains("[tick]"), "got: {output}");
        assert!(output.contains("frame=1"), "got: {output}");
        assert!(output.contains("now=1000.0µs"), "got: {output}");
    }

    #[test]
    fn forced_clear_is_flagged() {
        let mut fences = lamina_core::fence::FenceTable::new();
        let fence = fences.create();
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::NANOS);
        sink.on_fence_cleared(&FenceClearedEvent {
            frame_index: 7,
            fence,
            forced: true,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.starts_with("[fence] frame=7"), "got: {output}");
        assert!(output.contains("cleared=FORCED"), "got: {output}");
    }
}
