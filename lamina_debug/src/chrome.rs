// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads events captured by a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Each display becomes a trace process. Compositor phases are duration
//! slices on thread 0, and commits are instants on a thread per sending
//! client process.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use lamina_core::time::Timebase;
use lamina_core::trace::{CommitEvent, DamageSummary};

use crate::recorder::RecordedEvent;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
/// Events without their own timestamp reuse the last tick's.
pub fn export(
    events: &[RecordedEvent],
    timebase: Timebase,
    writer: &mut dyn Write,
) -> io::Result<()> {
    let mut out: Vec<Value> = Vec::new();
    let mut display = 0_u32;
    let mut last_ts = 0.0_f64;

    for recorded in events {
        match recorded {
            RecordedEvent::Tick(e) => {
                display = e.display.0;
                last_ts = ticks_to_us(e.now.ticks(), timebase);
                out.push(json!({
                    "ph": "i",
                    "name": "Tick",
                    "cat": "Frame",
                    "ts": last_ts,
                    "pid": display,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "frame_index": e.frame_index,
                        "refresh_interval": e.refresh_interval.map(|d| d.ticks()),
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                out.push(json!({
                    "ph": "B",
                    "name": e.phase.name(),
                    "cat": "Frame",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": display,
                    "tid": 0,
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                out.push(json!({
                    "ph": "E",
                    "name": e.phase.name(),
                    "cat": "Frame",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": display,
                    "tid": 0,
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::CommitStaged(e) => {
                out.push(commit_instant("CommitStaged", e, display, last_ts));
            }
            RecordedEvent::CommitHeld(e) => {
                out.push(commit_instant("CommitHeld", e, display, last_ts));
            }
            RecordedEvent::CommitApplied(e) => {
                out.push(commit_instant("CommitApplied", e, display, last_ts));
            }
            RecordedEvent::FenceCleared(e) => {
                out.push(json!({
                    "ph": "i",
                    "name": "FenceCleared",
                    "cat": "Fence",
                    "ts": last_ts,
                    "pid": display,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "frame_index": e.frame_index,
                        "fence": format!("{:?}", e.fence),
                        "forced": e.forced,
                    }
                }));
            }
            RecordedEvent::FenceTimeout(e) => {
                let held_since = ticks_to_us(e.held_since.ticks(), timebase);
                out.push(json!({
                    "ph": "X",
                    "name": "FenceTimeout",
                    "cat": "Fence",
                    "ts": held_since,
                    "dur": ticks_to_us(e.now.ticks(), timebase) - held_since,
                    "pid": display,
                    "tid": 0,
                    "args": {
                        "frame_index": e.frame_index,
                        "fence": format!("{:?}", e.fence),
                        "context": format!("{:?}", e.context),
                    }
                }));
            }
            RecordedEvent::FrameSummary(s) => {
                let phases: serde_json::Map<String, Value> = lamina_core::trace::PhaseKind::ALL
                    .iter()
                    .map(|&p| {
                        (
                            format!("{}_us", p.name()),
                            json!(ticks_to_us(s.phase(p), timebase)),
                        )
                    })
                    .collect();
                out.push(json!({
                    "ph": "i",
                    "name": "FrameSummary",
                    "cat": "Summary",
                    "ts": ticks_to_us(s.now.ticks(), timebase),
                    "pid": s.display.0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "frame_index": s.frame_index,
                        "commits_applied": s.commits_applied,
                        "commits_held": s.commits_held,
                        "fences_forced": s.fences_forced,
                        "animations_running": s.animations_running,
                        "items_painted": s.items_painted,
                        "damage": damage_value(s.damage),
                        "phases": phases,
                    }
                }));
            }
            RecordedEvent::NodeChangesCount { frame_index, count } => {
                out.push(json!({
                    "ph": "i",
                    "name": "NodeChanges",
                    "cat": "Rich",
                    "ts": last_ts,
                    "pid": display,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "frame_index": frame_index,
                        "count": count,
                    }
                }));
            }
            RecordedEvent::DamageRectsCount { frame_index, count } => {
                out.push(json!({
                    "ph": "i",
                    "name": "DamageRects",
                    "cat": "Rich",
                    "ts": last_ts,
                    "pid": display,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "frame_index": frame_index,
                        "count": count,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &out)?;
    Ok(())
}

fn commit_instant(name: &str, e: &CommitEvent, display: u32, ts: f64) -> Value {
    json!({
        "ph": "i",
        "name": name,
        "cat": "Commit",
        "ts": ts,
        "pid": display,
        // Thread 0 is the compositor.
        "tid": e.process.0 + 1,
        "s": "t",
        "args": {
            "frame_index": e.frame_index,
            "context": format!("{:?}", e.context),
            "transaction": format!("{:?}", e.transaction),
            "seq": e.seq,
            "fence": e.fence.map(|f| format!("{f:?}")),
        }
    })
}

fn damage_value(damage: DamageSummary) -> Value {
    match damage {
        DamageSummary::None => json!("none"),
        DamageSummary::Partial(n) => json!(n),
        DamageSummary::Full => json!("full"),
    }
}

fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use lamina_core::display::DisplayId;
    use lamina_core::time::HostTime;
    use lamina_core::trace::{PhaseBeginEvent, PhaseEndEvent, PhaseKind, TickEvent, TraceSink};

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_tick(&TickEvent {
            frame_index: 0,
            display: DisplayId::MAIN,
            now: HostTime(1_000_000),
            refresh_interval: Some(lamina_core::time::Duration(16_666_667)),
        });
        rec.on_phase_begin(&PhaseBeginEvent {
            frame_index: 0,
            phase: PhaseKind::Apply,
            timestamp: HostTime(1_000_000),
        });
        rec.on_phase_end(&PhaseEndEvent {
            frame_index: 0,
            phase: PhaseKind::Apply,
            timestamp: HostTime(1_000_100),
        });

        let mut out = Vec::new();
        export(rec.events(), Timebase::NANOS, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 3);

        assert_eq!(parsed[0]["ph"], "i");
        assert_eq!(parsed[0]["name"], "Tick");
        assert_eq!(parsed[0]["args"]["refresh_interval"], 16_666_667);

        assert_eq!(parsed[1]["ph"], "B");
        assert_eq!(parsed[1]["name"], "apply");

        assert_eq!(parsed[2]["ph"], "E");
        assert_eq!(parsed[2]["name"], "apply");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], Timebase::NANOS, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty());
    }
}
