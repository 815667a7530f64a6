// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pretty-printing, recording and Chrome trace export for lamina
//! diagnostics.
//!
//! This crate provides [`TraceSink`](lamina_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output.
//! - [`recorder::RecorderSink`]: keeps every event in memory as a
//!   [`recorder::RecordedEvent`].
//! - [`chrome::export`]: writes Chrome Trace Event Format JSON from recorded
//!   events.

pub mod chrome;
pub mod pretty;
pub mod recorder;
