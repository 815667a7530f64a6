// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types for transactional cross-process compositing.
//!
//! `lamina_core` provides the data structures shared by client processes and
//! the compositing server. It is `no_std` compatible (with `alloc`) and uses
//! arena tables with generational handles throughout, so a destroyed object
//! is reported as [`Error::StaleReference`] instead of aliasing a newer one.
//!
//! # Architecture
//!
//! ```text
//!   Client (per process)                      Server
//!   ────────────────────                      ──────
//!   model NodeStore                           ContextTable
//!       │  create / set / add_child              │
//!       ▼                                        ▼
//!   Transaction ──commit──► Commit ──submit──► staged queue ──┐
//!                     (one per context)                       │ fence open?
//!                                                             ▼
//!   FenceTable ◄── acquire / release / trigger ──     presentation + render
//! ```
//!
//! **[`node`]**: Struct-of-arrays content-node tree. Properties are set by
//! the owner; world transforms, effective opacity and effective frames are
//! derived by evaluation and never stored independently.
//!
//! **[`transaction`]**: The client-side [`Client`](transaction::Client) with
//! explicit and implicit transactions, undo on discard and completion
//! callbacks.
//!
//! **[`commit`]**: Plain-data commit messages that cross the process
//! boundary.
//!
//! **[`fence`]**: Release-counted fences with per-party accounting.
//!
//! **[`context`]**: The server's per-context presentation and render
//! mirrors, staged commit queues and running interpolations.
//!
//! **[`animation`]**: Timing curves, repeat policy and interpolation
//! sampling.
//!
//! **[`dirty`]**: Multi-channel dirty tracking via `understory_dirty`.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! compositor instrumentation, with zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-node
//!   change and damage-rect events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod animation;
pub mod commit;
pub mod context;
pub mod dirty;
pub mod display;
pub mod error;
pub mod fence;
pub mod handle;
pub mod node;
pub mod time;
pub mod timing;
pub mod trace;
pub mod transaction;
pub mod transform;

pub use error::{Error, Result};
