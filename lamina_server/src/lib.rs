// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The lamina compositing server.
//!
//! This crate owns all cross-process state and serializes every change to
//! it. Client processes talk to it only through plain-data messages.
//!
//! ```text
//!  ServerHandle ──Request──► Server::pump ──► typed operations
//!                                               │
//!        ┌──────────────┬──────────────┬────────┴─────┬──────────────┐
//!        ▼              ▼              ▼              ▼              ▼
//!   ContextTable    FenceTable    SceneManager   GroupTable   FocusRegister
//!        │              │              │
//!        └──────┬───────┘       DisplayLayout::resolve
//!               ▼                      │
//!   Server::tick ──► Compositor ◄──────┘ placements ──► OutputStage
//! ```
//!
//! - [`scene`]: scenes, member layers and versioned settings diffs.
//! - [`manager`]: scene lifecycle, bindings, embedding and policy.
//! - [`layout`]: per-display placement and resolution to context
//!   placements.
//! - [`group`]: synchronized groups sharing one fence.
//! - [`input`]: focus register and hit-test routing.
//! - [`message`]: requests, replies, notifications and the queue handle.
//! - [`server`]: the [`Server`] store, frame loop and process-death sweep.
//!
//! # Crate features
//!
//! - `trace` / `trace-rich` (disabled by default): Forward to the
//!   corresponding `lamina_core` and `lamina_render` features.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod group;
pub mod input;
pub mod layout;
pub mod manager;
pub mod message;
pub mod scene;
pub mod server;

pub use config::{ScenePolicy, ServerConfig};
pub use message::{HandleError, Notification, Reply, Request, ServerHandle};
pub use server::Server;
