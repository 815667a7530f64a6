// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants for content-node stores.
//!
//! Each [`NodeStore`](crate::node::NodeStore) keeps an
//! [`understory_dirty`] tracker. Property writes mark the channel for their
//! category:
//!
//! - **Propagating**: [`GEOMETRY`] and [`OPACITY`] are marked with
//!   [`EagerPolicy`](understory_dirty::EagerPolicy) over child→parent
//!   dependency edges, because world transforms, effective opacity and
//!   effective hidden state are inherited. Hidden-flag changes ride on
//!   [`GEOMETRY`].
//! - **Local-only**: [`APPEARANCE`] (clip, corner radius) and [`CONTENT`]
//!   (backing surface, mask, kind) only mark the written node.
//! - **Structural**: [`TOPOLOGY`] is marked on create/destroy/attach/detach
//!   and on z-position changes, and triggers a paint-order rebuild.

use understory_dirty::Channel;

/// Bounds, anchor, position, transform or hidden flag changed.
pub const GEOMETRY: Channel = Channel::new(0);

/// Opacity changed.
pub const OPACITY: Channel = Channel::new(1);

/// Clip-related attributes changed.
pub const APPEARANCE: Channel = Channel::new(2);

/// Backing surface, mask reference or content kind changed.
pub const CONTENT: Channel = Channel::new(3);

/// Tree topology or sibling paint order changed.
pub const TOPOLOGY: Channel = Channel::new(4);
