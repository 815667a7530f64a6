// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content-node tree data model.
//!
//! A *content node* is a rectangular visual element in a compositing tree.
//! Each node has:
//!
//! - An identity ([`NodeId`]), a generational handle that goes stale when
//!   the node is destroyed.
//! - Topology: parent, first-child and sibling links forming an ordered
//!   tree. Later siblings paint in front of earlier ones unless z-position
//!   says otherwise.
//! - **Attributes** read and written through [`Property`] /
//!   [`PropertyValue`]: bounds, anchor point, position, transform,
//!   z-position, opacity, corner radius, masks-to-bounds, backing surface,
//!   mask, content kind and hidden flag.
//! - **Computed state** produced by [`evaluate`](NodeStore::evaluate): world
//!   transform, effective opacity and effective hidden flag. The effective
//!   frame is derived from these on demand.
//!
//! Nodes live in struct-of-arrays layout with index-based handles.

mod evaluate;
mod id;
mod kind;
mod property;
mod store;
mod traverse;

pub use evaluate::FrameChanges;
pub use id::{INVALID, NodeId, ROOT_NODE, SurfaceId};
pub use kind::{ClipShape, ContentKind};
pub use property::{Property, PropertyValue};
pub use store::{DEFAULT_ANCHOR, NodeStore};
pub use traverse::Children;
