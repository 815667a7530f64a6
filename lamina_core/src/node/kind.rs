// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content kinds and clip shapes.

use crate::handle::ContextId;

/// What a node draws.
///
/// A closed set dispatched by a single `match` in the compositor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// A grouping node; draws its backing surface if it has one.
    #[default]
    Plain,
    /// Image content in the backing surface.
    Image,
    /// Vector shape rasterized into the backing surface by the producer.
    Shape,
    /// Text rasterized into the backing surface by the producer.
    Text,
    /// Hosts another context's tree beneath this node.
    ContextHost(ContextId),
}

/// A shape used to clip a node's content and descendants, in the node's
/// local (bounds) space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClipShape {
    /// An axis-aligned rectangle.
    Rect(kurbo::Rect),
    /// A rectangle with rounded corners.
    RoundedRect(kurbo::RoundedRect),
}

impl ClipShape {
    /// Returns the clip's bounding rectangle.
    #[must_use]
    pub fn bounding_rect(&self) -> kurbo::Rect {
        match self {
            Self::Rect(r) => *r,
            Self::RoundedRect(rr) => rr.rect(),
        }
    }
}
