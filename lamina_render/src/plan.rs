// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render plan: an ordered sequence of draw items for one frame.

use alloc::vec::Vec;

use kurbo::Rect;
use lamina_core::display::DisplayId;
use lamina_core::handle::ContextId;
use lamina_core::node::{ClipShape, ContentKind, NodeId, SurfaceId};
use lamina_core::time::HostTime;

use crate::damage::DamageRegion;

/// Blend mode for compositing a render item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Standard source-over alpha compositing.
    #[default]
    SourceOver,
    /// Multiply blend.
    Multiply,
    /// Screen blend.
    Screen,
}

/// A single draw command in the render plan.
///
/// Items are produced in back-to-front order: placements by level, then
/// each context's nodes in paint order, with hosted contexts painted
/// directly after their host node.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderItem {
    /// Context the node belongs to.
    pub context: ContextId,
    /// The node this item originates from.
    pub node: NodeId,
    /// What the node draws.
    pub kind: ContentKind,
    /// The surface to draw (if any; grouping nodes have `None`).
    pub surface: Option<SurfaceId>,
    /// Display-space transform (column-major 4x4).
    pub transform: [f32; 16],
    /// Display-space axis-aligned bounds of the node.
    pub frame: Rect,
    /// Effective opacity (0.0–1.0, accumulated from ancestors and the
    /// placement).
    pub opacity: f32,
    /// Clip shape in the node's local coordinates, if any.
    pub clip: Option<ClipShape>,
    /// Node in the same context whose coverage masks this item. Mask
    /// sources are not painted as items of their own.
    pub mask: Option<NodeId>,
    /// Display-space rectangle the item is confined to, if its placement
    /// clips.
    pub scissor: Option<Rect>,
    /// Nesting depth through context hosts (0 for placed contexts).
    pub host_depth: u8,
    /// Blend mode.
    pub blend_mode: BlendMode,
}

/// An ordered list of draw commands for a single frame on a single display.
///
/// Output stages translate this into native compositor operations or GPU
/// draw calls depending on their rendering strategy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderPlan {
    /// Target display for this plan.
    pub display: DisplayId,
    /// Frame counter of the tick that produced the plan.
    pub frame_index: u64,
    /// Sampling time of every interpolation in the plan.
    pub timestamp: HostTime,
    /// Draw items in back-to-front order.
    pub items: Vec<RenderItem>,
    /// What changed since the previous plan.
    pub damage: DamageRegion,
}

impl RenderPlan {
    /// Creates an empty render plan for the given display.
    #[must_use]
    pub fn new(display: DisplayId) -> Self {
        Self {
            display,
            frame_index: 0,
            timestamp: HostTime(0),
            items: Vec::new(),
            damage: DamageRegion::Full,
        }
    }

    /// Clears the plan for reuse.
    pub fn clear(&mut self) {
        self.items.clear();
        self.damage = DamageRegion::None;
    }

    /// Returns the items that belong to `context`, in paint order.
    pub fn items_for(&self, context: ContextId) -> impl Iterator<Item = &RenderItem> + '_ {
        self.items.iter().filter(move |item| item.context == context)
    }

    /// Returns the first item drawn for `node` in `context`.
    #[must_use]
    pub fn find(&self, context: ContextId, node: NodeId) -> Option<&RenderItem> {
        self.items
            .iter()
            .find(|item| item.context == context && item.node == node)
    }
}

#[cfg(test)]
mod tests {
    use lamina_core::handle::RawHandle;

    use super::*;

    fn item(context: ContextId, node: NodeId) -> RenderItem {
        RenderItem {
            context,
            node,
            kind: ContentKind::Plain,
            surface: None,
            transform: [0.0; 16],
            frame: Rect::ZERO,
            opacity: 1.0,
            clip: None,
            mask: None,
            scissor: None,
            host_depth: 0,
            blend_mode: BlendMode::default(),
        }
    }

    #[test]
    fn lookup_by_context_and_node() {
        let a = ContextId(RawHandle::from_parts(0, 0));
        let b = ContextId(RawHandle::from_parts(1, 0));
        let n0 = NodeId::from_parts(0, 0);
        let n1 = NodeId::from_parts(1, 0);
        let mut plan = RenderPlan::new(DisplayId::MAIN);
        plan.items.push(item(a, n0));
        plan.items.push(item(b, n0));
        plan.items.push(item(a, n1));

        assert_eq!(plan.items_for(a).count(), 2);
        assert!(plan.find(b, n0).is_some());
        assert!(plan.find(b, n1).is_none());

        plan.clear();
        assert!(plan.items.is_empty());
        assert!(plan.damage.is_empty());
    }
}
