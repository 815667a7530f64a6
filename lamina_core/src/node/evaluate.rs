// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame evaluation and change tracking.
//!
//! Evaluation drains each dirty channel and recomputes in
//! parent-before-child order:
//!
//! 1. **GEOMETRY**: `world_transform = parent_world * local_matrix` and
//!    `effective_hidden = parent_effective_hidden || hidden`.
//! 2. **OPACITY**: `effective_opacity = parent_effective * opacity`.
//! 3. **APPEARANCE** / **CONTENT**: drained and reported only; consumers
//!    read current values from the store.
//! 4. **TOPOLOGY**: drained and discarded; the paint order was already
//!    rebuilt at the start of evaluation if needed.
//!
//! [`FrameChanges`] uses raw slot indices so consumers can index straight
//! into the store's arrays through the `*_at()` accessors.

use alloc::vec::Vec;

use super::id::{INVALID, NodeId};
use super::store::NodeStore;
use crate::dirty;
use crate::error::{Error, Result};
use crate::transform::Transform3d;

/// The set of changes produced by a single [`NodeStore::evaluate`] call.
#[derive(Clone, Debug, Default)]
pub struct FrameChanges {
    /// Nodes whose world transform was recomputed.
    pub geometry: Vec<u32>,
    /// Nodes whose effective opacity was recomputed.
    pub opacities: Vec<u32>,
    /// Nodes whose clip attributes changed.
    pub appearance: Vec<u32>,
    /// Nodes whose backing, mask or kind changed.
    pub content: Vec<u32>,
    /// Nodes that became effectively hidden.
    pub hidden: Vec<u32>,
    /// Nodes that became visible again.
    pub unhidden: Vec<u32>,
    /// Nodes created since the last evaluate.
    pub added: Vec<u32>,
    /// Nodes destroyed since the last evaluate.
    pub removed: Vec<u32>,
    /// Whether the paint order was rebuilt.
    pub topology_changed: bool,
}

impl FrameChanges {
    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.geometry.clear();
        self.opacities.clear();
        self.appearance.clear();
        self.content.clear();
        self.hidden.clear();
        self.unhidden.clear();
        self.added.clear();
        self.removed.clear();
        self.topology_changed = false;
    }

    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
            && self.opacities.is_empty()
            && self.appearance.is_empty()
            && self.content.is_empty()
            && self.hidden.is_empty()
            && self.unhidden.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
            && !self.topology_changed
    }
}

impl NodeStore {
    /// Evaluates the tree, recomputing dirty properties and returning the
    /// set of changes.
    pub fn evaluate(&mut self) -> FrameChanges {
        let mut changes = FrameChanges::default();
        self.evaluate_into(&mut changes);
        changes
    }

    /// Like [`evaluate`](Self::evaluate), but reuses a caller-provided buffer.
    pub fn evaluate_into(&mut self, changes: &mut FrameChanges) {
        changes.clear();

        if self.traversal_dirty {
            self.rebuild_paint_order();
            changes.topology_changed = true;
            self.traversal_dirty = false;
        }

        let dirty_geometry: Vec<u32> = self
            .dirty
            .drain(dirty::GEOMETRY)
            .affected()
            .deterministic()
            .run()
            .collect();
        for &idx in &dirty_geometry {
            let i = idx as usize;
            if !self.alive[i] {
                continue;
            }
            let parent_idx = self.parent[i];
            let (parent_world, parent_hidden) = if parent_idx != INVALID {
                (
                    self.world_transform[parent_idx as usize],
                    self.effective_hidden[parent_idx as usize],
                )
            } else {
                (Transform3d::IDENTITY, false)
            };
            self.world_transform[i] = parent_world * self.local_matrix_at(idx);

            let new_hidden = parent_hidden || self.hidden[i];
            if new_hidden != self.effective_hidden[i] {
                if new_hidden {
                    changes.hidden.push(idx);
                } else {
                    changes.unhidden.push(idx);
                }
                self.effective_hidden[i] = new_hidden;
            }
        }
        changes.geometry = dirty_geometry;

        let dirty_opacities: Vec<u32> = self
            .dirty
            .drain(dirty::OPACITY)
            .affected()
            .deterministic()
            .run()
            .collect();
        for &idx in &dirty_opacities {
            let i = idx as usize;
            if !self.alive[i] {
                continue;
            }
            let parent_opacity = match self.parent[i] {
                INVALID => 1.0,
                p => self.effective_opacity[p as usize],
            };
            self.effective_opacity[i] = parent_opacity * self.opacity[i];
        }
        changes.opacities = dirty_opacities;

        changes.appearance = self
            .dirty
            .drain(dirty::APPEARANCE)
            .deterministic()
            .run()
            .collect();

        changes.content = self
            .dirty
            .drain(dirty::CONTENT)
            .deterministic()
            .run()
            .collect();

        let _: Vec<u32> = self
            .dirty
            .drain(dirty::TOPOLOGY)
            .deterministic()
            .run()
            .collect();

        core::mem::swap(&mut self.pending_added, &mut changes.added);
        core::mem::swap(&mut self.pending_removed, &mut changes.removed);
    }

    /// Returns the current paint order, back to front.
    ///
    /// Depth-first pre-order from each root in slot order; siblings are
    /// visited in ascending z-position, ties keeping sibling order. Only
    /// valid after [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn paint_order(&self) -> &[u32] {
        &self.paint_order
    }

    /// Returns the contiguous slice of [`paint_order`](Self::paint_order)
    /// covering the subtree rooted at the parentless node `root`.
    ///
    /// Fails with [`Error::InvalidState`] if `root` has a parent.
    pub fn paint_order_under(&self, root: NodeId) -> Result<&[u32]> {
        self.validate(root)?;
        if self.parent[root.idx as usize] != INVALID {
            return Err(Error::InvalidState);
        }
        let Some(start) = self.paint_order.iter().position(|&i| i == root.idx) else {
            return Ok(&[]);
        };
        let len = self.paint_order[start + 1..]
            .iter()
            .take_while(|&&i| self.parent[i as usize] != INVALID)
            .count();
        Ok(&self.paint_order[start..=start + len])
    }

    fn rebuild_paint_order(&mut self) {
        self.paint_order.clear();
        let mut siblings = Vec::new();
        for idx in 0..self.len {
            if self.alive[idx as usize] && self.parent[idx as usize] == INVALID {
                self.dfs_collect(idx, &mut siblings);
            }
        }
    }

    fn dfs_collect(&mut self, idx: u32, scratch: &mut Vec<u32>) {
        self.paint_order.push(idx);
        let start = scratch.len();
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            scratch.push(child);
            child = self.next_sibling[child as usize];
        }
        let z = &self.z_position;
        scratch[start..].sort_by(|a, b| z[*a as usize].total_cmp(&z[*b as usize]));
        for k in start..scratch.len() {
            let child = scratch[k];
            self.dfs_collect(child, scratch);
        }
        scratch.truncate(start);
    }
}

#[cfg(test)]
mod tests {
    use kurbo::{Point, Rect};

    use super::*;
    use crate::node::{ContentKind, PropertyValue, SurfaceId};

    #[test]
    fn evaluate_computes_world_transforms() {
        let mut store = NodeStore::new();
        let parent = store.create_node(ContentKind::Plain);
        let child = store.create_node(ContentKind::Plain);

        store
            .set(parent, PropertyValue::AnchorPoint(Point::ORIGIN))
            .unwrap();
        store
            .set(parent, PropertyValue::Position(Point::new(10.0, 0.0)))
            .unwrap();
        store
            .set(child, PropertyValue::AnchorPoint(Point::ORIGIN))
            .unwrap();
        store
            .set(child, PropertyValue::Position(Point::new(0.0, 5.0)))
            .unwrap();
        store.add_child(parent, child).unwrap();

        let _changes = store.evaluate();

        assert_eq!(
            store.world_transform(parent),
            Ok(Transform3d::from_translation(10.0, 0.0, 0.0))
        );
        assert_eq!(
            store.world_transform(child),
            Ok(Transform3d::from_translation(10.0, 5.0, 0.0))
        );
    }

    #[test]
    fn anchor_point_centers_bounds_on_position() {
        let mut store = NodeStore::new();
        let id = store.create_node(ContentKind::Plain);
        store
            .set(id, PropertyValue::Bounds(Rect::new(0.0, 0.0, 100.0, 50.0)))
            .unwrap();
        store
            .set(id, PropertyValue::Position(Point::new(200.0, 100.0)))
            .unwrap();
        let _ = store.evaluate();

        assert_eq!(
            store.effective_frame(id),
            Ok(Rect::new(150.0, 75.0, 250.0, 125.0))
        );
    }

    #[test]
    fn evaluate_computes_effective_opacity() {
        let mut store = NodeStore::new();
        let parent = store.create_node(ContentKind::Plain);
        let child = store.create_node(ContentKind::Plain);

        store.set(parent, PropertyValue::Opacity(0.5)).unwrap();
        store.set(child, PropertyValue::Opacity(0.8)).unwrap();
        store.add_child(parent, child).unwrap();

        let _changes = store.evaluate();

        let eps = 1e-6;
        assert!((store.effective_opacity(parent).unwrap() - 0.5).abs() < eps);
        assert!((store.effective_opacity(child).unwrap() - 0.4).abs() < eps);
    }

    #[test]
    fn no_change_evaluate_returns_empty() {
        let mut store = NodeStore::new();
        let _root = store.create_node(ContentKind::Plain);

        let _ = store.evaluate();

        let changes = store.evaluate();
        assert!(changes.is_empty());
    }

    #[test]
    fn paint_order_is_depth_first() {
        let mut store = NodeStore::new();
        let a = store.create_node(ContentKind::Plain);
        let b = store.create_node(ContentKind::Plain);
        let c = store.create_node(ContentKind::Plain);
        let d = store.create_node(ContentKind::Plain);

        // a -> [b -> [d], c]
        store.add_child(a, b).unwrap();
        store.add_child(a, c).unwrap();
        store.add_child(b, d).unwrap();

        let _ = store.evaluate();

        assert_eq!(store.paint_order(), &[a.idx, b.idx, d.idx, c.idx]);
    }

    #[test]
    fn z_position_reorders_siblings() {
        let mut store = NodeStore::new();
        let root = store.create_node(ContentKind::Plain);
        let a = store.create_node(ContentKind::Plain);
        let b = store.create_node(ContentKind::Plain);
        let c = store.create_node(ContentKind::Plain);
        store.add_child(root, a).unwrap();
        store.add_child(root, b).unwrap();
        store.add_child(root, c).unwrap();
        let _ = store.evaluate();

        store.set(a, PropertyValue::ZPosition(1.0)).unwrap();
        let changes = store.evaluate();
        assert!(changes.topology_changed);
        // b and c tie at zero and keep sibling order.
        assert_eq!(store.paint_order(), &[root.idx, b.idx, c.idx, a.idx]);
    }

    #[test]
    fn paint_order_under_excludes_other_roots() {
        let mut store = NodeStore::with_root();
        let root = crate::node::ROOT_NODE;
        let a = store.create_node(ContentKind::Plain);
        let stray = store.create_node(ContentKind::Plain);
        let b = store.create_node(ContentKind::Plain);
        store.add_child(root, a).unwrap();
        store.add_child(a, b).unwrap();
        let _ = store.evaluate();

        assert_eq!(store.paint_order_under(root), Ok(&[root.idx, a.idx, b.idx][..]));
        assert_eq!(store.paint_order_under(stray), Ok(&[stray.idx][..]));
        assert_eq!(store.paint_order_under(b), Err(Error::InvalidState));
    }

    #[test]
    fn evaluate_tracks_appearance_and_content_changes() {
        let mut store = NodeStore::new();
        let id = store.create_node(ContentKind::Plain);
        let _ = store.evaluate();

        store.set(id, PropertyValue::MasksToBounds(true)).unwrap();
        store
            .set(id, PropertyValue::Backing(Some(SurfaceId(1))))
            .unwrap();
        let changes = store.evaluate();
        assert!(changes.appearance.contains(&id.idx));
        assert!(changes.content.contains(&id.idx));
    }

    #[test]
    fn evaluate_propagates_opacity_to_descendants() {
        let mut store = NodeStore::new();
        let grandparent = store.create_node(ContentKind::Plain);
        let parent = store.create_node(ContentKind::Plain);
        let child = store.create_node(ContentKind::Plain);

        store.add_child(grandparent, parent).unwrap();
        store.add_child(parent, child).unwrap();
        let _ = store.evaluate();

        store.set(grandparent, PropertyValue::Opacity(0.5)).unwrap();
        let changes = store.evaluate();

        assert!(changes.opacities.contains(&child.idx));
        let eps = 1e-6;
        assert!((store.effective_opacity(child).unwrap() - 0.5).abs() < eps);
    }

    #[test]
    fn evaluate_added_and_removed_lifecycle() {
        let mut store = NodeStore::new();
        let id = store.create_node(ContentKind::Plain);

        let changes = store.evaluate();
        assert!(changes.added.contains(&id.idx));
        assert!(changes.removed.is_empty());

        let changes = store.evaluate();
        assert!(changes.added.is_empty());

        store.destroy_node(id).unwrap();
        let changes = store.evaluate();
        assert!(changes.removed.contains(&id.idx));
        assert!(changes.added.is_empty());
    }

    #[test]
    fn hidden_propagates_to_children() {
        let mut store = NodeStore::new();
        let parent = store.create_node(ContentKind::Plain);
        let child = store.create_node(ContentKind::Plain);
        store.add_child(parent, child).unwrap();
        let _ = store.evaluate();

        store.set(parent, PropertyValue::Hidden(true)).unwrap();
        let changes = store.evaluate();

        assert_eq!(store.effective_hidden(child), Ok(true));
        assert!(changes.hidden.contains(&parent.idx));
        assert!(changes.hidden.contains(&child.idx));

        store.set(parent, PropertyValue::Hidden(false)).unwrap();
        let changes = store.evaluate();
        assert_eq!(store.effective_hidden(child), Ok(false));
        assert!(changes.unhidden.contains(&child.idx));
    }

    #[test]
    fn reparent_recomputes_world_transform() {
        let mut store = NodeStore::new();
        let a = store.create_node(ContentKind::Plain);
        let b = store.create_node(ContentKind::Plain);
        let child = store.create_node(ContentKind::Plain);
        store.set(a, PropertyValue::AnchorPoint(Point::ORIGIN)).unwrap();
        store.set(b, PropertyValue::AnchorPoint(Point::ORIGIN)).unwrap();
        store.set(child, PropertyValue::AnchorPoint(Point::ORIGIN)).unwrap();
        store
            .set(b, PropertyValue::Position(Point::new(0.0, 7.0)))
            .unwrap();
        store.add_child(a, child).unwrap();
        let _ = store.evaluate();

        store.remove_from_parent(child).unwrap();
        store.add_child(b, child).unwrap();
        let _ = store.evaluate();
        assert_eq!(
            store.world_transform(child),
            Ok(Transform3d::from_translation(0.0, 7.0, 0.0))
        );
    }

    #[test]
    fn evaluate_into_reuses_buffer() {
        let mut store = NodeStore::new();
        let id = store.create_node(ContentKind::Plain);
        let mut changes = FrameChanges::default();
        store.evaluate_into(&mut changes);
        assert!(changes.added.contains(&id.idx));
        store.evaluate_into(&mut changes);
        assert!(changes.added.is_empty());
    }
}
