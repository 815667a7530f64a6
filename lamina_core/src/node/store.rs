// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays node storage with allocation, topology, and property
//! management.

use alloc::vec::Vec;

use kurbo::{Point, Rect};
use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use super::id::{INVALID, NodeId, ROOT_NODE, SurfaceId};
use super::kind::{ClipShape, ContentKind};
use super::property::{Property, PropertyValue};
use super::traverse::Children;
use crate::dirty;
use crate::error::{Error, Result};
use crate::transform::Transform3d;

/// Default anchor point: the center of the bounds.
pub const DEFAULT_ANCHOR: Point = Point::new(0.5, 0.5);

/// Struct-of-arrays storage for one tree of content nodes.
///
/// Nodes are addressed by [`NodeId`] handles. Destroyed nodes are recycled
/// via a free list, and generation counters reject stale handles with
/// [`Error::StaleReference`].
#[derive(Debug)]
pub struct NodeStore {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,

    // -- Local properties --
    pub(crate) bounds: Vec<Rect>,
    pub(crate) anchor: Vec<Point>,
    pub(crate) position: Vec<Point>,
    pub(crate) transform: Vec<Transform3d>,
    pub(crate) z_position: Vec<f64>,
    pub(crate) opacity: Vec<f32>,
    pub(crate) corner_radius: Vec<f64>,
    pub(crate) masks_to_bounds: Vec<bool>,
    pub(crate) backing: Vec<Option<SurfaceId>>,
    pub(crate) mask: Vec<Option<NodeId>>,
    pub(crate) kind: Vec<ContentKind>,
    pub(crate) hidden: Vec<bool>,

    // -- Computed by evaluate --
    pub(crate) world_transform: Vec<Transform3d>,
    pub(crate) effective_opacity: Vec<f32>,
    pub(crate) effective_hidden: Vec<bool>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) alive: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    // -- Dirty tracking --
    pub(crate) dirty: DirtyTracker<u32>,

    // -- Paint order cache --
    pub(crate) paint_order: Vec<u32>,
    pub(crate) traversal_dirty: bool,

    // -- Lifecycle tracking --
    pub(crate) pending_added: Vec<u32>,
    pub(crate) pending_removed: Vec<u32>,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore {
    /// How many slots past its end a store grows to honor
    /// [`create_node_at`](Self::create_node_at).
    ///
    /// Allocators hand out slots densely; gaps only come from creations
    /// that were discarded or never reached this store.
    pub const MAX_SLOT_GAP: u32 = 4096;

    /// Whether `create_node_at` may grow a store of `len` slots to hold
    /// slot `idx`.
    pub(crate) fn slot_in_reach(len: u32, idx: u32) -> bool {
        idx != INVALID && idx <= len.saturating_add(Self::MAX_SLOT_GAP)
    }

    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            bounds: Vec::new(),
            anchor: Vec::new(),
            position: Vec::new(),
            transform: Vec::new(),
            z_position: Vec::new(),
            opacity: Vec::new(),
            corner_radius: Vec::new(),
            masks_to_bounds: Vec::new(),
            backing: Vec::new(),
            mask: Vec::new(),
            kind: Vec::new(),
            hidden: Vec::new(),
            world_transform: Vec::new(),
            effective_opacity: Vec::new(),
            effective_hidden: Vec::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            paint_order: Vec::new(),
            traversal_dirty: true,
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
        }
    }

    /// Creates a store holding only [`ROOT_NODE`].
    #[must_use]
    pub fn with_root() -> Self {
        let mut store = Self::new();
        let root = store.create_node(ContentKind::Plain);
        debug_assert_eq!(root, ROOT_NODE, "a fresh store allocates slot zero first");
        store
    }

    // -- Allocation API --

    /// Creates a detached node with default attributes and returns its
    /// handle.
    ///
    /// Defaults: empty bounds, centered anchor, origin position, identity
    /// transform, full opacity, no clip, no backing, visible.
    pub fn create_node(&mut self, kind: ContentKind) -> NodeId {
        let idx = match self.free_list.pop() {
            Some(idx) => {
                self.generation[idx as usize] = self.generation[idx as usize].wrapping_add(1);
                idx
            }
            None => self.push_slot(),
        };
        self.activate(idx, kind);
        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Creates a store with `slots` dead slots ready for
    /// [`create_node_at`](Self::create_node_at).
    #[must_use]
    pub fn with_free_slots(slots: u32) -> Self {
        let mut store = Self::new();
        while store.len < slots {
            let idx = store.push_slot();
            store.free_list.push(idx);
        }
        store
    }

    /// Creates a node in exactly the slot and generation named by `id`.
    ///
    /// Used by mirror stores that replay another store's allocations.
    /// Fails with [`Error::InvalidState`] if the slot is occupied, or if it
    /// lies more than [`MAX_SLOT_GAP`](Self::MAX_SLOT_GAP) slots past the
    /// end of the store.
    pub fn create_node_at(&mut self, id: NodeId, kind: ContentKind) -> Result<()> {
        if !Self::slot_in_reach(self.len, id.idx) {
            return Err(Error::InvalidState);
        }
        while self.len <= id.idx {
            let idx = self.push_slot();
            self.free_list.push(idx);
        }
        if self.alive[id.idx as usize] {
            return Err(Error::InvalidState);
        }
        self.free_list.retain(|&i| i != id.idx);
        self.generation[id.idx as usize] = id.generation;
        self.activate(id.idx, kind);
        Ok(())
    }

    /// Destroys a detached-or-attached leaf node, freeing its slot.
    ///
    /// Fails with [`Error::InvalidState`] if the node still has children.
    pub fn destroy_node(&mut self, id: NodeId) -> Result<()> {
        self.validate(id)?;
        let idx = id.idx;
        if self.first_child[idx as usize] != INVALID {
            return Err(Error::InvalidState);
        }
        if self.parent[idx as usize] != INVALID {
            let p = self.parent[idx as usize];
            self.unlink_from_parent(idx);
            self.dirty.mark(p, dirty::TOPOLOGY);
        }
        self.dirty.remove_key(idx);

        // Bump generation so old handles fail validation at once.
        self.generation[idx as usize] = self.generation[idx as usize].wrapping_add(1);
        self.alive[idx as usize] = false;
        self.free_list.push(idx);
        self.traversal_dirty = true;
        self.pending_removed.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);
        Ok(())
    }

    /// Returns whether the given handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.validate(id).is_ok()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.alive.iter().filter(|a| **a).count()
    }

    // -- Topology API --

    /// Appends `child` as the last (front-most) child of `parent`.
    ///
    /// Fails with [`Error::InvalidState`] if `child` already has a parent or
    /// if the edge would make a node its own ancestor.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.validate(parent)?;
        self.validate(child)?;
        let (p, c) = (parent.idx, child.idx);
        if self.parent[c as usize] != INVALID || self.is_ancestor_or_self(c, p) {
            return Err(Error::InvalidState);
        }

        self.parent[c as usize] = p;
        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            let last = self.last_child(p);
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }
        self.link_dependencies(c, p);
        Ok(())
    }

    /// Inserts `child` immediately behind `sibling` in paint order.
    ///
    /// Fails with [`Error::InvalidState`] if `child` already has a parent,
    /// `sibling` has none, or the edge would form a cycle.
    pub fn insert_before(&mut self, child: NodeId, sibling: NodeId) -> Result<()> {
        self.validate(child)?;
        self.validate(sibling)?;
        let (c, s) = (child.idx, sibling.idx);
        let p = self.parent[s as usize];
        if self.parent[c as usize] != INVALID || p == INVALID || self.is_ancestor_or_self(c, p) {
            return Err(Error::InvalidState);
        }

        self.parent[c as usize] = p;
        self.next_sibling[c as usize] = s;
        self.prev_sibling[c as usize] = self.prev_sibling[s as usize];
        if self.prev_sibling[s as usize] != INVALID {
            self.next_sibling[self.prev_sibling[s as usize] as usize] = c;
        } else {
            self.first_child[p as usize] = c;
        }
        self.prev_sibling[s as usize] = c;
        self.link_dependencies(c, p);
        Ok(())
    }

    /// Detaches `child` from its parent.
    ///
    /// Fails with [`Error::InvalidState`] if it has no parent.
    pub fn remove_from_parent(&mut self, child: NodeId) -> Result<()> {
        self.validate(child)?;
        let c = child.idx;
        let p = self.parent[c as usize];
        if p == INVALID {
            return Err(Error::InvalidState);
        }
        self.unlink_from_parent(c);
        self.dirty.remove_dependency(c, p, dirty::GEOMETRY);
        self.dirty.remove_dependency(c, p, dirty::OPACITY);
        self.mark_subtree_inherited_dirty(c);
        self.traversal_dirty = true;
        self.dirty.mark(p, dirty::TOPOLOGY);
        Ok(())
    }

    /// Returns the parent of a node, if any.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.validate(id)?;
        Ok(self.handle_at(self.parent[id.idx as usize]))
    }

    /// Returns the sibling painted immediately in front of `id`, if any.
    pub fn next_sibling(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.validate(id)?;
        Ok(self.handle_at(self.next_sibling[id.idx as usize]))
    }

    /// Returns an iterator over the direct children of a node, back to front.
    pub fn children(&self, id: NodeId) -> Result<Children<'_>> {
        self.validate(id)?;
        Ok(Children::new(self, self.first_child[id.idx as usize]))
    }

    /// Returns the live nodes that have no parent, in slot order.
    #[must_use]
    pub fn roots(&self) -> Vec<NodeId> {
        (0..self.len)
            .filter(|&idx| self.alive[idx as usize] && self.parent[idx as usize] == INVALID)
            .filter_map(|idx| self.handle_at(idx))
            .collect()
    }

    // -- Property API --

    /// Reads one property.
    pub fn get(&self, id: NodeId, property: Property) -> Result<PropertyValue> {
        self.validate(id)?;
        Ok(self.value_at(id.idx, property))
    }

    /// Writes one property, returning the value it replaced.
    ///
    /// Marks the dirty channel for the property's category.
    pub fn set(&mut self, id: NodeId, value: PropertyValue) -> Result<PropertyValue> {
        self.validate(id)?;
        let idx = id.idx;
        let i = idx as usize;
        let prior = self.value_at(idx, value.property());
        match value {
            PropertyValue::Bounds(v) => self.bounds[i] = v,
            PropertyValue::AnchorPoint(v) => self.anchor[i] = v,
            PropertyValue::Position(v) => self.position[i] = v,
            PropertyValue::Transform(v) => self.transform[i] = v,
            PropertyValue::ZPosition(v) => self.z_position[i] = v,
            PropertyValue::Opacity(v) => self.opacity[i] = v.clamp(0.0, 1.0),
            PropertyValue::CornerRadius(v) => self.corner_radius[i] = v.max(0.0),
            PropertyValue::MasksToBounds(v) => self.masks_to_bounds[i] = v,
            PropertyValue::Backing(v) => self.backing[i] = v,
            PropertyValue::Mask(v) => self.mask[i] = v,
            PropertyValue::Kind(v) => self.kind[i] = v,
            PropertyValue::Hidden(v) => self.hidden[i] = v,
        }
        match value.property() {
            Property::Bounds
            | Property::AnchorPoint
            | Property::Position
            | Property::Transform
            | Property::Hidden => self.dirty.mark_with(idx, dirty::GEOMETRY, &EagerPolicy),
            Property::Opacity => self.dirty.mark_with(idx, dirty::OPACITY, &EagerPolicy),
            Property::CornerRadius | Property::MasksToBounds => {
                self.dirty.mark(idx, dirty::APPEARANCE);
            }
            Property::Backing | Property::Mask | Property::Kind => {
                self.dirty.mark(idx, dirty::CONTENT);
            }
            Property::ZPosition => {
                self.traversal_dirty = true;
                self.dirty.mark(idx, dirty::TOPOLOGY);
            }
        }
        Ok(prior)
    }

    /// Returns the local bounds of a node.
    pub fn bounds(&self, id: NodeId) -> Result<Rect> {
        self.validate(id)?;
        Ok(self.bounds[id.idx as usize])
    }

    /// Returns the local opacity of a node.
    pub fn opacity(&self, id: NodeId) -> Result<f32> {
        self.validate(id)?;
        Ok(self.opacity[id.idx as usize])
    }

    /// Returns the position of a node in its parent's space.
    pub fn position(&self, id: NodeId) -> Result<Point> {
        self.validate(id)?;
        Ok(self.position[id.idx as usize])
    }

    /// Returns the content kind of a node.
    pub fn kind(&self, id: NodeId) -> Result<ContentKind> {
        self.validate(id)?;
        Ok(self.kind[id.idx as usize])
    }

    /// Returns the computed world transform of a node.
    ///
    /// Only valid after [`evaluate`](Self::evaluate).
    pub fn world_transform(&self, id: NodeId) -> Result<Transform3d> {
        self.validate(id)?;
        Ok(self.world_transform[id.idx as usize])
    }

    /// Returns the computed effective opacity of a node.
    ///
    /// Only valid after [`evaluate`](Self::evaluate).
    pub fn effective_opacity(&self, id: NodeId) -> Result<f32> {
        self.validate(id)?;
        Ok(self.effective_opacity[id.idx as usize])
    }

    /// Returns whether a node is hidden by itself or an ancestor.
    ///
    /// Only valid after [`evaluate`](Self::evaluate).
    pub fn effective_hidden(&self, id: NodeId) -> Result<bool> {
        self.validate(id)?;
        Ok(self.effective_hidden[id.idx as usize])
    }

    /// Returns the node's effective frame: the axis-aligned bounding box of
    /// its bounds mapped into root space.
    ///
    /// Derived from the current world transform on every call; only valid
    /// after [`evaluate`](Self::evaluate).
    pub fn effective_frame(&self, id: NodeId) -> Result<Rect> {
        self.validate(id)?;
        Ok(self.effective_frame_at(id.idx))
    }

    // -- Raw-index accessors --
    //
    // These accept raw slot indices (as found in `FrameChanges` or
    // `paint_order()`) and skip generation validation.

    /// Returns the live handle for raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn node_at(&self, idx: u32) -> NodeId {
        self.check_slot(idx);
        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Returns the computed world transform at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn world_transform_at(&self, idx: u32) -> Transform3d {
        self.check_slot(idx);
        self.world_transform[idx as usize]
    }

    /// Returns the computed effective opacity at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn effective_opacity_at(&self, idx: u32) -> f32 {
        self.check_slot(idx);
        self.effective_opacity[idx as usize]
    }

    /// Returns whether raw slot `idx` is effectively hidden.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn effective_hidden_at(&self, idx: u32) -> bool {
        self.check_slot(idx);
        self.effective_hidden[idx as usize]
    }

    /// Returns the local bounds at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn bounds_at(&self, idx: u32) -> Rect {
        self.check_slot(idx);
        self.bounds[idx as usize]
    }

    /// Returns the backing surface at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn backing_at(&self, idx: u32) -> Option<SurfaceId> {
        self.check_slot(idx);
        self.backing[idx as usize]
    }

    /// Returns the mask node at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn mask_at(&self, idx: u32) -> Option<NodeId> {
        self.check_slot(idx);
        self.mask[idx as usize]
    }

    /// Returns the content kind at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn kind_at(&self, idx: u32) -> ContentKind {
        self.check_slot(idx);
        self.kind[idx as usize]
    }

    /// Returns the clip shape derived from corner radius and
    /// masks-to-bounds at raw slot `idx`, in local space.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn clip_at(&self, idx: u32) -> Option<ClipShape> {
        self.check_slot(idx);
        let i = idx as usize;
        if !self.masks_to_bounds[i] {
            return None;
        }
        let bounds = self.bounds[i];
        let radius = self.corner_radius[i];
        Some(if radius > 0.0 {
            ClipShape::RoundedRect(bounds.to_rounded_rect(radius))
        } else {
            ClipShape::Rect(bounds)
        })
    }

    /// Returns the effective frame at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn effective_frame_at(&self, idx: u32) -> Rect {
        self.check_slot(idx);
        self.world_transform[idx as usize].transform_rect_bbox(self.bounds[idx as usize])
    }

    /// Returns the local-to-parent matrix at raw slot `idx`:
    /// `T(position) · transform · T(-(bounds.origin + anchor · size))`.
    #[must_use]
    pub(crate) fn local_matrix_at(&self, idx: u32) -> Transform3d {
        let i = idx as usize;
        let b = self.bounds[i];
        let a = self.anchor[i];
        let p = self.position[i];
        let pivot_x = b.x0 + a.x * b.width();
        let pivot_y = b.y0 + a.y * b.height();
        Transform3d::from_translation(p.x, p.y, 0.0)
            * self.transform[i]
            * Transform3d::from_translation(-pivot_x, -pivot_y, 0.0)
    }

    // -- Internal helpers --

    fn value_at(&self, idx: u32, property: Property) -> PropertyValue {
        let i = idx as usize;
        match property {
            Property::Bounds => PropertyValue::Bounds(self.bounds[i]),
            Property::AnchorPoint => PropertyValue::AnchorPoint(self.anchor[i]),
            Property::Position => PropertyValue::Position(self.position[i]),
            Property::Transform => PropertyValue::Transform(self.transform[i]),
            Property::ZPosition => PropertyValue::ZPosition(self.z_position[i]),
            Property::Opacity => PropertyValue::Opacity(self.opacity[i]),
            Property::CornerRadius => PropertyValue::CornerRadius(self.corner_radius[i]),
            Property::MasksToBounds => PropertyValue::MasksToBounds(self.masks_to_bounds[i]),
            Property::Backing => PropertyValue::Backing(self.backing[i]),
            Property::Mask => PropertyValue::Mask(self.mask[i]),
            Property::Kind => PropertyValue::Kind(self.kind[i]),
            Property::Hidden => PropertyValue::Hidden(self.hidden[i]),
        }
    }

    /// Appends a dead slot and returns its index.
    fn push_slot(&mut self) -> u32 {
        let idx = self.len;
        self.len += 1;
        self.parent.push(INVALID);
        self.first_child.push(INVALID);
        self.next_sibling.push(INVALID);
        self.prev_sibling.push(INVALID);
        self.bounds.push(Rect::ZERO);
        self.anchor.push(DEFAULT_ANCHOR);
        self.position.push(Point::ORIGIN);
        self.transform.push(Transform3d::IDENTITY);
        self.z_position.push(0.0);
        self.opacity.push(1.0);
        self.corner_radius.push(0.0);
        self.masks_to_bounds.push(false);
        self.backing.push(None);
        self.mask.push(None);
        self.kind.push(ContentKind::Plain);
        self.hidden.push(false);
        self.world_transform.push(Transform3d::IDENTITY);
        self.effective_opacity.push(1.0);
        self.effective_hidden.push(false);
        self.generation.push(0);
        self.alive.push(false);
        idx
    }

    /// Resets slot `idx` to defaults and marks it live.
    fn activate(&mut self, idx: u32, kind: ContentKind) {
        let i = idx as usize;
        self.parent[i] = INVALID;
        self.first_child[i] = INVALID;
        self.next_sibling[i] = INVALID;
        self.prev_sibling[i] = INVALID;
        self.bounds[i] = Rect::ZERO;
        self.anchor[i] = DEFAULT_ANCHOR;
        self.position[i] = Point::ORIGIN;
        self.transform[i] = Transform3d::IDENTITY;
        self.z_position[i] = 0.0;
        self.opacity[i] = 1.0;
        self.corner_radius[i] = 0.0;
        self.masks_to_bounds[i] = false;
        self.backing[i] = None;
        self.mask[i] = None;
        self.kind[i] = kind;
        self.hidden[i] = false;
        self.world_transform[i] = Transform3d::IDENTITY;
        self.effective_opacity[i] = 1.0;
        self.effective_hidden[i] = false;
        self.alive[i] = true;

        self.traversal_dirty = true;
        self.pending_added.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);
        self.mark_subtree_inherited_dirty(idx);
    }

    pub(crate) fn validate(&self, id: NodeId) -> Result<()> {
        let i = id.idx as usize;
        if id.idx < self.len && self.alive[i] && self.generation[i] == id.generation {
            Ok(())
        } else {
            Err(Error::StaleReference)
        }
    }

    fn check_slot(&self, idx: u32) {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
    }

    fn handle_at(&self, idx: u32) -> Option<NodeId> {
        (idx != INVALID).then(|| NodeId {
            idx,
            generation: self.generation[idx as usize],
        })
    }

    fn last_child(&self, p: u32) -> u32 {
        let mut last = self.first_child[p as usize];
        while self.next_sibling[last as usize] != INVALID {
            last = self.next_sibling[last as usize];
        }
        last
    }

    /// Whether `ancestor` is `idx` or one of its ancestors' chain reaches it
    /// from `idx`'s side, i.e. attaching `ancestor` under `idx` would loop.
    fn is_ancestor_or_self(&self, ancestor: u32, mut idx: u32) -> bool {
        while idx != INVALID {
            if idx == ancestor {
                return true;
            }
            idx = self.parent[idx as usize];
        }
        false
    }

    /// Adds inherited-channel edges for a fresh `c → p` link and marks the
    /// moved subtree.
    fn link_dependencies(&mut self, c: u32, p: u32) {
        let _ = self.dirty.add_dependency(c, p, dirty::GEOMETRY);
        let _ = self.dirty.add_dependency(c, p, dirty::OPACITY);
        self.mark_subtree_inherited_dirty(c);
        self.traversal_dirty = true;
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    /// Removes `idx` from its parent's child list without touching dirty
    /// state.
    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];
        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }
        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }

    fn mark_subtree_inherited_dirty(&mut self, idx: u32) {
        self.dirty.mark_with(idx, dirty::GEOMETRY, &EagerPolicy);
        self.dirty.mark_with(idx, dirty::OPACITY, &EagerPolicy);
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn create_and_destroy() {
        let mut store = NodeStore::new();
        let id = store.create_node(ContentKind::Plain);
        assert!(store.is_alive(id));
        store.destroy_node(id).unwrap();
        assert!(!store.is_alive(id));
    }

    #[test]
    fn generation_prevents_stale_access() {
        let mut store = NodeStore::new();
        let id1 = store.create_node(ContentKind::Plain);
        store.destroy_node(id1).unwrap();
        let id2 = store.create_node(ContentKind::Plain);
        assert_eq!(id1.idx, id2.idx, "slot should be reused");
        assert_ne!(id1.generation, id2.generation);
        assert_eq!(
            store.set(id1, PropertyValue::Opacity(0.5)),
            Err(Error::StaleReference)
        );
        assert!(store.set(id2, PropertyValue::Opacity(0.5)).is_ok());
    }

    #[test]
    fn create_node_at_mirrors_slot_and_generation() {
        let mut mirror = NodeStore::new();
        let id = NodeId::from_parts(3, 7);
        mirror.create_node_at(id, ContentKind::Image).unwrap();
        assert!(mirror.is_alive(id));
        assert_eq!(mirror.kind(id), Ok(ContentKind::Image));
        assert_eq!(mirror.live_count(), 1);
        assert_eq!(
            mirror.create_node_at(id, ContentKind::Plain),
            Err(Error::InvalidState)
        );
    }

    #[test]
    fn create_node_at_refuses_far_slots() {
        let mut mirror = NodeStore::with_root();
        let far = NodeId::from_parts(20_000_000, 0);
        assert_eq!(
            mirror.create_node_at(far, ContentKind::Plain),
            Err(Error::InvalidState)
        );
        assert_eq!(
            mirror.create_node_at(NodeId::from_parts(INVALID, 0), ContentKind::Plain),
            Err(Error::InvalidState)
        );
        assert_eq!(mirror.len, 1, "refused creates do not grow the store");

        let edge = NodeId::from_parts(1 + NodeStore::MAX_SLOT_GAP, 0);
        mirror.create_node_at(edge, ContentKind::Plain).unwrap();
        assert!(mirror.is_alive(edge));
    }

    #[test]
    fn free_slots_accept_mirrored_creates() {
        let mut store = NodeStore::with_free_slots(3);
        assert_eq!(store.live_count(), 0);
        let id = NodeId::from_parts(2, 5);
        store.create_node_at(id, ContentKind::Text).unwrap();
        assert_eq!(store.kind(id), Ok(ContentKind::Text));
        assert_eq!(store.len, 3);
    }

    #[test]
    fn add_child_and_query() {
        let mut store = NodeStore::new();
        let parent = store.create_node(ContentKind::Plain);
        let a = store.create_node(ContentKind::Plain);
        let b = store.create_node(ContentKind::Plain);
        store.add_child(parent, a).unwrap();
        store.add_child(parent, b).unwrap();
        assert_eq!(store.parent(a), Ok(Some(parent)));
        let kids: Vec<_> = store.children(parent).unwrap().collect();
        assert_eq!(kids, vec![a, b]);
    }

    #[test]
    fn insert_before_orders_siblings() {
        let mut store = NodeStore::new();
        let parent = store.create_node(ContentKind::Plain);
        let a = store.create_node(ContentKind::Plain);
        let b = store.create_node(ContentKind::Plain);
        let c = store.create_node(ContentKind::Plain);
        store.add_child(parent, a).unwrap();
        store.add_child(parent, c).unwrap();
        store.insert_before(b, c).unwrap();
        let kids: Vec<_> = store.children(parent).unwrap().collect();
        assert_eq!(kids, vec![a, b, c]);
        assert_eq!(store.next_sibling(b), Ok(Some(c)));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut store = NodeStore::new();
        let a = store.create_node(ContentKind::Plain);
        let b = store.create_node(ContentKind::Plain);
        store.add_child(a, b).unwrap();
        assert_eq!(store.add_child(b, a), Err(Error::InvalidState));
        assert_eq!(store.add_child(a, a), Err(Error::InvalidState));
    }

    #[test]
    fn destroy_with_children_is_rejected() {
        let mut store = NodeStore::new();
        let parent = store.create_node(ContentKind::Plain);
        let child = store.create_node(ContentKind::Plain);
        store.add_child(parent, child).unwrap();
        assert_eq!(store.destroy_node(parent), Err(Error::InvalidState));
        assert!(store.is_alive(parent), "failed destroy must not free the node");
    }

    #[test]
    fn remove_from_parent_detaches() {
        let mut store = NodeStore::new();
        let parent = store.create_node(ContentKind::Plain);
        let child = store.create_node(ContentKind::Plain);
        store.add_child(parent, child).unwrap();
        store.remove_from_parent(child).unwrap();
        assert_eq!(store.parent(child), Ok(None));
        assert!(store.children(parent).unwrap().next().is_none());
        assert_eq!(store.remove_from_parent(child), Err(Error::InvalidState));
    }

    #[test]
    fn set_returns_prior_value() {
        let mut store = NodeStore::new();
        let id = store.create_node(ContentKind::Plain);
        let prior = store.set(id, PropertyValue::Opacity(0.25)).unwrap();
        assert_eq!(prior, PropertyValue::Opacity(1.0));
        assert_eq!(store.get(id, Property::Opacity), Ok(PropertyValue::Opacity(0.25)));
    }

    #[test]
    fn opacity_is_clamped() {
        let mut store = NodeStore::new();
        let id = store.create_node(ContentKind::Plain);
        store.set(id, PropertyValue::Opacity(3.0)).unwrap();
        assert_eq!(store.opacity(id), Ok(1.0));
    }

    #[test]
    fn clip_follows_corner_radius() {
        let mut store = NodeStore::new();
        let id = store.create_node(ContentKind::Plain);
        let bounds = Rect::new(0.0, 0.0, 40.0, 20.0);
        store.set(id, PropertyValue::Bounds(bounds)).unwrap();
        assert_eq!(store.clip_at(id.idx), None);
        store.set(id, PropertyValue::MasksToBounds(true)).unwrap();
        assert_eq!(store.clip_at(id.idx), Some(ClipShape::Rect(bounds)));
        store.set(id, PropertyValue::CornerRadius(4.0)).unwrap();
        assert!(matches!(
            store.clip_at(id.idx),
            Some(ClipShape::RoundedRect(_))
        ));
    }

    #[test]
    fn roots_returns_parentless_nodes() {
        let mut store = NodeStore::new();
        let a = store.create_node(ContentKind::Plain);
        let b = store.create_node(ContentKind::Plain);
        let c = store.create_node(ContentKind::Plain);
        store.add_child(a, c).unwrap();
        assert_eq!(store.roots(), vec![a, b]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn raw_accessor_out_of_range_panics() {
        let store = NodeStore::new();
        let _ = store.bounds_at(0);
    }
}
