// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Focus and input routing.
//!
//! Positional events go to the topmost context under the point on the
//! rendered, resolved layout: placements are tested front-to-back and,
//! within a context, nodes are tested in reverse paint order. Hosted
//! contexts are searched where they are drawn, so a point over an embedded
//! tree reaches the embedded context. Key events go to the keyboard focus
//! holder.

use std::collections::{BTreeMap, BTreeSet};

use kurbo::Point;
use lamina_core::context::ContextTable;
use lamina_core::display::DisplayId;
use lamina_core::error::{Error, Result};
use lamina_core::handle::{ContextId, ProcessId};
use lamina_core::node::{ContentKind, ROOT_NODE};
use lamina_core::time::HostTime;
use lamina_core::transform::Transform3d;
use lamina_render::ContextPlacement;

/// Kinds of focus. Each is held by at most one context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FocusCategory {
    /// Hardware and software keyboard input.
    Keyboard,
    /// Game controller input.
    GameController,
    /// Assistive technology cursor.
    Accessibility,
}

/// Exclusive focus assignment per category.
#[derive(Clone, Debug, Default)]
pub struct FocusRegister {
    holders: BTreeMap<FocusCategory, ContextId>,
}

impl FocusRegister {
    /// Creates a register with no holders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives `category` to `context`, returning the previous holder.
    pub fn set(&mut self, category: FocusCategory, context: ContextId) -> Option<ContextId> {
        self.holders.insert(category, context)
    }

    /// Current holder of `category`.
    #[must_use]
    pub fn holder(&self, category: FocusCategory) -> Option<ContextId> {
        self.holders.get(&category).copied()
    }

    /// Removes `context` from every category it holds. Returns the
    /// categories it lost.
    pub fn clear_context(&mut self, context: ContextId) -> Vec<FocusCategory> {
        let lost: Vec<FocusCategory> = self
            .holders
            .iter()
            .filter(|(_, c)| **c == context)
            .map(|(k, _)| *k)
            .collect();
        for category in &lost {
            self.holders.remove(category);
        }
        lost
    }
}

/// What happened.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputKind {
    /// Pointer button pressed.
    PointerDown,
    /// Pointer moved.
    PointerMove,
    /// Pointer button released.
    PointerUp,
    /// Touch started.
    TouchBegan,
    /// Touch moved.
    TouchMoved,
    /// Touch lifted.
    TouchEnded,
    /// Scroll by a delta.
    Scroll {
        /// Horizontal delta.
        dx: f64,
        /// Vertical delta.
        dy: f64,
    },
    /// Key pressed.
    KeyDown(u32),
    /// Key released.
    KeyUp(u32),
}

impl InputKind {
    /// Whether the event is delivered to keyboard focus rather than by
    /// position.
    #[must_use]
    pub fn is_key(&self) -> bool {
        matches!(self, Self::KeyDown(_) | Self::KeyUp(_))
    }
}

/// A raw input event from the platform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputEvent {
    /// When the event occurred.
    pub timestamp: HostTime,
    /// Display the event occurred on.
    pub display: DisplayId,
    /// What happened.
    pub kind: InputKind,
    /// Display-space location, for positional events.
    pub location: Option<Point>,
}

impl InputEvent {
    /// A positional event on the main display.
    #[must_use]
    pub fn at(kind: InputKind, location: Point) -> Self {
        Self {
            timestamp: HostTime(0),
            display: DisplayId::MAIN,
            kind,
            location: Some(location),
        }
    }

    /// A key event on the main display.
    #[must_use]
    pub fn key(kind: InputKind) -> Self {
        Self {
            timestamp: HostTime(0),
            display: DisplayId::MAIN,
            kind,
            location: None,
        }
    }
}

/// Where an event was delivered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteTarget {
    /// Receiving context.
    pub context: ContextId,
    /// Location in the receiving context's root space, for positional
    /// events.
    pub local: Option<Point>,
}

/// Picks the receiver for `event`.
///
/// `placements` are back-to-front, as resolved for the event's display.
/// Returns `Ok(None)` when nothing is under the point or nobody holds
/// keyboard focus, and [`Error::TargetUnavailable`] when the receiver's
/// owner is in `unreachable`.
pub fn route(
    event: &InputEvent,
    placements: &[ContextPlacement],
    contexts: &ContextTable,
    focus: &FocusRegister,
    unreachable: &BTreeSet<ProcessId>,
    max_depth: u8,
) -> Result<Option<RouteTarget>> {
    let target = if event.kind.is_key() {
        focus
            .holder(FocusCategory::Keyboard)
            .map(|context| RouteTarget {
                context,
                local: None,
            })
    } else {
        event
            .location
            .and_then(|point| hit_test(point, placements, contexts, max_depth))
    };
    let Some(target) = target else {
        return Ok(None);
    };
    let owner = contexts.owner(target.context)?;
    if unreachable.contains(&owner) {
        tracing::debug!(context = ?target.context, ?owner, "input target unreachable");
        return Err(Error::TargetUnavailable);
    }
    Ok(Some(target))
}

/// Returns the topmost context under a display-space point.
#[must_use]
pub fn hit_test(
    point: Point,
    placements: &[ContextPlacement],
    contexts: &ContextTable,
    max_depth: u8,
) -> Option<RouteTarget> {
    for placement in placements.iter().rev() {
        if placement.opacity <= 0.0 {
            continue;
        }
        let Some(inverse) = placement.display_transform().inverse() else {
            continue;
        };
        let local = inverse.transform_point(point);
        if placement.clips && !placement.frame.size().to_rect().contains(local) {
            continue;
        }
        let mut stack = Vec::new();
        if let Some(hit) = hit_context(
            placement.context,
            local,
            Transform3d::IDENTITY,
            contexts,
            &mut stack,
            max_depth,
        ) {
            return Some(hit);
        }
    }
    None
}

fn hit_context(
    context: ContextId,
    point: Point,
    base: Transform3d,
    contexts: &ContextTable,
    stack: &mut Vec<ContextId>,
    depth: u8,
) -> Option<RouteTarget> {
    let store = contexts.get(context).ok()?.render();
    let order = store.paint_order_under(ROOT_NODE).ok()?;
    stack.push(context);
    let mut found = None;
    for &idx in order.iter().rev() {
        if store.effective_hidden_at(idx) || store.effective_opacity_at(idx) <= 0.0 {
            continue;
        }
        let world = base * store.world_transform_at(idx);
        if let ContentKind::ContextHost(hosted) = store.kind_at(idx)
            && depth > 0
            && !stack.contains(&hosted)
            && let Some(hit) = hit_context(hosted, point, world, contexts, stack, depth - 1)
        {
            found = Some(hit);
            break;
        }
        let Some(inverse) = world.inverse() else {
            continue;
        };
        if store.bounds_at(idx).contains(inverse.transform_point(point)) {
            let local = base
                .inverse()
                .map_or(point, |root| root.transform_point(point));
            found = Some(RouteTarget {
                context,
                local: Some(local),
            });
            break;
        }
    }
    stack.pop();
    found
}

#[cfg(test)]
mod tests {
    use kurbo::Rect;
    use lamina_core::node::PropertyValue;
    use lamina_core::transaction::Client;

    use super::*;

    const APP: ProcessId = ProcessId(1);

    fn sized_context(contexts: &mut ContextTable, client: &mut Client, size: Rect) -> ContextId {
        let id = contexts.create(APP);
        let root = client.attach_context(id).unwrap();
        let txn = client.open_transaction(id, true).unwrap();
        client.mutate(txn, root, PropertyValue::Bounds(size)).unwrap();
        client.commit(txn).unwrap();
        for commit in client.take_commits() {
            contexts.submit(commit).unwrap();
        }
        let state = contexts.get_mut(id).unwrap();
        state.apply_front(HostTime(0)).unwrap();
        state.render_mut().evaluate();
        id
    }

    #[test]
    fn focus_is_exclusive_per_category() {
        let mut contexts = ContextTable::new();
        let a = contexts.create(APP);
        let b = contexts.create(APP);
        let mut focus = FocusRegister::new();
        assert_eq!(focus.set(FocusCategory::Keyboard, a), None);
        assert_eq!(focus.set(FocusCategory::Keyboard, b), Some(a));
        focus.set(FocusCategory::Accessibility, b);
        assert_eq!(focus.holder(FocusCategory::Keyboard), Some(b));
        let lost = focus.clear_context(b);
        assert_eq!(lost, vec![FocusCategory::Keyboard, FocusCategory::Accessibility]);
        assert_eq!(focus.holder(FocusCategory::Keyboard), None);
    }

    #[test]
    fn topmost_placement_wins() {
        let mut contexts = ContextTable::new();
        let mut client = Client::new(APP);
        let size = Rect::new(0.0, 0.0, 300.0, 600.0);
        let below = sized_context(&mut contexts, &mut client, size);
        let above = sized_context(&mut contexts, &mut client, size);
        let frame = Rect::new(0.0, 0.0, 300.0, 600.0);
        let placements = [
            ContextPlacement::new(below, frame, 1),
            ContextPlacement::new(above, frame, 2),
        ];
        let event = InputEvent::at(InputKind::PointerDown, Point::new(10.0, 10.0));
        let focus = FocusRegister::new();
        let hit = route(&event, &placements, &contexts, &focus, &BTreeSet::new(), 4)
            .unwrap()
            .unwrap();
        assert_eq!(hit.context, above);
        assert_eq!(hit.local, Some(Point::new(10.0, 10.0)));

        let miss = InputEvent::at(InputKind::PointerDown, Point::new(500.0, 10.0));
        assert_eq!(
            route(&miss, &placements, &contexts, &focus, &BTreeSet::new(), 4),
            Ok(None)
        );

        let unreachable = BTreeSet::from([APP]);
        assert_eq!(
            route(&event, &placements, &contexts, &focus, &unreachable, 4),
            Err(Error::TargetUnavailable)
        );
    }

    #[test]
    fn offset_placement_reports_local_point() {
        let mut contexts = ContextTable::new();
        let mut client = Client::new(APP);
        let c = sized_context(&mut contexts, &mut client, Rect::new(0.0, 0.0, 100.0, 100.0));
        let placements = [ContextPlacement::new(c, Rect::new(50.0, 50.0, 150.0, 150.0), 0)];
        let hit = hit_test(Point::new(60.0, 75.0), &placements, &contexts, 4).unwrap();
        assert_eq!(hit.local, Some(Point::new(10.0, 25.0)));
        assert!(hit_test(Point::new(40.0, 75.0), &placements, &contexts, 4).is_none());
    }

    #[test]
    fn keys_follow_keyboard_focus() {
        let mut contexts = ContextTable::new();
        let c = contexts.create(APP);
        let mut focus = FocusRegister::new();
        let key = InputEvent::key(InputKind::KeyDown(30));
        assert_eq!(
            route(&key, &[], &contexts, &focus, &BTreeSet::new(), 4),
            Ok(None)
        );
        focus.set(FocusCategory::Keyboard, c);
        let hit = route(&key, &[], &contexts, &focus, &BTreeSet::new(), 4)
            .unwrap()
            .unwrap();
        assert_eq!(hit, RouteTarget { context: c, local: None });
    }
}
