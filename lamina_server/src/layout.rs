// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display layouts and their resolution into compositor placements.

use kurbo::{Rect, Vec2};
use lamina_core::display::DisplayId;
use lamina_core::handle::SceneId;
use lamina_core::transform::Transform3d;
use lamina_render::ContextPlacement;

use crate::manager::SceneManager;
use crate::scene::{Orientation, SceneLayerKind};

/// One scene placed on a display.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacedElement {
    /// The placed scene.
    pub scene: SceneId,
    /// Display-space frame.
    pub frame: Rect,
    /// Stacking level.
    pub level: i32,
    /// Opacity applied to everything in the scene.
    pub opacity: f32,
    /// Extra transform, applied in the frame's coordinate space.
    pub transform: Transform3d,
    /// Placement order; later placements win level ties.
    pub seq: u64,
}

/// The ordered set of scenes shown on one display.
#[derive(Clone, Debug)]
pub struct DisplayLayout {
    display: DisplayId,
    orientation: Orientation,
    elements: Vec<PlacedElement>,
    next_seq: u64,
}

impl DisplayLayout {
    /// Creates an empty layout.
    #[must_use]
    pub fn new(display: DisplayId) -> Self {
        Self {
            display,
            orientation: Orientation::Portrait,
            elements: Vec::new(),
            next_seq: 0,
        }
    }

    /// Target display.
    #[must_use]
    pub fn display(&self) -> DisplayId {
        self.display
    }

    /// Current orientation.
    #[must_use]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Sets the orientation.
    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    /// Places `scene`, replacing any earlier placement of it. The new
    /// placement wins ties against everything already at `level`.
    pub fn place(
        &mut self,
        scene: SceneId,
        frame: Rect,
        level: i32,
        opacity: f32,
        transform: Transform3d,
    ) {
        self.elements.retain(|e| e.scene != scene);
        self.elements.push(PlacedElement {
            scene,
            frame,
            level,
            opacity: opacity.clamp(0.0, 1.0),
            transform,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Updates the frame and level of an existing placement, keeping its
    /// tie-break order. Returns whether the scene is placed here.
    pub fn reframe(&mut self, scene: SceneId, frame: Rect, level: i32) -> bool {
        match self.elements.iter_mut().find(|e| e.scene == scene) {
            Some(e) => {
                e.frame = frame;
                e.level = level;
                true
            }
            None => false,
        }
    }

    /// Removes a scene. Returns whether it was placed here.
    pub fn remove(&mut self, scene: SceneId) -> bool {
        let before = self.elements.len();
        self.elements.retain(|e| e.scene != scene);
        self.elements.len() != before
    }

    /// Returns the placement of `scene`, if any.
    #[must_use]
    pub fn element(&self, scene: SceneId) -> Option<&PlacedElement> {
        self.elements.iter().find(|e| e.scene == scene)
    }

    /// Elements back-to-front: ascending level, ties by placement order.
    #[must_use]
    pub fn paint_order(&self) -> Vec<PlacedElement> {
        let mut order = self.elements.clone();
        order.sort_by_key(|e| (e.level, e.seq));
        order
    }

    /// Number of placed scenes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether nothing is placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Flattens the layout into back-to-front context placements.
    ///
    /// Backgrounded scenes are skipped. Embedded scenes are placed at their
    /// server frame relative to the host scene, to at most `max_depth`
    /// levels of nesting.
    #[must_use]
    pub fn resolve(&self, scenes: &SceneManager, max_depth: u8) -> Vec<ContextPlacement> {
        let mut out = Vec::new();
        for element in self.paint_order() {
            let base = Frame {
                origin: element.frame.origin().to_vec2(),
                transform: element.transform,
                bounds: element.frame,
                opacity: element.opacity,
                level: element.level,
            };
            resolve_scene(scenes, element.scene, base, max_depth, &mut out);
        }
        out
    }
}

#[derive(Clone, Copy)]
struct Frame {
    origin: Vec2,
    transform: Transform3d,
    bounds: Rect,
    opacity: f32,
    level: i32,
}

fn resolve_scene(
    scenes: &SceneManager,
    scene: SceneId,
    frame: Frame,
    depth: u8,
    out: &mut Vec<ContextPlacement>,
) {
    let Ok(s) = scenes.get(scene) else {
        return;
    };
    if s.server_settings().backgrounded {
        return;
    }
    for layer in s.layers() {
        match layer.kind {
            SceneLayerKind::Context(context) => out.push(ContextPlacement {
                context,
                frame: Rect::from_origin_size(frame.origin.to_point(), frame.bounds.size()),
                level: frame.level,
                opacity: frame.opacity,
                transform: frame.transform,
                clips: true,
            }),
            SceneLayerKind::Embedded(inner) if depth > 0 => {
                let Ok(child) = scenes.get(inner) else {
                    continue;
                };
                let local = child.server_settings().frame;
                let nested = Frame {
                    origin: frame.origin,
                    transform: frame.transform
                        * Transform3d::from_translation(local.x0, local.y0, 0.0),
                    bounds: local,
                    opacity: frame.opacity,
                    level: frame.level,
                };
                resolve_scene(scenes, inner, nested, depth - 1, out);
            }
            SceneLayerKind::Embedded(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use lamina_core::context::ContextTable;
    use lamina_core::handle::ProcessId;

    use super::*;
    use crate::config::ScenePolicy;
    use crate::scene::{ClientSettings, SceneDefinition, ServerSettingsDiff};

    const APP: ProcessId = ProcessId(1);

    #[test]
    fn ties_go_to_most_recent_placement() {
        let mut scenes = SceneManager::new(ScenePolicy::permissive());
        let a = scenes
            .create_scene(APP, SceneDefinition::named("a"), ClientSettings::default())
            .unwrap();
        let b = scenes
            .create_scene(APP, SceneDefinition::named("b"), ClientSettings::default())
            .unwrap();
        let mut layout = DisplayLayout::new(DisplayId::MAIN);
        let frame = Rect::new(0.0, 0.0, 10.0, 10.0);
        layout.place(b, frame, 1, 1.0, Transform3d::IDENTITY);
        layout.place(a, frame, 1, 1.0, Transform3d::IDENTITY);
        let order: Vec<_> = layout.paint_order().iter().map(|e| e.scene).collect();
        assert_eq!(order, vec![b, a]);

        layout.place(b, frame, 1, 1.0, Transform3d::IDENTITY);
        let order: Vec<_> = layout.paint_order().iter().map(|e| e.scene).collect();
        assert_eq!(order, vec![a, b], "re-placing moves to the top of its level");

        assert!(layout.reframe(a, frame, 2));
        assert_eq!(layout.paint_order()[1].scene, a);
        assert!(layout.remove(a));
        assert!(!layout.remove(a));
        assert_eq!(layout.len(), 1);
    }

    #[test]
    fn embedded_scenes_resolve_relative_to_host() {
        let mut contexts = ContextTable::new();
        let outer_ctx = contexts.create(APP);
        let inner_ctx = contexts.create(APP);
        let mut scenes = SceneManager::new(ScenePolicy::permissive());
        let host = scenes
            .create_scene(APP, SceneDefinition::named("host"), ClientSettings::default())
            .unwrap();
        let pip = scenes
            .create_scene(APP, SceneDefinition::named("pip"), ClientSettings::default())
            .unwrap();
        scenes
            .bind_context_layer(host, outer_ctx, APP, 0, &contexts)
            .unwrap();
        scenes
            .bind_context_layer(pip, inner_ctx, APP, 0, &contexts)
            .unwrap();
        scenes.bind_external_layer(host, pip, 1).unwrap();
        scenes
            .update_server_settings(
                pip,
                &ServerSettingsDiff {
                    frame: Some(Rect::new(20.0, 30.0, 120.0, 80.0)),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut layout = DisplayLayout::new(DisplayId::MAIN);
        layout.place(host, Rect::new(100.0, 100.0, 400.0, 700.0), 0, 1.0, Transform3d::IDENTITY);
        let placements = layout.resolve(&scenes, 4);
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].context, outer_ctx);
        assert_eq!(placements[1].context, inner_ctx);
        assert_eq!(
            placements[1].display_rect(),
            Rect::new(120.0, 130.0, 220.0, 180.0)
        );
        assert_eq!(layout.resolve(&scenes, 0).len(), 1, "depth limit");

        scenes
            .update_server_settings(
                host,
                &ServerSettingsDiff {
                    backgrounded: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(layout.resolve(&scenes, 4).is_empty());
    }
}
