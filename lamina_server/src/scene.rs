// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scenes and their synchronized settings.
//!
//! A scene carries two independently versioned settings sets. The client
//! proposes [`ClientSettings`]; the server owns [`ServerSettings`]. Both are
//! only ever changed through diffs, and a diff bumps the version only when
//! it changes at least one field.

use kurbo::Rect;
use lamina_core::handle::{ContextId, ProcessId, SceneId};

/// Display orientation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Upright portrait.
    #[default]
    Portrait,
    /// Portrait, rotated 180°.
    PortraitUpsideDown,
    /// Landscape, home edge on the left.
    LandscapeLeft,
    /// Landscape, home edge on the right.
    LandscapeRight,
}

/// How a scene is created. The type spec is opaque to the server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneDefinition {
    /// Client-chosen identifier, for diagnostics.
    pub identifier: String,
    /// Opaque scene type description.
    pub type_spec: Vec<u8>,
}

impl SceneDefinition {
    /// A definition with an identifier and no type spec.
    #[must_use]
    pub fn named(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            type_spec: Vec::new(),
        }
    }
}

/// What a member layer shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SceneLayerKind {
    /// A rendering context bound directly.
    Context(ContextId),
    /// Another scene's output.
    Embedded(SceneId),
}

/// One member layer of a scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SceneLayer {
    /// What the layer shows.
    pub kind: SceneLayerKind,
    /// Stacking level among the scene's layers.
    pub level: i32,
}

/// Settings owned by the client.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientSettings {
    /// Bumped on every effective change.
    pub version: u64,
    /// Requested level.
    pub preferred_level: i32,
    /// Requested orientation.
    pub preferred_orientation: Orientation,
    /// Regions the client knows to be opaque, in scene space.
    pub occlusion_hints: Vec<Rect>,
}

/// Changed-field set for [`ClientSettings`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientSettingsDiff {
    /// New preferred level.
    pub preferred_level: Option<i32>,
    /// New preferred orientation.
    pub preferred_orientation: Option<Orientation>,
    /// New occlusion hints.
    pub occlusion_hints: Option<Vec<Rect>>,
}

impl ClientSettingsDiff {
    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.preferred_level.is_none()
            && self.preferred_orientation.is_none()
            && self.occlusion_hints.is_none()
    }

    /// Applies the diff. Returns whether anything changed; the version is
    /// bumped only in that case.
    pub fn apply(&self, settings: &mut ClientSettings) -> bool {
        let mut changed = false;
        changed |= assign(&mut settings.preferred_level, self.preferred_level);
        changed |= assign(
            &mut settings.preferred_orientation,
            self.preferred_orientation,
        );
        changed |= assign(&mut settings.occlusion_hints, self.occlusion_hints.clone());
        if changed {
            settings.version += 1;
        }
        changed
    }
}

/// Settings owned by the server.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerSettings {
    /// Bumped on every effective change.
    pub version: u64,
    /// Authoritative frame, in display space (or host-scene space when
    /// embedded).
    pub frame: Rect,
    /// Authoritative level.
    pub level: i32,
    /// Authoritative orientation.
    pub orientation: Orientation,
    /// Whether the scene is in the background.
    pub backgrounded: bool,
    /// Regions of the scene covered by other content.
    pub occlusions: Vec<Rect>,
}

/// Changed-field set for [`ServerSettings`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerSettingsDiff {
    /// New frame.
    pub frame: Option<Rect>,
    /// New level.
    pub level: Option<i32>,
    /// New orientation.
    pub orientation: Option<Orientation>,
    /// New background state.
    pub backgrounded: Option<bool>,
    /// New occlusions.
    pub occlusions: Option<Vec<Rect>>,
}

impl ServerSettingsDiff {
    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
            && self.level.is_none()
            && self.orientation.is_none()
            && self.backgrounded.is_none()
            && self.occlusions.is_none()
    }

    /// Applies the diff and returns the subset of fields that actually
    /// changed. The version is bumped only if that subset is non-empty.
    pub fn apply(&self, settings: &mut ServerSettings) -> Self {
        let mut effective = Self::default();
        if assign(&mut settings.frame, self.frame) {
            effective.frame = self.frame;
        }
        if assign(&mut settings.level, self.level) {
            effective.level = self.level;
        }
        if assign(&mut settings.orientation, self.orientation) {
            effective.orientation = self.orientation;
        }
        if assign(&mut settings.backgrounded, self.backgrounded) {
            effective.backgrounded = self.backgrounded;
        }
        if assign(&mut settings.occlusions, self.occlusions.clone()) {
            effective.occlusions.clone_from(&self.occlusions);
        }
        if !effective.is_empty() {
            settings.version += 1;
        }
        effective
    }
}

/// The result of a client settings proposal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SettingsOutcome {
    /// Fields accepted, with the values actually applied (levels may be
    /// clamped).
    pub accepted: ClientSettingsDiff,
    /// Fields refused by policy, with the requested values.
    pub denied: ClientSettingsDiff,
    /// Server settings changed as a consequence.
    pub server_diff: ServerSettingsDiff,
    /// Client settings version after the proposal.
    pub client_version: u64,
    /// Server settings version after the proposal.
    pub server_version: u64,
}

/// A server-managed on-screen unit.
#[derive(Clone, Debug)]
pub struct Scene {
    pub(crate) owner: ProcessId,
    pub(crate) definition: SceneDefinition,
    pub(crate) layers: Vec<SceneLayer>,
    pub(crate) client: ClientSettings,
    pub(crate) server: ServerSettings,
}

impl Scene {
    pub(crate) fn new(owner: ProcessId, definition: SceneDefinition, client: ClientSettings) -> Self {
        Self {
            owner,
            definition,
            layers: Vec::new(),
            client,
            server: ServerSettings::default(),
        }
    }

    /// Owning client.
    #[must_use]
    pub fn owner(&self) -> ProcessId {
        self.owner
    }

    /// How the scene was created.
    #[must_use]
    pub fn definition(&self) -> &SceneDefinition {
        &self.definition
    }

    /// Member layers, back-to-front.
    #[must_use]
    pub fn layers(&self) -> &[SceneLayer] {
        &self.layers
    }

    /// Current client settings.
    #[must_use]
    pub fn client_settings(&self) -> &ClientSettings {
        &self.client
    }

    /// Current server settings.
    #[must_use]
    pub fn server_settings(&self) -> &ServerSettings {
        &self.server
    }

    /// Contexts bound directly to this scene.
    pub fn contexts(&self) -> impl Iterator<Item = ContextId> + '_ {
        self.layers.iter().filter_map(|l| match l.kind {
            SceneLayerKind::Context(c) => Some(c),
            SceneLayerKind::Embedded(_) => None,
        })
    }

    /// Scenes embedded directly in this scene.
    pub fn embedded(&self) -> impl Iterator<Item = SceneId> + '_ {
        self.layers.iter().filter_map(|l| match l.kind {
            SceneLayerKind::Embedded(s) => Some(s),
            SceneLayerKind::Context(_) => None,
        })
    }

    /// Inserts a layer above every layer with a level less than or equal to
    /// `layer.level`.
    pub(crate) fn insert_layer(&mut self, layer: SceneLayer) {
        let at = self.layers.partition_point(|l| l.level <= layer.level);
        self.layers.insert(at, layer);
    }

    /// Removes every layer showing `kind`. Returns whether any was removed.
    pub(crate) fn remove_layer(&mut self, kind: SceneLayerKind) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| l.kind != kind);
        self.layers.len() != before
    }
}

/// Writes `value` into `slot` if present and different. Returns whether the
/// slot changed.
fn assign<T: PartialEq>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(v) if *slot != v => {
            *slot = v;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use lamina_core::handle::RawHandle;

    use super::*;

    #[test]
    fn client_diff_bumps_version_only_on_change() {
        let mut settings = ClientSettings::default();
        let diff = ClientSettingsDiff {
            preferred_level: Some(3),
            ..Default::default()
        };
        assert!(diff.apply(&mut settings));
        assert_eq!(settings.version, 1);
        assert!(!diff.apply(&mut settings), "same value again");
        assert_eq!(settings.version, 1);
        assert!(!ClientSettingsDiff::default().apply(&mut settings));
    }

    #[test]
    fn server_diff_reports_effective_fields() {
        let mut settings = ServerSettings {
            level: 2,
            ..Default::default()
        };
        let diff = ServerSettingsDiff {
            level: Some(2),
            backgrounded: Some(true),
            ..Default::default()
        };
        let effective = diff.apply(&mut settings);
        assert_eq!(effective.level, None, "unchanged field dropped");
        assert_eq!(effective.backgrounded, Some(true));
        assert_eq!(settings.version, 1);
        assert!(diff.apply(&mut settings).is_empty());
        assert_eq!(settings.version, 1);
    }

    #[test]
    fn layers_stay_sorted_with_latest_on_top_of_ties() {
        let c = |i| SceneLayerKind::Context(ContextId(RawHandle::from_parts(i, 0)));
        let mut scene = Scene::new(
            ProcessId(1),
            SceneDefinition::named("main"),
            ClientSettings::default(),
        );
        scene.insert_layer(SceneLayer { kind: c(0), level: 5 });
        scene.insert_layer(SceneLayer { kind: c(1), level: 1 });
        scene.insert_layer(SceneLayer { kind: c(2), level: 5 });
        let order: Vec<_> = scene.layers().iter().map(|l| l.kind).collect();
        assert_eq!(order, vec![c(1), c(0), c(2)]);
        assert!(scene.remove_layer(c(0)));
        assert!(!scene.remove_layer(c(0)));
        assert_eq!(scene.contexts().count(), 2);
    }
}
