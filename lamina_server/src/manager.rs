// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The scene manager: server-side authority over scenes and their settings.
//!
//! Every operation validates fully before it mutates, so a rejected request
//! leaves the scene table exactly as it was.

use std::collections::BTreeMap;

use lamina_core::context::ContextTable;
use lamina_core::error::{Error, Result};
use lamina_core::handle::{Arena, ContextId, ProcessId, SceneId};

use crate::config::ScenePolicy;
use crate::scene::{
    ClientSettings, ClientSettingsDiff, Scene, SceneDefinition, SceneLayer, SceneLayerKind,
    ServerSettingsDiff, SettingsOutcome,
};

/// What a destroyed scene left behind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneTeardown {
    /// The scene's owner.
    pub owner: Option<ProcessId>,
    /// Contexts that were bound to it.
    pub unbound: Vec<ContextId>,
    /// Scenes that embedded it, with their owners.
    pub hosts: Vec<(SceneId, ProcessId)>,
}

/// Owns every scene and the context-to-scene binding table.
#[derive(Debug, Default)]
pub struct SceneManager {
    scenes: Arena<Scene>,
    bindings: BTreeMap<ContextId, SceneId>,
    policy: ScenePolicy,
}

impl SceneManager {
    /// Creates an empty manager enforcing `policy`.
    #[must_use]
    pub fn new(policy: ScenePolicy) -> Self {
        Self {
            scenes: Arena::new(),
            bindings: BTreeMap::new(),
            policy,
        }
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &ScenePolicy {
        &self.policy
    }

    /// Creates a scene for an authenticated `client`.
    ///
    /// Fails with [`Error::PermissionDenied`] if policy refuses the client.
    /// The initial preferred level is clamped like any later proposal, and
    /// seeds the server level.
    pub fn create_scene(
        &mut self,
        client: ProcessId,
        definition: SceneDefinition,
        mut initial: ClientSettings,
    ) -> Result<SceneId> {
        if !self.policy.allows(client) {
            return Err(Error::PermissionDenied);
        }
        initial.preferred_level = self.policy.clamp_level(initial.preferred_level);
        initial.version = 0;
        let mut scene = Scene::new(client, definition, initial);
        scene.server.level = scene.client.preferred_level;
        scene.server.orientation = scene.client.preferred_orientation;
        Ok(SceneId(self.scenes.insert(scene)))
    }

    /// Removes a scene, unbinding its contexts and removing it from every
    /// scene that embedded it.
    pub fn destroy_scene(&mut self, scene: SceneId) -> Result<SceneTeardown> {
        let removed = self.scenes.remove(scene.0)?;
        let unbound: Vec<ContextId> = removed.contexts().collect();
        for context in &unbound {
            self.bindings.remove(context);
        }
        let mut hosts = Vec::new();
        for (handle, host) in self.scenes.iter_mut() {
            if host.remove_layer(SceneLayerKind::Embedded(scene)) {
                hosts.push((SceneId(handle), host.owner));
            }
        }
        Ok(SceneTeardown {
            owner: Some(removed.owner),
            unbound,
            hosts,
        })
    }

    /// Looks up a scene.
    pub fn get(&self, scene: SceneId) -> Result<&Scene> {
        self.scenes.get(scene.0)
    }

    /// Whether the handle names a live scene.
    #[must_use]
    pub fn contains(&self, scene: SceneId) -> bool {
        self.scenes.contains(scene.0)
    }

    /// Iterates live scenes in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (SceneId, &Scene)> + '_ {
        self.scenes.iter().map(|(h, s)| (SceneId(h), s))
    }

    /// Scenes owned by `process`.
    #[must_use]
    pub fn owned_by(&self, process: ProcessId) -> Vec<SceneId> {
        self.iter()
            .filter(|(_, s)| s.owner == process)
            .map(|(id, _)| id)
            .collect()
    }

    /// The scene a context is bound to, if any.
    #[must_use]
    pub fn scene_of(&self, context: ContextId) -> Option<SceneId> {
        self.bindings.get(&context).copied()
    }

    /// Binds a context as a member layer.
    ///
    /// `claimed_owner` is the process the caller says owns the context.
    /// Fails with [`Error::InvalidContext`] if the context does not exist,
    /// is owned by someone else, or is already bound to a scene.
    pub fn bind_context_layer(
        &mut self,
        scene: SceneId,
        context: ContextId,
        claimed_owner: ProcessId,
        level: i32,
        contexts: &ContextTable,
    ) -> Result<()> {
        self.scenes.get(scene.0)?;
        match contexts.owner(context) {
            Ok(owner) if owner == claimed_owner => {}
            _ => return Err(Error::InvalidContext),
        }
        if self.bindings.contains_key(&context) {
            return Err(Error::InvalidContext);
        }
        self.scenes.get_mut(scene.0)?.insert_layer(SceneLayer {
            kind: SceneLayerKind::Context(context),
            level,
        });
        self.bindings.insert(context, scene);
        Ok(())
    }

    /// Removes a context's binding, wherever it is. Returns the scene it
    /// was bound to.
    pub fn unbind_context(&mut self, context: ContextId) -> Option<SceneId> {
        let scene = self.bindings.remove(&context)?;
        if let Ok(s) = self.scenes.get_mut(scene.0) {
            s.remove_layer(SceneLayerKind::Context(context));
        }
        Some(scene)
    }

    /// Embeds `embedded`'s output in `host`.
    ///
    /// Fails with [`Error::CyclicEmbedding`] if `embedded` already
    /// (transitively) embeds `host`, or is `host` itself.
    pub fn bind_external_layer(&mut self, host: SceneId, embedded: SceneId, level: i32) -> Result<()> {
        self.scenes.get(host.0)?;
        self.scenes.get(embedded.0)?;
        if host == embedded || self.embeds(embedded, host) {
            return Err(Error::CyclicEmbedding);
        }
        self.scenes.get_mut(host.0)?.insert_layer(SceneLayer {
            kind: SceneLayerKind::Embedded(embedded),
            level,
        });
        Ok(())
    }

    /// Whether `outer` transitively embeds `inner`.
    #[must_use]
    pub fn embeds(&self, outer: SceneId, inner: SceneId) -> bool {
        let mut stack = vec![outer];
        let mut seen = Vec::new();
        while let Some(scene) = stack.pop() {
            if seen.contains(&scene) {
                continue;
            }
            seen.push(scene);
            let Ok(s) = self.scenes.get(scene.0) else {
                continue;
            };
            for child in s.embedded() {
                if child == inner {
                    return true;
                }
                stack.push(child);
            }
        }
        false
    }

    /// Validates a client proposal against policy and applies what is
    /// allowed.
    ///
    /// Levels are clamped into the policy range; orientation changes are
    /// refused while the scene is backgrounded (if policy says so). Accepted
    /// level and orientation flow into the server settings.
    pub fn propose_client_settings(
        &mut self,
        scene: SceneId,
        diff: &ClientSettingsDiff,
    ) -> Result<SettingsOutcome> {
        let policy = self.policy.clone();
        let s = self.scenes.get_mut(scene.0)?;
        let mut accepted = ClientSettingsDiff::default();
        let mut denied = ClientSettingsDiff::default();

        accepted.preferred_level = diff.preferred_level.map(|l| policy.clamp_level(l));
        match diff.preferred_orientation {
            Some(o) if s.server.backgrounded && policy.deny_orientation_while_backgrounded => {
                denied.preferred_orientation = Some(o);
            }
            other => accepted.preferred_orientation = other,
        }
        accepted.occlusion_hints.clone_from(&diff.occlusion_hints);

        accepted.apply(&mut s.client);
        let server_diff = ServerSettingsDiff {
            level: accepted.preferred_level,
            orientation: accepted.preferred_orientation,
            ..Default::default()
        }
        .apply(&mut s.server);

        Ok(SettingsOutcome {
            accepted,
            denied,
            server_diff,
            client_version: s.client.version,
            server_version: s.server.version,
        })
    }

    /// Applies a server-initiated change. Returns the fields that actually
    /// changed.
    pub fn update_server_settings(
        &mut self,
        scene: SceneId,
        diff: &ServerSettingsDiff,
    ) -> Result<ServerSettingsDiff> {
        Ok(diff.apply(&mut self.scenes.get_mut(scene.0)?.server))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Orientation;

    const APP: ProcessId = ProcessId(1);
    const OTHER: ProcessId = ProcessId(2);

    fn manager() -> SceneManager {
        SceneManager::new(ScenePolicy::permissive().with_levels(0, 10).deny(OTHER))
    }

    fn scene(m: &mut SceneManager) -> SceneId {
        m.create_scene(APP, SceneDefinition::named("s"), ClientSettings::default())
            .unwrap()
    }

    #[test]
    fn denied_client_cannot_create() {
        let mut m = manager();
        assert_eq!(
            m.create_scene(OTHER, SceneDefinition::default(), ClientSettings::default()),
            Err(Error::PermissionDenied)
        );
        assert_eq!(m.iter().count(), 0);
    }

    #[test]
    fn cyclic_embedding_is_rejected_without_change() {
        let mut m = manager();
        let a = scene(&mut m);
        let b = scene(&mut m);
        let c = scene(&mut m);
        m.bind_external_layer(a, b, 0).unwrap();
        m.bind_external_layer(b, c, 0).unwrap();
        assert_eq!(m.bind_external_layer(c, a, 0), Err(Error::CyclicEmbedding));
        assert_eq!(m.bind_external_layer(a, a, 0), Err(Error::CyclicEmbedding));
        assert!(m.get(c).unwrap().layers().is_empty());
        assert!(m.embeds(a, c));
        assert!(!m.embeds(c, a));
    }

    #[test]
    fn binding_checks_context_owner_and_uniqueness() {
        let mut contexts = ContextTable::new();
        let mine = contexts.create(APP);
        let theirs = contexts.create(OTHER);
        let gone = contexts.create(APP);
        contexts.destroy(gone).unwrap();

        let mut m = manager();
        let s = scene(&mut m);
        let t = scene(&mut m);
        assert_eq!(
            m.bind_context_layer(s, theirs, APP, 0, &contexts),
            Err(Error::InvalidContext)
        );
        assert_eq!(
            m.bind_context_layer(s, gone, APP, 0, &contexts),
            Err(Error::InvalidContext)
        );
        m.bind_context_layer(s, mine, APP, 0, &contexts).unwrap();
        assert_eq!(
            m.bind_context_layer(t, mine, APP, 0, &contexts),
            Err(Error::InvalidContext),
            "a context binds to at most one scene"
        );
        assert!(m.get(t).unwrap().layers().is_empty());
        assert_eq!(m.scene_of(mine), Some(s));
        assert_eq!(m.unbind_context(mine), Some(s));
        assert!(m.get(s).unwrap().layers().is_empty());
    }

    #[test]
    fn proposal_clamps_level_and_denies_background_rotation() {
        let mut m = manager();
        let s = scene(&mut m);
        let outcome = m
            .propose_client_settings(
                s,
                &ClientSettingsDiff {
                    preferred_level: Some(40),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.accepted.preferred_level, Some(10));
        assert_eq!(outcome.server_diff.level, Some(10));
        assert_eq!(outcome.client_version, 1);
        assert_eq!(outcome.server_version, 1);

        m.update_server_settings(
            s,
            &ServerSettingsDiff {
                backgrounded: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        let outcome = m
            .propose_client_settings(
                s,
                &ClientSettingsDiff {
                    preferred_orientation: Some(Orientation::LandscapeLeft),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            outcome.denied.preferred_orientation,
            Some(Orientation::LandscapeLeft)
        );
        assert!(outcome.accepted.is_empty());
        assert!(outcome.server_diff.is_empty());
        assert_eq!(outcome.client_version, 1, "nothing applied");
        assert_eq!(
            m.get(s).unwrap().server_settings().orientation,
            Orientation::Portrait
        );
    }

    #[test]
    fn destroying_embedded_scene_updates_hosts() {
        let mut m = manager();
        let host = scene(&mut m);
        let inner = scene(&mut m);
        m.bind_external_layer(host, inner, 1).unwrap();
        let teardown = m.destroy_scene(inner).unwrap();
        assert_eq!(teardown.hosts, vec![(host, APP)]);
        assert!(m.get(host).unwrap().layers().is_empty());
        assert_eq!(m.get(inner).err(), Some(Error::StaleReference));
    }
}
