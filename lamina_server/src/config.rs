// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Server configuration.

use std::collections::BTreeSet;

use lamina_core::handle::ProcessId;
use lamina_render::CompositorConfig;

/// Rules the scene manager applies to client requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScenePolicy {
    /// Lowest level a client may request.
    pub min_level: i32,
    /// Highest level a client may request.
    pub max_level: i32,
    /// Whether orientation changes are refused while a scene is
    /// backgrounded.
    pub deny_orientation_while_backgrounded: bool,
    /// Clients that may not create scenes.
    pub denied_clients: BTreeSet<ProcessId>,
}

impl ScenePolicy {
    /// Allows every level and every client, and still refuses orientation
    /// changes in the background.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            min_level: i32::MIN,
            max_level: i32::MAX,
            deny_orientation_while_backgrounded: true,
            denied_clients: BTreeSet::new(),
        }
    }

    /// Restricts client-requested levels to `min..=max`.
    #[must_use]
    pub fn with_levels(mut self, min: i32, max: i32) -> Self {
        self.min_level = min;
        self.max_level = max.max(min);
        self
    }

    /// Refuses scene creation for `client`.
    #[must_use]
    pub fn deny(mut self, client: ProcessId) -> Self {
        self.denied_clients.insert(client);
        self
    }

    /// Clamps a requested level into the allowed range.
    #[must_use]
    pub fn clamp_level(&self, level: i32) -> i32 {
        level.clamp(self.min_level, self.max_level)
    }

    /// Whether `client` may create scenes.
    #[must_use]
    pub fn allows(&self, client: ProcessId) -> bool {
        !self.denied_clients.contains(&client)
    }
}

impl Default for ScenePolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

/// Everything needed to start a [`Server`](crate::Server).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerConfig {
    /// Compositor timing and limits.
    pub compositor: CompositorConfig,
    /// Scene policy.
    pub policy: ScenePolicy,
}

impl ServerConfig {
    /// A 120 Hz configuration with the permissive policy.
    #[must_use]
    pub fn hz120() -> Self {
        Self {
            compositor: CompositorConfig::hz120(),
            policy: ScenePolicy::permissive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use lamina_core::time::Duration;

    use super::*;

    #[test]
    fn default_timeout_is_four_frames() {
        let config = ServerConfig::default();
        assert_eq!(
            config.compositor.fence_timeout,
            config.compositor.refresh_interval.saturating_mul(4)
        );
        assert_eq!(ServerConfig::hz120().compositor.refresh_interval, Duration(8_333_333));
    }

    #[test]
    fn level_clamping() {
        let policy = ScenePolicy::permissive().with_levels(0, 10);
        assert_eq!(policy.clamp_level(-3), 0);
        assert_eq!(policy.clamp_level(7), 7);
        assert_eq!(policy.clamp_level(99), 10);
        assert!(!policy.clone().deny(ProcessId(4)).allows(ProcessId(4)));
        assert!(policy.allows(ProcessId(4)));
    }
}
