// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Output stage contract.
//!
//! The compositor ends every pass by handing the finished [`RenderPlan`] to
//! an [`OutputStage`]. Drawing the plan (GPU submission, a native compositor
//! tree, a screenshot for tests) is entirely the stage's business; the core
//! never waits on it.

use crate::plan::RenderPlan;

/// Consumes finished frames.
///
/// GPU-backed stages and test doubles implement this trait, enabling a
/// generic server loop.
///
/// # Frame loop pseudocode
///
/// ```rust,ignore
/// fn on_vsync(now: HostTime) {
///     tick = tick.next(interval);
///     server.pump();
///     server.tick(tick, &mut output, Tracer::none())?;
/// }
/// ```
pub trait OutputStage {
    /// Presents one frame. `plan.damage` describes what changed since the
    /// previous call.
    fn present(&mut self, plan: &RenderPlan);
}

/// An [`OutputStage`] that keeps the most recent plan.
#[derive(Clone, Debug, Default)]
pub struct RetainLast {
    /// The last presented plan.
    pub last: Option<RenderPlan>,
    /// How many frames were presented.
    pub presented: u64,
}

impl RetainLast {
    /// Creates an empty stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputStage for RetainLast {
    fn present(&mut self, plan: &RenderPlan) {
        self.last = Some(plan.clone());
        self.presented += 1;
    }
}
