// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The once-per-tick compositor pass.
//!
//! A pass has two halves so that the server can act on fence state between
//! them:
//!
//! 1. [`Compositor::begin`] marks newly held commits and force-clears fences
//!    whose held commits outlived [`CompositorConfig::fence_timeout`].
//! 2. [`Compositor::compose`] applies every staged commit whose fence is
//!    open (stopping per context at the first held one), samples running
//!    interpolations, evaluates the render trees, paints the placed contexts
//!    back-to-front, computes damage and hands the plan to the
//!    [`OutputStage`].
//!
//! Fence state never changes inside `compose`, so every commit released by
//! the same fence becomes visible in the same plan. A transaction that
//! spans several contexts is applied only once each of its parts is at the
//! front of its queue, and then all parts land together. Nothing in the pass
//! reads a clock: the frame is a pure function of the committed states,
//! fence states, placements and [`FrameTick::now`].

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use kurbo::Rect;
use lamina_core::commit::Commit;
use lamina_core::context::{AppliedCommit, ContextTable};
use lamina_core::error::Error;
use lamina_core::fence::{Fence, FenceTable};
use lamina_core::handle::{ContextId, FenceId};
use lamina_core::node::{ContentKind, FrameChanges, NodeId, ROOT_NODE};
use lamina_core::time::{Duration, HostTime};
use lamina_core::timing::FrameTick;
use lamina_core::trace::{
    CommitEvent, FenceClearedEvent, FenceTimeoutEvent, FrameSummary, FrameSummaryBuilder,
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, TickEvent, Tracer,
};
use lamina_core::transform::Transform3d;

use crate::damage::DamageRegion;
use crate::output::OutputStage;
use crate::plan::{BlendMode, RenderItem, RenderPlan};

/// Compositor tuning.
///
/// Presets assume nanosecond host ticks ([`Timebase::NANOS`]).
///
/// [`Timebase::NANOS`]: lamina_core::time::Timebase::NANOS
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositorConfig {
    /// Nominal display refresh interval.
    pub refresh_interval: Duration,
    /// How long a commit may be held by an uncleared fence before the fence
    /// is force-cleared.
    pub fence_timeout: Duration,
    /// How many context hosts may nest inside one placed context.
    pub max_host_depth: u8,
}

impl CompositorConfig {
    /// Refresh intervals a fence may hold a commit by default.
    pub const DEFAULT_TIMEOUT_FRAMES: u64 = 4;

    /// 60 Hz display.
    #[must_use]
    pub const fn hz60() -> Self {
        Self::with_refresh(Duration(16_666_667))
    }

    /// 120 Hz display.
    #[must_use]
    pub const fn hz120() -> Self {
        Self::with_refresh(Duration(8_333_333))
    }

    /// A display with the given refresh interval and default timeout.
    #[must_use]
    pub const fn with_refresh(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval,
            fence_timeout: refresh_interval.saturating_mul(Self::DEFAULT_TIMEOUT_FRAMES),
            max_host_depth: 4,
        }
    }

    /// Overrides the fence timeout.
    #[must_use]
    pub const fn fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self::hz60()
    }
}

/// Where one context appears on the display, as resolved from the layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContextPlacement {
    /// The placed context.
    pub context: ContextId,
    /// Display-space frame. The context root's origin maps to the frame's
    /// origin.
    pub frame: Rect,
    /// Stacking level, for diagnostics; placements arrive already sorted.
    pub level: i32,
    /// Opacity multiplied into every item.
    pub opacity: f32,
    /// Extra transform applied in the frame's coordinate space.
    pub transform: Transform3d,
    /// Whether content is confined to the frame.
    pub clips: bool,
}

impl ContextPlacement {
    /// A placement at `frame` with full opacity, no extra transform and
    /// clipping on.
    #[must_use]
    pub fn new(context: ContextId, frame: Rect, level: i32) -> Self {
        Self {
            context,
            frame,
            level,
            opacity: 1.0,
            transform: Transform3d::IDENTITY,
            clips: true,
        }
    }

    /// Maps context-root space into display space.
    #[must_use]
    pub fn display_transform(&self) -> Transform3d {
        Transform3d::from_translation(self.frame.x0, self.frame.y0, 0.0) * self.transform
    }

    /// Display-space bounds of the placement frame after its transform.
    #[must_use]
    pub fn display_rect(&self) -> Rect {
        self.display_transform()
            .transform_rect_bbox(Rect::from_origin_size((0.0, 0.0), self.frame.size()))
    }
}

/// What one pass did.
#[derive(Clone, Debug)]
pub struct PassReport {
    /// Commits that became visible, in application order.
    pub applied: Vec<AppliedCommit>,
    /// Fences force-cleared by the timeout policy this tick.
    pub forced: Vec<FenceId>,
    /// Fences whose gated commits were released this tick.
    pub cleared: Vec<FenceId>,
    /// Fences collected at the end of the pass.
    pub collected: Vec<FenceId>,
    /// Commits that failed to apply against the server's mirrors, one
    /// entry per refused transaction.
    pub rejected: Vec<(ContextId, Error)>,
    /// Commits discarded because a transaction was refused: its own parts
    /// and everything staged behind them.
    pub dropped: Vec<Commit>,
    /// Per-frame counters.
    pub summary: FrameSummary,
}

/// Runs compositor passes and remembers what the previous frame looked like.
///
/// Each display has its own compositor. Contexts are shared, so damage is
/// judged against the context revisions this compositor last presented
/// rather than against what changed during its own pass.
#[derive(Debug)]
pub struct Compositor {
    config: CompositorConfig,
    forced: Vec<FenceId>,
    changes: FrameChanges,
    last_placements: Vec<ContextPlacement>,
    last_bounds: BTreeMap<ContextId, Rect>,
    presented: BTreeMap<ContextId, u64>,
    has_presented: bool,
}

impl Compositor {
    /// Creates a compositor.
    #[must_use]
    pub fn new(config: CompositorConfig) -> Self {
        Self {
            config,
            forced: Vec::new(),
            changes: FrameChanges::default(),
            last_placements: Vec::new(),
            last_bounds: BTreeMap::new(),
            presented: BTreeMap::new(),
            has_presented: false,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Starts a pass: records when staged commits were first seen held and
    /// force-clears fences that held one for at least the fence timeout.
    /// Returns the fences cleared this way.
    pub fn begin(
        &mut self,
        tick: &FrameTick,
        contexts: &mut ContextTable,
        fences: &mut FenceTable,
        tracer: &mut Tracer<'_>,
    ) -> &[FenceId] {
        let now = tick.now;
        tracer.tick(&TickEvent::from(tick));
        self.forced.clear();

        let mut expired = Vec::new();
        for (context, state) in contexts.iter_mut() {
            for staged in state.staged_mut().iter_mut() {
                let Some(fence) = staged.commit.fence else {
                    continue;
                };
                if fences.is_open(fence) {
                    continue;
                }
                let since = match staged.held_since {
                    Some(since) => since,
                    None => {
                        staged.held_since = Some(now);
                        tracer.commit_held(&commit_event(tick.frame_index, &staged.commit));
                        now
                    }
                };
                if now.saturating_duration_since(since) >= self.config.fence_timeout {
                    expired.push((fence, context, since));
                }
            }
        }

        for (fence, context, held_since) in expired {
            if let Ok(true) = fences.force_clear(fence) {
                tracer.fence_timeout(&FenceTimeoutEvent {
                    frame_index: tick.frame_index,
                    fence,
                    context,
                    held_since,
                    now,
                });
                self.forced.push(fence);
            }
        }
        &self.forced
    }

    /// Finishes a pass and presents the frame.
    ///
    /// `placements` must be in back-to-front order; placements of contexts
    /// that no longer exist are skipped. `pinned` keeps cleared fences
    /// alive past collection even when no staged commit refers to them.
    pub fn compose(
        &mut self,
        tick: &FrameTick,
        contexts: &mut ContextTable,
        fences: &mut FenceTable,
        placements: &[ContextPlacement],
        pinned: &dyn Fn(FenceId) -> bool,
        output: &mut dyn OutputStage,
        tracer: &mut Tracer<'_>,
    ) -> PassReport {
        let now = tick.now;
        let frame_index = tick.frame_index;
        let mut summary = FrameSummaryBuilder::new(&TickEvent::from(tick));
        for _ in &self.forced {
            summary.fence_forced();
        }

        // -- Resolve --
        phase_begin(tracer, &mut summary, frame_index, PhaseKind::Resolve, now);
        let placements: Vec<ContextPlacement> = placements
            .iter()
            .filter(|p| contexts.contains(p.context))
            .copied()
            .collect();
        phase_end(tracer, &mut summary, frame_index, PhaseKind::Resolve, now);

        // -- Apply --
        phase_begin(tracer, &mut summary, frame_index, PhaseKind::Apply, now);
        let mut applied = Vec::new();
        let mut rejected = Vec::new();
        let mut dropped = Vec::new();
        let mut cleared = BTreeSet::new();
        let order: Vec<ContextId> = contexts.iter().map(|(id, _)| id).collect();
        // A part can reach the front of its queue only after an earlier
        // context in `order` was visited, so sweep until nothing moves.
        let mut progressed = true;
        while progressed {
            progressed = false;
            for &context in &order {
                while let Some(batch) = contexts.front_batch(context) {
                    let fronts: Vec<CommitEvent> = batch
                        .iter()
                        .filter_map(|&c| contexts.get(c).ok()?.staged().front())
                        .map(|front| commit_event(frame_index, &front.commit))
                        .collect();
                    if fronts
                        .iter()
                        .any(|e| e.fence.is_some_and(|f| !fences.is_open(f)))
                    {
                        break;
                    }
                    progressed = true;
                    let refused = batch.iter().find_map(|&c| {
                        contexts
                            .get(c)
                            .and_then(|state| state.check_front())
                            .err()
                            .map(|error| (c, error))
                    });
                    if let Some(refused) = refused {
                        let doomed = fronts.iter().map(|e| (e.process, e.transaction)).collect();
                        dropped.extend(contexts.discard_transactions(doomed));
                        rejected.push(refused);
                        continue;
                    }
                    for event in &fronts {
                        if let Some(fence) = event.fence
                            && cleared.insert(fence)
                        {
                            tracer.fence_cleared(&FenceClearedEvent {
                                frame_index,
                                fence,
                                forced: fences.get(fence).is_ok_and(Fence::is_forced),
                            });
                        }
                        match contexts
                            .get_mut(event.context)
                            .and_then(|state| state.apply_front(now))
                        {
                            Ok(Some(commit)) => {
                                summary.commit_applied();
                                tracer.commit_applied(event);
                                applied.push(commit);
                            }
                            Ok(None) => {}
                            Err(error) => rejected.push((event.context, error)),
                        }
                    }
                }
            }
        }
        let held: usize = contexts.iter().map(|(_, s)| s.staged().len()).sum();
        summary.set_commits_held(count(held));
        phase_end(tracer, &mut summary, frame_index, PhaseKind::Apply, now);

        // -- Sample --
        phase_begin(tracer, &mut summary, frame_index, PhaseKind::Sample, now);
        let mut running = 0;
        let mut changed = BTreeSet::new();
        for (context, state) in contexts.iter_mut() {
            running += state.sample(now);
            state.evaluate_into(&mut self.changes);
            #[cfg(feature = "trace-rich")]
            if !self.changes.is_empty() {
                tracer.node_changes(frame_index, &node_changes(context, &self.changes));
            }
            if self.presented.get(&context) != Some(&state.revision()) {
                changed.insert(context);
            }
        }
        summary.set_animations_running(count(running));
        phase_end(tracer, &mut summary, frame_index, PhaseKind::Sample, now);

        // -- Paint --
        phase_begin(tracer, &mut summary, frame_index, PhaseKind::Paint, now);
        let mut plan = RenderPlan::new(tick.display);
        plan.frame_index = frame_index;
        plan.timestamp = now;
        let mut painter = Painter {
            contexts,
            max_depth: self.config.max_host_depth,
            stack: Vec::new(),
            items: Vec::new(),
            touched: Vec::new(),
        };
        let mut bounds = BTreeMap::new();
        let mut damage = DamageRegion::None;
        for placement in &placements {
            let scissor = placement.clips.then(|| placement.display_rect());
            painter.touched.clear();
            let first = painter.items.len();
            painter.paint(
                placement.context,
                placement.display_transform(),
                placement.opacity,
                scissor,
                0,
            );
            let painted = painter.items[first..]
                .iter()
                .fold(placement.display_rect(), |acc, item| {
                    acc.union(item.frame)
                });
            if painter.touched.iter().any(|c| changed.contains(c)) {
                damage.add_rect(painted);
                if let Some(prev) = self.last_bounds.get(&placement.context) {
                    damage.add_rect(*prev);
                }
            }
            bounds.insert(placement.context, painted);
        }
        plan.items = painter.items;
        let full = !self.has_presented || self.last_placements != placements;
        plan.damage = if full { DamageRegion::Full } else { damage };
        summary.set_items_painted(count(plan.items.len()));
        summary.set_damage(plan.damage.summary());
        phase_end(tracer, &mut summary, frame_index, PhaseKind::Paint, now);

        // -- Output --
        phase_begin(tracer, &mut summary, frame_index, PhaseKind::Output, now);
        #[cfg(feature = "trace-rich")]
        if let DamageRegion::Rects(rects) = &plan.damage {
            tracer.damage_rects(frame_index, &damage_rects(rects));
        }
        output.present(&plan);
        phase_end(tracer, &mut summary, frame_index, PhaseKind::Output, now);

        let contexts = &*contexts;
        let collected = fences.collect(|f| contexts.gates_fence(f) || pinned(f));

        self.last_placements = placements;
        self.last_bounds = bounds;
        self.presented = contexts.iter().map(|(id, s)| (id, s.revision())).collect();
        self.has_presented = true;

        let summary = summary.finish();
        tracer.frame_summary(&summary);
        PassReport {
            applied,
            forced: core::mem::take(&mut self.forced),
            cleared: cleared.into_iter().collect(),
            collected,
            rejected,
            dropped,
            summary,
        }
    }

    /// Runs both halves of a pass with nothing pinned.
    pub fn run(
        &mut self,
        tick: &FrameTick,
        contexts: &mut ContextTable,
        fences: &mut FenceTable,
        placements: &[ContextPlacement],
        output: &mut dyn OutputStage,
        tracer: &mut Tracer<'_>,
    ) -> PassReport {
        self.begin(tick, contexts, fences, tracer);
        self.compose(tick, contexts, fences, placements, &|_| false, output, tracer)
    }
}

/// Walks context render trees into render items.
struct Painter<'a> {
    contexts: &'a ContextTable,
    max_depth: u8,
    stack: Vec<ContextId>,
    items: Vec<RenderItem>,
    touched: Vec<ContextId>,
}

impl Painter<'_> {
    fn paint(
        &mut self,
        context: ContextId,
        base: Transform3d,
        opacity: f32,
        scissor: Option<Rect>,
        depth: u8,
    ) {
        let Ok(state) = self.contexts.get(context) else {
            return;
        };
        self.touched.push(context);
        self.stack.push(context);
        let store = state.render();
        let order = store.paint_order_under(ROOT_NODE).unwrap_or(&[]);
        let mask_sources: BTreeSet<u32> = order
            .iter()
            .filter_map(|&idx| store.mask_at(idx))
            .filter(|&mask| store.is_alive(mask))
            .map(NodeId::index)
            .collect();
        for &idx in order {
            if mask_sources.contains(&idx) || store.effective_hidden_at(idx) {
                continue;
            }
            let alpha = store.effective_opacity_at(idx) * opacity;
            if alpha <= 0.0 {
                continue;
            }
            let world = base * store.world_transform_at(idx);
            let kind = store.kind_at(idx);
            self.items.push(RenderItem {
                context,
                node: store.node_at(idx),
                kind,
                surface: store.backing_at(idx),
                transform: world.to_cols_f32(),
                frame: world.transform_rect_bbox(store.bounds_at(idx)),
                opacity: alpha,
                clip: store.clip_at(idx),
                mask: store.mask_at(idx).filter(|&mask| store.is_alive(mask)),
                scissor,
                host_depth: depth,
                blend_mode: BlendMode::SourceOver,
            });
            // Host cycles and runaway nesting are cut here.
            if let ContentKind::ContextHost(hosted) = kind
                && depth < self.max_depth
                && !self.stack.contains(&hosted)
            {
                self.paint(hosted, world, alpha, scissor, depth + 1);
            }
        }
        self.stack.pop();
    }
}

fn commit_event(frame_index: u64, commit: &lamina_core::commit::Commit) -> CommitEvent {
    CommitEvent {
        frame_index,
        context: commit.context,
        process: commit.process,
        transaction: commit.transaction,
        seq: commit.seq,
        fence: commit.fence,
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn phase_begin(
    tracer: &mut Tracer<'_>,
    summary: &mut FrameSummaryBuilder,
    frame_index: u64,
    phase: PhaseKind,
    timestamp: HostTime,
) {
    summary.phase_begin(phase, timestamp);
    tracer.phase_begin(&PhaseBeginEvent {
        frame_index,
        phase,
        timestamp,
    });
}

fn phase_end(
    tracer: &mut Tracer<'_>,
    summary: &mut FrameSummaryBuilder,
    frame_index: u64,
    phase: PhaseKind,
    timestamp: HostTime,
) {
    summary.phase_end(phase, timestamp);
    tracer.phase_end(&PhaseEndEvent {
        frame_index,
        phase,
        timestamp,
    });
}

#[cfg(feature = "trace-rich")]
fn node_changes(
    context: ContextId,
    changes: &FrameChanges,
) -> Vec<lamina_core::trace::NodeChange> {
    use lamina_core::trace::{NodeChange, NodeField};

    let lists: [(&[u32], NodeField); 5] = [
        (&changes.geometry, NodeField::Geometry),
        (&changes.opacities, NodeField::Opacity),
        (&changes.appearance, NodeField::Appearance),
        (&changes.content, NodeField::Content),
        (&changes.added, NodeField::Topology),
    ];
    lists
        .iter()
        .flat_map(|(indices, field)| {
            indices.iter().map(move |&node_index| NodeChange {
                context,
                node_index,
                field: *field,
            })
        })
        .collect()
}

#[cfg(feature = "trace-rich")]
#[expect(
    clippy::cast_possible_truncation,
    reason = "display coordinates fit in i32/u32"
)]
fn damage_rects(rects: &[Rect]) -> Vec<lamina_core::trace::DamageRect> {
    rects
        .iter()
        .map(|r| {
            let r = r.expand();
            lamina_core::trace::DamageRect {
                x: r.x0 as i32,
                y: r.y0 as i32,
                width: r.width() as u32,
                height: r.height() as u32,
            }
        })
        .collect()
}
