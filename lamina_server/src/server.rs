// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The server store.
//!
//! [`Server`] is the single writer for every piece of cross-process state:
//! contexts, fences, scenes, display layouts, synchronized groups and focus.
//! Client requests are executed one at a time, either directly through the
//! typed methods or queued through a [`ServerHandle`] and drained by
//! [`Server::pump`]. [`Server::tick`] runs one compositor pass per display
//! refresh and never waits on a client.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{self, Receiver, Sender};

use kurbo::Rect;
use lamina_core::commit::Commit;
use lamina_core::context::ContextTable;
use lamina_core::display::DisplayId;
use lamina_core::error::{Error, Result};
use lamina_core::fence::FenceTable;
use lamina_core::handle::{ContextId, FenceId, GroupId, ProcessId, SceneId, TransactionId};
use lamina_core::time::HostTime;
use lamina_core::timing::FrameTick;
use lamina_core::trace::{CommitEvent, Tracer};
use lamina_core::transform::Transform3d;
use lamina_render::{Compositor, ContextPlacement, OutputStage, PassReport};

use crate::config::ServerConfig;
use crate::group::{GroupOp, GroupTable};
use crate::input::{self, FocusCategory, FocusRegister, InputEvent, RouteTarget};
use crate::layout::DisplayLayout;
use crate::manager::SceneManager;
use crate::message::{Envelope, Notification, Reply, Request, ServerHandle};
use crate::scene::{
    ClientSettings, ClientSettingsDiff, Orientation, SceneDefinition, ServerSettingsDiff,
    SettingsOutcome,
};

/// Completion bookkeeping for one transaction that asked to be notified.
#[derive(Clone, Debug, Default)]
struct PendingCompletion {
    parts: u32,
    applied: u32,
    /// Contexts with a submitted but unapplied part.
    outstanding: BTreeSet<ContextId>,
    /// Contexts where a part was applied.
    landed: BTreeSet<ContextId>,
}

/// The compositing server.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    contexts: ContextTable,
    fences: FenceTable,
    scenes: SceneManager,
    layouts: BTreeMap<DisplayId, DisplayLayout>,
    compositors: BTreeMap<DisplayId, Compositor>,
    groups: GroupTable,
    focus: FocusRegister,
    connections: BTreeSet<ProcessId>,
    unreachable: BTreeSet<ProcessId>,
    notifications: BTreeMap<ProcessId, Vec<Notification>>,
    completions: BTreeMap<(ProcessId, TransactionId), PendingCompletion>,
    staged_events: Vec<CommitEvent>,
    inbox: Receiver<Envelope>,
    sender: Sender<Envelope>,
    now: HostTime,
}

impl Server {
    /// Starts a server with empty tables.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let (sender, inbox) = mpsc::channel();
        Self {
            scenes: SceneManager::new(config.policy.clone()),
            config,
            contexts: ContextTable::new(),
            fences: FenceTable::new(),
            layouts: BTreeMap::new(),
            compositors: BTreeMap::new(),
            groups: GroupTable::new(),
            focus: FocusRegister::new(),
            connections: BTreeSet::new(),
            unreachable: BTreeSet::new(),
            notifications: BTreeMap::new(),
            completions: BTreeMap::new(),
            staged_events: Vec::new(),
            inbox,
            sender,
            now: HostTime::default(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Live rendering contexts.
    #[must_use]
    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// Live fences.
    #[must_use]
    pub fn fences(&self) -> &FenceTable {
        &self.fences
    }

    /// Live scenes.
    #[must_use]
    pub fn scenes(&self) -> &SceneManager {
        &self.scenes
    }

    /// Synchronized groups in flight.
    #[must_use]
    pub fn groups(&self) -> &GroupTable {
        &self.groups
    }

    /// The focus register.
    #[must_use]
    pub fn focus(&self) -> &FocusRegister {
        &self.focus
    }

    /// The layout of `display`, if anything was ever placed there.
    #[must_use]
    pub fn layout(&self, display: DisplayId) -> Option<&DisplayLayout> {
        self.layouts.get(&display)
    }

    /// Time of the most recent tick.
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.now
    }

    /// Whether `process` has an authenticated channel.
    #[must_use]
    pub fn is_connected(&self, process: ProcessId) -> bool {
        process == ProcessId::SERVER || self.connections.contains(&process)
    }

    fn authenticate(&self, process: ProcessId) -> Result<()> {
        if self.is_connected(process) {
            Ok(())
        } else {
            Err(Error::PermissionDenied)
        }
    }

    fn notify(&mut self, process: ProcessId, notification: Notification) {
        if process != ProcessId::SERVER {
            self.notifications
                .entry(process)
                .or_default()
                .push(notification);
        }
    }

    /// Drains the notifications queued for `process`.
    pub fn take_notifications(&mut self, process: ProcessId) -> Vec<Notification> {
        self.notifications.remove(&process).unwrap_or_default()
    }

    // -- Connections --

    /// Registers an authenticated channel for `process`.
    pub fn connect(&mut self, process: ProcessId) {
        if self.connections.insert(process) {
            tracing::info!(?process, "client connected");
        }
        self.unreachable.remove(&process);
    }

    /// Returns a queue handle that speaks for `process`.
    #[must_use]
    pub fn handle(&self, process: ProcessId) -> ServerHandle {
        ServerHandle::new(process, self.sender.clone())
    }

    /// Marks a process as temporarily unable to receive input.
    pub fn mark_unreachable(&mut self, process: ProcessId) {
        self.unreachable.insert(process);
    }

    /// Clears an earlier [`mark_unreachable`](Self::mark_unreachable).
    pub fn mark_reachable(&mut self, process: ProcessId) {
        self.unreachable.remove(&process);
    }

    // -- Contexts --

    /// Allocates a context owned by `process`.
    pub fn create_context(&mut self, process: ProcessId) -> Result<ContextId> {
        self.authenticate(process)?;
        let context = self.contexts.create(process);
        tracing::debug!(?process, ?context, "context created");
        Ok(context)
    }

    /// Destroys a context. Only the owner (or the server) may do this.
    ///
    /// The context is unbound from its scene, loses any focus it held and
    /// stops counting towards pending completions. Transactions with a part
    /// still staged on it can never land whole, so they are dropped from
    /// every other context too.
    pub fn destroy_context(&mut self, process: ProcessId, context: ContextId) -> Result<()> {
        self.authenticate(process)?;
        let owner = self.contexts.owner(context)?;
        if process != owner && process != ProcessId::SERVER {
            return Err(Error::NotOwner);
        }
        let doomed = self
            .contexts
            .get(context)?
            .staged()
            .iter()
            .filter(|s| s.commit.parts > 1)
            .map(|s| (s.commit.process, s.commit.transaction))
            .collect();
        let dropped = self.contexts.discard_transactions(doomed);
        self.contexts.destroy(context)?;
        self.drop_commits(dropped);
        if let Some(scene) = self.scenes.unbind_context(context)
            && let Ok(scene_owner) = self.scenes.get(scene).map(|s| s.owner())
        {
            if scene_owner != owner {
                self.notify(scene_owner, Notification::ContextDestroyed { context });
            }
            if process != owner {
                self.notify(owner, Notification::ContextUnbound { scene, context });
            }
        }
        for category in self.focus.clear_context(context) {
            tracing::debug!(?context, ?category, "focus cleared with context");
        }
        for pending in self.completions.values_mut() {
            if pending.outstanding.remove(&context) {
                pending.applied += 1;
            }
        }
        tracing::debug!(?owner, ?context, "context destroyed");
        Ok(())
    }

    /// Stages a commit on its context.
    ///
    /// The sender must be connected and own the context; the sequence number
    /// must advance past every commit already submitted for the context.
    pub fn submit(&mut self, commit: Commit) -> Result<()> {
        self.authenticate(commit.process)?;
        let key = (commit.process, commit.transaction);
        let context = commit.context;
        let parts = commit.parts;
        let notify = commit.notify_completion;
        let event = CommitEvent {
            frame_index: 0,
            context,
            process: commit.process,
            transaction: commit.transaction,
            seq: commit.seq,
            fence: commit.fence,
        };
        self.contexts.submit(commit)?;
        if notify {
            let pending = self.completions.entry(key).or_default();
            pending.parts = parts;
            pending.outstanding.insert(context);
        }
        self.staged_events.push(event);
        Ok(())
    }

    // -- Fences --

    /// Allocates a fence.
    pub fn create_fence(&mut self, process: ProcessId) -> Result<FenceId> {
        self.authenticate(process)?;
        Ok(self.fences.create())
    }

    /// Takes one reference on `fence` for `process`.
    pub fn acquire_fence(&mut self, process: ProcessId, fence: FenceId) -> Result<()> {
        self.authenticate(process)?;
        self.fences.acquire(fence, process)
    }

    /// Drops one reference `process` holds. Returns whether the fence
    /// cleared.
    pub fn release_fence(&mut self, process: ProcessId, fence: FenceId) -> Result<bool> {
        self.authenticate(process)?;
        self.fences.release(fence, process)
    }

    /// Clears `fence` regardless of references.
    pub fn trigger_fence(&mut self, process: ProcessId, fence: FenceId) -> Result<bool> {
        self.authenticate(process)?;
        self.fences.trigger(fence)
    }

    /// Whether `fence` has cleared.
    pub fn fence_is_cleared(&self, fence: FenceId) -> Result<bool> {
        self.fences.is_cleared(fence)
    }

    // -- Scenes --

    fn check_scene_owner(&self, process: ProcessId, scene: SceneId) -> Result<()> {
        let owner = self.scenes.get(scene)?.owner();
        if process == owner || process == ProcessId::SERVER {
            Ok(())
        } else {
            Err(Error::PermissionDenied)
        }
    }

    /// Creates a scene for a connected client.
    pub fn create_scene(
        &mut self,
        process: ProcessId,
        definition: SceneDefinition,
        initial: ClientSettings,
    ) -> Result<SceneId> {
        self.authenticate(process)?;
        let identifier = definition.identifier.clone();
        match self.scenes.create_scene(process, definition, initial) {
            Ok(scene) => {
                tracing::info!(?process, ?scene, %identifier, "scene created");
                Ok(scene)
            }
            Err(error) => {
                tracing::warn!(?process, %identifier, %error, "scene creation refused");
                Err(error)
            }
        }
    }

    /// Destroys a scene. Only its owner (or the server) may do this.
    ///
    /// The scene leaves every display layout and host scene, and its bound
    /// contexts are unbound. Affected owners are notified.
    pub fn destroy_scene(&mut self, process: ProcessId, scene: SceneId) -> Result<()> {
        self.authenticate(process)?;
        self.check_scene_owner(process, scene)?;
        let teardown = self.scenes.destroy_scene(scene)?;
        for layout in self.layouts.values_mut() {
            layout.remove(scene);
        }
        if let Some(owner) = teardown.owner
            && owner != process
        {
            self.notify(owner, Notification::SceneDestroyed { scene });
        }
        for context in teardown.unbound {
            if let Ok(owner) = self.contexts.owner(context) {
                self.notify(owner, Notification::ContextUnbound { scene, context });
            }
        }
        for (host, host_owner) in teardown.hosts {
            self.notify(
                host_owner,
                Notification::EmbeddedSceneRemoved {
                    host,
                    embedded: scene,
                },
            );
        }
        tracing::info!(?process, ?scene, "scene destroyed");
        Ok(())
    }

    /// Binds a context owned by `process` into a scene owned by `process`.
    pub fn bind_context_layer(
        &mut self,
        process: ProcessId,
        scene: SceneId,
        context: ContextId,
        level: i32,
    ) -> Result<()> {
        self.authenticate(process)?;
        self.check_scene_owner(process, scene)?;
        let claimed = if process == ProcessId::SERVER {
            self.contexts.owner(context).map_err(|_| Error::InvalidContext)?
        } else {
            process
        };
        self.scenes
            .bind_context_layer(scene, context, claimed, level, &self.contexts)
    }

    /// Embeds `embedded` in `host`, which `process` must own.
    pub fn bind_external_layer(
        &mut self,
        process: ProcessId,
        host: SceneId,
        embedded: SceneId,
        level: i32,
    ) -> Result<()> {
        self.authenticate(process)?;
        self.check_scene_owner(process, host)?;
        let result = self.scenes.bind_external_layer(host, embedded, level);
        if let Err(Error::CyclicEmbedding) = result {
            tracing::warn!(?host, ?embedded, "embedding refused: cycle");
        }
        result
    }

    /// Validates a client settings proposal and applies what policy allows.
    pub fn propose_client_settings(
        &mut self,
        process: ProcessId,
        scene: SceneId,
        diff: &ClientSettingsDiff,
    ) -> Result<SettingsOutcome> {
        self.authenticate(process)?;
        self.check_scene_owner(process, scene)?;
        let outcome = self.scenes.propose_client_settings(scene, diff)?;
        if !outcome.denied.is_empty() {
            tracing::debug!(?scene, denied = ?outcome.denied, "settings partly denied");
        }
        if outcome.server_diff.level.is_some() {
            self.sync_layouts(scene);
        }
        Ok(outcome)
    }

    /// Applies a server-initiated settings change and notifies the owner.
    /// Returns the fields that actually changed.
    pub fn update_server_settings(
        &mut self,
        scene: SceneId,
        diff: &ServerSettingsDiff,
    ) -> Result<ServerSettingsDiff> {
        let effective = self.scenes.update_server_settings(scene, diff)?;
        if !effective.is_empty() {
            let s = self.scenes.get(scene)?;
            let (owner, version) = (s.owner(), s.server_settings().version);
            if effective.frame.is_some() || effective.level.is_some() {
                self.sync_layouts(scene);
            }
            self.notify(
                owner,
                Notification::ServerSettingsChanged {
                    scene,
                    diff: effective.clone(),
                    version,
                },
            );
        }
        Ok(effective)
    }

    /// Copies the scene's server frame and level into every layout it is
    /// placed in.
    fn sync_layouts(&mut self, scene: SceneId) {
        let Ok(s) = self.scenes.get(scene) else {
            return;
        };
        let settings = s.server_settings();
        for layout in self.layouts.values_mut() {
            layout.reframe(scene, settings.frame, settings.level);
        }
    }

    // -- Display layouts --

    /// Places a scene on a display. The scene's server frame and level
    /// follow the placement, and its owner is notified.
    pub fn place(
        &mut self,
        display: DisplayId,
        scene: SceneId,
        frame: Rect,
        level: i32,
        opacity: f32,
        transform: Transform3d,
    ) -> Result<()> {
        self.scenes.get(scene)?;
        self.layouts
            .entry(display)
            .or_insert_with(|| DisplayLayout::new(display))
            .place(scene, frame, level, opacity, transform);
        self.update_server_settings(
            scene,
            &ServerSettingsDiff {
                frame: Some(frame),
                level: Some(level),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// Takes a scene off a display. Returns whether it was placed there.
    pub fn remove_from_display(&mut self, display: DisplayId, scene: SceneId) -> bool {
        self.layouts
            .get_mut(&display)
            .is_some_and(|layout| layout.remove(scene))
    }

    /// Rotates a display. Every scene placed on it receives the new
    /// orientation.
    pub fn set_display_orientation(&mut self, display: DisplayId, orientation: Orientation) {
        let layout = self
            .layouts
            .entry(display)
            .or_insert_with(|| DisplayLayout::new(display));
        layout.set_orientation(orientation);
        let placed: Vec<SceneId> = layout.paint_order().iter().map(|e| e.scene).collect();
        let diff = ServerSettingsDiff {
            orientation: Some(orientation),
            ..Default::default()
        };
        for scene in placed {
            if let Err(error) = self.update_server_settings(scene, &diff) {
                tracing::debug!(?display, ?scene, %error, "orientation update skipped");
            }
        }
    }

    /// Resolves a display's layout into back-to-front placements.
    #[must_use]
    pub fn placements(&self, display: DisplayId) -> Vec<ContextPlacement> {
        self.layouts
            .get(&display)
            .map(|layout| {
                layout.resolve(&self.scenes, self.config.compositor.max_host_depth)
            })
            .unwrap_or_default()
    }

    // -- Synchronized groups --

    /// Starts a synchronized group and returns its shared fence.
    ///
    /// Participants gate their final commits on the fence. Every scene
    /// named by a settings op must exist.
    pub fn begin_group(&mut self, ops: Vec<GroupOp>) -> Result<(GroupId, FenceId)> {
        for op in &ops {
            if let GroupOp::SceneSettings { scene, .. } = op {
                self.scenes.get(*scene)?;
            }
        }
        let count = ops.len();
        let (group, fence) = self.groups.begin(ops, &mut self.fences, self.now)?;
        tracing::info!(?group, ?fence, ops = count, "group started");
        Ok((group, fence))
    }

    /// Marks one sub-operation of a group ready.
    pub fn report_ready(&mut self, process: ProcessId, group: GroupId, index: usize) -> Result<()> {
        self.authenticate(process)?;
        self.groups.report_ready(group, index, &mut self.fences)?;
        tracing::debug!(?process, ?group, index, "group op ready");
        Ok(())
    }

    /// Unwinds a group: commits held on its fence are dropped, staged
    /// settings are discarded and the fence is cleared. Participants are
    /// notified.
    pub fn fail_group(&mut self, group: GroupId) -> Result<()> {
        let g = self.groups.remove(group)?;
        let dropped = self.contexts.discard_gated(g.fence());
        let dropped = self.drop_commits(dropped);
        if self.fences.contains(g.fence()) {
            self.fences.trigger(g.fence())?;
        }
        let mut participants = BTreeSet::new();
        for op in g.ops() {
            match op {
                GroupOp::Launch { process } => {
                    participants.insert(*process);
                }
                GroupOp::SceneSettings { scene, .. } => {
                    if let Ok(s) = self.scenes.get(*scene) {
                        participants.insert(s.owner());
                    }
                }
            }
        }
        for process in participants {
            self.notify(process, Notification::GroupFailed { group });
        }
        tracing::warn!(?group, dropped, "group failed");
        Ok(())
    }

    /// Forgets completion tracking for commits discarded unapplied and tells
    /// each surviving context's owner what to roll its model back to.
    /// Returns how many commits were dropped.
    fn drop_commits(&mut self, dropped: Vec<Commit>) -> usize {
        let count = dropped.len();
        let mut by_context: BTreeMap<ContextId, Vec<TransactionId>> = BTreeMap::new();
        for commit in dropped {
            self.completions
                .remove(&(commit.process, commit.transaction));
            by_context
                .entry(commit.context)
                .or_default()
                .push(commit.transaction);
        }
        for (context, transactions) in by_context {
            let Ok(state) = self.contexts.get(context) else {
                continue;
            };
            let owner = state.owner();
            let snapshot = state.snapshot();
            tracing::debug!(?context, dropped = transactions.len(), "staged commits dropped");
            self.notify(
                owner,
                Notification::CommitsDropped {
                    context,
                    transactions,
                    snapshot,
                },
            );
        }
        count
    }

    /// Force-clears groups that outlived the fence timeout, then applies the
    /// staged settings of every group whose fence is open.
    fn resolve_groups(&mut self, now: HostTime) {
        let timeout = self.config.compositor.fence_timeout;
        if now.ticks() >= timeout.ticks() {
            let deadline = HostTime(now.ticks() - timeout.ticks());
            for group in self.groups.overdue(deadline, &self.fences) {
                if let Ok(g) = self.groups.get(group)
                    && let Ok(true) = self.fences.force_clear(g.fence())
                {
                    tracing::warn!(?group, "group timed out; forcing");
                }
            }
        }
        for (group, g) in self.groups.take_completed(&self.fences) {
            for op in g.ops() {
                if let GroupOp::SceneSettings { scene, diff } = op
                    && let Err(error) = self.update_server_settings(*scene, diff)
                {
                    tracing::debug!(?group, ?scene, %error, "group settings skipped");
                }
            }
            tracing::info!(?group, "group completed");
        }
    }

    // -- Input --

    /// Gives a focus category to a context. The server may focus any
    /// context; a client only its own. The previous holder's owner is
    /// notified. Returns the previous holder.
    pub fn set_focus(
        &mut self,
        process: ProcessId,
        category: FocusCategory,
        context: ContextId,
    ) -> Result<Option<ContextId>> {
        self.authenticate(process)?;
        let owner = self.contexts.owner(context)?;
        if process != owner && process != ProcessId::SERVER {
            return Err(Error::PermissionDenied);
        }
        let previous = self.focus.set(category, context);
        if let Some(prev) = previous
            && prev != context
            && let Ok(prev_owner) = self.contexts.owner(prev)
        {
            self.notify(
                prev_owner,
                Notification::FocusLost {
                    context: prev,
                    category,
                },
            );
        }
        Ok(previous)
    }

    /// Finds the receiver of a raw input event on the current layout.
    ///
    /// Fails with [`Error::TargetUnavailable`] if the receiver's owner is
    /// disconnected or marked unreachable.
    pub fn route(&self, event: &InputEvent) -> Result<Option<RouteTarget>> {
        let placements = self.placements(event.display);
        let mut unavailable = self.unreachable.clone();
        unavailable.extend(
            self.contexts
                .iter()
                .map(|(_, s)| s.owner())
                .filter(|p| !self.is_connected(*p)),
        );
        input::route(
            event,
            &placements,
            &self.contexts,
            &self.focus,
            &unavailable,
            self.config.compositor.max_host_depth,
        )
    }

    // -- Process lifecycle --

    /// Sweeps everything a dead process owned or held.
    ///
    /// Its contexts and scenes are destroyed, its fence references are
    /// released, groups it was launching fail, and its channel is closed.
    pub fn process_died(&mut self, process: ProcessId) {
        let contexts = self.contexts.owned_by(process);
        for &context in &contexts {
            let _ = self.destroy_context(ProcessId::SERVER, context);
        }
        let scenes = self.scenes.owned_by(process);
        for &scene in &scenes {
            let _ = self.destroy_scene(ProcessId::SERVER, scene);
        }
        let cleared = self.fences.release_all(process);
        for group in self.groups.launched_by(process) {
            let _ = self.fail_group(group);
        }
        self.completions.retain(|(p, _), _| *p != process);
        self.notifications.remove(&process);
        self.connections.remove(&process);
        self.unreachable.remove(&process);
        tracing::warn!(
            ?process,
            contexts = contexts.len(),
            scenes = scenes.len(),
            fences_cleared = cleared.len(),
            "process died; swept"
        );
    }

    // -- Request queue --

    /// Executes every queued request in arrival order. Returns how many ran.
    pub fn pump(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(envelope) = self.inbox.try_recv() {
            let result = self.execute(envelope.process, envelope.request);
            match envelope.reply {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => {
                    if let Err(error) = result {
                        tracing::debug!(process = ?envelope.process, %error, "request failed");
                    }
                }
            }
            ran += 1;
        }
        ran
    }

    /// Executes one request on behalf of `process`.
    pub fn execute(&mut self, process: ProcessId, request: Request) -> Result<Reply> {
        match request {
            Request::Connect => {
                self.connect(process);
                Ok(Reply::Done)
            }
            Request::CreateContext => self.create_context(process).map(Reply::Context),
            Request::DestroyContext { context } => {
                self.destroy_context(process, context).map(|()| Reply::Done)
            }
            Request::Commit(commit) => {
                if commit.process != process {
                    return Err(Error::NotOwner);
                }
                self.submit(commit).map(|()| Reply::Done)
            }
            Request::CreateFence => self.create_fence(process).map(Reply::Fence),
            Request::AcquireFence { fence } => {
                self.acquire_fence(process, fence).map(|()| Reply::Done)
            }
            Request::ReleaseFence { fence } => {
                self.release_fence(process, fence).map(Reply::Released)
            }
            Request::TriggerFence { fence } => {
                self.trigger_fence(process, fence).map(|_| Reply::Done)
            }
            Request::CreateScene {
                definition,
                initial,
            } => self
                .create_scene(process, definition, initial)
                .map(Reply::Scene),
            Request::DestroyScene { scene } => {
                self.destroy_scene(process, scene).map(|()| Reply::Done)
            }
            Request::BindContextLayer {
                scene,
                context,
                level,
            } => self
                .bind_context_layer(process, scene, context, level)
                .map(|()| Reply::Done),
            Request::BindExternalLayer {
                host,
                embedded,
                level,
            } => self
                .bind_external_layer(process, host, embedded, level)
                .map(|()| Reply::Done),
            Request::ProposeSettings { scene, diff } => self
                .propose_client_settings(process, scene, &diff)
                .map(Reply::Settings),
            Request::SetFocus { category, context } => self
                .set_focus(process, category, context)
                .map(Reply::Focus),
            Request::ReportReady { group, index } => {
                self.report_ready(process, group, index).map(|()| Reply::Done)
            }
        }
    }

    // -- Frame loop --

    /// Runs one frame for the tick's display.
    ///
    /// Order within the tick: fence timeouts, group resolution (so group
    /// settings land with the commits their fence releases), layout
    /// resolution, then the compositor pass. Completion notifications are
    /// queued for transactions that finished in this frame.
    pub fn tick(
        &mut self,
        tick: &FrameTick,
        output: &mut dyn OutputStage,
        tracer: &mut Tracer<'_>,
    ) -> PassReport {
        self.now = tick.now;
        for mut event in self.staged_events.drain(..) {
            event.frame_index = tick.frame_index;
            tracer.commit_staged(&event);
        }

        let mut compositor = self
            .compositors
            .remove(&tick.display)
            .unwrap_or_else(|| Compositor::new(self.config.compositor));

        for &fence in compositor.begin(tick, &mut self.contexts, &mut self.fences, tracer) {
            tracing::warn!(?fence, frame = tick.frame_index, error = %Error::FenceTimeout, "fence force-cleared");
        }
        self.resolve_groups(tick.now);

        let placements = self.placements(tick.display);
        let groups = &self.groups;
        let report = compositor.compose(
            tick,
            &mut self.contexts,
            &mut self.fences,
            &placements,
            &|fence| groups.uses_fence(fence),
            output,
            tracer,
        );
        self.compositors.insert(tick.display, compositor);

        for (context, error) in &report.rejected {
            tracing::warn!(?context, %error, "commit rejected during apply");
        }
        self.drop_commits(report.dropped.clone());
        self.track_completions(&report);
        report
    }

    fn track_completions(&mut self, report: &PassReport) {
        for applied in report.applied.iter().filter(|a| a.notify_completion) {
            if let Some(pending) = self
                .completions
                .get_mut(&(applied.process, applied.transaction))
                && pending.outstanding.remove(&applied.context)
            {
                pending.applied += 1;
                pending.landed.insert(applied.context);
            }
        }
        let contexts = &self.contexts;
        let done: Vec<(ProcessId, TransactionId)> = self
            .completions
            .iter()
            .filter(|((_, transaction), pending)| {
                pending.applied >= pending.parts
                    && pending.outstanding.is_empty()
                    && !pending.landed.iter().any(|c| {
                        contexts
                            .get(*c)
                            .is_ok_and(|state| state.is_animating(*transaction))
                    })
            })
            .map(|(key, _)| *key)
            .collect();
        for (process, transaction) in done {
            self.completions.remove(&(process, transaction));
            self.notify(process, Notification::TransactionCompleted { transaction });
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
