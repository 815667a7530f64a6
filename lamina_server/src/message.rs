// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plain-data messages between client processes and the server.
//!
//! Clients never hold references into server state. They send [`Request`]s
//! through a [`ServerHandle`]; the server executes them in arrival order
//! during [`Server::pump`](crate::Server::pump) and answers on an optional
//! reply channel. Asynchronous changes reach clients as [`Notification`]s.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use lamina_core::commit::{Commit, NodeOp};
use lamina_core::error::{Error, Result};
use lamina_core::handle::{ContextId, FenceId, GroupId, ProcessId, SceneId, TransactionId};

use crate::input::FocusCategory;
use crate::scene::{
    ClientSettings, ClientSettingsDiff, SceneDefinition, ServerSettingsDiff, SettingsOutcome,
};

/// A request from a client process.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// Registers the sender as an authenticated client.
    Connect,
    /// Allocates a rendering context with an empty tree.
    CreateContext,
    /// Releases a rendering context.
    DestroyContext {
        /// Context to destroy.
        context: ContextId,
    },
    /// Stages one context's slice of a committed transaction.
    Commit(Commit),
    /// Allocates a fence.
    CreateFence,
    /// Takes a reference on a fence.
    AcquireFence {
        /// Target fence.
        fence: FenceId,
    },
    /// Drops a reference on a fence.
    ReleaseFence {
        /// Target fence.
        fence: FenceId,
    },
    /// Clears a fence regardless of references.
    TriggerFence {
        /// Target fence.
        fence: FenceId,
    },
    /// Creates a scene.
    CreateScene {
        /// How the scene is created.
        definition: SceneDefinition,
        /// Initial client settings.
        initial: ClientSettings,
    },
    /// Destroys a scene.
    DestroyScene {
        /// Target scene.
        scene: SceneId,
    },
    /// Binds a context as a member layer of a scene.
    BindContextLayer {
        /// Target scene.
        scene: SceneId,
        /// Context to bind.
        context: ContextId,
        /// Level among the scene's layers.
        level: i32,
    },
    /// Embeds one scene in another.
    BindExternalLayer {
        /// Host scene.
        host: SceneId,
        /// Embedded scene.
        embedded: SceneId,
        /// Level among the host's layers.
        level: i32,
    },
    /// Proposes new client settings.
    ProposeSettings {
        /// Target scene.
        scene: SceneId,
        /// Proposed change.
        diff: ClientSettingsDiff,
    },
    /// Moves a focus category to a context.
    SetFocus {
        /// Focus category.
        category: FocusCategory,
        /// New holder.
        context: ContextId,
    },
    /// Marks one sub-operation of a synchronized group ready.
    ReportReady {
        /// Target group.
        group: GroupId,
        /// Sub-operation index.
        index: usize,
    },
}

/// A successful answer to a [`Request`].
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// The request had no result value.
    Done,
    /// A new context.
    Context(ContextId),
    /// A new fence.
    Fence(FenceId),
    /// Whether a release cleared its fence.
    Released(bool),
    /// A new scene.
    Scene(SceneId),
    /// The result of a settings proposal.
    Settings(SettingsOutcome),
    /// The previous holder of a focus category.
    Focus(Option<ContextId>),
}

/// Something that happened to a client's objects without it asking.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// Every commit of the transaction was applied and its animations
    /// finished.
    TransactionCompleted {
        /// The finished transaction.
        transaction: TransactionId,
    },
    /// The server changed a scene's settings.
    ServerSettingsChanged {
        /// Target scene.
        scene: SceneId,
        /// Fields that changed.
        diff: ServerSettingsDiff,
        /// Server settings version after the change.
        version: u64,
    },
    /// A scene owned by the client was destroyed by someone else.
    SceneDestroyed {
        /// The scene.
        scene: SceneId,
    },
    /// A context owned by the client lost its scene binding.
    ContextUnbound {
        /// The scene it was bound to.
        scene: SceneId,
        /// The context.
        context: ContextId,
    },
    /// A context bound to the client's scene was destroyed.
    ContextDestroyed {
        /// The context.
        context: ContextId,
    },
    /// A scene embedded in the client's scene was destroyed.
    EmbeddedSceneRemoved {
        /// The host scene.
        host: SceneId,
        /// The removed scene.
        embedded: SceneId,
    },
    /// A context owned by the client lost a focus category.
    FocusLost {
        /// The context.
        context: ContextId,
        /// The category.
        category: FocusCategory,
    },
    /// A synchronized group the client took part in was unwound.
    GroupFailed {
        /// The group.
        group: GroupId,
    },
    /// Staged commits on one of the client's contexts were discarded
    /// unapplied. The client should roll its model back to `snapshot`.
    CommitsDropped {
        /// The context.
        context: ContextId,
        /// Transactions that lost their commit here, oldest first.
        transactions: Vec<TransactionId>,
        /// Ops that rebuild the model the server will hold once every
        /// surviving staged commit has landed.
        snapshot: Vec<NodeOp>,
    },
}

/// A request in flight.
#[derive(Debug)]
pub struct Envelope {
    /// Sending process.
    pub process: ProcessId,
    /// The request.
    pub request: Request,
    /// Where to send the answer, if anyone is waiting.
    pub reply: Option<Sender<Result<Reply>>>,
}

/// Errors from talking to the server through a [`ServerHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// The server, or the reply channel, is gone.
    #[error("server is no longer running")]
    Disconnected,
    /// The server rejected the request.
    #[error(transparent)]
    Core(#[from] Error),
}

/// A client process's connection to the server's request queue.
#[derive(Clone, Debug)]
pub struct ServerHandle {
    process: ProcessId,
    sender: Sender<Envelope>,
}

impl ServerHandle {
    pub(crate) fn new(process: ProcessId, sender: Sender<Envelope>) -> Self {
        Self { process, sender }
    }

    /// The process this handle speaks for.
    #[must_use]
    pub fn process(&self) -> ProcessId {
        self.process
    }

    /// Queues a request without waiting for an answer. Failures are logged
    /// by the server.
    pub fn send(&self, request: Request) -> Result<(), HandleError> {
        self.sender
            .send(Envelope {
                process: self.process,
                request,
                reply: None,
            })
            .map_err(|_| HandleError::Disconnected)
    }

    /// Queues a request and returns a slot for its answer.
    pub fn request(&self, request: Request) -> Result<PendingReply, HandleError> {
        let (reply, receiver) = mpsc::channel();
        self.sender
            .send(Envelope {
                process: self.process,
                request,
                reply: Some(reply),
            })
            .map_err(|_| HandleError::Disconnected)?;
        Ok(PendingReply { receiver })
    }
}

/// The answer to a queued request, once the server has pumped it.
#[derive(Debug)]
pub struct PendingReply {
    receiver: Receiver<Result<Reply>>,
}

impl PendingReply {
    /// Returns the answer if the server has produced it.
    pub fn try_take(&self) -> Option<Result<Reply, HandleError>> {
        match self.receiver.try_recv() {
            Ok(reply) => Some(reply.map_err(HandleError::from)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(HandleError::Disconnected)),
        }
    }

    /// Blocks until the server answers.
    pub fn wait(self) -> Result<Reply, HandleError> {
        self.receiver
            .recv()
            .map_err(|_| HandleError::Disconnected)?
            .map_err(HandleError::from)
    }
}
