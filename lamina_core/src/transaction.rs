// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Client-side transaction engine.
//!
//! A [`Client`] is one process's half of the protocol. It owns the *model*
//! trees of the contexts it attached and batches every change to them into
//! transactions.
//!
//! Changes apply to the model at once and are recorded with enough
//! information to undo them, so [`Client::discard`] restores the model with
//! no external effect. [`Client::commit`] turns a transaction into one
//! [`Commit`] per touched context and queues them for the server.
//!
//! # Implicit transactions
//!
//! [`Client::set`] and [`Client::current_transaction`] use the innermost
//! open explicit transaction, or else lazily open the *implicit* one. The
//! host event loop calls [`Client::end_tick`] once per iteration, which
//! commits the implicit transaction unless [`Client::defer_implicit_commit`]
//! was called during that tick.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::fmt;

use crate::animation::AnimationSpec;
use crate::commit::{Commit, NodeOp};
use crate::error::{Error, Result};
use crate::handle::{Arena, ContextId, FenceId, ProcessId, TransactionId};
use crate::node::{ContentKind, NodeId, NodeStore, Property, PropertyValue, ROOT_NODE};

/// A node qualified by the context whose tree it lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle {
    /// Owning context.
    pub context: ContextId,
    /// Node within that context's tree.
    pub node: NodeId,
}

/// Runs when every commit of a transaction has been applied and its
/// animations have finished.
pub type CompletionCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug)]
struct ClientContext {
    model: NodeStore,
    next_seq: u64,
}

/// Everything needed to rebuild a destroyed node.
#[derive(Clone, Debug)]
struct NodeSnapshot {
    kind: ContentKind,
    values: Vec<PropertyValue>,
    parent: Option<NodeId>,
    next: Option<NodeId>,
}

#[derive(Clone, Debug)]
enum Recorded {
    Create {
        node: NodeId,
        kind: ContentKind,
    },
    Destroy {
        node: NodeId,
        snapshot: NodeSnapshot,
    },
    Set {
        node: NodeId,
        value: PropertyValue,
        prior: PropertyValue,
        animation: Option<AnimationSpec>,
    },
    AddChild {
        parent: NodeId,
        child: NodeId,
    },
    InsertBefore {
        child: NodeId,
        sibling: NodeId,
    },
    RemoveFromParent {
        child: NodeId,
        parent: NodeId,
        next: Option<NodeId>,
    },
}

impl Recorded {
    fn to_op(&self) -> NodeOp {
        match *self {
            Self::Create { node, kind } => NodeOp::Create { node, kind },
            Self::Destroy { node, .. } => NodeOp::Destroy { node },
            Self::Set {
                node,
                value,
                animation,
                ..
            } => NodeOp::Set {
                node,
                value,
                animation,
            },
            Self::AddChild { parent, child } => NodeOp::AddChild { parent, child },
            Self::InsertBefore { child, sibling } => NodeOp::InsertBefore { child, sibling },
            Self::RemoveFromParent { child, .. } => NodeOp::RemoveFromParent { child },
        }
    }

    fn undo(&self, model: &mut NodeStore) -> Result<()> {
        match self {
            Self::Create { node, .. } => model.destroy_node(*node),
            Self::Destroy { node, snapshot } => {
                model.create_node_at(*node, snapshot.kind)?;
                for value in &snapshot.values {
                    model.set(*node, *value)?;
                }
                reattach(model, *node, snapshot.parent, snapshot.next)
            }
            Self::Set { node, prior, .. } => model.set(*node, *prior).map(|_| ()),
            Self::AddChild { child, .. } | Self::InsertBefore { child, .. } => {
                model.remove_from_parent(*child)
            }
            Self::RemoveFromParent {
                child,
                parent,
                next,
            } => reattach(model, *child, Some(*parent), *next),
        }
    }
}

fn reattach(
    model: &mut NodeStore,
    node: NodeId,
    parent: Option<NodeId>,
    next: Option<NodeId>,
) -> Result<()> {
    match (parent, next) {
        (_, Some(next)) => model.insert_before(node, next),
        (Some(parent), None) => model.add_child(parent, node),
        (None, None) => Ok(()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Open,
    Committed,
}

#[derive(Debug)]
struct TransactionRecord {
    phase: Phase,
    contexts: BTreeSet<ContextId>,
    ops: Vec<(ContextId, Recorded)>,
    fence: Option<FenceId>,
    animation: Option<AnimationSpec>,
}

impl TransactionRecord {
    fn new() -> Self {
        Self {
            phase: Phase::Open,
            contexts: BTreeSet::new(),
            ops: Vec::new(),
            fence: None,
            animation: None,
        }
    }
}

/// One process's side of the compositing protocol.
pub struct Client {
    process: ProcessId,
    contexts: BTreeMap<ContextId, ClientContext>,
    transactions: Arena<TransactionRecord>,
    explicit_stack: Vec<TransactionId>,
    implicit: Option<TransactionId>,
    defer_implicit: bool,
    retiring: Vec<TransactionId>,
    outbox: Vec<Commit>,
    callbacks: BTreeMap<TransactionId, CompletionCallback>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("process", &self.process)
            .field("contexts", &self.contexts.len())
            .field("open_transactions", &self.transactions.len())
            .field("implicit", &self.implicit)
            .field("outbox", &self.outbox.len())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client for `process` with no contexts.
    #[must_use]
    pub fn new(process: ProcessId) -> Self {
        Self {
            process,
            contexts: BTreeMap::new(),
            transactions: Arena::new(),
            explicit_stack: Vec::new(),
            implicit: None,
            defer_implicit: false,
            retiring: Vec::new(),
            outbox: Vec::new(),
            callbacks: BTreeMap::new(),
        }
    }

    /// This client's process identity.
    #[must_use]
    pub fn process(&self) -> ProcessId {
        self.process
    }

    // -- Contexts --

    /// Starts tracking the model tree of a context the server created for
    /// this process. Returns the handle of the tree's root.
    ///
    /// Fails with [`Error::InvalidState`] if already attached.
    pub fn attach_context(&mut self, context: ContextId) -> Result<NodeHandle> {
        if self.contexts.contains_key(&context) {
            return Err(Error::InvalidState);
        }
        self.contexts.insert(
            context,
            ClientContext {
                model: NodeStore::with_root(),
                next_seq: 1,
            },
        );
        Ok(NodeHandle {
            context,
            node: ROOT_NODE,
        })
    }

    /// Stops tracking a context. Pending changes to it can no longer be
    /// committed.
    pub fn detach_context(&mut self, context: ContextId) -> Result<()> {
        self.contexts
            .remove(&context)
            .map(|_| ())
            .ok_or(Error::NotOwner)
    }

    /// Returns the root of an attached context.
    pub fn root(&self, context: ContextId) -> Result<NodeHandle> {
        self.model(context)?;
        Ok(NodeHandle {
            context,
            node: ROOT_NODE,
        })
    }

    /// Read access to a context's model tree.
    ///
    /// Fails with [`Error::NotOwner`] if the context is not attached here.
    pub fn model(&self, context: ContextId) -> Result<&NodeStore> {
        self.contexts
            .get(&context)
            .map(|c| &c.model)
            .ok_or(Error::NotOwner)
    }

    /// Reads one property from the model.
    pub fn get(&self, node: NodeHandle, property: Property) -> Result<PropertyValue> {
        self.model(node.context)?.get(node.node, property)
    }

    // -- Transaction scopes --

    /// Opens a transaction on `context`.
    ///
    /// An explicit transaction is a fresh scope pushed on the explicit
    /// stack. A non-explicit request joins the implicit transaction,
    /// opening it if needed.
    pub fn open_transaction(&mut self, context: ContextId, explicit: bool) -> Result<TransactionId> {
        self.model(context)?;
        let txn = if explicit {
            let txn = TransactionId(self.transactions.insert(TransactionRecord::new()));
            self.explicit_stack.push(txn);
            txn
        } else {
            self.implicit_transaction()
        };
        self.open_record(txn)?.contexts.insert(context);
        Ok(txn)
    }

    /// Returns the innermost explicit transaction, or the implicit one
    /// (opening it if needed).
    pub fn current_transaction(&mut self) -> TransactionId {
        match self.explicit_stack.last() {
            Some(&txn) => txn,
            None => self.implicit_transaction(),
        }
    }

    fn implicit_transaction(&mut self) -> TransactionId {
        match self.implicit {
            Some(txn) => txn,
            None => {
                let txn = TransactionId(self.transactions.insert(TransactionRecord::new()));
                self.implicit = Some(txn);
                txn
            }
        }
    }

    /// Whether `txn` is open (not yet committed or discarded).
    #[must_use]
    pub fn is_open(&self, txn: TransactionId) -> bool {
        self.transactions
            .get(txn.0)
            .is_ok_and(|r| r.phase == Phase::Open)
    }

    /// Keeps the implicit transaction open across the next
    /// [`end_tick`](Self::end_tick).
    pub fn defer_implicit_commit(&mut self) {
        self.defer_implicit = true;
    }

    /// End-of-tick hook for the host event loop.
    ///
    /// Retires transactions committed before this tick, then commits the
    /// implicit transaction unless deferred.
    pub fn end_tick(&mut self) -> Result<()> {
        for txn in self.retiring.drain(..) {
            let removed = self.transactions.remove(txn.0);
            debug_assert!(removed.is_ok(), "retiring transactions stay in the arena until now");
        }
        let deferred = core::mem::replace(&mut self.defer_implicit, false);
        match self.implicit {
            Some(txn) if !deferred => self.commit(txn),
            _ => Ok(()),
        }
    }

    // -- Per-transaction settings --

    /// Sets default animation parameters for later property writes in
    /// `txn`.
    pub fn set_animation(&mut self, txn: TransactionId, spec: AnimationSpec) -> Result<()> {
        self.open_record(txn)?.animation = Some(spec);
        Ok(())
    }

    /// Gates `txn` on `fence`.
    ///
    /// Fails with [`Error::InvalidState`] once the transaction has been
    /// committed.
    pub fn set_fence(&mut self, txn: TransactionId, fence: FenceId) -> Result<()> {
        self.open_record(txn)?.fence = Some(fence);
        Ok(())
    }

    /// Registers a callback for when `txn` has been fully presented.
    pub fn on_completion(&mut self, txn: TransactionId, callback: CompletionCallback) -> Result<()> {
        self.open_record(txn)?;
        self.callbacks.insert(txn, callback);
        Ok(())
    }

    // -- Mutations --

    /// Creates a detached node in `context`.
    pub fn create_node(
        &mut self,
        txn: TransactionId,
        context: ContextId,
        kind: ContentKind,
    ) -> Result<NodeHandle> {
        self.open_record(txn)?;
        let node = self.model_mut(context)?.create_node(kind);
        self.record(txn, context, Recorded::Create { node, kind });
        Ok(NodeHandle { context, node })
    }

    /// Destroys a childless node, detaching it first if needed.
    ///
    /// Fails with [`Error::InvalidState`] for a context root or a node with
    /// children.
    pub fn destroy_node(&mut self, txn: TransactionId, node: NodeHandle) -> Result<()> {
        self.open_record(txn)?;
        let model = self.model_mut(node.context)?;
        if node.node == ROOT_NODE {
            return Err(Error::InvalidState);
        }
        let values = Property::ALL
            .iter()
            .map(|p| model.get(node.node, *p))
            .collect::<Result<Vec<_>>>()?;
        let snapshot = NodeSnapshot {
            kind: model.kind(node.node)?,
            values,
            parent: model.parent(node.node)?,
            next: model.next_sibling(node.node)?,
        };
        model.destroy_node(node.node)?;
        self.record(
            txn,
            node.context,
            Recorded::Destroy {
                node: node.node,
                snapshot,
            },
        );
        Ok(())
    }

    /// Appends `child` to `parent`'s children.
    pub fn add_child(&mut self, txn: TransactionId, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        let context = same_context(parent, child)?;
        self.open_record(txn)?;
        self.model_mut(context)?.add_child(parent.node, child.node)?;
        self.record(
            txn,
            context,
            Recorded::AddChild {
                parent: parent.node,
                child: child.node,
            },
        );
        Ok(())
    }

    /// Inserts `child` directly behind `sibling`.
    pub fn insert_before(
        &mut self,
        txn: TransactionId,
        child: NodeHandle,
        sibling: NodeHandle,
    ) -> Result<()> {
        let context = same_context(child, sibling)?;
        self.open_record(txn)?;
        self.model_mut(context)?
            .insert_before(child.node, sibling.node)?;
        self.record(
            txn,
            context,
            Recorded::InsertBefore {
                child: child.node,
                sibling: sibling.node,
            },
        );
        Ok(())
    }

    /// Detaches `child` from its parent.
    pub fn remove_from_parent(&mut self, txn: TransactionId, child: NodeHandle) -> Result<()> {
        self.open_record(txn)?;
        let model = self.model_mut(child.context)?;
        let parent = model.parent(child.node)?.ok_or(Error::InvalidState)?;
        let next = model.next_sibling(child.node)?;
        model.remove_from_parent(child.node)?;
        self.record(
            txn,
            child.context,
            Recorded::RemoveFromParent {
                child: child.node,
                parent,
                next,
            },
        );
        Ok(())
    }

    /// Writes one property, animated with the transaction's defaults if it
    /// has any.
    pub fn mutate(&mut self, txn: TransactionId, node: NodeHandle, value: PropertyValue) -> Result<()> {
        let defaults = self.open_record(txn)?.animation;
        self.write(txn, node, value, defaults)
    }

    /// Writes one property with an explicit animation.
    pub fn mutate_animated(
        &mut self,
        txn: TransactionId,
        node: NodeHandle,
        value: PropertyValue,
        spec: AnimationSpec,
    ) -> Result<()> {
        self.write(txn, node, value, Some(spec))
    }

    /// Writes one property in the current transaction.
    pub fn set(&mut self, node: NodeHandle, value: PropertyValue) -> Result<()> {
        self.model(node.context)?;
        let txn = self.current_transaction();
        self.mutate(txn, node, value)
    }

    fn write(
        &mut self,
        txn: TransactionId,
        node: NodeHandle,
        value: PropertyValue,
        animation: Option<AnimationSpec>,
    ) -> Result<()> {
        self.open_record(txn)?;
        let prior = self.model_mut(node.context)?.set(node.node, value)?;
        let animation = animation.filter(|_| value.property().is_animatable());
        self.record(
            txn,
            node.context,
            Recorded::Set {
                node: node.node,
                value,
                prior,
                animation,
            },
        );
        Ok(())
    }

    // -- Commit / discard --

    /// Commits `txn`, queueing one [`Commit`] per context it touched.
    ///
    /// Never blocks; fence gating happens on the server. A transaction with
    /// no changes still commits a (no-op) message per context it was
    /// opened on.
    pub fn commit(&mut self, txn: TransactionId) -> Result<()> {
        let record = self.open_record(txn)?;
        let contexts: Vec<ContextId> = record.contexts.iter().copied().collect();
        let parts = u32::try_from(contexts.len()).map_err(|_| Error::InvalidState)?;
        if contexts.iter().any(|c| !self.contexts.contains_key(c)) {
            return Err(Error::NotOwner);
        }

        let record = self.open_record(txn)?;
        record.phase = Phase::Committed;
        let fence = record.fence;
        let ops: Vec<(ContextId, NodeOp)> = record.ops.iter().map(|(c, r)| (*c, r.to_op())).collect();
        let notify_completion = self.callbacks.contains_key(&txn);
        let mut commits = Vec::with_capacity(contexts.len());
        for context in contexts {
            let ops = ops
                .iter()
                .filter(|(c, _)| *c == context)
                .map(|(_, op)| *op)
                .collect();
            let Some(state) = self.contexts.get_mut(&context) else {
                continue;
            };
            let seq = state.next_seq;
            state.next_seq += 1;
            commits.push(Commit {
                process: self.process,
                context,
                transaction: txn,
                parts,
                seq,
                fence,
                notify_completion,
                ops,
            });
        }

        if commits.is_empty() {
            // Nothing to present; the transaction is complete already.
            self.complete(txn);
        }
        self.outbox.extend(commits);
        self.forget_scope(txn);
        self.retiring.push(txn);
        Ok(())
    }

    /// Rolls back every change in `txn` and drops it.
    ///
    /// Fails with [`Error::InvalidState`] if it was already committed.
    pub fn discard(&mut self, txn: TransactionId) -> Result<()> {
        self.open_record(txn)?;
        let record = self.transactions.remove(txn.0)?;
        for (context, op) in record.ops.iter().rev() {
            if let Some(state) = self.contexts.get_mut(context) {
                op.undo(&mut state.model)?;
            }
        }
        self.callbacks.remove(&txn);
        self.forget_scope(txn);
        Ok(())
    }

    /// Rolls a context's model back to what the server holds after it
    /// dropped the staged commits of `dropped` unapplied.
    ///
    /// `snapshot` is the rebuild list the server sent along. Completion
    /// callbacks of the dropped transactions never run and are removed.
    /// Fails with [`Error::InvalidState`] while an open transaction holds
    /// changes to the context; those were made on top of the dropped state
    /// and have to be discarded first.
    pub fn resync(
        &mut self,
        context: ContextId,
        dropped: &[TransactionId],
        snapshot: &[NodeOp],
    ) -> Result<()> {
        self.model(context)?;
        let touched = self.transactions.iter().any(|(_, record)| {
            record.phase == Phase::Open && record.ops.iter().any(|(c, _)| *c == context)
        });
        if touched {
            return Err(Error::InvalidState);
        }
        let slots = snapshot
            .iter()
            .filter_map(|op| match op {
                NodeOp::Create { node, .. } => Some(node.index().saturating_add(1)),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let mut model = NodeStore::with_free_slots(slots);
        for op in snapshot {
            op.apply_to(&mut model)?;
        }
        *self.model_mut(context)? = model;
        for txn in dropped {
            self.callbacks.remove(txn);
        }
        Ok(())
    }

    /// Drains the commits queued for the server.
    pub fn take_commits(&mut self) -> Vec<Commit> {
        core::mem::take(&mut self.outbox)
    }

    /// Runs the completion callback for `txn`, if one is registered.
    /// Returns whether a callback ran.
    pub fn complete(&mut self, txn: TransactionId) -> bool {
        match self.callbacks.remove(&txn) {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    // -- Helpers --

    fn open_record(&mut self, txn: TransactionId) -> Result<&mut TransactionRecord> {
        let record = self.transactions.get_mut(txn.0)?;
        if record.phase != Phase::Open {
            return Err(Error::InvalidState);
        }
        Ok(record)
    }

    fn model_mut(&mut self, context: ContextId) -> Result<&mut NodeStore> {
        self.contexts
            .get_mut(&context)
            .map(|c| &mut c.model)
            .ok_or(Error::NotOwner)
    }

    /// Appends an applied change to an open record. Callers validate the
    /// record first.
    fn record(&mut self, txn: TransactionId, context: ContextId, op: Recorded) {
        if let Ok(record) = self.transactions.get_mut(txn.0) {
            record.contexts.insert(context);
            record.ops.push((context, op));
        }
    }

    fn forget_scope(&mut self, txn: TransactionId) {
        self.explicit_stack.retain(|t| *t != txn);
        if self.implicit == Some(txn) {
            self.implicit = None;
        }
    }
}

fn same_context(a: NodeHandle, b: NodeHandle) -> Result<ContextId> {
    if a.context == b.context {
        Ok(a.context)
    } else {
        Err(Error::InvalidState)
    }
}
