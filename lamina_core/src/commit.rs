// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plain-data commit messages.
//!
//! A committed transaction crosses the process boundary as one [`Commit`]
//! per context it touched. Commits carry only handles and values, never
//! references into the sender's memory.

use alloc::vec::Vec;

use crate::animation::AnimationSpec;
use crate::error::Result;
use crate::handle::{ContextId, FenceId, ProcessId, TransactionId};
use crate::node::{ContentKind, NodeId, NodeStore, PropertyValue};

/// One structural or property change to a context's tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeOp {
    /// A node was created at exactly this slot and generation.
    Create {
        /// The new node.
        node: NodeId,
        /// Its content kind.
        kind: ContentKind,
    },
    /// A node was destroyed (detaching it first if attached).
    Destroy {
        /// The destroyed node.
        node: NodeId,
    },
    /// A property was written.
    Set {
        /// Target node.
        node: NodeId,
        /// New value.
        value: PropertyValue,
        /// Interpolation to run from the on-screen value, if any.
        animation: Option<AnimationSpec>,
    },
    /// `child` was appended to `parent`.
    AddChild {
        /// New parent.
        parent: NodeId,
        /// Attached node.
        child: NodeId,
    },
    /// `child` was inserted immediately behind `sibling`.
    InsertBefore {
        /// Attached node.
        child: NodeId,
        /// Existing sibling.
        sibling: NodeId,
    },
    /// `child` was detached from its parent.
    RemoveFromParent {
        /// Detached node.
        child: NodeId,
    },
}

impl NodeOp {
    /// Returns the node this op primarily targets.
    #[must_use]
    pub fn node(&self) -> NodeId {
        match *self {
            Self::Create { node, .. } | Self::Destroy { node } | Self::Set { node, .. } => node,
            Self::AddChild { child, .. }
            | Self::InsertBefore { child, .. }
            | Self::RemoveFromParent { child } => child,
        }
    }

    /// Applies the op to `store` with no interpolation.
    pub fn apply_to(&self, store: &mut NodeStore) -> Result<()> {
        match *self {
            Self::Create { node, kind } => store.create_node_at(node, kind),
            Self::Destroy { node } => store.destroy_node(node),
            Self::Set { node, value, .. } => store.set(node, value).map(|_| ()),
            Self::AddChild { parent, child } => store.add_child(parent, child),
            Self::InsertBefore { child, sibling } => store.insert_before(child, sibling),
            Self::RemoveFromParent { child } => store.remove_from_parent(child),
        }
    }
}

/// The slice of one committed transaction that targets one context.
#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    /// Sending process.
    pub process: ProcessId,
    /// Target context.
    pub context: ContextId,
    /// Transaction this commit belongs to.
    pub transaction: TransactionId,
    /// How many commits the transaction produced in total (one per context).
    pub parts: u32,
    /// Per-context sequence number; strictly increasing.
    pub seq: u64,
    /// Gate that must clear before this commit becomes visible.
    pub fence: Option<FenceId>,
    /// Whether the sender wants a completion notification.
    pub notify_completion: bool,
    /// Changes, in the order they were made.
    pub ops: Vec<NodeOp>,
}

impl Commit {
    /// Whether this commit starts any interpolation.
    #[must_use]
    pub fn is_animated(&self) -> bool {
        self.ops.iter().any(|op| {
            matches!(op, NodeOp::Set { value, animation: Some(spec), .. }
                if spec.is_animated() && value.property().is_animatable())
        })
    }
}
