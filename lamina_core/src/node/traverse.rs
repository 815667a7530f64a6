// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use alloc::vec::Vec;

use super::id::{INVALID, NodeId};
use super::store::NodeStore;
use crate::error::Result;

/// An iterator over the direct children of a node, back to front.
///
/// Created by [`NodeStore::children`].
#[derive(Debug)]
pub struct Children<'a> {
    store: &'a NodeStore,
    current: u32,
}

impl<'a> Children<'a> {
    pub(crate) fn new(store: &'a NodeStore, first: u32) -> Self {
        Self {
            store,
            current: first,
        }
    }
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.store.next_sibling[idx as usize];
        Some(NodeId {
            idx,
            generation: self.store.generation[idx as usize],
        })
    }
}

impl NodeStore {
    /// Returns every live node in the subtree rooted at `root`, pre-order,
    /// root first.
    pub fn subtree(&self, root: NodeId) -> Result<Vec<NodeId>> {
        self.validate(root)?;
        let mut out = Vec::new();
        let mut stack = alloc::vec![root.idx];
        while let Some(idx) = stack.pop() {
            out.push(self.node_at(idx));
            let start = stack.len();
            let mut child = self.first_child[idx as usize];
            while child != INVALID {
                stack.push(child);
                child = self.next_sibling[child as usize];
            }
            stack[start..].reverse();
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use crate::node::{ContentKind, NodeStore};

    #[test]
    fn subtree_is_pre_order() {
        let mut store = NodeStore::new();
        let a = store.create_node(ContentKind::Plain);
        let b = store.create_node(ContentKind::Plain);
        let c = store.create_node(ContentKind::Plain);
        let d = store.create_node(ContentKind::Plain);
        store.add_child(a, b).unwrap();
        store.add_child(a, c).unwrap();
        store.add_child(b, d).unwrap();
        assert_eq!(store.subtree(a), Ok(vec![a, b, d, c]));
        assert_eq!(store.subtree(c), Ok(vec![c]));
    }
}
