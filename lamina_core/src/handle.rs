// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generational handles and the arena tables they index.
//!
//! Every server-owned registry (contexts, fences, scenes, groups) and the
//! client-side transaction table is an [`Arena`] keyed by an opaque handle.
//! A handle pairs a slot index with a generation counter; destroying an
//! entry bumps the slot's generation so that old handles fail lookup with
//! [`Error::StaleReference`] even after the slot is reused.

use alloc::vec::Vec;
use core::fmt;

use crate::error::{Error, Result};

/// Identifies a client process (or the server itself).
///
/// Process identities are assigned by the host IPC substrate; the core treats
/// them as opaque and only compares them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// The server's own identity, used when the server holds fence
    /// references on behalf of a synchronized group.
    pub const SERVER: Self = Self(0);
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessId({})", self.0)
    }
}

/// A slot index plus generation. Typed handles wrap this.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawHandle {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl RawHandle {
    /// Builds a handle from its parts.
    ///
    /// Only meaningful when the parts came from a live handle (for example,
    /// after crossing a message boundary).
    #[inline]
    #[must_use]
    pub const fn from_parts(idx: u32, generation: u32) -> Self {
        Self { idx, generation }
    }

    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@gen{}", self.idx, self.generation)
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub RawHandle);

        impl $name {
            /// Returns the underlying raw handle.
            #[inline]
            #[must_use]
            pub const fn raw(self) -> RawHandle {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.0)
            }
        }
    };
}

define_handle!(
    /// A globally routable handle to a rendering context.
    ContextId
);
define_handle!(
    /// A handle to a cross-process fence.
    FenceId
);
define_handle!(
    /// A handle to a client-side transaction.
    TransactionId
);
define_handle!(
    /// A handle to a server-managed scene.
    SceneId
);
define_handle!(
    /// A handle to a synchronized group.
    GroupId
);

/// Generational slot table.
///
/// Entries live in `Option` slots; freed slots go on a free list and are
/// reused with a bumped generation.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    generation: Vec<u32>,
    free_list: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Inserts a value and returns its handle.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "arenas never hold more than u32::MAX entries"
    )]
    pub fn insert(&mut self, value: T) -> RawHandle {
        if let Some(idx) = self.free_list.pop() {
            self.slots[idx as usize] = Some(value);
            RawHandle {
                idx,
                generation: self.generation[idx as usize],
            }
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Some(value));
            self.generation.push(0);
            RawHandle { idx, generation: 0 }
        }
    }

    /// Removes the entry, invalidating every outstanding handle to it.
    pub fn remove(&mut self, handle: RawHandle) -> Result<T> {
        self.check(handle)?;
        let idx = handle.idx as usize;
        let value = self.slots[idx].take().ok_or(Error::StaleReference)?;
        self.generation[idx] = self.generation[idx].wrapping_add(1);
        self.free_list.push(handle.idx);
        Ok(value)
    }

    /// Returns whether the handle refers to a live entry.
    #[must_use]
    pub fn contains(&self, handle: RawHandle) -> bool {
        self.check(handle).is_ok()
    }

    /// Looks up an entry.
    pub fn get(&self, handle: RawHandle) -> Result<&T> {
        self.check(handle)?;
        self.slots[handle.idx as usize]
            .as_ref()
            .ok_or(Error::StaleReference)
    }

    /// Looks up an entry mutably.
    pub fn get_mut(&mut self, handle: RawHandle) -> Result<&mut T> {
        self.check(handle)?;
        self.slots[handle.idx as usize]
            .as_mut()
            .ok_or(Error::StaleReference)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Whether the arena holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates live entries in slot order.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "arenas never hold more than u32::MAX entries"
    )]
    pub fn iter(&self) -> impl Iterator<Item = (RawHandle, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref().map(|value| {
                (
                    RawHandle {
                        idx: idx as u32,
                        generation: self.generation[idx],
                    },
                    value,
                )
            })
        })
    }

    /// Iterates live entries mutably in slot order.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "arenas never hold more than u32::MAX entries"
    )]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RawHandle, &mut T)> + '_ {
        let generation = &self.generation;
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(move |(idx, slot)| {
                slot.as_mut().map(|value| {
                    (
                        RawHandle {
                            idx: idx as u32,
                            generation: generation[idx],
                        },
                        value,
                    )
                })
            })
    }

    /// Returns the handles of all live entries.
    #[must_use]
    pub fn handles(&self) -> Vec<RawHandle> {
        self.iter().map(|(h, _)| h).collect()
    }

    fn check(&self, handle: RawHandle) -> Result<()> {
        let idx = handle.idx as usize;
        if idx < self.slots.len()
            && self.generation[idx] == handle.generation
            && self.slots[idx].is_some()
        {
            Ok(())
        } else {
            Err(Error::StaleReference)
        }
    }
}
