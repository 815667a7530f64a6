// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy shared by every lamina crate.
//!
//! Structural and ownership errors are returned synchronously to the caller
//! and never leave shared state half-modified: an operation that returns
//! `Err` has had no effect. [`Error::FenceTimeout`] is the one variant that
//! is never returned from an operation; it exists so that observability
//! layers can report forced fence clears with the same vocabulary.

/// Convenience alias used throughout the workspace.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can go wrong in the compositing core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// A mutation was attempted by a process that does not own the target
    /// context.
    #[error("caller does not own the target context")]
    NotOwner,
    /// A handle refers to a node, context, scene, fence or transaction that
    /// has been destroyed.
    #[error("handle refers to a destroyed object")]
    StaleReference,
    /// The operation is out of sequence (for example, setting a fence on a
    /// transaction that was already committed).
    #[error("operation is not valid in the current state")]
    InvalidState,
    /// Policy rejected the request, or the caller is not authenticated.
    #[error("permission denied")]
    PermissionDenied,
    /// The context handle does not exist, is owned by a different process
    /// than claimed, or is already bound elsewhere.
    #[error("invalid rendering context")]
    InvalidContext,
    /// Embedding the scene would make it (transitively) embed itself.
    #[error("scene embedding would form a cycle")]
    CyclicEmbedding,
    /// Input was routed to a context whose owning process is unreachable.
    #[error("input target is unavailable")]
    TargetUnavailable,
    /// A fence-held transaction exceeded its timeout and was force-applied.
    #[error("fence timed out and was force-cleared")]
    FenceTimeout,
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn display_messages_are_distinct() {
        let all = [
            Error::NotOwner,
            Error::StaleReference,
            Error::InvalidState,
            Error::PermissionDenied,
            Error::InvalidContext,
            Error::CyclicEmbedding,
            Error::TargetUnavailable,
            Error::FenceTimeout,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.to_string(), b.to_string(), "{a:?} vs {b:?}");
            }
        }
    }
}
