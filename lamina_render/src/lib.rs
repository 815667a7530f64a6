// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render plans, damage tracking and the compositor pass for lamina.
//!
//! This crate sits between [`lamina_core`]'s per-context trees and whatever
//! draws the final frame. It defines:
//!
//! - [`RenderItem`]: a single draw command in the render plan
//! - [`RenderPlan`]: an ordered list of draw commands for one frame
//! - [`DamageRegion`]: spatial damage tracking for partial re-rendering
//! - [`Compositor`]: the once-per-tick pass that applies staged commits,
//!   samples interpolations and paints placed contexts back-to-front
//! - [`OutputStage`]: the contract the final output stage implements
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` / `trace-rich` (disabled by default): Forward to the
//!   corresponding `lamina_core` features.

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

mod compositor;
mod damage;
mod output;
mod plan;

pub use compositor::{Compositor, CompositorConfig, ContextPlacement, PassReport};
pub use damage::DamageRegion;
pub use output::{OutputStage, RetainLast};
pub use plan::{BlendMode, RenderItem, RenderPlan};
