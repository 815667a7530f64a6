// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spatial damage tracking for partial re-rendering.

use alloc::vec::Vec;

use kurbo::Rect;
use lamina_core::trace::DamageSummary;

/// A region of the display that needs re-rendering.
///
/// Output stages can use this to minimize GPU work by only redrawing areas
/// that changed since the last frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum DamageRegion {
    /// The entire display needs redrawing.
    #[default]
    Full,
    /// A list of axis-aligned rectangles in display space that need
    /// redrawing.
    Rects(Vec<Rect>),
    /// Nothing changed; the previous frame can be reused.
    None,
}

impl DamageRegion {
    /// Returns `true` if no region needs redrawing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Adds one damaged rectangle. Empty rectangles are ignored and
    /// rectangles already covered are not duplicated.
    pub fn add_rect(&mut self, rect: Rect) {
        if rect.is_zero_area() {
            return;
        }
        match self {
            Self::Full => {}
            Self::None => *self = Self::Rects(alloc::vec![rect]),
            Self::Rects(rects) => {
                if !rects.iter().any(|r| r.union(rect) == *r) {
                    rects.push(rect);
                }
            }
        }
    }

    /// Merges another damage region into this one.
    pub fn merge(&mut self, other: &Self) {
        match (&*self, other) {
            (Self::Full, _) | (_, Self::Full) => *self = Self::Full,
            (Self::None, _) => *self = other.clone(),
            (_, Self::None) => {}
            (Self::Rects(_), Self::Rects(b)) => {
                for rect in b {
                    self.add_rect(*rect);
                }
            }
        }
    }

    /// Coarse summary for tracing.
    #[must_use]
    pub fn summary(&self) -> DamageSummary {
        match self {
            Self::Full => DamageSummary::Full,
            Self::None => DamageSummary::None,
            Self::Rects(rects) => {
                DamageSummary::Partial(u32::try_from(rects.len()).unwrap_or(u32::MAX))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn merge_rules() {
        let mut d = DamageRegion::None;
        d.merge(&DamageRegion::Rects(vec![Rect::new(0.0, 0.0, 10.0, 10.0)]));
        assert_eq!(d.summary(), DamageSummary::Partial(1));
        d.merge(&DamageRegion::None);
        assert_eq!(d.summary(), DamageSummary::Partial(1));
        d.merge(&DamageRegion::Full);
        assert_eq!(d, DamageRegion::Full);
        d.add_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(d, DamageRegion::Full, "full absorbs rects");
    }

    #[test]
    fn covered_and_empty_rects_are_skipped() {
        let mut d = DamageRegion::None;
        d.add_rect(Rect::ZERO);
        assert!(d.is_empty());
        d.add_rect(Rect::new(0.0, 0.0, 100.0, 100.0));
        d.add_rect(Rect::new(10.0, 10.0, 20.0, 20.0));
        d.add_rect(Rect::new(200.0, 0.0, 210.0, 10.0));
        assert_eq!(d.summary(), DamageSummary::Partial(2));
    }
}
