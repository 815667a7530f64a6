// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node properties and their values.

use kurbo::{Point, Rect};

use super::id::{NodeId, SurfaceId};
use super::kind::ContentKind;
use crate::transform::Transform3d;

/// Names one settable node attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Property {
    /// Local bounds rectangle.
    Bounds,
    /// Normalized anchor point (0–1 in each axis).
    AnchorPoint,
    /// Anchor position in the parent's space.
    Position,
    /// 3-D affine/perspective transform around the anchor.
    Transform,
    /// Z-ordering hint among siblings.
    ZPosition,
    /// Opacity (0–1).
    Opacity,
    /// Corner radius for clipping.
    CornerRadius,
    /// Whether content and descendants clip to bounds.
    MasksToBounds,
    /// Backing pixel buffer.
    Backing,
    /// Mask node (its alpha masks this node).
    Mask,
    /// Content kind.
    Kind,
    /// Hidden flag.
    Hidden,
}

impl Property {
    /// Every property, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::Bounds,
        Self::AnchorPoint,
        Self::Position,
        Self::Transform,
        Self::ZPosition,
        Self::Opacity,
        Self::CornerRadius,
        Self::MasksToBounds,
        Self::Backing,
        Self::Mask,
        Self::Kind,
        Self::Hidden,
    ];

    /// Whether values of this property can be interpolated.
    #[must_use]
    pub const fn is_animatable(self) -> bool {
        matches!(
            self,
            Self::Bounds
                | Self::AnchorPoint
                | Self::Position
                | Self::Transform
                | Self::ZPosition
                | Self::Opacity
                | Self::CornerRadius
        )
    }
}

/// A property together with its value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PropertyValue {
    /// See [`Property::Bounds`].
    Bounds(Rect),
    /// See [`Property::AnchorPoint`].
    AnchorPoint(Point),
    /// See [`Property::Position`].
    Position(Point),
    /// See [`Property::Transform`].
    Transform(Transform3d),
    /// See [`Property::ZPosition`].
    ZPosition(f64),
    /// See [`Property::Opacity`].
    Opacity(f32),
    /// See [`Property::CornerRadius`].
    CornerRadius(f64),
    /// See [`Property::MasksToBounds`].
    MasksToBounds(bool),
    /// See [`Property::Backing`].
    Backing(Option<SurfaceId>),
    /// See [`Property::Mask`].
    Mask(Option<NodeId>),
    /// See [`Property::Kind`].
    Kind(ContentKind),
    /// See [`Property::Hidden`].
    Hidden(bool),
}

impl PropertyValue {
    /// Which property this value is for.
    #[must_use]
    pub const fn property(&self) -> Property {
        match self {
            Self::Bounds(_) => Property::Bounds,
            Self::AnchorPoint(_) => Property::AnchorPoint,
            Self::Position(_) => Property::Position,
            Self::Transform(_) => Property::Transform,
            Self::ZPosition(_) => Property::ZPosition,
            Self::Opacity(_) => Property::Opacity,
            Self::CornerRadius(_) => Property::CornerRadius,
            Self::MasksToBounds(_) => Property::MasksToBounds,
            Self::Backing(_) => Property::Backing,
            Self::Mask(_) => Property::Mask,
            Self::Kind(_) => Property::Kind,
            Self::Hidden(_) => Property::Hidden,
        }
    }

    /// Interpolates from `self` (at `t = 0`) towards `to` (at `t = 1`).
    ///
    /// Returns `None` when the two values are for different properties or
    /// the property is discrete.
    #[must_use]
    pub fn lerp(&self, to: &Self, t: f64) -> Option<Self> {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        let value = match (self, to) {
            (Self::Bounds(a), Self::Bounds(b)) => Self::Bounds(Rect::new(
                mix(a.x0, b.x0),
                mix(a.y0, b.y0),
                mix(a.x1, b.x1),
                mix(a.y1, b.y1),
            )),
            (Self::AnchorPoint(a), Self::AnchorPoint(b)) => {
                Self::AnchorPoint(Point::new(mix(a.x, b.x), mix(a.y, b.y)))
            }
            (Self::Position(a), Self::Position(b)) => {
                Self::Position(Point::new(mix(a.x, b.x), mix(a.y, b.y)))
            }
            (Self::Transform(a), Self::Transform(b)) => Self::Transform(a.lerp(b, t)),
            (Self::ZPosition(a), Self::ZPosition(b)) => Self::ZPosition(mix(*a, *b)),
            (Self::Opacity(a), Self::Opacity(b)) => Self::Opacity(mix_f32(*a, *b, t)),
            (Self::CornerRadius(a), Self::CornerRadius(b)) => Self::CornerRadius(mix(*a, *b)),
            _ => return None,
        };
        Some(value)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "opacity is stored in single precision"
)]
fn mix_f32(a: f32, b: f32, t: f64) -> f32 {
    (f64::from(a) + (f64::from(b) - f64::from(a)) * t) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opacity_midpoint() {
        let v = PropertyValue::Opacity(1.0).lerp(&PropertyValue::Opacity(0.5), 0.5);
        assert_eq!(v, Some(PropertyValue::Opacity(0.75)));
    }

    #[test]
    fn discrete_properties_do_not_interpolate() {
        let a = PropertyValue::Hidden(false);
        let b = PropertyValue::Hidden(true);
        assert_eq!(a.lerp(&b, 0.5), None);
        assert!(!Property::Hidden.is_animatable());
    }

    #[test]
    fn mismatched_properties_do_not_interpolate() {
        let a = PropertyValue::Opacity(1.0);
        let b = PropertyValue::CornerRadius(4.0);
        assert_eq!(a.lerp(&b, 0.5), None);
    }

    #[test]
    fn value_names_its_property() {
        assert_eq!(
            PropertyValue::Position(Point::ORIGIN).property(),
            Property::Position
        );
    }
}
