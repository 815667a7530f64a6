// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property interpolation descriptors.
//!
//! The transaction engine only records an [`AnimationSpec`] next to a
//! property write. When the compositor applies the commit it turns the spec
//! into an [`Animation`] whose start value is whatever was on screen at that
//! moment, then samples it once per tick until it finishes.

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::node::PropertyValue;
use crate::time::{Duration, HostTime};

const NEWTON_ITERATIONS: u8 = 8;
const SOLVE_EPSILON: f64 = 1e-7;

/// Maps linear time progress in `[0, 1]` to value progress.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum TimingCurve {
    /// Constant speed.
    #[default]
    Linear,
    /// Slow start.
    EaseIn,
    /// Slow end.
    EaseOut,
    /// Slow start and end.
    EaseInOut,
    /// A unit cubic Bézier through `(0, 0)`, `(x1, y1)`, `(x2, y2)`, `(1, 1)`.
    CubicBezier {
        /// First control point x, clamped to `[0, 1]`.
        x1: f64,
        /// First control point y.
        y1: f64,
        /// Second control point x, clamped to `[0, 1]`.
        x2: f64,
        /// Second control point y.
        y2: f64,
    },
}

impl TimingCurve {
    /// Samples the curve at time progress `x`.
    #[must_use]
    pub fn sample(self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            Self::Linear => x,
            Self::EaseIn => Bezier::new(0.42, 0.0, 1.0, 1.0).solve(x),
            Self::EaseOut => Bezier::new(0.0, 0.0, 0.58, 1.0).solve(x),
            Self::EaseInOut => Bezier::new(0.42, 0.0, 0.58, 1.0).solve(x),
            Self::CubicBezier { x1, y1, x2, y2 } => {
                Bezier::new(x1.clamp(0.0, 1.0), y1, x2.clamp(0.0, 1.0), y2).solve(x)
            }
        }
    }
}

/// Unit cubic Bézier in polynomial form.
struct Bezier {
    ax: f64,
    bx: f64,
    cx: f64,
    ay: f64,
    by: f64,
    cy: f64,
}

impl Bezier {
    fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let cx = 3.0 * x1;
        let bx = 3.0 * (x2 - x1) - cx;
        let cy = 3.0 * y1;
        let by = 3.0 * (y2 - y1) - cy;
        Self {
            ax: 1.0 - cx - bx,
            bx,
            cx,
            ay: 1.0 - cy - by,
            by,
            cy,
        }
    }

    fn x_at(&self, t: f64) -> f64 {
        ((self.ax * t + self.bx) * t + self.cx) * t
    }

    fn y_at(&self, t: f64) -> f64 {
        ((self.ay * t + self.by) * t + self.cy) * t
    }

    fn dx_at(&self, t: f64) -> f64 {
        (3.0 * self.ax * t + 2.0 * self.bx) * t + self.cx
    }

    /// Finds the curve parameter whose x equals `x`: Newton first, bisection
    /// if the derivative flattens out.
    fn t_for_x(&self, x: f64) -> f64 {
        let mut t = x;
        for _ in 0..NEWTON_ITERATIONS {
            let err = self.x_at(t) - x;
            if err.abs() < SOLVE_EPSILON {
                return t;
            }
            let dx = self.dx_at(t);
            if dx.abs() < 1e-6 {
                break;
            }
            t -= err / dx;
        }

        let (mut lo, mut hi) = (0.0, 1.0);
        t = x;
        while lo < hi {
            let x2 = self.x_at(t);
            if (x2 - x).abs() < SOLVE_EPSILON {
                break;
            }
            if x > x2 {
                lo = t;
            } else {
                hi = t;
            }
            let next = (hi - lo) / 2.0 + lo;
            if next == t {
                break;
            }
            t = next;
        }
        t
    }

    fn solve(&self, x: f64) -> f64 {
        self.y_at(self.t_for_x(x))
    }
}

/// How many times an animation runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RepeatCount {
    /// A possibly fractional number of cycles; `1.0` runs once.
    Count(f64),
    /// Never finishes.
    Forever,
}

/// Repeat and autoreverse behavior.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RepeatPolicy {
    /// Number of cycles.
    pub count: RepeatCount,
    /// When set, each cycle runs forward then backward.
    pub autoreverse: bool,
}

impl RepeatPolicy {
    /// Runs once, forward only.
    pub const ONCE: Self = Self {
        count: RepeatCount::Count(1.0),
        autoreverse: false,
    };
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        Self::ONCE
    }
}

/// Duration, curve and repeat policy for one animated property write.
///
/// Also serves as a transaction's animation defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnimationSpec {
    /// Length of one forward pass. Zero means the write is not animated.
    pub duration: Duration,
    /// Progress curve.
    pub curve: TimingCurve,
    /// Repeat policy.
    pub repeat: RepeatPolicy,
}

impl AnimationSpec {
    /// A single forward pass over `duration` with the given curve.
    #[must_use]
    pub const fn new(duration: Duration, curve: TimingCurve) -> Self {
        Self {
            duration,
            curve,
            repeat: RepeatPolicy::ONCE,
        }
    }

    /// Returns a copy with a different repeat policy.
    #[must_use]
    pub const fn with_repeat(mut self, repeat: RepeatPolicy) -> Self {
        self.repeat = repeat;
        self
    }

    /// Whether this spec produces any interpolation at all.
    #[must_use]
    pub fn is_animated(&self) -> bool {
        self.duration > Duration::ZERO
            && !matches!(self.repeat.count, RepeatCount::Count(c) if c <= 0.0)
    }
}

/// A running interpolation on one property of one node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Animation {
    /// Value on screen when the animation began.
    pub from: PropertyValue,
    /// Committed target value.
    pub to: PropertyValue,
    /// Timing parameters.
    pub spec: AnimationSpec,
    /// Tick timestamp at which the animation was applied.
    pub begin: HostTime,
}

/// Result of sampling an [`Animation`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// Interpolated value to render.
    pub value: PropertyValue,
    /// Whether the animation has run to completion.
    pub finished: bool,
}

impl Animation {
    /// Samples the animation at `now`.
    ///
    /// Once finished, the sample is the target value. Values whose kind does
    /// not interpolate jump to the target immediately.
    #[must_use]
    pub fn sample(&self, now: HostTime) -> Sample {
        let done = Sample {
            value: self.to,
            finished: true,
        };
        if !self.spec.is_animated() {
            return done;
        }
        let pass = self.spec.duration.ticks();
        let cycle = if self.spec.repeat.autoreverse {
            pass.saturating_mul(2)
        } else {
            pass
        };
        let elapsed = now.saturating_duration_since(self.begin).ticks();
        if let RepeatCount::Count(count) = self.spec.repeat.count {
            if elapsed as f64 >= cycle as f64 * count {
                return done;
            }
        }

        let within = elapsed % cycle;
        let progress = if within < pass {
            Duration(within).fraction_of(self.spec.duration)
        } else {
            1.0 - Duration(within - pass).fraction_of(self.spec.duration)
        };
        match self.from.lerp(&self.to, self.spec.curve.sample(progress)) {
            Some(value) => Sample {
                value,
                finished: false,
            },
            None => done,
        }
    }
}
