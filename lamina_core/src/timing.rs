// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display refresh ticks.
//!
//! The output layer delivers one [`FrameTick`] per display refresh (a
//! vsync-like signal). The compositor runs exactly one pass per tick and
//! uses [`FrameTick::now`] as the sampling time for every animation in that
//! pass, so a frame is a pure function of committed state, fence state and
//! this timestamp.

use crate::display::DisplayId;
use crate::time::{Duration, HostTime};

/// A frame opportunity delivered by the display-signal interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameTick {
    /// Monotonic host time of this refresh.
    pub now: HostTime,
    /// Display refresh interval, if the driver reports it.
    pub refresh_interval: Option<Duration>,
    /// Monotonically increasing frame counter.
    pub frame_index: u64,
    /// Which display this tick is for.
    pub display: DisplayId,
}

impl FrameTick {
    /// Creates a tick for the main display.
    #[must_use]
    pub const fn new(frame_index: u64, now: HostTime) -> Self {
        Self {
            now,
            refresh_interval: None,
            frame_index,
            display: DisplayId::MAIN,
        }
    }

    /// Returns the tick that follows this one after `interval`.
    #[must_use]
    pub fn next(&self, interval: Duration) -> Self {
        Self {
            now: self.now.saturating_add(interval),
            refresh_interval: self.refresh_interval,
            frame_index: self.frame_index + 1,
            display: self.display,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_advances_time_and_index() {
        let tick = FrameTick::new(4, HostTime(1_000));
        let next = tick.next(Duration(16));
        assert_eq!(next.frame_index, 5);
        assert_eq!(next.now, HostTime(1_016));
        assert_eq!(next.display, DisplayId::MAIN);
    }
}
