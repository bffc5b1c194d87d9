// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel time.
//!
//! The kernel clock is a free-running 32-bit tick counter that is allowed to
//! wrap. Deadlines are stored raw; whether a deadline has passed is decided
//! by subtracting the current time and reinterpreting the difference as a
//! signed value, which makes the comparison transparent across the wrap.
//! Never compare two `Ticks` with `<` -- that is exactly the bug this type
//! exists to prevent, so it deliberately implements no ordering.

/// A point on the kernel clock, measured in ticks.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(transparent)]
pub struct Ticks(u32);

impl Ticks {
    /// Returns the point `delta` ticks after `self`, wrapping.
    pub fn offset(self, delta: u32) -> Ticks {
        Ticks(self.0.wrapping_add(delta))
    }

    /// Treating `self` as a deadline, checks whether it has been reached at
    /// time `now`. A deadline is due the moment the clock equals it.
    pub fn is_due(self, now: Ticks) -> bool {
        self.0.wrapping_sub(now.0) as i32 <= 0
    }
}

impl From<u32> for Ticks {
    fn from(v: u32) -> Self {
        Ticks(v)
    }
}

impl From<Ticks> for u32 {
    fn from(v: Ticks) -> Self {
        v.0
    }
}

/// How long a blocking queue or semaphore operation is willing to wait.
///
/// This is the structured form of the classic signed-tick-count convention,
/// where zero means "don't wait" and negative means "wait forever".
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Wait {
    /// Give up immediately if the request can't be satisfied.
    None,
    /// Wait at most this many ticks. The deadline is computed once, when the
    /// operation starts.
    Ticks(u32),
    /// Wait indefinitely.
    Forever,
}

impl Wait {
    /// Computes the absolute give-up point for an operation starting at
    /// `now`, if this wait has one.
    pub fn deadline_from(self, now: Ticks) -> Option<Ticks> {
        match self {
            Wait::Ticks(n) => Some(now.offset(n)),
            Wait::None | Wait::Forever => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_due_at_and_after_its_tick() {
        let d = Ticks::from(100);
        assert!(!d.is_due(Ticks::from(99)));
        assert!(d.is_due(Ticks::from(100)));
        assert!(d.is_due(Ticks::from(101)));
    }

    #[test]
    fn deadline_comparison_survives_the_wrap() {
        // A sleep requested just before the counter wraps must come due at
        // the right wall-clock offset, not 2**32 ticks early or late.
        let now = Ticks::from(u32::MAX - 2);
        let d = now.offset(5); // lands at 2 after the wrap
        assert_eq!(u32::from(d), 2);
        assert!(!d.is_due(now));
        assert!(!d.is_due(now.offset(4)));
        assert!(d.is_due(now.offset(5)));
        assert!(d.is_due(now.offset(6)));
    }

    #[test]
    fn far_past_deadlines_read_as_due() {
        let d = Ticks::from(10);
        // Half the clock's range ago still counts as "passed".
        assert!(d.is_due(Ticks::from(10 + 0x3fff_ffff)));
    }

    #[test]
    fn wait_deadlines() {
        let now = Ticks::from(7);
        assert_eq!(Wait::None.deadline_from(now), None);
        assert_eq!(Wait::Forever.deadline_from(now), None);
        assert_eq!(Wait::Ticks(3).deadline_from(now), Some(Ticks::from(10)));
    }
}
