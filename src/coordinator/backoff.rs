// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Capped exponential backoff for poll scheduling.

use std::time::Duration;

/// Backoff schedule for a device's poll cycle.
///
/// The base is the configured poll interval; every consecutive failure
/// doubles the delay until the cap. A success resets the schedule to the
/// base immediately. The policy is a pure function of the failure count,
/// so it can be tested without timers.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mpower_lib::coordinator::BackoffPolicy;
///
/// let policy = BackoffPolicy::new(Duration::from_secs(30), Duration::from_secs(300));
/// assert_eq!(policy.delay(0), Duration::from_secs(30));
/// assert_eq!(policy.delay(1), Duration::from_secs(60));
/// assert_eq!(policy.delay(4), Duration::from_secs(300)); // capped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    /// Creates a policy with the given base and cap.
    ///
    /// A cap below the base is raised to the base.
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
        }
    }

    /// The base delay (one poll interval).
    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    /// The maximum delay.
    #[must_use]
    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay before the next attempt after `consecutive_failures` failures.
    ///
    /// Zero failures yields the base interval; each failure doubles it up to
    /// the cap.
    #[must_use]
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.base;
        }
        // Shift is clamped well before Duration arithmetic can overflow.
        let factor = 1u32 << consecutive_failures.min(16);
        self.base.checked_mul(factor).map_or(self.cap, |d| d.min(self.cap))
    }
}
