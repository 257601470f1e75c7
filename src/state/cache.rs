// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-device snapshot cache.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::ErrorKind;

use super::DeviceSnapshot;

/// Holds the current [`DeviceSnapshot`] for one device.
///
/// Built on a tokio `watch` channel: [`read`](Self::read) never blocks on an
/// in-progress poll, [`replace`](Self::replace) swaps the snapshot atomically
/// and wakes every subscriber. Cloning the cache shares the same snapshot.
///
/// # Examples
///
/// ```
/// use mpower_lib::state::{DeviceSnapshot, StateCache};
///
/// let cache = StateCache::new();
/// assert!(!cache.read().available);
///
/// let mut changes = cache.subscribe();
/// // changes.changed().await fires on every replace()
/// ```
#[derive(Debug, Clone)]
pub struct StateCache {
    tx: Arc<watch::Sender<DeviceSnapshot>>,
}

impl StateCache {
    /// Creates a cache holding the empty, never-polled snapshot.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(DeviceSnapshot::empty());
        Self { tx: Arc::new(tx) }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn read(&self) -> DeviceSnapshot {
        self.tx.borrow().clone()
    }

    /// Atomically replaces the current snapshot and notifies subscribers.
    pub fn replace(&self, snapshot: DeviceSnapshot) {
        // send_replace never fails; subscribers are optional.
        let _ = self.tx.send_replace(snapshot);
    }

    /// Records a failed poll, keeping the stale outlet values.
    ///
    /// `available` is decided by the coordinator from its consecutive-failure
    /// counter; the cache only stores the verdict.
    pub fn record_failure(&self, kind: ErrorKind, available: bool) {
        self.tx.send_modify(|snapshot| {
            snapshot.available = available;
            snapshot.last_error = Some(kind);
        });
    }

    /// Applies an optimistic single-outlet overlay.
    ///
    /// Produces a derived snapshot with that outlet's `is_on` set to the
    /// desired state and `pending` raised; `last_updated` is left unchanged
    /// since the value is intent, not observation. Returns the outlet's
    /// previous `is_on`, or `None` if the index is unknown.
    pub fn apply_optimistic(&self, index: u8, desired: bool) -> Option<bool> {
        let mut previous = None;
        self.tx.send_if_modified(|snapshot| {
            let Some(outlet) = snapshot.outlets.iter_mut().find(|o| o.index == index) else {
                return false;
            };
            previous = Some(outlet.is_on);
            outlet.is_on = desired;
            outlet.pending = true;
            true
        });
        previous
    }

    /// Reverts a failed optimistic overlay to the captured previous value.
    ///
    /// Skipped if an authoritative poll already overwrote the outlet (the
    /// pending flag is cleared by every successful replace).
    pub fn revert_optimistic(&self, index: u8, previous: bool) {
        self.tx.send_if_modified(|snapshot| {
            let Some(outlet) = snapshot.outlets.iter_mut().find(|o| o.index == index) else {
                return false;
            };
            if !outlet.pending {
                return false;
            }
            outlet.is_on = previous;
            outlet.pending = false;
            true
        });
    }

    /// Subscribes to snapshot replacements.
    ///
    /// The receiver sees every change made through this cache; dropping it
    /// unregisters the listener.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}
