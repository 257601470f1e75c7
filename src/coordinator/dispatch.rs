// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outlet command dispatch with optimistic state updates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

use crate::error::{Error, Result};

use super::poll::PollCoordinator;

/// One in-flight outlet command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingCommand {
    /// The requested output state.
    pub(crate) desired: bool,
    /// When the command was issued.
    pub(crate) issued_at: Instant,
    /// Identifies the `supersede` call that created this entry.
    token: u64,
}

/// Tracks commands whose effect has not yet been confirmed by a poll.
///
/// One slot per outlet: a newer command for the same outlet supersedes the
/// older one, so only the latest desired state is ever tracked. Each entry
/// carries the token its `supersede` call returned, so a superseded command
/// can no longer touch the slot.
#[derive(Debug, Default)]
pub(crate) struct PendingCommands {
    slots: parking_lot::Mutex<HashMap<u8, PendingCommand>>,
    next_token: AtomicU64,
}

impl PendingCommands {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a command for an outlet, replacing any older one.
    ///
    /// Returns the token identifying this entry.
    pub(crate) fn supersede(&self, outlet: u8, desired: bool) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(
            outlet,
            PendingCommand {
                desired,
                issued_at: Instant::now(),
                token,
            },
        );
        token
    }

    /// Drops the tracked command for an outlet if the slot still belongs to
    /// `token`. Returns whether it was removed.
    pub(crate) fn remove_if(&self, outlet: u8, token: u64) -> bool {
        let mut slots = self.slots.lock();
        if slots.get(&outlet).is_some_and(|c| c.token == token) {
            slots.remove(&outlet);
            return true;
        }
        false
    }

    /// Returns the tracked command for an outlet.
    pub(crate) fn get(&self, outlet: u8) -> Option<PendingCommand> {
        self.slots.lock().get(&outlet).copied()
    }

    /// Clears commands the snapshot confirms, plus any that have outlived
    /// the command timeout without confirmation.
    pub(crate) fn reconcile(
        &self,
        snapshot: &crate::state::DeviceSnapshot,
        timeout: std::time::Duration,
    ) {
        let now = Instant::now();
        self.slots.lock().retain(|outlet, command| {
            if now.duration_since(command.issued_at) >= timeout {
                return false;
            }
            match snapshot.outlet(*outlet) {
                Some(state) => state.is_on != command.desired,
                None => false,
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Issues outlet switch commands for one device.
///
/// A command is applied to the cached snapshot optimistically before the
/// request goes out, so subscribers see the intended state without waiting a
/// full poll cycle. A failed send reverts the optimistic value; a successful
/// send schedules a short-delay refresh so the authoritative reading follows
/// promptly. Either way, the next poll's payload wins.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    coordinator: PollCoordinator,
}

impl CommandDispatcher {
    /// Creates a dispatcher riding on the given coordinator.
    #[must_use]
    pub fn new(coordinator: PollCoordinator) -> Self {
        Self { coordinator }
    }

    /// Switches one outlet on or off.
    ///
    /// The cached outlet flips to `desired` (marked pending) before the
    /// request is sent. Issuing a second command for the same outlet while
    /// the first is unconfirmed supersedes it: only the latest desired state
    /// is tracked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] if the coordinator has been stopped,
    /// [`Error::OutletOutOfRange`] if the device has reported its outlets and
    /// `outlet` is not among them, or [`Error::Client`] when the device
    /// rejects the request. On a client error the optimistic update has been
    /// reverted.
    pub async fn set_outlet(&self, outlet: u8, desired: bool) -> Result<()> {
        let inner = &self.coordinator.inner;
        if self.coordinator.is_stopped() {
            return Err(Error::Stopped);
        }

        let snapshot = inner.cache.read();
        if snapshot.has_data() && snapshot.outlet(outlet).is_none() {
            return Err(Error::OutletOutOfRange {
                index: outlet,
                count: snapshot.outlet_count(),
            });
        }

        let token = inner.pending.supersede(outlet, desired);
        let previous = inner.cache.apply_optimistic(outlet, desired);

        tracing::debug!(
            device_id = %inner.device_id,
            outlet,
            desired,
            "Dispatching switch command"
        );

        match inner
            .client
            .send_switch(outlet, desired, inner.config.request_timeout)
            .await
        {
            Ok(()) => {
                self.schedule_refresh();
                Ok(())
            }
            Err(e) => {
                // A newer command may own the slot by now; only the owner
                // removes it and reverts the overlay.
                if inner.pending.remove_if(outlet, token)
                    && let Some(previous) = previous
                {
                    inner.cache.revert_optimistic(outlet, previous);
                }
                tracing::warn!(
                    device_id = %inner.device_id,
                    outlet,
                    error = %e,
                    "Switch command failed, optimistic update reverted"
                );
                Err(Error::Client(e))
            }
        }
    }

    /// Refreshes shortly after a successful command so the authoritative
    /// reading replaces the optimistic one without waiting a full interval.
    fn schedule_refresh(&self) {
        let coordinator = self.coordinator.clone();
        let delay = coordinator.inner.config.command_refresh_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = coordinator.refresh_now().await {
                tracing::debug!(
                    device_id = %coordinator.inner.device_id,
                    error = %e,
                    "Post-command refresh skipped"
                );
            }
        });
    }
}
