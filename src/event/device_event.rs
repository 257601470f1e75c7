// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registry and coordinator event types.

use chrono::{DateTime, Utc};

use crate::error::ErrorKind;

use super::DeviceId;

/// Events emitted by the coordinator registry and its poll coordinators.
///
/// Entity adapters that need per-outlet values should read the state cache
/// (or hold a `watch` receiver); these events carry lifecycle and
/// availability transitions that affect a whole device.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum DeviceEvent {
    /// A device was added to the registry and its coordinator started.
    DeviceAdded {
        /// The ID of the added device.
        device_id: DeviceId,
    },

    /// A device was removed and its coordinator stopped.
    DeviceRemoved {
        /// The ID of the removed device.
        device_id: DeviceId,
    },

    /// A poll replaced the device snapshot with fresh data.
    SnapshotUpdated {
        /// The ID of the device.
        device_id: DeviceId,
        /// When the snapshot was fetched.
        fetched_at: DateTime<Utc>,
    },

    /// The device crossed an availability boundary.
    AvailabilityChanged {
        /// The ID of the device.
        device_id: DeviceId,
        /// Whether the device is now considered reachable.
        available: bool,
        /// The failure classification that drove an unavailable transition.
        last_error: Option<ErrorKind>,
    },
}

impl DeviceEvent {
    /// Returns the device ID associated with this event.
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        match self {
            Self::DeviceAdded { device_id }
            | Self::DeviceRemoved { device_id }
            | Self::SnapshotUpdated { device_id, .. }
            | Self::AvailabilityChanged { device_id, .. } => *device_id,
        }
    }

    /// Returns `true` for added/removed lifecycle events.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::DeviceAdded { .. } | Self::DeviceRemoved { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_extraction() {
        let id = DeviceId::new();
        assert_eq!(DeviceEvent::DeviceAdded { device_id: id }.device_id(), id);
        assert_eq!(
            DeviceEvent::AvailabilityChanged {
                device_id: id,
                available: false,
                last_error: Some(ErrorKind::Timeout),
            }
            .device_id(),
            id
        );
    }

    #[test]
    fn lifecycle_classification() {
        let id = DeviceId::new();
        assert!(DeviceEvent::DeviceRemoved { device_id: id }.is_lifecycle());
        assert!(
            !DeviceEvent::SnapshotUpdated {
                device_id: id,
                fetched_at: Utc::now(),
            }
            .is_lifecycle()
        );
    }
}
