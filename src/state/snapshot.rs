// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Snapshot types for a polled device.

use chrono::{DateTime, Utc};

use crate::client::OutletReading;
use crate::error::ErrorKind;

/// State of one outlet, as last observed or optimistically assumed.
///
/// Owned exclusively by the state cache; entity adapters receive copies and
/// never mutate outlet state directly.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutletState {
    /// Physical port number, 1-based, stable across polls.
    pub index: u8,
    /// Relay state.
    pub is_on: bool,
    /// Active power in watts.
    pub power_watts: Option<f64>,
    /// RMS voltage in volts.
    pub voltage: Option<f64>,
    /// RMS current in amperes.
    pub current: Option<f64>,
    /// Power factor (0-1).
    pub power_factor: Option<f64>,
    /// Accumulated energy in watt-hours.
    pub energy_wh: Option<f64>,
    /// When this outlet was last confirmed by a poll.
    pub last_updated: DateTime<Utc>,
    /// True while `is_on` reflects unconfirmed user intent rather than a
    /// device report.
    pub pending: bool,
}

impl OutletState {
    fn from_reading(reading: OutletReading, fetched_at: DateTime<Utc>) -> Self {
        Self {
            index: reading.port,
            is_on: reading.output,
            power_watts: reading.power,
            voltage: reading.voltage,
            current: reading.current,
            power_factor: reading.power_factor,
            energy_wh: reading.energy,
            last_updated: fetched_at,
            pending: false,
        }
    }
}

/// An immutable view of one device's outlets at a point in time.
///
/// Replaced as a whole on every successful poll. On a failed poll the outlet
/// values are carried over stale-but-present while `available` and
/// `last_error` record the failure.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeviceSnapshot {
    /// Outlet states ordered by physical port number.
    pub outlets: Vec<OutletState>,
    /// When the outlet data was last fetched successfully. `None` until the
    /// first successful poll.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Whether the device is considered reachable.
    pub available: bool,
    /// Classification of the most recent poll failure, if any.
    pub last_error: Option<ErrorKind>,
}

impl DeviceSnapshot {
    /// Creates the initial snapshot for a device that has never been polled.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            outlets: Vec::new(),
            fetched_at: None,
            available: false,
            last_error: None,
        }
    }

    /// Builds an authoritative snapshot from a successful fetch.
    ///
    /// Readings are assumed to be ordered by port (the client guarantees it).
    #[must_use]
    pub fn from_readings(readings: Vec<OutletReading>, fetched_at: DateTime<Utc>) -> Self {
        let outlets = readings
            .into_iter()
            .map(|r| OutletState::from_reading(r, fetched_at))
            .collect();
        Self {
            outlets,
            fetched_at: Some(fetched_at),
            available: true,
            last_error: None,
        }
    }

    /// Returns the state of one outlet by its physical port number.
    #[must_use]
    pub fn outlet(&self, index: u8) -> Option<&OutletState> {
        self.outlets.iter().find(|o| o.index == index)
    }

    /// Returns `true` once at least one poll has succeeded.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.fetched_at.is_some()
    }

    /// Number of outlets the device reports.
    #[must_use]
    pub fn outlet_count(&self) -> usize {
        self.outlets.len()
    }
}
