// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device client abstraction and the mPower HTTP implementation.
//!
//! The poll coordinator talks to devices exclusively through the
//! [`DeviceClient`] trait: one call to fetch the full outlet array, one call
//! to switch a single outlet. [`HttpClient`] implements it against the mPower
//! web API; tests substitute scripted clients.

mod http;

pub use http::HttpClient;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::error::ClientError;

/// One outlet record as reported by the device.
///
/// This is the wire-level reading; the state cache turns it into an
/// [`OutletState`](crate::state::OutletState) with freshness metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutletReading {
    /// Physical port number, 1-based.
    pub port: u8,
    /// Relay state.
    #[serde(deserialize_with = "bool_from_int")]
    pub output: bool,
    /// Active power in watts.
    #[serde(default)]
    pub power: Option<f64>,
    /// RMS voltage in volts.
    #[serde(default)]
    pub voltage: Option<f64>,
    /// RMS current in amperes.
    #[serde(default)]
    pub current: Option<f64>,
    /// Power factor (0-1).
    #[serde(default, rename = "powerfactor")]
    pub power_factor: Option<f64>,
    /// Accumulated energy in watt-hours.
    #[serde(default)]
    pub energy: Option<f64>,
}

/// The mPower firmware reports relay state as 0/1; newer builds use booleans.
fn bool_from_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrBool {
        Int(i64),
        Bool(bool),
    }

    match IntOrBool::deserialize(deserializer)? {
        IntOrBool::Int(v) => Ok(v != 0),
        IntOrBool::Bool(b) => Ok(b),
    }
}

/// Transport-level client for one mPower device.
///
/// Implementations must be cheap to share behind an `Arc`; the coordinator,
/// the command dispatcher and spawned refresh tasks all hold clones. The
/// timeout is caller-supplied per call so that setup probes and routine polls
/// can use different budgets.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Fetches the current state of all outlets.
    ///
    /// The returned readings are ordered by physical port number.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] classified as network, timeout, auth or
    /// protocol failure.
    async fn fetch_status(&self, timeout: Duration) -> Result<Vec<OutletReading>, ClientError>;

    /// Switches a single outlet on or off.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] with the same classification as
    /// [`fetch_status`](Self::fetch_status).
    async fn send_switch(
        &self,
        outlet: u8,
        on: bool,
        timeout: Duration,
    ) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_parses_integer_output() {
        let json = r#"{"port": 3, "output": 1, "power": 42.5, "voltage": 230.1,
                       "current": 0.19, "powerfactor": 0.97, "energy": 1204.0}"#;
        let reading: OutletReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.port, 3);
        assert!(reading.output);
        assert_eq!(reading.power, Some(42.5));
        assert_eq!(reading.power_factor, Some(0.97));
    }

    #[test]
    fn reading_parses_boolean_output() {
        let json = r#"{"port": 1, "output": false}"#;
        let reading: OutletReading = serde_json::from_str(json).unwrap();
        assert!(!reading.output);
        assert!(reading.power.is_none());
        assert!(reading.energy.is_none());
    }

    #[test]
    fn reading_rejects_missing_port() {
        let json = r#"{"output": 1}"#;
        assert!(serde_json::from_str::<OutletReading>(json).is_err());
    }
}
