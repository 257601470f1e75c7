// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the mPower library.
//!
//! Failures split into two layers: [`ClientError`] covers everything that can
//! go wrong talking to a device over the wire, while [`Error`] adds the
//! library-level conditions (unknown device, stopped coordinator, bad
//! configuration). Poll failures are additionally classified into an
//! [`ErrorKind`] that is recorded on the device snapshot instead of being
//! raised to readers.

use thiserror::Error;

use crate::event::DeviceId;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Communication with the device failed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Device was not found in the registry.
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    /// The coordinator has been stopped and no longer accepts requests.
    #[error("coordinator is stopped")]
    Stopped,

    /// An outlet index does not exist on the device.
    #[error("outlet {index} is out of range (device reports {count} outlets)")]
    OutletOutOfRange {
        /// The requested 1-based outlet index.
        index: u8,
        /// Number of outlets in the current snapshot.
        count: usize,
    },

    /// Device configuration is invalid.
    #[error("invalid device configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors from the device client (HTTP transport and payload decoding).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection-level failure (refused, reset, DNS, TLS).
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request did not complete within the configured timeout.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The device rejected the configured credentials.
    #[error("authentication rejected by device")]
    Auth,

    /// The device answered with something the decoder does not understand.
    #[error("malformed device response: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Classifies this error for recording in a device snapshot.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Auth => ErrorKind::Auth,
            Self::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// Converts a reqwest error, splitting timeouts from other network faults.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_ms)
        } else {
            Self::Network(err)
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Classification of a failed poll, recorded in `DeviceSnapshot::last_error`.
///
/// `Network` and `Timeout` are transient and retried with backoff. `Auth` is
/// non-recovering until credentials change. `Protocol` is treated as
/// transient but logged distinctly since it may indicate a firmware mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Connection refused, reset or unroutable.
    Network,
    /// Request timed out.
    Timeout,
    /// Credentials rejected.
    Auth,
    /// Malformed or unexpected response payload.
    Protocol,
}

impl ErrorKind {
    /// Returns `true` for errors that backoff-and-retry can recover from.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Auth)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::Protocol => "protocol",
        };
        write!(f, "{name}")
    }
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_kinds() {
        assert_eq!(ClientError::Auth.kind(), ErrorKind::Auth);
        assert_eq!(ClientError::Timeout(5000).kind(), ErrorKind::Timeout);
        assert_eq!(
            ClientError::Protocol("not json".to_string()).kind(),
            ErrorKind::Protocol
        );
    }

    #[test]
    fn auth_is_not_transient() {
        assert!(!ErrorKind::Auth.is_transient());
        assert!(ErrorKind::Network.is_transient());
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::Protocol.is_transient());
    }

    #[test]
    fn error_from_client_error() {
        let err: Error = ClientError::Auth.into();
        assert!(matches!(err, Error::Client(ClientError::Auth)));
    }

    #[test]
    fn timeout_display_includes_millis() {
        let err = ClientError::Timeout(15000);
        assert_eq!(err.to_string(), "request timed out after 15000 ms");
    }

    #[test]
    fn out_of_range_display() {
        let err = Error::OutletOutOfRange { index: 7, count: 6 };
        assert_eq!(
            err.to_string(),
            "outlet 7 is out of range (device reports 6 outlets)"
        );
    }

    #[test]
    fn json_error_maps_to_protocol() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ClientError = json_err.into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
