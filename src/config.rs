// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device configuration.

use std::time::Duration;

use crate::coordinator::BackoffPolicy;
use crate::error::Error;

/// Configuration for one mPower device.
///
/// Created at setup and immutable for the lifetime of its coordinator.
/// The caller-supplied values are expected to be pre-validated by whatever
/// configuration surface embeds this library; [`DeviceConfig::validate`] only
/// rejects values that would break the polling machinery itself.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mpower_lib::DeviceConfig;
///
/// let config = DeviceConfig::new("192.168.1.40")
///     .with_credentials("ubnt", "ubnt")
///     .with_poll_interval(Duration::from_secs(15))
///     .with_request_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device hostname or IP address.
    pub host: String,
    /// HTTP port (default 80).
    pub port: u16,
    /// Whether to use HTTPS.
    pub use_https: bool,
    /// Whether to accept untrusted TLS certificates. Off by default; the
    /// mPower firmware ships a self-signed certificate, so HTTPS setups
    /// usually need this switched on deliberately.
    pub accept_invalid_certs: bool,
    /// Optional (username, password) for the device web session.
    pub credentials: Option<(String, String)>,
    /// Interval between automatic polls.
    pub poll_interval: Duration,
    /// Per-request timeout for status fetches and commands.
    pub request_timeout: Duration,
    /// Consecutive failed polls before the device is marked unavailable.
    pub failure_threshold: u32,
    /// Backoff cap as a multiple of the poll interval.
    pub backoff_cap_factor: u32,
    /// How long an unconfirmed command stays pending before it is presumed
    /// lost. Defaults to twice the poll interval when not set.
    pub command_timeout: Option<Duration>,
    /// Delay between a successful command send and the confirming refresh,
    /// since the device's control plane may lag its sensor readout.
    pub command_refresh_delay: Duration,
}

impl DeviceConfig {
    /// Default poll interval (matches the device's own UI refresh rate).
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
    /// Default consecutive-failure threshold.
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
    /// Default backoff cap, as a multiple of the poll interval.
    pub const DEFAULT_BACKOFF_CAP_FACTOR: u32 = 10;
    /// Default delay before the post-command confirming refresh.
    pub const DEFAULT_COMMAND_REFRESH_DELAY: Duration = Duration::from_millis(250);

    /// Creates a configuration for the given host with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 80,
            use_https: false,
            accept_invalid_certs: false,
            credentials: None,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            request_timeout: Self::DEFAULT_TIMEOUT,
            failure_threshold: Self::DEFAULT_FAILURE_THRESHOLD,
            backoff_cap_factor: Self::DEFAULT_BACKOFF_CAP_FACTOR,
            command_timeout: None,
            command_refresh_delay: Self::DEFAULT_COMMAND_REFRESH_DELAY,
        }
    }

    /// Sets a custom port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables HTTPS.
    ///
    /// If the port hasn't been explicitly set, it is changed to 443.
    #[must_use]
    pub fn with_https(mut self) -> Self {
        if self.port == 80 {
            self.port = 443;
        }
        self.use_https = true;
        self
    }

    /// Accepts untrusted TLS certificates, such as the firmware's
    /// self-signed one. Only honored together with HTTPS.
    #[must_use]
    pub fn with_accept_invalid_certs(mut self) -> Self {
        self.accept_invalid_certs = true;
        self
    }

    /// Sets the device web session credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the consecutive-failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the backoff cap as a multiple of the poll interval.
    #[must_use]
    pub fn with_backoff_cap_factor(mut self, factor: u32) -> Self {
        self.backoff_cap_factor = factor;
        self
    }

    /// Sets an explicit pending-command timeout.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Sets the delay before the post-command confirming refresh.
    #[must_use]
    pub fn with_command_refresh_delay(mut self, delay: Duration) -> Self {
        self.command_refresh_delay = delay;
        self
    }

    /// Builds the base URL for the device web interface.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        let default_port = (self.use_https && self.port == 443) || (!self.use_https && self.port == 80);
        if default_port {
            format!("{scheme}://{}", self.host)
        } else {
            format!("{scheme}://{}:{}", self.host, self.port)
        }
    }

    /// Derives the backoff policy for this device.
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.poll_interval,
            self.poll_interval * self.backoff_cap_factor.max(1),
        )
    }

    /// Effective pending-command timeout (explicit or 2x the poll interval).
    #[must_use]
    pub fn effective_command_timeout(&self) -> Duration {
        self.command_timeout.unwrap_or(self.poll_interval * 2)
    }

    /// Checks that the values can drive a poll cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for an empty host, a zero poll
    /// interval, a zero request timeout or a zero failure threshold.
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfiguration("host is empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "request timeout must be non-zero".to_string(),
            ));
        }
        if self.failure_threshold == 0 {
            return Err(Error::InvalidConfiguration(
                "failure threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = DeviceConfig::new("192.168.1.40");
        assert_eq!(config.host, "192.168.1.40");
        assert_eq!(config.port, 80);
        assert!(!config.use_https);
        assert!(config.credentials.is_none());
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.failure_threshold, 3);
    }

    #[test]
    fn base_url_default_port_is_elided() {
        let config = DeviceConfig::new("192.168.1.40");
        assert_eq!(config.base_url(), "http://192.168.1.40");
    }

    #[test]
    fn base_url_custom_port() {
        let config = DeviceConfig::new("192.168.1.40").with_port(8080);
        assert_eq!(config.base_url(), "http://192.168.1.40:8080");
    }

    #[test]
    fn https_switches_default_port() {
        let config = DeviceConfig::new("192.168.1.40").with_https();
        assert_eq!(config.port, 443);
        assert_eq!(config.base_url(), "https://192.168.1.40");
    }

    #[test]
    fn https_keeps_explicit_port() {
        let config = DeviceConfig::new("192.168.1.40").with_port(8443).with_https();
        assert_eq!(config.base_url(), "https://192.168.1.40:8443");
    }

    #[test]
    fn invalid_cert_acceptance_is_opt_in() {
        let config = DeviceConfig::new("192.168.1.40").with_https();
        assert!(!config.accept_invalid_certs);

        let config = config.with_accept_invalid_certs();
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn command_timeout_defaults_to_twice_interval() {
        let config = DeviceConfig::new("h").with_poll_interval(Duration::from_secs(20));
        assert_eq!(config.effective_command_timeout(), Duration::from_secs(40));

        let config = config.with_command_timeout(Duration::from_secs(5));
        assert_eq!(config.effective_command_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn backoff_policy_uses_interval_and_cap() {
        let config = DeviceConfig::new("h")
            .with_poll_interval(Duration::from_secs(10))
            .with_backoff_cap_factor(6);
        let policy = config.backoff_policy();
        assert_eq!(policy.base(), Duration::from_secs(10));
        assert_eq!(policy.cap(), Duration::from_secs(60));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(DeviceConfig::new("").validate().is_err());
        assert!(
            DeviceConfig::new("h")
                .with_poll_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            DeviceConfig::new("h")
                .with_request_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            DeviceConfig::new("h")
                .with_failure_threshold(0)
                .validate()
                .is_err()
        );
        assert!(DeviceConfig::new("h").validate().is_ok());
    }
}
