// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP client for the mPower web API.
//!
//! The mPower firmware exposes a small cookie-authenticated API:
//! `POST /login.cgi` establishes a session, `GET /sensors` returns the outlet
//! array and `PUT /sensors/{port}` switches a relay. Sessions expire
//! server-side, so every request transparently re-authenticates once on a
//! 401/403 before giving up with [`ClientError::Auth`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::DeviceConfig;
use crate::error::{ClientError, Error};

use super::{DeviceClient, OutletReading};

/// Envelope around the sensor array returned by `GET /sensors`.
#[derive(Debug, Deserialize)]
struct SensorsEnvelope {
    sensors: Vec<OutletReading>,
}

/// HTTP client for one mPower device.
///
/// Holds a cookie store for the device session. Cloning shares the underlying
/// connection pool and session.
///
/// # Examples
///
/// ```no_run
/// use mpower_lib::{DeviceConfig, HttpClient};
/// use mpower_lib::client::DeviceClient;
/// use std::time::Duration;
///
/// # async fn example() -> mpower_lib::Result<()> {
/// let config = DeviceConfig::new("192.168.1.40").with_credentials("ubnt", "ubnt");
/// let client = HttpClient::new(&config)?;
/// let outlets = client.fetch_status(Duration::from_secs(5)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    client: Client,
    credentials: Option<(String, String)>,
}

impl HttpClient {
    /// Creates a client from a device configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &DeviceConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(config.use_https && config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Client(ClientError::Network(e)))?;

        Ok(Self {
            base_url: config.base_url(),
            client,
            credentials: config.credentials.clone(),
        })
    }

    /// Returns the base URL of the device.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Logs in to the device, establishing a session cookie.
    async fn login(&self, timeout: Duration) -> Result<(), ClientError> {
        let Some((username, password)) = &self.credentials else {
            return Err(ClientError::Auth);
        };

        let url = format!("{}/login.cgi", self.base_url);
        tracing::debug!(url = %url, "Logging in to device");

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .form(&[("username", username.as_str()), ("password", password.as_str())])
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, timeout_ms(timeout)))?;

        if is_auth_failure(response.status()) {
            return Err(ClientError::Auth);
        }

        Ok(())
    }

    /// Sends a request, re-authenticating once if the session has expired.
    async fn send_authenticated(
        &self,
        build: impl Fn(&Client) -> reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<reqwest::Response, ClientError> {
        let response = build(&self.client)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, timeout_ms(timeout)))?;

        if !is_auth_failure(response.status()) {
            return Ok(response);
        }

        self.login(timeout).await?;

        let response = build(&self.client)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, timeout_ms(timeout)))?;

        if is_auth_failure(response.status()) {
            return Err(ClientError::Auth);
        }

        Ok(response)
    }
}

#[async_trait]
impl DeviceClient for HttpClient {
    async fn fetch_status(&self, timeout: Duration) -> Result<Vec<OutletReading>, ClientError> {
        let url = format!("{}/sensors", self.base_url);

        let response = self
            .send_authenticated(|c| c.get(&url), timeout)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Protocol(format!(
                "unexpected HTTP {} from {url}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::from_reqwest(e, timeout_ms(timeout)))?;

        tracing::trace!(body = %body, "Received sensor payload");

        let envelope: SensorsEnvelope = serde_json::from_str(&body)?;
        if envelope.sensors.is_empty() {
            return Err(ClientError::Protocol("empty sensor array".to_string()));
        }

        let mut readings = envelope.sensors;
        readings.sort_by_key(|r| r.port);
        Ok(readings)
    }

    async fn send_switch(
        &self,
        outlet: u8,
        on: bool,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        let url = format!("{}/sensors/{outlet}", self.base_url);
        let output = if on { "1" } else { "0" };

        tracing::debug!(url = %url, output, "Sending switch command");

        let response = self
            .send_authenticated(|c| c.put(&url).form(&[("output", output)]), timeout)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Protocol(format!(
                "unexpected HTTP {} from {url}",
                status.as_u16()
            )));
        }

        Ok(())
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[allow(clippy::cast_possible_truncation)]
fn timeout_ms(timeout: Duration) -> u64 {
    timeout.as_millis() as u64
}
