// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polling and command coordination for one device.
//!
//! The [`PollCoordinator`] owns the recurring poll cycle: it refreshes the
//! state cache, classifies failures and backs off an unreachable device. The
//! [`CommandDispatcher`] rides on top of it, applying optimistic outlet
//! updates that the next authoritative poll reconciles.
//!
//! Both the timer and [`PollCoordinator::refresh_now`] feed one single-flight
//! fetch slot, so a device never sees overlapping status requests.

mod backoff;
mod dispatch;
mod poll;

pub use backoff::BackoffPolicy;
pub use dispatch::CommandDispatcher;
pub use poll::PollCoordinator;

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted device client for coordinator tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::client::{DeviceClient, OutletReading};
    use crate::error::ClientError;

    /// One scripted `fetch_status` outcome.
    #[derive(Debug, Clone)]
    pub enum ScriptedFetch {
        Ok(Vec<OutletReading>),
        Timeout,
        Auth,
        Protocol,
    }

    /// Device client driven by a script; repeats the last entry when the
    /// script runs out so background poll loops stay deterministic.
    pub struct MockClient {
        fetches: parking_lot::Mutex<VecDeque<ScriptedFetch>>,
        fetch_calls: AtomicUsize,
        fetch_delay: parking_lot::Mutex<Option<Duration>>,
        switch_calls: parking_lot::Mutex<Vec<(u8, bool)>>,
        fail_switch: parking_lot::Mutex<Option<ScriptedFetch>>,
    }

    impl MockClient {
        pub fn new(script: Vec<ScriptedFetch>) -> Self {
            Self {
                fetches: parking_lot::Mutex::new(script.into()),
                fetch_calls: AtomicUsize::new(0),
                fetch_delay: parking_lot::Mutex::new(None),
                switch_calls: parking_lot::Mutex::new(Vec::new()),
                fail_switch: parking_lot::Mutex::new(None),
            }
        }

        pub fn with_fetch_delay(self, delay: Duration) -> Self {
            *self.fetch_delay.lock() = Some(delay);
            self
        }

        pub fn failing_switches(self, failure: ScriptedFetch) -> Self {
            *self.fail_switch.lock() = Some(failure);
            self
        }

        pub fn fetch_calls(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }

        pub fn switch_calls(&self) -> Vec<(u8, bool)> {
            self.switch_calls.lock().clone()
        }

        pub fn reading(port: u8, on: bool) -> OutletReading {
            OutletReading {
                port,
                output: on,
                power: Some(if on { 12.5 } else { 0.0 }),
                voltage: Some(230.0),
                current: None,
                power_factor: None,
                energy: None,
            }
        }

        fn to_error(entry: &ScriptedFetch) -> ClientError {
            match entry {
                ScriptedFetch::Timeout => ClientError::Timeout(1000),
                ScriptedFetch::Auth => ClientError::Auth,
                ScriptedFetch::Protocol => ClientError::Protocol("scripted".to_string()),
                ScriptedFetch::Ok(_) => unreachable!("not an error entry"),
            }
        }
    }

    #[async_trait]
    impl DeviceClient for MockClient {
        async fn fetch_status(
            &self,
            _timeout: Duration,
        ) -> Result<Vec<OutletReading>, ClientError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.fetch_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let entry = {
                let mut fetches = self.fetches.lock();
                if fetches.len() > 1 {
                    fetches.pop_front().expect("non-empty")
                } else {
                    fetches.front().cloned().expect("script must not be empty")
                }
            };

            match entry {
                ScriptedFetch::Ok(readings) => Ok(readings),
                other => Err(Self::to_error(&other)),
            }
        }

        async fn send_switch(
            &self,
            outlet: u8,
            on: bool,
            _timeout: Duration,
        ) -> Result<(), ClientError> {
            let failure = self.fail_switch.lock().clone();
            if let Some(entry) = failure {
                return Err(Self::to_error(&entry));
            }
            self.switch_calls.lock().push((outlet, on));
            Ok(())
        }
    }
}
