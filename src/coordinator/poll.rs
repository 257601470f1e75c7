// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-device poll coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::client::DeviceClient;
use crate::config::DeviceConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::event::{DeviceEvent, DeviceId, EventBus};
use crate::state::{DeviceSnapshot, StateCache};

use super::BackoffPolicy;
use super::dispatch::PendingCommands;

/// Maintains freshness of one device's snapshot.
///
/// One recurring task per device: the first fetch runs immediately on
/// [`start`](Self::start), subsequent fetches follow the configured interval,
/// stretched by capped exponential backoff while the device is failing.
/// [`refresh_now`](Self::refresh_now) forces an out-of-cycle fetch and is
/// coalesced with any fetch already in flight, so a device never sees two
/// concurrent status requests.
///
/// Cloning shares the same coordinator.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mpower_lib::{DeviceConfig, HttpClient};
/// use mpower_lib::coordinator::PollCoordinator;
/// use mpower_lib::event::{DeviceId, EventBus};
///
/// # fn example() -> mpower_lib::Result<()> {
/// let config = DeviceConfig::new("192.168.1.40").with_credentials("ubnt", "ubnt");
/// let client = Arc::new(HttpClient::new(&config)?);
/// let coordinator = PollCoordinator::new(DeviceId::new(), config, client, EventBus::new());
/// coordinator.start();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PollCoordinator {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) device_id: DeviceId,
    pub(crate) config: DeviceConfig,
    pub(crate) client: Arc<dyn DeviceClient>,
    pub(crate) cache: StateCache,
    pub(crate) pending: PendingCommands,
    backoff: BackoffPolicy,
    events: EventBus,
    consecutive_failures: AtomicU32,
    stopped: AtomicBool,
    /// Single-flight slot: the timer and `refresh_now` both go through it.
    fetch_lock: Mutex<()>,
    /// Bumped after every completed fetch; lets a waiting caller detect that
    /// the fetch it queued behind already produced a fresh snapshot.
    fetch_seq: AtomicU64,
    stop_notify: Notify,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl PollCoordinator {
    /// Creates a coordinator for one device. Polling starts only on
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(
        device_id: DeviceId,
        config: DeviceConfig,
        client: Arc<dyn DeviceClient>,
        events: EventBus,
    ) -> Self {
        let backoff = config.backoff_policy();
        Self {
            inner: Arc::new(Inner {
                device_id,
                config,
                client,
                cache: StateCache::new(),
                pending: PendingCommands::new(),
                backoff,
                events,
                consecutive_failures: AtomicU32::new(0),
                stopped: AtomicBool::new(false),
                fetch_lock: Mutex::new(()),
                fetch_seq: AtomicU64::new(0),
                stop_notify: Notify::new(),
                task: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Returns the device ID this coordinator polls.
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.inner.device_id
    }

    /// Returns the device configuration.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Returns the state cache for this device.
    #[must_use]
    pub fn cache(&self) -> &StateCache {
        &self.inner.cache
    }

    /// Returns the current snapshot without blocking.
    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.inner.cache.read()
    }

    /// Returns whether the device is currently considered reachable.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.cache.read().available
    }

    /// Begins the recurring poll cycle. The first fetch executes
    /// immediately, not after one full interval. Idempotent.
    pub fn start(&self) {
        let mut task = self.inner.task.lock();
        if task.is_some() || self.is_stopped() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(run(inner)));
    }

    /// Stops the poll cycle.
    ///
    /// The pending inter-poll delay is cancelled promptly; a fetch already in
    /// flight is allowed to complete but its result is discarded. Terminal:
    /// a stopped coordinator cannot be restarted.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.stop_notify.notify_waiters();
        if let Some(task) = self.inner.task.lock().take() {
            drop(task);
        }
        tracing::debug!(device_id = %self.inner.device_id, "Coordinator stopped");
    }

    /// Returns whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Forces an out-of-cycle fetch and returns the resulting snapshot.
    ///
    /// If a fetch for this device is already in flight, no second request is
    /// issued; this call waits for the in-flight result and returns the same
    /// snapshot every coalesced caller sees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] if the coordinator has been stopped.
    pub async fn refresh_now(&self) -> Result<DeviceSnapshot> {
        if self.is_stopped() {
            return Err(Error::Stopped);
        }
        self.inner.refresh_coalesced().await;
        Ok(self.inner.cache.read())
    }
}

impl std::fmt::Debug for PollCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollCoordinator")
            .field("device_id", &self.inner.device_id)
            .field("host", &self.inner.config.host)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Runs one fetch through the single-flight slot.
    ///
    /// A caller that queued behind an in-flight fetch finds the sequence
    /// number advanced once it acquires the lock and returns without issuing
    /// a duplicate request.
    pub(crate) async fn refresh_coalesced(&self) {
        let seq_before = self.fetch_seq.load(Ordering::Acquire);
        let _guard = self.fetch_lock.lock().await;
        if self.fetch_seq.load(Ordering::Acquire) != seq_before {
            return;
        }
        if self.is_stopped() {
            return;
        }
        self.fetch_once().await;
        self.fetch_seq.fetch_add(1, Ordering::Release);
    }

    /// Performs one fetch and folds the result into the cache.
    async fn fetch_once(&self) {
        let fetched_at = Utc::now();
        let result = self.client.fetch_status(self.config.request_timeout).await;

        // A stop may have landed while the request was on the wire.
        if self.is_stopped() {
            tracing::debug!(device_id = %self.device_id, "Discarding fetch result after stop");
            return;
        }

        let was_available = self.cache.read().available;

        match result {
            Ok(readings) => {
                self.consecutive_failures.store(0, Ordering::Release);
                let snapshot = DeviceSnapshot::from_readings(readings, fetched_at);
                self.pending
                    .reconcile(&snapshot, self.config.effective_command_timeout());
                self.cache.replace(snapshot);

                tracing::debug!(device_id = %self.device_id, "Poll succeeded");
                self.events.publish(DeviceEvent::SnapshotUpdated {
                    device_id: self.device_id,
                    fetched_at,
                });
                if !was_available {
                    self.events.publish(DeviceEvent::AvailabilityChanged {
                        device_id: self.device_id,
                        available: true,
                        last_error: None,
                    });
                }
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                let kind = e.kind();
                let available =
                    was_available && kind.is_transient() && failures < self.config.failure_threshold;
                self.cache.record_failure(kind, available);

                tracing::warn!(
                    device_id = %self.device_id,
                    error = %e,
                    consecutive_failures = failures,
                    "Poll failed"
                );
                if was_available && !available {
                    self.events.publish(DeviceEvent::AvailabilityChanged {
                        device_id: self.device_id,
                        available: false,
                        last_error: Some(kind),
                    });
                }
            }
        }
    }

    /// Delay before the next automatic poll.
    fn next_delay(&self) -> Duration {
        let failures = self.consecutive_failures.load(Ordering::Acquire);
        if failures == 0 {
            return self.backoff.base();
        }
        // Retrying rejected credentials cannot succeed without external
        // action; park at the cap instead of hammering the device.
        if self.cache.read().last_error == Some(ErrorKind::Auth) {
            return self.backoff.cap();
        }
        self.backoff.delay(failures)
    }
}

/// The recurring poll task for one device.
async fn run(inner: Arc<Inner>) {
    tracing::debug!(device_id = %inner.device_id, host = %inner.config.host, "Poll loop started");

    loop {
        if inner.is_stopped() {
            break;
        }
        inner.refresh_coalesced().await;
        if inner.is_stopped() {
            break;
        }

        let delay = inner.next_delay();
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = inner.stop_notify.notified() => break,
        }
    }

    tracing::debug!(device_id = %inner.device_id, "Poll loop exited");
}
