// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The coordinator registry, the top-level entry point of the crate.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};

use crate::client::{DeviceClient, HttpClient};
use crate::config::DeviceConfig;
use crate::coordinator::{CommandDispatcher, PollCoordinator};
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, DeviceId, EventBus};
use crate::state::{DeviceSnapshot, OutletState};

/// Everything the registry keeps per device.
#[derive(Clone)]
struct DeviceHandle {
    coordinator: PollCoordinator,
    dispatcher: CommandDispatcher,
}

/// Owns the poll coordinators for a set of devices.
///
/// Adding a device spins up its coordinator and starts polling immediately;
/// removing it stops the coordinator and drops its state. All accessors are
/// non-blocking reads against the per-device cache, so callers never wait on
/// a poll in progress.
///
/// The registry is cheap to clone and can be shared across tasks; clones
/// operate on the same device set.
///
/// # Examples
///
/// ```no_run
/// use mpower_lib::{CoordinatorRegistry, DeviceConfig};
///
/// # async fn example() -> mpower_lib::Result<()> {
/// let registry = CoordinatorRegistry::new();
/// let id = registry.add_device(
///     DeviceConfig::new("192.168.1.40").with_credentials("ubnt", "ubnt"),
/// )?;
///
/// let snapshot = registry.snapshot(id)?;
/// if snapshot.available {
///     registry.request_outlet_change(id, 1, true).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CoordinatorRegistry {
    devices: Arc<RwLock<HashMap<DeviceId, DeviceHandle>>>,
    events: EventBus,
}

impl CoordinatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            events: EventBus::new(),
        }
    }

    /// Adds a device reached over HTTP and starts polling it.
    ///
    /// Returns the ID under which the device is registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the configuration fails
    /// validation, or an error from the HTTP client constructor.
    pub fn add_device(&self, config: DeviceConfig) -> Result<DeviceId> {
        config.validate()?;
        let client = Arc::new(HttpClient::new(&config)?);
        self.add_device_with_client(config, client)
    }

    /// Adds a device with a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the configuration fails
    /// validation.
    pub fn add_device_with_client(
        &self,
        config: DeviceConfig,
        client: Arc<dyn DeviceClient>,
    ) -> Result<DeviceId> {
        config.validate()?;
        let device_id = DeviceId::new();
        let host = config.host.clone();
        let coordinator = PollCoordinator::new(device_id, config, client, self.events.clone());
        let dispatcher = CommandDispatcher::new(coordinator.clone());
        coordinator.start();

        self.devices.write().insert(
            device_id,
            DeviceHandle {
                coordinator,
                dispatcher,
            },
        );

        tracing::info!(%device_id, %host, "Device added");
        self.events.publish(DeviceEvent::DeviceAdded { device_id });
        Ok(device_id)
    }

    /// Removes a device and stops its coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the ID is not registered.
    pub fn remove_device(&self, device_id: DeviceId) -> Result<()> {
        let handle = self
            .devices
            .write()
            .remove(&device_id)
            .ok_or(Error::DeviceNotFound(device_id))?;
        handle.coordinator.stop();

        tracing::info!(%device_id, "Device removed");
        self.events.publish(DeviceEvent::DeviceRemoved { device_id });
        Ok(())
    }

    /// Returns the current snapshot for a device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the ID is not registered.
    pub fn snapshot(&self, device_id: DeviceId) -> Result<DeviceSnapshot> {
        Ok(self.handle(device_id)?.coordinator.snapshot())
    }

    /// Returns the cached state of one outlet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown device and
    /// [`Error::OutletOutOfRange`] for an outlet the device has not reported.
    pub fn outlet_state(&self, device_id: DeviceId, outlet: u8) -> Result<OutletState> {
        let snapshot = self.snapshot(device_id)?;
        snapshot
            .outlet(outlet)
            .cloned()
            .ok_or(Error::OutletOutOfRange {
                index: outlet,
                count: snapshot.outlet_count(),
            })
    }

    /// Returns whether a device is currently considered reachable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the ID is not registered.
    pub fn is_device_available(&self, device_id: DeviceId) -> Result<bool> {
        Ok(self.handle(device_id)?.coordinator.is_available())
    }

    /// Forces an out-of-cycle poll of a device and returns the fresh snapshot.
    ///
    /// Coalesced with any fetch already in flight for that device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the ID is not registered, or
    /// [`Error::Stopped`] if the device is being removed concurrently.
    pub async fn refresh_device(&self, device_id: DeviceId) -> Result<DeviceSnapshot> {
        let coordinator = self.handle(device_id)?.coordinator;
        coordinator.refresh_now().await
    }

    /// Switches one outlet of a device on or off.
    ///
    /// The cached state flips optimistically before the command is sent; see
    /// [`CommandDispatcher::set_outlet`] for the full semantics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown device, plus the
    /// dispatch errors of [`CommandDispatcher::set_outlet`].
    pub async fn request_outlet_change(
        &self,
        device_id: DeviceId,
        outlet: u8,
        on: bool,
    ) -> Result<()> {
        let dispatcher = self.handle(device_id)?.dispatcher;
        dispatcher.set_outlet(outlet, on).await
    }

    /// Subscribes to snapshot replacements for one device.
    ///
    /// The receiver holds the current snapshot and wakes on every change,
    /// including optimistic command overlays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the ID is not registered.
    pub fn watch_device(&self, device_id: DeviceId) -> Result<watch::Receiver<DeviceSnapshot>> {
        Ok(self.handle(device_id)?.coordinator.cache().subscribe())
    }

    /// Subscribes to lifecycle and availability events across all devices.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Returns the IDs of all registered devices.
    #[must_use]
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.read().keys().copied().collect()
    }

    /// Returns the number of registered devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }

    /// Stops every coordinator and clears the registry.
    pub fn shutdown(&self) {
        let handles: Vec<(DeviceId, DeviceHandle)> = self.devices.write().drain().collect();
        for (device_id, handle) in handles {
            handle.coordinator.stop();
            self.events.publish(DeviceEvent::DeviceRemoved { device_id });
        }
        tracing::info!("Registry shut down");
    }

    fn handle(&self, device_id: DeviceId) -> Result<DeviceHandle> {
        self.devices
            .read()
            .get(&device_id)
            .cloned()
            .ok_or(Error::DeviceNotFound(device_id))
    }
}

impl Default for CoordinatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CoordinatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorRegistry")
            .field("device_count", &self.device_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::coordinator::testing::{MockClient, ScriptedFetch};
    use crate::error::ErrorKind;

    fn test_config() -> DeviceConfig {
        DeviceConfig::new("test-device").with_poll_interval(Duration::from_secs(10))
    }

    fn one_outlet_client(on: bool) -> Arc<MockClient> {
        Arc::new(MockClient::new(vec![ScriptedFetch::Ok(vec![
            MockClient::reading(1, on),
        ])]))
    }

    #[tokio::test(start_paused = true)]
    async fn add_device_starts_polling() {
        let registry = CoordinatorRegistry::new();
        let client = one_outlet_client(true);
        let id = registry
            .add_device_with_client(test_config(), Arc::clone(&client) as Arc<dyn DeviceClient>)
            .unwrap();

        let mut changes = registry.watch_device(id).unwrap();
        changes.changed().await.unwrap();

        assert!(registry.is_device_available(id).unwrap());
        assert!(registry.outlet_state(id, 1).unwrap().is_on);
        assert!(client.fetch_calls() >= 1);
    }

    #[tokio::test]
    async fn add_device_rejects_invalid_config() {
        let registry = CoordinatorRegistry::new();
        let result = registry.add_device_with_client(
            DeviceConfig::new(""),
            one_outlet_client(false) as Arc<dyn DeviceClient>,
        );
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
        assert_eq!(registry.device_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_device_stops_and_forgets() {
        let registry = CoordinatorRegistry::new();
        let id = registry
            .add_device_with_client(test_config(), one_outlet_client(true) as Arc<dyn DeviceClient>)
            .unwrap();
        assert_eq!(registry.device_count(), 1);

        registry.remove_device(id).unwrap();
        assert_eq!(registry.device_count(), 0);
        assert!(matches!(
            registry.snapshot(id),
            Err(Error::DeviceNotFound(_))
        ));
        assert!(matches!(
            registry.remove_device(id),
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_device_returns_fresh_snapshot() {
        let registry = CoordinatorRegistry::new();
        let id = registry
            .add_device_with_client(test_config(), one_outlet_client(false) as Arc<dyn DeviceClient>)
            .unwrap();

        let snapshot = registry.refresh_device(id).await.unwrap();
        assert!(snapshot.available);
        assert!(!snapshot.outlet(1).unwrap().is_on);
    }

    #[tokio::test(start_paused = true)]
    async fn outlet_state_unknown_index() {
        let registry = CoordinatorRegistry::new();
        let id = registry
            .add_device_with_client(test_config(), one_outlet_client(true) as Arc<dyn DeviceClient>)
            .unwrap();
        registry.refresh_device(id).await.unwrap();

        assert!(matches!(
            registry.outlet_state(id, 5),
            Err(Error::OutletOutOfRange { index: 5, count: 1 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn request_outlet_change_flows_through_dispatcher() {
        let registry = CoordinatorRegistry::new();
        let client = one_outlet_client(false);
        let id = registry
            .add_device_with_client(test_config(), Arc::clone(&client) as Arc<dyn DeviceClient>)
            .unwrap();
        registry.refresh_device(id).await.unwrap();

        registry.request_outlet_change(id, 1, true).await.unwrap();
        assert_eq!(client.switch_calls(), vec![(1, true)]);
        assert!(registry.outlet_state(id, 1).unwrap().is_on);
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_events_are_published() {
        let registry = CoordinatorRegistry::new();
        let mut events = registry.subscribe();

        let id = registry
            .add_device_with_client(test_config(), one_outlet_client(true) as Arc<dyn DeviceClient>)
            .unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            DeviceEvent::DeviceAdded { device_id } if device_id == id
        ));

        registry.remove_device(id).unwrap();
        // Poll events may interleave with removal.
        loop {
            match events.recv().await.unwrap() {
                DeviceEvent::DeviceRemoved { device_id } => {
                    assert_eq!(device_id, id);
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_device_reports_last_error() {
        let registry = CoordinatorRegistry::new();
        let client = Arc::new(MockClient::new(vec![ScriptedFetch::Auth]));
        let id = registry
            .add_device_with_client(test_config(), client as Arc<dyn DeviceClient>)
            .unwrap();

        let snapshot = registry.refresh_device(id).await.unwrap();
        assert!(!snapshot.available);
        assert_eq!(snapshot.last_error, Some(ErrorKind::Auth));
        assert!(!registry.is_device_available(id).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything() {
        let registry = CoordinatorRegistry::new();
        let a = registry
            .add_device_with_client(test_config(), one_outlet_client(true) as Arc<dyn DeviceClient>)
            .unwrap();
        let b = registry
            .add_device_with_client(test_config(), one_outlet_client(false) as Arc<dyn DeviceClient>)
            .unwrap();
        assert_eq!(registry.device_count(), 2);

        registry.shutdown();
        assert_eq!(registry.device_count(), 0);
        assert!(registry.snapshot(a).is_err());
        assert!(registry.snapshot(b).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_the_device_set() {
        let registry = CoordinatorRegistry::new();
        let clone = registry.clone();
        let id = registry
            .add_device_with_client(test_config(), one_outlet_client(true) as Arc<dyn DeviceClient>)
            .unwrap();
        assert_eq!(clone.device_count(), 1);
        assert!(clone.device_ids().contains(&id));
    }
}
