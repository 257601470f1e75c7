// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `mPower` Lib - A Rust library to poll and control Ubiquiti mFi mPower
//! power strips.
//!
//! The library keeps one background poll coordinator per device that
//! refreshes a cached snapshot of all outlets on a fixed interval, backs off
//! an unreachable device, and lets callers switch outlets with an optimistic
//! cached update that the next poll confirms or corrects.
//!
//! # Supported Features
//!
//! - **Outlet control**: Switch individual outlets on/off with optimistic
//!   cache updates
//! - **Recurring polling**: Per-device poll loops with capped exponential
//!   backoff and single-flight request coalescing
//! - **Energy monitoring**: Power, voltage, current, power factor and
//!   accumulated energy per outlet
//! - **Availability tracking**: Consecutive-failure threshold with
//!   stale-but-present readings and change events
//!
//! # Quick Start
//!
//! ```no_run
//! use mpower_lib::{CoordinatorRegistry, DeviceConfig};
//!
//! #[tokio::main]
//! async fn main() -> mpower_lib::Result<()> {
//!     let registry = CoordinatorRegistry::new();
//!
//!     // Registering a device starts its poll loop immediately.
//!     let id = registry.add_device(
//!         DeviceConfig::new("192.168.1.40").with_credentials("ubnt", "ubnt"),
//!     )?;
//!
//!     // Wait for the first poll, then read the cached snapshot.
//!     let mut changes = registry.watch_device(id)?;
//!     changes.changed().await.ok();
//!
//!     let snapshot = registry.snapshot(id)?;
//!     for outlet in &snapshot.outlets {
//!         println!(
//!             "outlet {}: {} ({:?} W)",
//!             outlet.index,
//!             if outlet.is_on { "on" } else { "off" },
//!             outlet.power_watts,
//!         );
//!     }
//!
//!     // Switch outlet 1 on. The snapshot flips immediately (marked
//!     // pending); the follow-up poll replaces it with the device's answer.
//!     registry.request_outlet_change(id, 1, true).await?;
//!
//!     registry.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Watching a Device
//!
//! Every snapshot replacement, including optimistic command overlays, wakes
//! `watch` subscribers:
//!
//! ```no_run
//! use mpower_lib::{CoordinatorRegistry, DeviceConfig};
//!
//! # async fn example() -> mpower_lib::Result<()> {
//! let registry = CoordinatorRegistry::new();
//! let id = registry.add_device(DeviceConfig::new("192.168.1.40"))?;
//!
//! let mut changes = registry.watch_device(id)?;
//! while changes.changed().await.is_ok() {
//!     let snapshot = changes.borrow_and_update().clone();
//!     println!("available={} outlets={}", snapshot.available, snapshot.outlet_count());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
mod config;
pub mod coordinator;
pub mod error;
pub mod event;
mod registry;
pub mod state;

pub use client::{DeviceClient, HttpClient, OutletReading};
pub use config::DeviceConfig;
pub use coordinator::{BackoffPolicy, CommandDispatcher, PollCoordinator};
pub use error::{ClientError, Error, ErrorKind, Result};
pub use event::{DeviceEvent, DeviceId, EventBus};
pub use registry::CoordinatorRegistry;
pub use state::{DeviceSnapshot, OutletState, StateCache};
