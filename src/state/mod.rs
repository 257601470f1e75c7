// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state: immutable snapshots and the per-device cache.
//!
//! A [`DeviceSnapshot`] is a fully-formed view of one device's outlets at a
//! point in time; the [`StateCache`] replaces it wholesale so that readers
//! always observe either the prior or the new snapshot, never a mix.

mod cache;
mod snapshot;

pub use cache::StateCache;
pub use snapshot::{DeviceSnapshot, OutletState};
