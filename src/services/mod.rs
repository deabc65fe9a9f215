// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod devices;
pub mod distance;
pub mod location;
pub mod tracker;

pub use devices::DeviceRegistry;
pub use location::{LocationProvider, PermissionBroker, PushLocationProvider};
pub use tracker::RunTracker;
