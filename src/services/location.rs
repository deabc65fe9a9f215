// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Location provider and permission seams.
//!
//! A [`LocationProvider`] hands out one event channel per watch. The hosted
//! implementation, [`PushLocationProvider`], receives fixes pushed by the
//! device over HTTP and applies the same spatial/interval filters a platform
//! provider would before forwarding them.

use crate::models::LocationFix;
use dashmap::DashMap;
use geo::{Distance, Haversine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Opaque identifier of an active provider registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchHandle(pub u64);

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options passed when registering a watch.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Minimum movement between delivered fixes (meters)
    pub min_distance_meters: f64,
    /// Requested polling interval (ms)
    pub interval_ms: u64,
    /// Minimum time between delivered fixes (ms)
    pub fastest_interval_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            min_distance_meters: 2.0,
            interval_ms: 5000,
            fastest_interval_ms: 5000,
        }
    }
}

/// Error reported by the location provider (GPS loss, revoked permission, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[error("location provider error {code}: {message}")]
pub struct ProviderError {
    pub code: u32,
    pub message: String,
}

impl ProviderError {
    pub const PERMISSION_DENIED: u32 = 1;
    pub const POSITION_UNAVAILABLE: u32 = 2;
    pub const TIMEOUT: u32 = 3;
}

/// Event delivered on a watch channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Fix(LocationFix),
    Error(ProviderError),
}

/// An active registration and its event stream.
///
/// The stream ends once the provider drops the registration.
#[derive(Debug)]
pub struct Watch {
    pub handle: WatchHandle,
    pub events: mpsc::UnboundedReceiver<PositionEvent>,
}

/// Source of position fixes.
pub trait LocationProvider {
    /// Register for fixes.
    fn watch_position(&self, options: &WatchOptions) -> Watch;

    /// Drop a registration. Unknown handles are ignored.
    fn clear_watch(&self, handle: WatchHandle);
}

/// Outcome of pushing an event into [`PushLocationProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Delivered,
    /// Dropped by the distance or interval filter
    Filtered,
    /// No such registration (never started, or already cleared)
    NoWatch,
}

struct WatchSlot {
    sender: mpsc::UnboundedSender<PositionEvent>,
    options: WatchOptions,
    last_delivered: Option<LocationFix>,
}

#[derive(Default)]
struct Registry {
    next_handle: AtomicU64,
    watches: DashMap<WatchHandle, WatchSlot>,
}

/// Provider fed by fixes the device pushes to the server.
#[derive(Clone, Default)]
pub struct PushLocationProvider {
    inner: Arc<Registry>,
}

impl PushLocationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward a fix to a watch, subject to its filters.
    pub fn push_fix(&self, handle: WatchHandle, fix: LocationFix) -> Delivery {
        let sent = {
            let Some(mut slot) = self.inner.watches.get_mut(&handle) else {
                return Delivery::NoWatch;
            };

            if let Some(last) = slot.last_delivered {
                if !passes_filters(&slot.options, &last, &fix) {
                    tracing::debug!(%handle, "Fix filtered by watch options");
                    return Delivery::Filtered;
                }
            }

            let sent = slot.sender.send(PositionEvent::Fix(fix)).is_ok();
            if sent {
                slot.last_delivered = Some(fix);
            }
            sent
        };

        if sent {
            Delivery::Delivered
        } else {
            // Receiver went away without clear_watch
            self.inner.watches.remove(&handle);
            Delivery::NoWatch
        }
    }

    /// Forward a provider error to a watch. Errors are never filtered.
    pub fn push_error(&self, handle: WatchHandle, error: ProviderError) -> Delivery {
        let sent = match self.inner.watches.get(&handle) {
            Some(slot) => slot.sender.send(PositionEvent::Error(error)).is_ok(),
            None => return Delivery::NoWatch,
        };

        if sent {
            Delivery::Delivered
        } else {
            self.inner.watches.remove(&handle);
            Delivery::NoWatch
        }
    }

    pub fn is_active(&self, handle: WatchHandle) -> bool {
        self.inner.watches.contains_key(&handle)
    }

    pub fn active_watches(&self) -> usize {
        self.inner.watches.len()
    }
}

impl LocationProvider for PushLocationProvider {
    fn watch_position(&self, options: &WatchOptions) -> Watch {
        let handle = WatchHandle(self.inner.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        let (sender, events) = mpsc::unbounded_channel();

        self.inner.watches.insert(
            handle,
            WatchSlot {
                sender,
                options: options.clone(),
                last_delivered: None,
            },
        );

        tracing::debug!(
            %handle,
            high_accuracy = options.high_accuracy,
            min_distance_meters = options.min_distance_meters,
            interval_ms = options.interval_ms,
            "Location watch registered"
        );

        Watch { handle, events }
    }

    fn clear_watch(&self, handle: WatchHandle) {
        if self.inner.watches.remove(&handle).is_some() {
            tracing::debug!(%handle, "Location watch cleared");
        }
    }
}

/// Whether `fix` is far enough, in time and space, from the last delivered fix.
fn passes_filters(options: &WatchOptions, last: &LocationFix, fix: &LocationFix) -> bool {
    let elapsed_ms = fix.timestamp_ms - last.timestamp_ms;
    if elapsed_ms < options.fastest_interval_ms as i64 {
        return false;
    }

    let moved_meters = Haversine.distance(last.point(), fix.point());
    moved_meters >= options.min_distance_meters
}

/// Result of a location permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    #[default]
    Unknown,
}

/// Grants or denies fine-location access.
pub trait PermissionBroker {
    fn request_fine_location(&self) -> PermissionStatus;
}

/// A status the device has already resolved acts as its own broker.
impl PermissionBroker for PermissionStatus {
    fn request_fine_location(&self) -> PermissionStatus {
        *self
    }
}
