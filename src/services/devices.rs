// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-device tracker registry.
//!
//! Each client screen mounts a tracker under its device id. Input the device
//! pushes (fixes, provider errors) is handed to the provider and applied to
//! the tracker under the tracker's lock, so a delivered fix is part of the
//! history by the time the request returns.
//!
//! The registry holds at most `max_devices` trackers. Mounting a new device
//! when full evicts the least recently used tracker without a running
//! session; if every tracker is running, the mount is refused.

use crate::db::RunStore;
use crate::error::{AppError, Result};
use crate::models::LocationFix;
use crate::services::location::{
    Delivery, PermissionBroker, ProviderError, PushLocationProvider, WatchHandle, WatchOptions,
};
use crate::services::tracker::{MountOutcome, RunTracker, StartOutcome, StopOutcome};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Tracker hosted for one device.
pub type DeviceTracker<S> = RunTracker<S, PushLocationProvider>;

/// Shared handle to a hosted tracker.
pub type SharedTracker<S> = Arc<Mutex<DeviceTracker<S>>>;

/// Result of a start request as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartResult {
    Started(WatchHandle),
    AlreadyActive(WatchHandle),
    PermissionDenied,
}

struct DeviceSlot<S: RunStore> {
    tracker: SharedTracker<S>,
    last_used: Instant,
}

/// Registry of mounted trackers keyed by device id.
pub struct DeviceRegistry<S: RunStore> {
    store: Arc<S>,
    provider: PushLocationProvider,
    options: WatchOptions,
    max_devices: usize,
    trackers: DashMap<String, DeviceSlot<S>>,
}

impl<S: RunStore> DeviceRegistry<S> {
    pub fn new(
        store: Arc<S>,
        provider: PushLocationProvider,
        options: WatchOptions,
        max_devices: usize,
    ) -> Self {
        Self {
            store,
            provider,
            options,
            max_devices,
            trackers: DashMap::new(),
        }
    }

    pub fn provider(&self) -> &PushLocationProvider {
        &self.provider
    }

    pub fn mounted_devices(&self) -> usize {
        self.trackers.len()
    }

    /// Mount (or remount) a device: set identity, request permission, fetch results.
    pub async fn mount(
        &self,
        device_id: &str,
        user_id: Option<String>,
        broker: &impl PermissionBroker,
    ) -> Result<MountOutcome> {
        let tracker = match self.touch(device_id) {
            Some(tracker) => tracker,
            None => {
                self.make_room()?;
                self.trackers
                    .entry(device_id.to_string())
                    .or_insert_with(|| {
                        tracing::info!(device_id, "Mounting tracker");
                        DeviceSlot {
                            tracker: Arc::new(Mutex::new(RunTracker::new(
                                None,
                                Arc::clone(&self.store),
                                self.provider.clone(),
                                self.options.clone(),
                            ))),
                            last_used: Instant::now(),
                        }
                    })
                    .tracker
                    .clone()
            }
        };

        let mut tracker = tracker.lock().await;
        tracker.identify(user_id);
        Ok(tracker.mount(broker).await)
    }

    /// Look up a mounted tracker.
    pub fn tracker(&self, device_id: &str) -> Result<SharedTracker<S>> {
        self.touch(device_id)
            .ok_or_else(|| AppError::NotFound(format!("Device {} is not mounted", device_id)))
    }

    /// Look up a mounted tracker and bring its identity up to date.
    pub async fn identified_tracker(
        &self,
        device_id: &str,
        user_id: Option<String>,
    ) -> Result<SharedTracker<S>> {
        let tracker = self.tracker(device_id)?;
        tracker.lock().await.set_user(user_id).await;
        Ok(tracker)
    }

    /// Start a session on a device.
    pub async fn start(
        &self,
        device_id: &str,
        user_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<StartResult> {
        let tracker = self.identified_tracker(device_id, user_id).await?;
        let outcome = tracker.lock().await.start(now);

        Ok(match outcome {
            StartOutcome::Started(handle) => StartResult::Started(handle),
            StartOutcome::AlreadyActive(handle) => StartResult::AlreadyActive(handle),
            StartOutcome::PermissionDenied => StartResult::PermissionDenied,
        })
    }

    /// Stop the session on a device. `None` if nothing was running.
    pub async fn stop(
        &self,
        device_id: &str,
        user_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<StopOutcome>> {
        let tracker = self.identified_tracker(device_id, user_id).await?;
        let mut tracker = tracker.lock().await;
        Ok(tracker.stop(now).await)
    }

    /// Deliver a fix from the device to its active watch.
    pub async fn deliver_fix(&self, device_id: &str, fix: LocationFix) -> Result<Delivery> {
        let tracker = self.tracker(device_id)?;
        let mut tracker = tracker.lock().await;

        let Some(session) = tracker.session() else {
            return Ok(Delivery::NoWatch);
        };
        let delivery = self.provider.push_fix(session.handle, fix);
        tracker.poll_events();
        Ok(delivery)
    }

    /// Deliver a provider error from the device to its active watch.
    pub async fn deliver_error(&self, device_id: &str, error: ProviderError) -> Result<Delivery> {
        let tracker = self.tracker(device_id)?;
        let mut tracker = tracker.lock().await;

        let Some(session) = tracker.session() else {
            return Ok(Delivery::NoWatch);
        };
        let delivery = self.provider.push_error(session.handle, error);
        tracker.poll_events();
        Ok(delivery)
    }

    /// Unmount a device, releasing any active watch. Returns `false` if it
    /// was not mounted.
    pub async fn unmount(&self, device_id: &str) -> bool {
        let Some((_, slot)) = self.trackers.remove(device_id) else {
            return false;
        };
        slot.tracker.lock().await.unmount();
        tracing::info!(device_id, "Tracker unmounted");
        true
    }

    /// Fetch a tracker and mark it as recently used.
    fn touch(&self, device_id: &str) -> Option<SharedTracker<S>> {
        let mut slot = self.trackers.get_mut(device_id)?;
        slot.last_used = Instant::now();
        Some(Arc::clone(&slot.tracker))
    }

    /// Ensure there is room for one more tracker.
    fn make_room(&self) -> Result<()> {
        if self.trackers.len() < self.max_devices {
            return Ok(());
        }

        // Trackers that are locked right now are in use; leave them alone
        let victim = self
            .trackers
            .iter()
            .filter(|slot| is_idle(&slot.tracker))
            .min_by_key(|slot| slot.last_used)
            .map(|slot| slot.key().clone());

        let evicted = victim.and_then(|device_id| {
            self.trackers
                .remove_if(&device_id, |_, slot| is_idle(&slot.tracker))
        });

        match evicted {
            Some((device_id, _)) => {
                tracing::info!(device_id = %device_id, "Evicted idle tracker");
                Ok(())
            }
            None => {
                tracing::warn!(
                    max_devices = self.max_devices,
                    "Device limit reached, mount refused"
                );
                Err(AppError::Unavailable(
                    "Too many devices are tracking right now".to_string(),
                ))
            }
        }
    }
}

/// Not locked and not running a session.
fn is_idle<S: RunStore>(tracker: &SharedTracker<S>) -> bool {
    tracker
        .try_lock()
        .map(|tracker| !tracker.is_active())
        .unwrap_or(false)
}
