// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run session tracker.
//!
//! Handles the session workflow:
//! 1. Start: register a location watch
//! 2. Each fix: persist it (best effort), update current location, append to history
//! 3. Stop: compute distance and duration, commit the result, clear history
//!
//! Identity is passed in explicitly; without a user id every remote
//! operation is skipped.
//!
//! The tracker owns the receiving end of its watch. Pending provider events
//! are applied by [`RunTracker::poll_events`], which `stop` also runs before
//! computing the result, so no delivered fix is left out of a session.

use crate::db::RunStore;
use crate::models::{Alert, LocationFix, RunHistory, RunResult};
use crate::services::distance::cumulative_distance_km;
use crate::services::location::{
    LocationProvider, PermissionBroker, PermissionStatus, PositionEvent, WatchHandle,
    WatchOptions,
};
use crate::time_utils::{elapsed_seconds, format_utc_rfc3339_millis};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// An active tracking interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSession {
    pub started_at: DateTime<Utc>,
    pub handle: WatchHandle,
}

/// Result of [`RunTracker::start`].
#[derive(Debug)]
pub enum StartOutcome {
    /// A new watch was registered; its events are applied by `poll_events`.
    Started(WatchHandle),
    /// A session is already running; its registration is untouched.
    AlreadyActive(WatchHandle),
    /// Location permission was denied at mount.
    PermissionDenied,
}

/// Result of stopping an active session.
#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    pub result: RunResult,
    /// Whether the result was committed to the store
    pub persisted: bool,
    pub alert: Option<Alert>,
}

/// Result of mounting a tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct MountOutcome {
    pub permission: PermissionStatus,
    pub alert: Option<Alert>,
    /// Number of results fetched, if a fetch ran and succeeded
    pub results_loaded: Option<usize>,
}

/// Snapshot of the tracker for display.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RunStatus {
    pub active: bool,
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub permission: PermissionStatus,
    /// Live distance over the rolling history (km, 2 decimals)
    pub total_distance_km: String,
    pub current_location: Option<LocationFix>,
    pub history_len: usize,
    pub started_at: Option<String>,
    pub last_duration_seconds: Option<f64>,
    /// Rolling history as an encoded polyline (precision 5)
    pub track_polyline: Option<String>,
}

/// Tracks one run session at a time for one screen.
pub struct RunTracker<S: RunStore, P: LocationProvider> {
    user_id: Option<String>,
    store: Arc<S>,
    provider: P,
    options: WatchOptions,
    permission: PermissionStatus,
    session: Option<RunSession>,
    /// Event stream of the active watch
    events: Option<mpsc::UnboundedReceiver<PositionEvent>>,
    history: RunHistory,
    current_location: Option<LocationFix>,
    total_distance_km: f64,
    last_duration_seconds: Option<f64>,
    results: Vec<RunResult>,
}

impl<S: RunStore, P: LocationProvider> RunTracker<S, P> {
    pub fn new(user_id: Option<String>, store: Arc<S>, provider: P, options: WatchOptions) -> Self {
        Self {
            user_id,
            store,
            provider,
            options,
            permission: PermissionStatus::Unknown,
            session: None,
            events: None,
            history: RunHistory::new(),
            current_location: None,
            total_distance_km: 0.0,
            last_duration_seconds: None,
            results: Vec::new(),
        }
    }

    // ─── Accessors ───────────────────────────────────────────────

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn session(&self) -> Option<RunSession> {
        self.session
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn permission(&self) -> PermissionStatus {
        self.permission
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub fn current_location(&self) -> Option<LocationFix> {
        self.current_location
    }

    /// Live distance over the rolling history (km, rounded to 2 decimals).
    pub fn total_distance_km(&self) -> f64 {
        self.total_distance_km
    }

    pub fn last_duration_seconds(&self) -> Option<f64> {
        self.last_duration_seconds
    }

    pub fn results(&self) -> &[RunResult] {
        &self.results
    }

    pub fn status(&self) -> RunStatus {
        let active = self.is_active();
        RunStatus {
            active,
            start_enabled: !active && self.permission != PermissionStatus::Denied,
            stop_enabled: active,
            permission: self.permission,
            total_distance_km: format!("{:.2}", self.total_distance_km),
            current_location: self.current_location,
            history_len: self.history.len(),
            started_at: self
                .session
                .map(|s| format_utc_rfc3339_millis(s.started_at)),
            last_duration_seconds: self.last_duration_seconds,
            track_polyline: self.track_polyline(),
        }
    }

    /// Rolling history encoded as a polyline, or `None` when empty.
    pub fn track_polyline(&self) -> Option<String> {
        if self.history.is_empty() {
            return None;
        }
        let coords = self.history.iter().map(|fix| geo::Coord {
            x: fix.longitude,
            y: fix.latitude,
        });
        polyline::encode_coordinates(coords, 5).ok()
    }

    // ─── Identity & Results ──────────────────────────────────────

    /// Replace the user identity. Returns `true` if it changed.
    ///
    /// Any change drops the fetched results; they belong to the previous user.
    pub fn identify(&mut self, user_id: Option<String>) -> bool {
        if self.user_id == user_id {
            return false;
        }
        tracing::info!(
            from = ?self.user_id,
            to = ?user_id,
            "Tracker identity changed"
        );
        self.user_id = user_id;
        self.results.clear();
        true
    }

    /// Replace the identity and refetch results when a user becomes available.
    pub async fn set_user(&mut self, user_id: Option<String>) -> bool {
        let changed = self.identify(user_id);
        if changed && self.user_id.is_some() {
            self.refresh_results().await;
        }
        changed
    }

    /// Fetch all results for the user and replace the local list.
    ///
    /// Returns the number fetched; `None` when skipped (no user) or failed.
    pub async fn refresh_results(&mut self) -> Option<usize> {
        let user_id = self.user_id.as_deref()?;

        match self.store.list_run_results(user_id).await {
            Ok(results) => {
                tracing::debug!(user_id, count = results.len(), "Fetched run results");
                self.results = results;
                Some(self.results.len())
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Error fetching run results");
                None
            }
        }
    }

    /// Request location permission and load past results.
    pub async fn mount(&mut self, broker: &impl PermissionBroker) -> MountOutcome {
        self.permission = broker.request_fine_location();

        let alert = match self.permission {
            PermissionStatus::Granted => {
                tracing::debug!("Location permission granted");
                None
            }
            PermissionStatus::Denied => {
                tracing::info!("Location permission denied");
                Some(Alert::permission_denied())
            }
            PermissionStatus::Unknown => None,
        };

        let results_loaded = self.refresh_results().await;

        MountOutcome {
            permission: self.permission,
            alert,
            results_loaded,
        }
    }

    // ─── Session Lifecycle ───────────────────────────────────────

    /// Start a session at `now`.
    ///
    /// Only one watch may be registered at a time; a second start is a no-op.
    pub fn start(&mut self, now: DateTime<Utc>) -> StartOutcome {
        if let Some(session) = self.session {
            tracing::debug!(handle = %session.handle, "Session already active");
            return StartOutcome::AlreadyActive(session.handle);
        }

        if self.permission == PermissionStatus::Denied {
            tracing::info!("Start refused: location permission denied");
            return StartOutcome::PermissionDenied;
        }

        let watch = self.provider.watch_position(&self.options);
        let handle = watch.handle;
        self.session = Some(RunSession {
            started_at: now,
            handle,
        });
        self.events = Some(watch.events);

        tracing::info!(
            user_id = ?self.user_id,
            %handle,
            "Run session started"
        );

        StartOutcome::Started(handle)
    }

    /// Apply every event already queued on the active watch.
    ///
    /// Returns the persistence tasks spawned for the applied fixes.
    pub fn poll_events(&mut self) -> Vec<JoinHandle<()>> {
        let Some(handle) = self.session.map(|s| s.handle) else {
            return Vec::new();
        };

        let mut tasks = Vec::new();
        while let Some(event) = self.events.as_mut().and_then(|rx| rx.try_recv().ok()) {
            tasks.extend(self.handle_event(handle, event));
        }
        tasks
    }

    /// Apply a provider event for `handle`.
    ///
    /// Events for a handle that is not the active one (queued before a stop)
    /// are dropped. For fixes, returns the detached persistence task if one
    /// was spawned.
    pub fn handle_event(
        &mut self,
        handle: WatchHandle,
        event: PositionEvent,
    ) -> Option<JoinHandle<()>> {
        if self.session.map(|s| s.handle) != Some(handle) {
            tracing::debug!(%handle, "Ignoring event for inactive watch");
            return None;
        }

        match event {
            PositionEvent::Fix(fix) => self.record_fix(fix),
            PositionEvent::Error(error) => {
                tracing::warn!(%handle, code = error.code, message = %error.message, "Location provider error");
                None
            }
        }
    }

    fn record_fix(&mut self, fix: LocationFix) -> Option<JoinHandle<()>> {
        let task = self.persist_fix(fix);

        self.current_location = Some(fix);
        self.history.push(fix);
        self.total_distance_km = cumulative_distance_km(self.history.iter());

        tracing::debug!(
            latitude = fix.latitude,
            longitude = fix.longitude,
            total_distance_km = self.total_distance_km,
            "Fix recorded"
        );

        task
    }

    /// Save a fix in the background; failures are only logged.
    fn persist_fix(&self, fix: LocationFix) -> Option<JoinHandle<()>> {
        let user_id = self.user_id.clone()?;
        let store = Arc::clone(&self.store);

        Some(tokio::spawn(async move {
            match store.add_location(&user_id, &fix).await {
                Ok(()) => tracing::debug!(user_id = %user_id, "Location saved"),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Error saving location")
                }
            }
        }))
    }

    /// Stop the active session at `now` and commit its result.
    ///
    /// Returns `None` when no session is active. Local state is reset whether
    /// or not the commit succeeds; only a successful commit is appended to
    /// the results list.
    pub async fn stop(&mut self, now: DateTime<Utc>) -> Option<StopOutcome> {
        // Fixes delivered before the stop still count
        self.poll_events();

        let session = self.session.take()?;
        self.provider.clear_watch(session.handle);
        self.events = None;

        // 1. Distance over the current history
        let total_distance_km = cumulative_distance_km(self.history.iter());
        // 2. Elapsed wall-clock time
        let duration_seconds = elapsed_seconds(session.started_at, now);

        let result = RunResult {
            total_distance_km,
            duration_seconds,
            timestamp: format_utc_rfc3339_millis(now),
        };

        // 3-4. Commit, then append locally on success
        let (persisted, alert) = match &self.user_id {
            None => {
                tracing::debug!("No user identity, run result not saved");
                (false, None)
            }
            Some(user_id) => {
                let key = result.document_key();
                match self.store.set_run_result(user_id, &key, &result).await {
                    Ok(()) => {
                        tracing::info!(
                            user_id = %user_id,
                            key = %key,
                            total_distance_km,
                            duration_seconds,
                            "Run result saved"
                        );
                        self.results.push(result.clone());
                        (true, None)
                    }
                    Err(e) => {
                        tracing::error!(user_id = %user_id, error = %e, "Error saving run result");
                        (false, Some(Alert::result_not_saved()))
                    }
                }
            }
        };

        // 5. Reset local state
        self.last_duration_seconds = Some(duration_seconds);
        self.clear_history();

        tracing::info!(handle = %session.handle, persisted, "Run session stopped");

        Some(StopOutcome {
            result,
            persisted,
            alert,
        })
    }

    /// Tear down: release any registration without committing a result.
    pub fn unmount(&mut self) {
        self.release_watch();
        self.clear_history();
    }

    fn release_watch(&mut self) {
        self.events = None;
        if let Some(session) = self.session.take() {
            self.provider.clear_watch(session.handle);
            tracing::info!(handle = %session.handle, "Location watch released on teardown");
        }
    }

    fn clear_history(&mut self) {
        self.history.clear();
        self.total_distance_km = cumulative_distance_km(self.history.iter());
    }
}

impl<S: RunStore, P: LocationProvider> Drop for RunTracker<S, P> {
    fn drop(&mut self) {
        self.release_watch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FirestoreDb;
    use crate::services::location::PushLocationProvider;

    fn offline_tracker(user_id: Option<&str>) -> RunTracker<FirestoreDb, PushLocationProvider> {
        RunTracker::new(
            user_id.map(String::from),
            Arc::new(FirestoreDb::new_mock()),
            PushLocationProvider::new(),
            WatchOptions::default(),
        )
    }

    #[test]
    fn test_new_tracker_is_idle() {
        let tracker = offline_tracker(None);
        let status = tracker.status();

        assert!(!status.active);
        assert!(status.start_enabled);
        assert!(!status.stop_enabled);
        assert_eq!(status.total_distance_km, "0.00");
        assert_eq!(status.track_polyline, None);
    }

    #[tokio::test]
    async fn test_denied_permission_disables_start() {
        let mut tracker = offline_tracker(None);
        let outcome = tracker.mount(&PermissionStatus::Denied).await;

        assert_eq!(outcome.alert, Some(Alert::permission_denied()));
        assert_eq!(outcome.results_loaded, None);
        assert!(matches!(
            tracker.start(Utc::now()),
            StartOutcome::PermissionDenied
        ));
        assert!(!tracker.status().start_enabled);
    }

    fn past_run() -> RunResult {
        RunResult {
            total_distance_km: 1.0,
            duration_seconds: 60.0,
            timestamp: "2024-01-15T10:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_identity_loss_clears_results() {
        let mut tracker = offline_tracker(Some("user-1"));
        tracker.results.push(past_run());

        assert!(!tracker.identify(Some("user-1".to_string())));
        assert_eq!(tracker.results().len(), 1);
        assert!(tracker.identify(None));
        assert!(tracker.results().is_empty());
    }

    #[tokio::test]
    async fn test_identity_switch_clears_results() {
        let mut tracker = offline_tracker(Some("user-1"));
        tracker.results.push(past_run());

        assert!(tracker.identify(Some("user-2".to_string())));
        assert!(tracker.results().is_empty());
    }

    #[tokio::test]
    async fn test_polyline_tracks_history() {
        let mut tracker = offline_tracker(None);
        let StartOutcome::Started(handle) = tracker.start(Utc::now()) else {
            panic!("expected a new session");
        };

        tracker.handle_event(handle, PositionEvent::Fix(LocationFix::new(38.5, -120.2, 0)));
        tracker.handle_event(
            handle,
            PositionEvent::Fix(LocationFix::new(40.7, -120.95, 5000)),
        );
        tracker.handle_event(
            handle,
            PositionEvent::Fix(LocationFix::new(43.252, -126.453, 10000)),
        );

        assert_eq!(
            tracker.track_polyline().as_deref(),
            Some("_p~iF~ps|U_ulLnnqC_mqNvxq`@")
        );
    }

    #[tokio::test]
    async fn test_stop_applies_queued_fixes() {
        let provider = PushLocationProvider::new();
        let mut tracker = RunTracker::new(
            None,
            Arc::new(FirestoreDb::new_mock()),
            provider.clone(),
            WatchOptions::default(),
        );
        let StartOutcome::Started(handle) = tracker.start(Utc::now()) else {
            panic!("expected a new session");
        };

        provider.push_fix(handle, LocationFix::new(10.0, 106.0, 0));
        provider.push_fix(handle, LocationFix::new(10.01, 106.0, 5000));
        assert!(tracker.history().is_empty());

        let outcome = tracker.stop(Utc::now()).await.unwrap();
        assert_eq!(outcome.result.total_distance_km, 1.11);
    }
}
