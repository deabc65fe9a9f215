// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device run-tracking routes.
//!
//! The device mounts a tracker, pushes provider fixes and errors as they
//! arrive, and drives the start/stop affordances.

use crate::error::{AppError, Result};
use crate::middleware::auth::Identity;
use crate::models::{Alert, LocationFix, RunResult};
use crate::services::devices::StartResult;
use crate::services::location::{Delivery, PermissionStatus, ProviderError};
use crate::services::tracker::RunStatus;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const MAX_DEVICE_ID_LEN: usize = 128;

/// Device routes (identity is optional).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/devices/{device_id}",
            put(mount_device).delete(unmount_device),
        )
        .route("/api/devices/{device_id}/run", get(get_status))
        .route("/api/devices/{device_id}/run/start", post(start_run))
        .route("/api/devices/{device_id}/run/stop", post(stop_run))
        .route("/api/devices/{device_id}/fixes", post(post_fix))
        .route(
            "/api/devices/{device_id}/provider-errors",
            post(post_provider_error),
        )
        .route("/api/devices/{device_id}/results", get(get_results))
}

/// Reject device ids that are empty, overlong, or contain unexpected characters.
fn validate_device_id(device_id: &str) -> Result<()> {
    let valid = !device_id.is_empty()
        && device_id.len() <= MAX_DEVICE_ID_LEN
        && device_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Invalid device id: {:?}",
            device_id
        )))
    }
}

// ─── Result Views ────────────────────────────────────────────

/// A past run, formatted for display.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RunResultView {
    pub total_distance_km: String,
    pub duration_seconds: String,
    pub duration_display: String,
    pub date: String,
    pub timestamp: String,
}

impl From<&RunResult> for RunResultView {
    fn from(result: &RunResult) -> Self {
        Self {
            total_distance_km: format!("{:.2}", result.total_distance_km),
            duration_seconds: format!("{:.2}", result.duration_seconds),
            duration_display: result.formatted_duration(),
            date: result.date().to_string(),
            timestamp: result.timestamp.clone(),
        }
    }
}

// ─── Mount / Unmount ─────────────────────────────────────────

#[derive(Deserialize)]
struct MountRequest {
    /// Outcome of the device's location permission prompt
    #[serde(default)]
    location_permission: PermissionStatus,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MountResponse {
    pub permission: PermissionStatus,
    pub alert: Option<Alert>,
    pub results_loaded: Option<usize>,
    pub status: RunStatus,
}

/// Mount a tracker for the device, request permission and load past results.
async fn mount_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<MountRequest>,
) -> Result<Json<MountResponse>> {
    validate_device_id(&device_id)?;

    tracing::info!(
        device_id = %device_id,
        user_id = ?identity.user_id,
        permission = ?body.location_permission,
        "Mount requested"
    );

    let outcome = state
        .devices
        .mount(&device_id, identity.user_id, &body.location_permission)
        .await?;
    let status = state.devices.tracker(&device_id)?.lock().await.status();

    Ok(Json(MountResponse {
        permission: outcome.permission,
        alert: outcome.alert,
        results_loaded: outcome.results_loaded,
        status,
    }))
}

/// Tear down the device's tracker, releasing any active watch.
async fn unmount_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<StatusCode> {
    validate_device_id(&device_id)?;

    if state.devices.unmount(&device_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "Device {} is not mounted",
            device_id
        )))
    }
}

// ─── Session ─────────────────────────────────────────────────

/// Current run state for the device.
async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<RunStatus>> {
    validate_device_id(&device_id)?;

    let tracker = state
        .devices
        .identified_tracker(&device_id, identity.user_id)
        .await?;
    let status = tracker.lock().await.status();
    Ok(Json(status))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum StartState {
    Started,
    AlreadyActive,
    PermissionDenied,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StartResponse {
    pub outcome: StartState,
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub watch_handle: Option<u64>,
    pub alert: Option<Alert>,
    pub status: RunStatus,
}

/// Start a run session.
async fn start_run(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<StartResponse>> {
    validate_device_id(&device_id)?;

    let started = state
        .devices
        .start(&device_id, identity.user_id, chrono::Utc::now())
        .await?;

    let (outcome, watch_handle, alert) = match started {
        StartResult::Started(handle) => (StartState::Started, Some(handle.0), None),
        StartResult::AlreadyActive(handle) => (StartState::AlreadyActive, Some(handle.0), None),
        StartResult::PermissionDenied => (
            StartState::PermissionDenied,
            None,
            Some(Alert::permission_denied()),
        ),
    };

    let status = state.devices.tracker(&device_id)?.lock().await.status();

    Ok(Json(StartResponse {
        outcome,
        watch_handle,
        alert,
        status,
    }))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StopResponse {
    pub stopped: bool,
    pub result: Option<RunResultView>,
    pub persisted: bool,
    pub alert: Option<Alert>,
    pub status: RunStatus,
}

/// Stop the run session and commit its result.
async fn stop_run(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<StopResponse>> {
    validate_device_id(&device_id)?;

    let stopped = state
        .devices
        .stop(&device_id, identity.user_id, chrono::Utc::now())
        .await?;
    let status = state.devices.tracker(&device_id)?.lock().await.status();

    let response = match stopped {
        Some(outcome) => StopResponse {
            stopped: true,
            result: Some(RunResultView::from(&outcome.result)),
            persisted: outcome.persisted,
            alert: outcome.alert,
            status,
        },
        None => StopResponse {
            stopped: false,
            result: None,
            persisted: false,
            alert: None,
            status,
        },
    };

    Ok(Json(response))
}

// ─── Provider Input ──────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeliveryResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub delivery: Delivery,
}

/// Accept a fix from the device's location hardware.
async fn post_fix(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Json(fix): Json<LocationFix>,
) -> Result<Json<DeliveryResponse>> {
    validate_device_id(&device_id)?;
    fix.validate()
        .map_err(|e| AppError::BadRequest(format!("Invalid fix: {}", e)))?;

    let delivery = state.devices.deliver_fix(&device_id, fix).await?;

    tracing::debug!(device_id = %device_id, ?delivery, "Fix received");

    Ok(Json(DeliveryResponse { delivery }))
}

/// Accept an error report from the device's location hardware.
async fn post_provider_error(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Json(error): Json<ProviderError>,
) -> Result<Json<DeliveryResponse>> {
    validate_device_id(&device_id)?;

    let delivery = state.devices.deliver_error(&device_id, error).await?;

    Ok(Json(DeliveryResponse { delivery }))
}

// ─── Results ─────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ResultsResponse {
    pub results: Vec<RunResultView>,
}

/// Past run results for display.
async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ResultsResponse>> {
    validate_device_id(&device_id)?;

    let tracker = state
        .devices
        .identified_tracker(&device_id, identity.user_id)
        .await?;
    let results = tracker
        .lock()
        .await
        .results()
        .iter()
        .map(RunResultView::from)
        .collect();

    Ok(Json(ResultsResponse { results }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_device_id() {
        assert!(validate_device_id("pixel-7_a1").is_ok());
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id("../etc").is_err());
        assert!(validate_device_id(&"a".repeat(MAX_DEVICE_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_result_view_formats_for_display() {
        let result = RunResult {
            total_distance_km: 1.1,
            duration_seconds: 3725.0,
            timestamp: "2024-01-15T10:00:05.000Z".to_string(),
        };
        let view = RunResultView::from(&result);

        assert_eq!(view.total_distance_km, "1.10");
        assert_eq!(view.duration_seconds, "3725.00");
        assert_eq!(view.duration_display, "1h 2m 5s");
        assert_eq!(view.date, "2024-01-15");
    }
}
