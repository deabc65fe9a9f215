// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use run_tracker::config::Config;
use run_tracker::db::{FirestoreDb, RunStore};
use run_tracker::error::AppError;
use run_tracker::models::{LocationFix, RunResult};
use run_tracker::routes::create_router;
use run_tracker::services::{DeviceRegistry, PushLocationProvider};
use run_tracker::AppState;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a test app with an offline database.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>) {
    let config = Config::test_default();
    let devices = DeviceRegistry::new(
        Arc::new(test_db_offline()),
        PushLocationProvider::new(),
        config.watch.clone(),
        config.max_devices,
    );

    let state = Arc::new(AppState { config, devices });

    (create_router(state.clone()), state)
}

/// Create a signed identity token for `user_id` using the test config key.
#[allow(dead_code)]
pub fn test_token(user_id: &str) -> String {
    run_tracker::middleware::auth::create_jwt(user_id, &Config::test_default().jwt_signing_key)
        .expect("Failed to create test JWT")
}

/// Send a JSON request and decode the JSON response (Null for empty bodies).
#[allow(dead_code)]
pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// In-memory [`RunStore`] with switchable failures.
#[allow(dead_code)]
#[derive(Default)]
pub struct MemoryStore {
    locations: Mutex<HashMap<String, Vec<LocationFix>>>,
    results: Mutex<HashMap<String, BTreeMap<String, RunResult>>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn locations(&self, user_id: &str) -> Vec<LocationFix> {
        self.locations
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stored_results(&self, user_id: &str) -> BTreeMap<String, RunResult> {
        self.results
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn insert_result(&self, user_id: &str, result: RunResult) {
        self.results
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .insert(result.document_key(), result);
    }
}

impl RunStore for MemoryStore {
    async fn add_location(&self, user_id: &str, fix: &LocationFix) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("simulated write failure".to_string()));
        }
        self.locations
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push(*fix);
        Ok(())
    }

    async fn set_run_result(
        &self,
        user_id: &str,
        key: &str,
        result: &RunResult,
    ) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("simulated write failure".to_string()));
        }
        self.results
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .insert(key.to_string(), result.clone());
        Ok(())
    }

    async fn list_run_results(&self, user_id: &str) -> Result<Vec<RunResult>, AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Database("simulated read failure".to_string()));
        }
        Ok(self.stored_results(user_id).into_values().collect())
    }
}
