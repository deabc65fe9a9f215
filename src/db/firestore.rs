// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Locations (append-only fix log per user)
//! - Daily distances (run session summaries per user)

use crate::db::{collections, RunStore};
use crate::error::AppError;
use crate::models::run::RUN_RESULT_FIELDS;
use crate::models::{LocationFix, RunResult};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator rejects real credentials, so connect unauthenticated.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Location Operations ─────────────────────────────────────

    /// Append a fix to `users/{user_id}/locations` with a generated document ID.
    pub async fn add_location(&self, user_id: &str, fix: &LocationFix) -> Result<(), AppError> {
        let client = self.get_client()?;
        let parent = client
            .parent_path(collections::USERS, user_id)
            .map_err(|e| AppError::Database(e.to_string()))?;

        let _: LocationFix = client
            .fluent()
            .insert()
            .into(collections::LOCATIONS)
            .generate_document_id()
            .parent(&parent)
            .object(fix)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get every logged fix for a user (unordered).
    pub async fn list_locations(&self, user_id: &str) -> Result<Vec<LocationFix>, AppError> {
        let client = self.get_client()?;
        let parent = client
            .parent_path(collections::USERS, user_id)
            .map_err(|e| AppError::Database(e.to_string()))?;

        client
            .fluent()
            .select()
            .from(collections::LOCATIONS)
            .parent(&parent)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Run Result Operations ───────────────────────────────────

    /// Store a run result at `users/{user_id}/dailyDistances/{key}`.
    ///
    /// Only the result fields are written (update mask), so other fields on an
    /// existing document survive.
    pub async fn set_run_result(
        &self,
        user_id: &str,
        key: &str,
        result: &RunResult,
    ) -> Result<(), AppError> {
        let client = self.get_client()?;
        let parent = client
            .parent_path(collections::USERS, user_id)
            .map_err(|e| AppError::Database(e.to_string()))?;

        let _: RunResult = client
            .fluent()
            .update()
            .fields(RUN_RESULT_FIELDS)
            .in_col(collections::DAILY_DISTANCES)
            .document_id(key)
            .parent(&parent)
            .object(result)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get a single run result by document key.
    pub async fn get_run_result(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<RunResult>, AppError> {
        let client = self.get_client()?;
        let parent = client
            .parent_path(collections::USERS, user_id)
            .map_err(|e| AppError::Database(e.to_string()))?;

        client
            .fluent()
            .select()
            .by_id_in(collections::DAILY_DISTANCES)
            .parent(&parent)
            .obj()
            .one(key)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get all run results for a user.
    ///
    /// Unbounded read; Firestore returns documents in key order.
    pub async fn list_run_results(&self, user_id: &str) -> Result<Vec<RunResult>, AppError> {
        let client = self.get_client()?;
        let parent = client
            .parent_path(collections::USERS, user_id)
            .map_err(|e| AppError::Database(e.to_string()))?;

        client
            .fluent()
            .select()
            .from(collections::DAILY_DISTANCES)
            .parent(&parent)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

impl RunStore for FirestoreDb {
    async fn add_location(&self, user_id: &str, fix: &LocationFix) -> Result<(), AppError> {
        FirestoreDb::add_location(self, user_id, fix).await
    }

    async fn set_run_result(
        &self,
        user_id: &str,
        key: &str,
        result: &RunResult,
    ) -> Result<(), AppError> {
        FirestoreDb::set_run_result(self, user_id, key, result).await
    }

    async fn list_run_results(&self, user_id: &str) -> Result<Vec<RunResult>, AppError> {
        FirestoreDb::list_run_results(self, user_id).await
    }
}
