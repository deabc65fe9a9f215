//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

use crate::error::AppError;
use crate::models::{LocationFix, RunResult};
use std::future::Future;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Per-user fix log (`users/{uid}/locations`)
    pub const LOCATIONS: &str = "locations";
    /// Per-user session summaries (`users/{uid}/dailyDistances`)
    pub const DAILY_DISTANCES: &str = "dailyDistances";
}

/// Remote storage used by the run tracker.
///
/// All operations are scoped to one user's sub-collections.
pub trait RunStore: Send + Sync + 'static {
    /// Append a fix to the user's location log.
    fn add_location(
        &self,
        user_id: &str,
        fix: &LocationFix,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Write a session summary, merging into any existing document with the same key.
    fn set_run_result(
        &self,
        user_id: &str,
        key: &str,
        result: &RunResult,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Read every session summary for the user (unordered).
    fn list_run_results(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<RunResult>, AppError>> + Send;
}
