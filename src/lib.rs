// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Run Tracker: GPS run sessions over a per-user Firestore store
//!
//! This crate turns a stream of location fixes into a live great-circle
//! distance, times each run session, and commits session summaries to
//! Firestore. The HTTP layer hosts one tracker per client device.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::DeviceRegistry;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub devices: DeviceRegistry<FirestoreDb>,
}
