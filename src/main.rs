// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run Tracker API Server
//!
//! Hosts one run tracker per client device and commits session summaries to
//! Firestore.

use run_tracker::{
    config::Config,
    db::FirestoreDb,
    services::{DeviceRegistry, PushLocationProvider},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Run Tracker API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id).await?;

    let provider = PushLocationProvider::new();
    let devices = DeviceRegistry::new(
        Arc::new(db),
        provider,
        config.watch.clone(),
        config.max_devices,
    );
    tracing::info!(
        max_devices = config.max_devices,
        min_distance_meters = config.watch.min_distance_meters,
        interval_ms = config.watch.interval_ms,
        high_accuracy = config.watch.high_accuracy,
        "Device registry initialized"
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        devices,
    });

    // Build router
    let app = run_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("run_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
