// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity middleware tests.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::{create_test_app, send_json, test_token};

#[tokio::test]
async fn test_requests_without_token_are_anonymous() {
    let (app, state) = create_test_app();

    let (status, _) = send_json(
        &app,
        "PUT",
        "/api/devices/tablet",
        None,
        Some(json!({ "location_permission": "granted" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let tracker = state.devices.tracker("tablet").unwrap();
    assert_eq!(tracker.lock().await.user_id(), None);
}

#[tokio::test]
async fn test_valid_bearer_token_sets_identity() {
    let (app, state) = create_test_app();
    let token = test_token("runner-9");

    let (status, _) = send_json(
        &app,
        "PUT",
        "/api/devices/tablet",
        Some(&token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let tracker = state.devices.tracker("tablet").unwrap();
    assert_eq!(tracker.lock().await.user_id(), Some("runner-9"));
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let (app, state) = create_test_app();

    let (status, _) = send_json(
        &app,
        "PUT",
        "/api/devices/tablet",
        Some("not.a.jwt"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(state.devices.mounted_devices(), 0);
}

#[tokio::test]
async fn test_token_signed_with_other_key_is_rejected() {
    let (app, _state) = create_test_app();
    let forged = run_tracker::middleware::auth::create_jwt(
        "runner-9",
        b"some_other_key_that_is_long_enough",
    )
    .unwrap();

    let (status, _) = send_json(&app, "GET", "/api/devices/tablet/run", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_bearer_authorization_is_rejected() {
    let (app, _state) = create_test_app();

    let request = Request::builder()
        .method("GET")
        .uri("/api/devices/tablet/run")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_cookie_is_accepted() {
    let (app, state) = create_test_app();
    let token = test_token("runner-9");

    let request = Request::builder()
        .method("PUT")
        .uri("/api/devices/tablet")
        .header(
            header::COOKIE,
            format!("{}={}", run_tracker::middleware::auth::TOKEN_COOKIE, token),
        )
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let tracker = state.devices.tracker("tablet").unwrap();
    assert_eq!(tracker.lock().await.user_id(), Some("runner-9"));
}

#[tokio::test]
async fn test_cors_preflight_allows_frontend() {
    let (app, _state) = create_test_app();

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/devices/tablet/run/start")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
}
