//! HTTP client API tests driven through the router with `oneshot`.

#![cfg(all(feature = "server", feature = "sqlite"))]

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{app_state, LICENSE_KEY, PRODUCT_GUID};
use serde_json::{json, Value};
use regserver::server::build_router;
use regserver::server::logging::REQUEST_ID_HEADER;
use regserver::server::AppState;
use tower::ServiceExt;

/// Send a request and return status, `X-Request-Id` presence and the JSON body.
async fn send(
    state: &AppState,
    method: &str,
    uri: &str,
    license_key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, bool, Value) {
    let body_bytes = body
        .map(|v| serde_json::to_vec(&v).unwrap())
        .unwrap_or_default();

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(key) = license_key {
        builder = builder.header("X-License-Key", key);
    }
    let request = builder.body(Body::from(body_bytes)).unwrap();

    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let has_request_id = response.headers().contains_key(REQUEST_ID_HEADER);

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));

    (status, has_request_id, body)
}

fn activation(code: &str) -> Option<Value> {
    Some(json!({ "machineCode": code, "userName": "alice" }))
}

#[tokio::test]
async fn activate_returns_pascal_case_entitlement() {
    let (state, _) = app_state(2).await;

    let (status, has_request_id, body) = send(
        &state,
        "POST",
        "/api/v1/activate",
        Some(LICENSE_KEY),
        activation("M1"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(has_request_id);
    assert_eq!(body["UserName"], "alice");
    assert_eq!(body["UserCompany"], "Acme Corp");
    assert_eq!(body["MachineCode"], "M1");
    assert_eq!(body["ProductGUID"], PRODUCT_GUID);
    assert_eq!(body["LicenseKey"], LICENSE_KEY);
    assert_eq!(body["Features"]["Edition"], "Pro");
    assert!(body["RegistrationHash"].as_str().is_some_and(|h| !h.is_empty()));
}

#[tokio::test]
async fn activate_requires_a_known_license_key() {
    let (state, _) = app_state(1).await;

    let (status, _, body) = send(&state, "POST", "/api/v1/activate", None, activation("M1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "MISSING_LICENSE_KEY");

    let (status, _, body) = send(
        &state,
        "POST",
        "/api/v1/activate",
        Some("NOT-A-KEY"),
        activation("M1"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_LICENSE_KEY");
}

#[tokio::test]
async fn full_license_answers_conflict_with_usage() {
    let (state, _) = app_state(1).await;

    let (status, _, _) = send(
        &state,
        "POST",
        "/api/v1/activate",
        Some(LICENSE_KEY),
        activation("M1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(
        &state,
        "POST",
        "/api/v1/activate",
        Some(LICENSE_KEY),
        activation("M2"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "SEAT_LIMIT_EXCEEDED");
    assert_eq!(body["error"]["details"]["in_use"], 1);
    assert_eq!(body["error"]["details"]["seat_count"], 1);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("1 of 1"));
}

#[tokio::test]
async fn blank_machine_code_is_a_bad_request() {
    let (state, _) = app_state(1).await;

    let (status, _, body) = send(
        &state,
        "POST",
        "/api/v1/activate",
        Some(LICENSE_KEY),
        activation(""),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FIELD");
}

#[tokio::test]
async fn malformed_body_uses_the_error_envelope() {
    let (state, _) = app_state(1).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/activate")
        .header("Content-Type", "application/json")
        .header("X-License-Key", LICENSE_KEY)
        .body(Body::from(r#"{"machineCode": "M1""#))
        .unwrap();
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");

    let uri = format!("/api/v1/license/{LICENSE_KEY}");
    let (status, _, body) = send(
        &state,
        "PUT",
        &uri,
        None,
        Some(json!({ "machineCode": "M1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn license_info_and_version_report() {
    let (state, _) = app_state(3).await;
    send(
        &state,
        "POST",
        "/api/v1/activate",
        Some(LICENSE_KEY),
        activation("M1"),
    )
    .await;

    let uri = format!("/api/v1/license/{LICENSE_KEY}");
    let (status, _, body) = send(&state, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["CustomerName"], "Acme Corp");
    assert_eq!(body["ProductName"], "Widget");
    assert_eq!(body["LicenseCount"], 3);
    assert_eq!(body["LicensesAvailable"], 2);

    let (status, _, body) = send(
        &state,
        "PUT",
        &uri,
        None,
        Some(json!({ "machineCode": "M1", "installedVersion": "1.3.0" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["LatestVersion"], "1.4.0");

    let (status, _, body) = send(
        &state,
        "PUT",
        &uri,
        None,
        Some(json!({ "machineCode": "M1", "installedVersion": "1.3" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FIELD");

    let (status, _, body) = send(
        &state,
        "PUT",
        &uri,
        None,
        Some(json!({ "machineCode": "M9", "installedVersion": "1.3.0" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unknown_license_is_not_found() {
    let (state, _) = app_state(1).await;

    let (status, _, body) = send(&state, "GET", "/api/v1/license/NOPE", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "LICENSE_NOT_FOUND");
}

#[tokio::test]
async fn product_version_endpoint() {
    let (state, _) = app_state(1).await;

    let uri = format!("/api/v1/productver/{PRODUCT_GUID}");
    let (status, _, body) = send(&state, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["LatestVersion"], "1.4.0");
    assert_eq!(body["DownloadURL"], common::DOWNLOAD_URL);

    let (status, _, _) = send(&state, "GET", "/api/v1/productver/unknown", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_probes() {
    let (state, _) = app_state(1).await;

    let (status, _, body) = send(&state, "GET", "/livez", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, body) = send(&state, "GET", "/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["database_connected"], true);
}
