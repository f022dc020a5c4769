use super::common::*;
use crate::workflows::booking::router::booking_router;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

fn build_router() -> axum::Router {
    let (service, _, _, _) = build_service();
    booking_router(service)
}

async fn dispatch(router: &axum::Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
        .expect("router dispatch");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    let payload = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, payload)
}

#[tokio::test]
async fn post_applications_returns_the_pending_view() {
    let router = build_router();
    let (status, payload) = dispatch(
        &router,
        "POST",
        "/api/v1/events/18010/applications",
        json!({ "cid": ALICE.0, "position": 1, "block": 1 }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payload["status"], json!("pending"));
    assert_eq!(payload["callsign"], json!("SBGR_TWR"));
}

#[tokio::test]
async fn eligibility_failures_are_reported_specifically() {
    let router = build_router();
    let (status, payload) = dispatch(
        &router,
        "POST",
        "/api/v1/events/18010/applications",
        json!({ "cid": CAROL.0, "position": 1, "block": 1 }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(payload["error"]
        .as_str()
        .unwrap_or_default()
        .contains("below the"));
}

#[tokio::test]
async fn concurrency_conflicts_collapse_to_a_retry_hint_for_candidates() {
    let router = build_router();
    let (_, view) = dispatch(
        &router,
        "POST",
        "/api/v1/events/18010/applications",
        json!({ "cid": ALICE.0, "position": 1, "block": 1 }),
    )
    .await;
    let id = view["id"].as_u64().expect("application id");

    let (status, _) = dispatch(
        &router,
        "POST",
        &format!("/api/v1/events/18010/applications/{id}/select"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, payload) = dispatch(
        &router,
        "POST",
        "/api/v1/events/18010/applications",
        json!({ "cid": BOB.0, "position": 1, "block": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(payload["error"], json!("slot state changed, please try again"));
}

#[tokio::test]
async fn admin_selection_conflicts_stay_specific() {
    let router = build_router();
    let (_, view) = dispatch(
        &router,
        "POST",
        "/api/v1/events/18010/applications",
        json!({ "cid": ALICE.0, "position": 1, "block": 1 }),
    )
    .await;
    let id = view["id"].as_u64().expect("application id");

    dispatch(
        &router,
        "POST",
        &format!("/api/v1/events/18010/applications/{id}/select"),
        json!({}),
    )
    .await;
    let (status, payload) = dispatch(
        &router,
        "POST",
        &format!("/api/v1/events/18010/applications/{id}/select"),
        json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(payload["error"]
        .as_str()
        .unwrap_or_default()
        .contains("no longer actionable"));
}

#[tokio::test]
async fn unknown_event_is_a_plain_not_found() {
    let router = build_router();
    let (status, _) = dispatch(&router, "GET", "/api/v1/events/99999", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
