mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceExt;
use wanderer_server::routes::create_api_router;

fn app() -> axum::Router {
    let state = support::test_state();
    create_api_router(state.clone()).with_state(state)
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

fn request_json<T: Serialize>(method: &str, uri: &str, body: &T) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ping_and_health_are_reachable() {
    let app = app();

    let response = app.clone().oneshot(request("GET", "/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["active_subscriptions"], 0);
}

#[tokio::test]
async fn subscription_create_list_delete_round_trip() {
    let app = app();

    let create_req = request_json(
        "POST",
        "/api/v1/subscriptions",
        &json!({
            "subscriber_id": "alice",
            "system_ids": [30000142],
            "callback_url": "https://example.invalid/webhook",
        }),
    );
    let response = app.clone().oneshot(create_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert!(body["subscription_id"].is_string());

    let response = app.clone().oneshot(request("GET", "/api/v1/subscriptions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = app.clone().oneshot(request("DELETE", "/api/v1/subscriptions/alice")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.oneshot(request("DELETE", "/api/v1/subscriptions/alice")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn subscription_create_rejects_empty_entity_ids() {
    let app = app();

    let response = app
        .oneshot(request_json(
            "POST",
            "/api/v1/subscriptions",
            &json!({
                "subscriber_id": "bob",
                "callback_url": "https://example.invalid/webhook",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn system_kill_count_defaults_to_zero_for_unseen_system() {
    let app = app();
    let response = app.oneshot(request("GET", "/system_kill_count/30000142")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn killfeed_rejects_malformed_client_id() {
    let app = app();
    let response = app
        .oneshot(request("GET", "/api/killfeed?client_id=not!valid&systems=30000142"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
