//! Router-level tests over paths that resolve before any database I/O:
//! route/entity/relation lookup, query validation, body shape validation.
//! The pool is lazy and never connects.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chirp_server::{common_routes, entity_routes, social_model, AppState};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;

fn app() -> Router {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/never_connected")
        .expect("lazy pool");
    let state = AppState {
        pool,
        model: Arc::new(social_model()),
    };
    Router::new()
        .merge(common_routes(state.clone()))
        .nest("/api", entity_routes(state))
}

async fn send(req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app().oneshot(req).await.expect("infallible");
    let status = resp.status();
    let body = resp.into_body().collect().await.expect("body").to_bytes();
    (status, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

fn json(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn health_and_version_respond() {
    let (status, _) = send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(get("/version")).await;
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["name"], "chirp-server");
}

#[tokio::test]
async fn unknown_entity_is_404_with_empty_body() {
    let (status, body) = send(get("/api/accounts")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());

    let (status, _) = send(json("POST", "/api/accounts", "{}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_sort_field_is_400() {
    let (status, body) = send(get("/api/tweets?sort_by=popularity")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["error"]["code"], "invalid_query");
}

#[tokio::test]
async fn bad_pagination_is_400() {
    let (status, _) = send(get("/api/users?take=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(get("/api/users?skip=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_relation_is_404() {
    let (status, _) = send(get("/api/tweets/t1/bookmarks")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // connect on a to_one relation: not a collection, so not a route either
    let (status, _) = send(json("POST", "/api/tweets/t1/user?id=u1", "")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disconnect_body_must_be_an_array() {
    let (status, _) = send(json("DELETE", "/api/tweets/t1/likes", r#"{"id":"l1"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_body_must_be_an_object() {
    let (status, _) = send(json("POST", "/api/tweets", "[1,2]")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_missing_required_fields_is_422() {
    let (status, body) = send(json("POST", "/api/users", r#"{"username":"alice"}"#)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["error"]["code"], "validation_error");
}

#[tokio::test]
async fn oversized_field_is_422() {
    let long = "x".repeat(1001);
    let body = format!(r#"{{"content":"{}"}}"#, long);
    let (status, _) = send(json("PATCH", "/api/tweets/t1", &body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
