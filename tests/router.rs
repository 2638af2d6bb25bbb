//! HTTP surface driven through the router.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use persistence_endpoints::{
    build_router, load_from_str, resolve, AppState, InMemoryCollection, InMemoryStore, StaticTokenAuthorizer,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const ENDPOINTS: &str = r#"[
    {
        "modelName": "Test1",
        "find": {"max": 10},
        "delete": {"removeRefs": [{"modelName": "Test2", "field": "test1"}]}
    },
    {
        "modelName": "Test2",
        "create": {"bindWithToken": {"tokenKey": "userId", "recordKey": "owner"}},
        "find": {"bindWithToken": {"tokenKey": "userId", "recordKey": "owner"}, "isSecure": true},
        "update": {"isSecure": true}
    }
]"#;

fn app() -> Router {
    let store = InMemoryStore::new();
    store.register(InMemoryCollection::new("Test1"));
    store.register(InMemoryCollection::new("Test2").with_relation("test1", "Test1"));
    let endpoints = resolve(&load_from_str(ENDPOINTS).unwrap(), &store).unwrap();
    let authorizer = StaticTokenAuthorizer::new()
        .with_token("t1", json!({"userId": "u1"}).as_object().cloned().unwrap())
        .with_token("t2", json!({"userId": "u2"}).as_object().cloned().unwrap());
    let state = AppState::new(Arc::new(store), Arc::new(authorizer));
    build_router(state, endpoints, 64 * 1024)
}

fn encode(raw: &str) -> String {
    raw.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn health_and_version() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
    let (status, _) = call(&app, Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, Method::GET, "/version", None, None).await;
    assert_eq!(body["name"], json!("persistence-endpoints"));
}

#[tokio::test]
async fn create_then_find_by_path_id() {
    let app = app();
    let (status, body) = call(&app, Method::POST, "/api/test-1/create", None, Some(json!({"prop1": "a"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["record"]["_id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::GET, &format!("/api/test-1/find/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["record"]["prop1"], json!("a"));
    assert_eq!(body["data"]["totalRecords"], json!(1));
    assert_eq!(body["data"]["totalPages"], Value::Null);

    let (_, body) = call(&app, Method::GET, "/api/test-1/find?perPage=1&page=1", None, None).await;
    assert_eq!(body["data"]["records"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["totalPages"], json!(1));
    assert_eq!(body["data"]["perPage"], json!(1));
}

#[tokio::test]
async fn user_errors_carry_their_message() {
    let app = app();
    let id = "0f8e6a2c-58c1-4c1e-9a55-0d5d0a3f5a01";
    let uri = format!("/api/test-1/find/{}?filters={}", id, encode(r#"{"prop1":"a"}"#));
    let (status, body) = call(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().starts_with("\"ids\" or \"filters\" may be used, not both."));

    let (status, body) = call(&app, Method::GET, "/api/test-1/find/nope", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], json!("One or more ID is not valid."));

    let (status, body) = call(&app, Method::DELETE, "/api/test-1/delete", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], json!("\"ids\" or \"filters\" are required."));

    let (status, body) = call(&app, Method::PATCH, "/api/test-1/update", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], json!("\"body\" is required."));
}

#[tokio::test]
async fn scoped_and_secure_routes() {
    let app = app();
    let (status, body) = call(&app, Method::POST, "/api/test-2/create", None, Some(json!({"v": 1}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], json!("Token is invalid."));

    let (status, body) = call(&app, Method::POST, "/api/test-2/create", Some("t1"), Some(json!({"owner": "u2"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["record"]["owner"], json!("u1"));

    let (status, _) = call(&app, Method::GET, "/api/test-2/find", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, body) = call(&app, Method::GET, "/api/test-2/find", Some("t2"), None).await;
    assert_eq!(body["data"]["totalRecords"], json!(0));
    let (_, body) = call(&app, Method::GET, "/api/test-2/find", Some("t1"), None).await;
    assert_eq!(body["data"]["totalRecords"], json!(1));

    let (status, _) = call(&app, Method::PATCH, "/api/test-2/update", Some("bad"), Some(json!({"v": 2}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn delete_reports_count_and_clears_references() {
    let app = app();
    let (_, body) = call(&app, Method::POST, "/api/test-1/create", None, Some(json!([{"p": 1}, {"p": 2}]))).await;
    let ids: Vec<String> = body["data"]["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["_id"].as_str().unwrap().to_string())
        .collect();
    let (_, body) = call(&app, Method::POST, "/api/test-2/create", Some("t1"), Some(json!({"test1": ids[0]}))).await;
    let holder = body["data"]["record"]["_id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::DELETE, &format!("/api/test-1/delete/{}", ids.join(",")), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deletedCount"], json!(2));

    let uri = format!("/api/test-2/find/{}", holder);
    let (_, body) = call(&app, Method::GET, &uri, Some("t1"), None).await;
    assert_eq!(body["data"]["record"]["test1"], Value::Null);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = app();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/test-1/create")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{bad"))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
