//! Shared helpers for taspa-orchestrator integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use taspa_common::broker::{Broker, MemoryBroker};
use taspa_common::db::{directions, open_in_memory};
use taspa_orchestrator::{build_router, AppState};
use tower::util::ServiceExt;

pub const BOUNDARY: &str = "taspa-test-boundary";

pub struct TestApp {
    pub db: SqlitePool,
    pub broker: MemoryBroker,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let broker = MemoryBroker::new("scrape.jobs");
        Self::with_broker(broker.clone(), Arc::new(broker)).await
    }

    pub async fn with_broker(observer: MemoryBroker, broker: Arc<dyn Broker>) -> Self {
        let db = open_in_memory().await.expect("in-memory database");
        let state = AppState::new(db.clone(), broker, 1024 * 1024);
        Self { db, broker: observer, router: build_router(state) }
    }

    pub async fn direction(&self, name: &str) -> i64 {
        directions::create_direction(&self.db, name).await.expect("create direction")
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("router response")
    }
}

pub fn get(uri: &str, roles: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(roles) = roles {
        builder = builder.header("X-Roles", roles);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json(method: &str, uri: &str, roles: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(roles) = roles {
        builder = builder.header("X-Roles", roles);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn upload(uri: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("X-Roles", "developer")
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("JSON body")
}
