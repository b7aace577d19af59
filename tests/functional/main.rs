// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for admission dispatch over HTTP.
//!
//! These tests assemble a `WebhookRouter` into the axum router the server
//! would serve and drive it with `tower::ServiceExt::oneshot`. No listener,
//! TLS material or cluster is required.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_mutation_returns_json_patch
//! ```
//!
//! ## Test Categories
//!
//! - **Admission tests**: typed and generic paths, HTTP status mapping, uid echo
//! - **Composite tests**: chained validation and converging mutation end to end

#[path = "../common/fixtures.rs"]
mod fixtures;

mod composite_tests;

use std::sync::Arc;

use admission_webhook_runtime::webhooks::{AdmissionResponse, AdmissionReview};
use admission_webhook_runtime::{DynamicObject, HealthState};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
use tower::ServiceExt;

pub use fixtures::*;

/// Response captured from one request
pub struct Reply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Reply {
    /// Body decoded as an admission review
    pub fn review(&self) -> AdmissionReview<DynamicObject> {
        serde_json::from_slice(&self.body).expect("body is an admission review")
    }

    /// Response carried in the admission review body
    pub fn response(&self) -> AdmissionResponse {
        self.review().response.expect("review carries a response")
    }

    /// JSON patch carried in the response
    pub fn patch(&self) -> json_patch::Patch {
        let raw = self.response().patch.expect("response carries a patch");
        serde_json::from_slice(&raw).expect("patch is a JSON patch")
    }

    /// Body decoded as loose JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("body is JSON")
    }

    /// Body as text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// POST `body` to `path` with the given content type
pub async fn post(
    app: &Router,
    path: &str,
    content_type: Option<&str>,
    body: Vec<u8>,
) -> Reply {
    let mut request = Request::post(path);
    if let Some(content_type) = content_type {
        request = request.header(CONTENT_TYPE, content_type);
    }
    send(app, request.body(Body::from(body)).unwrap()).await
}

/// POST an admission review as `application/json`
pub async fn admit(app: &Router, path: &str, review: ReviewBuilder) -> Reply {
    post(app, path, Some("application/json"), review.body()).await
}

/// GET `path`
pub async fn get(app: &Router, path: &str) -> Reply {
    send(app, Request::get(path).body(Body::empty()).unwrap()).await
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    Reply {
        status,
        content_type,
        body,
    }
}

/// Fresh health state for a router under test
pub fn health() -> Arc<HealthState> {
    Arc::new(HealthState::new())
}
