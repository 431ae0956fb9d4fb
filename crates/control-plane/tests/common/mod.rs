// Shared helpers for control plane integration tests
// Tests run against the in-memory backend; no external services required.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use vigil_control_plane::{
    auth::{AuditRecorder, AuthConfig, AuthState},
    build_router,
    storage::{AuditLogFilter, AuditLogRow, StorageBackend},
};
use vigil_core::{ClassifierClient, MemoryNotifier};

pub struct TestApp {
    pub router: Router,
    pub auth: AuthState,
    pub notifier: Arc<MemoryNotifier>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AuthConfig::for_tests(), "http://127.0.0.1:1")
    }

    pub fn with_config(config: AuthConfig, classifier_url: &str) -> Self {
        let db = StorageBackend::in_memory();
        let (audit, _task) = AuditRecorder::spawn(db.clone(), config.audit_queue_capacity);
        let notifier = Arc::new(MemoryNotifier::new());
        let auth = AuthState::new(config, db, audit, notifier.clone());
        let classifier = ClassifierClient::new(classifier_url, Duration::from_secs(2)).unwrap();

        Self {
            router: build_router(auth.clone(), classifier),
            auth,
            notifier,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    /// POST a body verbatim, for malformed payloads
    pub async fn post_raw(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, None, Some(body)).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn register(&self, username: &str, password: &str, role: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/auth/register",
                serde_json::json!({ "username": username, "password": password, "role": role }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body
    }

    /// Log in and return the response body (tokens + user)
    pub async fn login(&self, username: &str, password: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/auth/login",
                serde_json::json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body
    }

    /// Register then log in, returning the access token
    pub async fn access_token_for(&self, username: &str, role: &str) -> String {
        self.register(username, "pw123456", role).await;
        self.login(username, "pw123456").await["accessToken"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Every audit entry written so far, newest first
    pub async fn audit_log(&self) -> Vec<AuditLogRow> {
        self.auth.audit.flush().await;
        self.auth
            .db
            .list_audit_logs(&AuditLogFilter {
                limit: 1000,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub async fn audit_actions(&self) -> Vec<String> {
        self.audit_log()
            .await
            .into_iter()
            .map(|row| row.action)
            .collect()
    }
}
