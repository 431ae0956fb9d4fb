// Router-level tests for the authentication and session API
// Run with: cargo test -p vigil-control-plane --test auth_routes

mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::time::Duration;
use vigil_control_plane::auth::{jwt::AccessTokenClaims, AuthConfig};
use vigil_core::Role;

async fn wait_for_reset_token(app: &TestApp, username: &str) -> String {
    for _ in 0..100 {
        if let Some(notice) = app.notifier.last_for(username) {
            return notice.token;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no reset notice delivered for {username}");
}

// =============================================================================
// Registration and login
// =============================================================================

#[tokio::test]
async fn test_alice_role_scenario() {
    let app = TestApp::new();

    let body = app.register("alice", "pw123456", "user").await;
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["user"].get("passwordHash").is_none());

    let (status, body) = app
        .post(
            "/api/auth/login",
            json!({ "username": "alice", "password": "pw123456", "roleRequested": "user" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].as_str().is_some());
    assert!(body["refreshToken"].as_str().is_some());
    assert_eq!(body["user"]["role"], "user");

    let (status, body) = app
        .post(
            "/api/auth/login",
            json!({ "username": "alice", "password": "pw123456", "roleRequested": "admin" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ROLE_MISMATCH");

    let actions = app.audit_actions().await;
    assert_eq!(
        actions,
        vec!["LOGIN_ROLE_MISMATCH", "LOGIN_SUCCESS", "REGISTER"]
    );
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_bad_input() {
    let app = TestApp::new();
    app.register("bob", "pw123456", "commander").await;

    let (status, body) = app
        .post(
            "/api/auth/register",
            json!({ "username": "bob", "password": "another-pw", "role": "user" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_USERNAME");

    let (status, body) = app
        .post(
            "/api/auth/register",
            json!({ "username": "carol", "password": "pw123456", "role": "superuser" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .post(
            "/api/auth/register",
            json!({ "username": "carol", "password": "short", "role": "user" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post("/api/auth/register", json!({ "username": "carol" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let failures = app
        .audit_actions()
        .await
        .into_iter()
        .filter(|a| a == "REGISTER_FAILED")
        .count();
    // The body without a password never reaches the handler
    assert_eq!(failures, 3);
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let app = TestApp::new();
    let (status, body) = app.post_raw("/api/auth/login", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_signup_can_be_disabled() {
    let config = AuthConfig {
        disable_signup: true,
        ..AuthConfig::for_tests()
    };
    let app = TestApp::with_config(config, "http://127.0.0.1:1");

    let (status, body) = app
        .post(
            "/api/auth/register",
            json!({ "username": "dave", "password": "pw123456", "role": "user" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "SIGNUP_DISABLED");
}

#[tokio::test]
async fn test_login_does_not_reveal_usernames() {
    let app = TestApp::new();
    app.register("erin", "pw123456", "user").await;

    let (unknown_status, unknown) = app
        .post(
            "/api/auth/login",
            json!({ "username": "nobody", "password": "pw123456" }),
        )
        .await;
    let (wrong_status, wrong) = app
        .post(
            "/api/auth/login",
            json!({ "username": "erin", "password": "wrong-password" }),
        )
        .await;

    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, wrong);
    assert_eq!(wrong["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_sixth_login_attempt_is_rate_limited() {
    let app = TestApp::new();
    app.register("frank", "pw123456", "user").await;

    for _ in 0..5 {
        let (status, _) = app
            .post(
                "/api/auth/login",
                json!({ "username": "frank", "password": "wrong-password" }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Correct password, but the window is exhausted
    let (status, body) = app
        .post(
            "/api/auth/login",
            json!({ "username": "frank", "password": "pw123456" }),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");

    let actions = app.audit_actions().await;
    assert_eq!(actions[0], "LOGIN_RATE_LIMITED");
    assert_eq!(actions.iter().filter(|a| *a == "LOGIN_FAILED").count(), 5);
}

// =============================================================================
// Refresh rotation and logout
// =============================================================================

#[tokio::test]
async fn test_refresh_rotates_and_detects_reuse() {
    let app = TestApp::new();
    app.register("grace", "pw123456", "user").await;
    let login = app.login("grace", "pw123456").await;
    let original = login["refreshToken"].as_str().unwrap();

    let (status, rotated) = app
        .post("/api/auth/refresh", json!({ "refreshToken": original }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let successor = rotated["refreshToken"].as_str().unwrap();
    assert_ne!(successor, original);
    assert!(rotated["accessToken"].as_str().is_some());

    // Reuse of the rotated token fails
    let (status, body) = app
        .post("/api/auth/refresh", json!({ "refreshToken": original }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");

    // Unknown tokens fail the same way
    let (status, _) = app
        .post("/api/auth/refresh", json!({ "refreshToken": "made-up" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/api/auth/refresh", json!({ "refreshToken": successor }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let log = app.audit_log().await;
    let replay = log
        .iter()
        .find(|row| row.action == "REFRESH_REPLAY")
        .expect("replay recorded");
    assert!(!replay.success);
    assert!(replay.user_id.is_some());
    assert!(log.iter().any(|row| row.action == "REFRESH_INVALID"));
}

#[tokio::test]
async fn test_expired_refresh_token_is_reported_as_expired() {
    let mut config = AuthConfig::for_tests();
    config.jwt.refresh_token_lifetime = Duration::ZERO;
    let app = TestApp::with_config(config, "http://127.0.0.1:1");
    app.register("gus", "pw123456", "user").await;
    let token = app.login("gus", "pw123456").await["refreshToken"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = app
        .post("/api/auth/refresh", json!({ "refreshToken": token }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_EXPIRED");

    let log = app.audit_log().await;
    assert_eq!(log[0].action, "REFRESH_EXPIRED");
    assert!(!log[0].success);
    assert!(log[0].user_id.is_some());
}

#[tokio::test]
async fn test_concurrent_refresh_has_exactly_one_winner() {
    let app = TestApp::new();
    app.register("heidi", "pw123456", "user").await;
    let token = app.login("heidi", "pw123456").await["refreshToken"]
        .as_str()
        .unwrap()
        .to_string();

    let (a, b) = tokio::join!(
        app.post("/api/auth/refresh", json!({ "refreshToken": token })),
        app.post("/api/auth/refresh", json!({ "refreshToken": token })),
    );

    let mut statuses = vec![a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::UNAUTHORIZED]);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let app = TestApp::new();
    app.register("ivan", "pw123456", "user").await;
    let token = app.login("ivan", "pw123456").await["refreshToken"]
        .as_str()
        .unwrap()
        .to_string();

    let first = app
        .post("/api/auth/logout", json!({ "refreshToken": token }))
        .await;
    let second = app
        .post("/api/auth/logout", json!({ "refreshToken": token }))
        .await;
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(first, second);

    let (status, _) = app
        .post("/api/auth/refresh", json!({ "refreshToken": token }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Access control
// =============================================================================

#[tokio::test]
async fn test_protected_routes_require_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app
        .request(Method::GET, "/api/auth/me", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, body) = app.get("/api/admin/users", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_expired_access_token_is_rejected_as_expired() {
    let app = TestApp::new();
    let now = chrono::Utc::now().timestamp();
    // Past the validator's leeway
    let claims = AccessTokenClaims {
        sub: uuid::Uuid::now_v7().to_string(),
        username: "root".to_string(),
        role: Role::Admin,
        token_type: "access".to_string(),
        iat: now - 3600,
        exp: now - 600,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(AuthConfig::for_tests().jwt.secret.as_bytes()),
    )
    .unwrap();

    let (status, body) = app.get("/api/admin/users", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_EXPIRED");

    let (status, body) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_EXPIRED");

    assert!(app.audit_actions().await.is_empty());
}

#[tokio::test]
async fn test_user_role_cannot_reach_admin_routes() {
    let app = TestApp::new();
    let token = app.access_token_for("judy", "user").await;

    let (status, body) = app.get("/api/admin/users", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app.get("/api/audit-logs", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let log = app.audit_log().await;
    let denied: Vec<_> = log
        .iter()
        .filter(|row| row.action == "FORBIDDEN_ACCESS")
        .collect();
    assert_eq!(denied.len(), 2);
    assert_eq!(denied[0].username.as_deref(), Some("judy"));
    assert_eq!(denied[0].metadata["path"], "/api/audit-logs");

    let (status, me) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "judy");
}

#[tokio::test]
async fn test_commander_reads_audit_log_but_not_users() {
    let app = TestApp::new();
    app.register("mallory", "pw123456", "user").await;
    app.post(
        "/api/auth/login",
        json!({ "username": "mallory", "password": "nope-nope" }),
    )
    .await;
    let token = app.access_token_for("ken", "commander").await;
    app.auth.audit.flush().await;

    let (status, body) = app
        .get("/api/audit-logs?action=login_failed&limit=10", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["username"], "mallory");
    assert_eq!(entries[0]["success"], false);

    let (status, body) = app.get("/api/audit-logs?action=BOGUS", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = app.get("/api/admin/users", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_role_change_applies_on_next_refresh() {
    let app = TestApp::new();
    let admin = app.access_token_for("root", "admin").await;
    app.register("leo", "pw123456", "user").await;
    let leo = app.login("leo", "pw123456").await;
    let leo_id = leo["user"]["id"].as_str().unwrap();

    let (status, users) = app.get("/api/admin/users", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users["data"].as_array().unwrap().len(), 2);

    let (status, updated) = app
        .request(
            Method::PATCH,
            &format!("/api/admin/users/{leo_id}/role"),
            Some(&admin),
            Some(json!({ "role": "commander" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["role"], "commander");

    let (_, rotated) = app
        .post(
            "/api/auth/refresh",
            json!({ "refreshToken": leo["refreshToken"] }),
        )
        .await;
    let new_access = rotated["accessToken"].as_str().unwrap();
    let (status, _) = app.get("/api/audit-logs", new_access).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("/api/admin/users/{}/role", uuid::Uuid::nil()),
            Some(&admin),
            Some(json!({ "role": "user" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let actions = app.audit_actions().await;
    assert_eq!(actions.iter().filter(|a| *a == "ROLE_CHANGED").count(), 1);
}

// =============================================================================
// Password reset
// =============================================================================

#[tokio::test]
async fn test_password_reset_is_single_use_and_ends_sessions() {
    let app = TestApp::new();
    app.register("mike", "pw123456", "user").await;
    let session = app.login("mike", "pw123456").await;

    let (status, known) = app
        .post(
            "/api/auth/request-password-reset",
            json!({ "username": "mike" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, unknown) = app
        .post(
            "/api/auth/request-password-reset",
            json!({ "username": "nobody" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(known, unknown);

    let token = wait_for_reset_token(&app, "mike").await;
    assert!(app.notifier.last_for("nobody").is_none());

    let (status, _) = app
        .post(
            "/api/auth/reset-password",
            json!({ "token": token, "newPassword": "new-password-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Second use of the same token
    let (status, body) = app
        .post(
            "/api/auth/reset-password",
            json!({ "token": token, "newPassword": "new-password-2" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_OR_EXPIRED_TOKEN");

    // Sessions issued before the reset are gone
    let (status, _) = app
        .post(
            "/api/auth/refresh",
            json!({ "refreshToken": session["refreshToken"] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/api/auth/login",
            json!({ "username": "mike", "password": "pw123456" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    app.login("mike", "new-password-1").await;

    let actions = app.audit_actions().await;
    assert!(actions.contains(&"PASSWORD_RESET_COMPLETED".to_string()));
    assert!(actions.contains(&"PASSWORD_RESET_FAILED".to_string()));
    assert_eq!(
        actions
            .iter()
            .filter(|a| *a == "PASSWORD_RESET_REQUESTED")
            .count(),
        2
    );
}

// =============================================================================
// Surrounding surface
// =============================================================================

#[tokio::test]
async fn test_health_reports_storage() {
    let app = TestApp::new();
    let (status, body) = app
        .request(Method::GET, "/health", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_classify_report_maps_upstream_failure() {
    let app = TestApp::new();
    let token = app.access_token_for("nina", "user").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/reports/classify",
            Some(&token),
            Some(json!({ "text": "Unidentified drone over the perimeter" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn test_classify_report_forwards_to_classifier() {
    use axum::{routing::post, Json, Router};

    let classifier = Router::new().route(
        "/classify",
        post(|Json(body): Json<Value>| async move {
            Json(json!({
                "input_text": body["text"],
                "predicted_class": "critical",
                "confidence": 0.97
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, classifier).await.unwrap() });

    let app = TestApp::with_config(AuthConfig::for_tests(), &url);
    let token = app.access_token_for("oscar", "commander").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/reports/classify",
            Some(&token),
            Some(json!({ "text": "Armed intruders at gate 4" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], "critical");
    assert_eq!(body["confidence"], 0.97);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/reports/classify",
            Some(&token),
            Some(json!({ "text": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
