//! Admin route access control tests.
//!
//! The admin gate runs before any identity-store call, so non-admins
//! get a 403 even with the store offline, and admins surface the
//! store's offline error instead.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use screening_portal::models::UserRole;
use tower::ServiceExt;

mod common;

async fn admin_request(
    app: axum::Router,
    token: &str,
    method: &str,
    uri: &str,
) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_provider_cannot_list_pending_reviewers() {
    let (app, state, _) = common::create_test_app();
    let session = common::test_session(UserRole::ServiceProvider, true);
    let token = common::create_test_jwt(&session, &state.config.session_signing_key);

    let response = admin_request(app, &token, "GET", "/api/admin/reviewers").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = common::body_json(response).await;
    assert_eq!(body["error"], "forbidden");
    assert!(body["details"].as_str().unwrap().contains("Admin access required"));
}

#[tokio::test]
async fn test_approved_reviewer_cannot_approve_accounts() {
    let (app, state, _) = common::create_test_app();
    let session = common::test_session(UserRole::Reviewer, true);
    let token = common::create_test_jwt(&session, &state.config.session_signing_key);

    // Review access does not grant admin access
    let response =
        admin_request(app, &token, "POST", "/api/admin/reviewers/user-123/approve").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_list_reaches_identity_store() {
    let (app, state, _) = common::create_test_app();
    let session = common::test_session(UserRole::Admin, true);
    let token = common::create_test_jwt(&session, &state.config.session_signing_key);

    let response = admin_request(app, &token, "GET", "/api/admin/reviewers").await;

    // The gate passed; the offline mock store fails the query. With a
    // reachable store this is a 200 with the pending list.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "persistence_error");

    // Store errors never leak details to the client
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_admin_approve_reaches_identity_store() {
    let (app, state, _) = common::create_test_app();
    let session = common::test_session(UserRole::Admin, true);
    let token = common::create_test_jwt(&session, &state.config.session_signing_key);

    let response =
        admin_request(app, &token, "POST", "/api/admin/reviewers/user-123/approve").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "persistence_error");
}
