// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifetime tests.
//!
//! Sessions live in the signed token only: expiry is enforced by the
//! token's `exp` claim, and the bootstrap endpoint treats any bad token
//! as "not signed in" rather than an error.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use screening_portal::middleware::auth::{Claims, SESSION_COOKIE};
use screening_portal::models::{Session, UserRole};
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

mod common;

/// Sign a token whose `exp` already passed.
fn create_expired_jwt(session: &Session, signing_key: &[u8]) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    // Issued five hours ago, expired one hour ago
    let claims = Claims {
        sub: session.user_id.clone(),
        sid: session.sid.clone(),
        username: session.username.clone(),
        facility: session.facility.clone(),
        role: session.role,
        approved: session.approved,
        login_time: session.login_time.clone(),
        iat: now - 5 * 60 * 60,
        exp: now - 60 * 60,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .expect("Failed to create expired JWT")
}

#[tokio::test]
async fn test_expired_session_rejected() {
    let (app, state, _) = common::create_test_app();
    let session = common::test_session(UserRole::Admin, true);
    let token = create_expired_jwt(&session, &state.config.session_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_key_rejected() {
    let (app, _, _) = common::create_test_app();
    let session = common::test_session(UserRole::Admin, true);
    let token = common::create_test_jwt(&session, b"some_other_signing_key_32_bytes!");

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_bootstrap_without_token() {
    let (app, _, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Not an error: the frontend just shows the login page
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["authenticated"], false);
    assert!(body.get("session").is_none());
}

#[tokio::test]
async fn test_session_bootstrap_with_cookie() {
    let (app, state, _) = common::create_test_app();
    let session = common::test_session(UserRole::Reviewer, false);
    let token = common::create_test_jwt(&session, &state.config.session_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/session")
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["session"]["username"], "nurse_jane");
    assert_eq!(body["session"]["role"], "reviewer");
    assert_eq!(body["session"]["approved"], false);
}

#[tokio::test]
async fn test_session_bootstrap_with_expired_cookie() {
    let (app, state, _) = common::create_test_app();
    let session = common::test_session(UserRole::Reviewer, true);
    let token = create_expired_jwt(&session, &state.config.session_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/session")
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["authenticated"], false);
}

#[tokio::test]
async fn test_logout_expires_session_cookie() {
    let (app, state, _) = common::create_test_app();
    let session = common::test_session(UserRole::ServiceProvider, true);
    let token = common::create_test_jwt(&session, &state.config.session_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    // Removal cookie must match the creation path
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("logout should set a removal cookie")
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with(&format!("{}=", SESSION_COOKIE)));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_logout_without_session_still_succeeds() {
    let (app, _, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Logout is idempotent; a dead session just clears the cookie
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["success"], true);
}
