// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT session middleware.
//!
//! The signed token carries the full session snapshot minted at login, so
//! handlers never re-fetch the profile. Expiry is enforced by the token's
//! `exp` claim: four hours after sign-in, requests start failing with 401.

use crate::models::{Session, UserRole};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "portal_session";

/// How long a session stays valid after sign-in.
pub const SESSION_TTL_SECS: usize = 4 * 60 * 60;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (identity-service user id)
    pub sub: String,
    /// Per-login session id
    pub sid: String,
    /// Display name
    pub username: String,
    /// Facility from the profile
    pub facility: Option<String>,
    /// Role from the profile
    pub role: UserRole,
    /// Whether an admin has approved this account
    pub approved: bool,
    /// Sign-in time (ISO 8601)
    pub login_time: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

impl From<Claims> for Session {
    fn from(claims: Claims) -> Self {
        Session {
            user_id: claims.sub,
            sid: claims.sid,
            username: claims.username,
            facility: claims.facility,
            role: claims.role,
            approved: claims.approved,
            login_time: claims.login_time,
        }
    }
}

/// Pull the session token out of a request: cookie first, then header.
pub fn extract_token(jar: &CookieJar, request: &Request) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(h) if h.starts_with("Bearer ") => Some(h[7..].to_string()),
        _ => None,
    }
}

/// Decode and validate a session token.
///
/// Fails on bad signatures and on tokens older than the session TTL.
pub fn decode_session(token: &str, signing_key: &[u8]) -> Result<Session, StatusCode> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let token_data =
        decode::<Claims>(token, &key, &validation).map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(token_data.claims.into())
}

/// Middleware that requires a valid session.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_token(&jar, &request).ok_or(StatusCode::UNAUTHORIZED)?;

    let session = decode_session(&token, &state.config.session_signing_key)?;
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Create a JWT for a user session.
pub fn create_session_jwt(session: &Session, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: session.user_id.clone(),
        sid: session.sid.clone(),
        username: session.username.clone(),
        facility: session.facility.clone(),
        role: session.role,
        approved: session.approved,
        login_time: session.login_time.clone(),
        iat: now,
        exp: now + SESSION_TTL_SECS,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}
