// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registration, login and session routes.

use axum::{
    extract::{Request, State},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{
    create_session_jwt, decode_session, extract_token, SESSION_COOKIE, SESSION_TTL_SECS,
};
use crate::models::{Profile, Session, UserRole};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(session_bootstrap))
}

/// Routes that additionally require a valid session.
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/me", get(get_me))
}

// ─── Shared Response Types ───────────────────────────────────

/// Session fields safe to hand to the frontend.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionInfo {
    pub username: String,
    pub facility: Option<String>,
    pub role: UserRole,
    pub approved: bool,
    pub login_time: String,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            username: session.username.clone(),
            facility: session.facility.clone(),
            role: session.role,
            approved: session.approved,
            login_time: session.login_time.clone(),
        }
    }
}

// ─── Registration ────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub confirm_password: String,
    pub user_category: UserRole,
    #[serde(default)]
    pub facility: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
}

/// Register a new account.
///
/// Every profile starts unapproved; reviewers gain record access only after
/// an admin approves them.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(flatten_validation_errors(&e)))?;

    if payload.password != payload.confirm_password {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }
    check_password_complexity(&payload.password)?;

    let facility = match payload.user_category {
        UserRole::ServiceProvider => {
            let facility = payload
                .facility
                .as_deref()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .ok_or_else(|| {
                    AppError::Validation(
                        "Facility is required for service providers".to_string(),
                    )
                })?;
            if !state.config.is_known_facility(facility) {
                return Err(AppError::Validation(format!(
                    "Unknown facility: {}",
                    facility
                )));
            }
            Some(facility.to_string())
        }
        _ => None,
    };

    if state.db.username_taken(&payload.username).await? {
        return Err(AppError::Validation("Username already taken".to_string()));
    }

    let user_id = state.db.sign_up(&payload.email, &payload.password).await?;

    let profile = Profile {
        id: user_id,
        username: payload.username.clone(),
        email: payload.email.clone(),
        facility,
        user_category: payload.user_category,
        approved: false,
    };
    state.db.insert_profile(&profile).await?;

    tracing::info!(username = %profile.username, role = ?profile.user_category, "Account registered");

    Ok(Json(RegisterResponse {
        success: true,
        message: "Registration successful! Please login.".to_string(),
    }))
}

/// Reject passwords without an uppercase letter, lowercase letter and digit.
fn check_password_complexity(password: &str) -> Result<()> {
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AppError::Validation(
            "Password must contain an uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AppError::Validation(
            "Password must contain a lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "Password must contain a digit".to_string(),
        ));
    }
    Ok(())
}

/// Collapse validator's per-field error map into one message line.
fn flatten_validation_errors(errors: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {}", field))
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

// ─── Login / Logout ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LoginResponse {
    /// Session token, also set as an HttpOnly cookie
    pub token: String,
    pub session: SessionInfo,
}

/// Sign in with email + password, minting a four-hour session.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let tokens = state.db.sign_in(&payload.email, &payload.password).await?;

    let profile = state
        .db
        .get_profile(&tokens.user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No profile for this account".to_string()))?;

    let session = Session {
        user_id: profile.id.clone(),
        sid: uuid::Uuid::new_v4().to_string(),
        username: profile.username.clone(),
        facility: profile.facility.clone(),
        role: profile.user_category,
        approved: profile.approved,
        login_time: format_utc_rfc3339(chrono::Utc::now()),
    };

    let jwt = create_session_jwt(&session, &state.config.session_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Session token creation failed: {}", e)))?;

    state
        .screening
        .begin_session(&session.sid, Some(tokens.access_token))
        .await;

    tracing::info!(username = %session.username, role = ?session.role, "User signed in");

    let cookie = session_cookie(&state, jwt.clone());
    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token: jwt,
            session: SessionInfo::from(&session),
        }),
    ))
}

/// Build the session cookie. `Secure` is off for localhost frontends only.
fn session_cookie(state: &AppState, jwt: String) -> Cookie<'static> {
    let secure = !state.config.frontend_url.starts_with("http://localhost")
        && !state.config.frontend_url.starts_with("http://127.0.0.1");

    Cookie::build((SESSION_COOKIE, jwt))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(SESSION_TTL_SECS as i64))
        .build()
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Sign out: drop the workflow slot, revoke the identity-service token
/// (best-effort) and expire the cookie.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
) -> (CookieJar, Json<LogoutResponse>) {
    if let Some(token) = extract_token(&jar, &request) {
        if let Ok(session) = decode_session(&token, &state.config.session_signing_key) {
            let access_token = state.screening.end_session(&session.sid).await;
            if let Some(access_token) = access_token {
                if let Err(e) = state.db.sign_out(&access_token).await {
                    tracing::warn!(error = %e, "Identity-service sign-out failed");
                }
            }
            tracing::info!(username = %session.username, "User signed out");
        }
    }

    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/"));
    (jar, Json(LogoutResponse { success: true }))
}

// ─── Session Bootstrap ───────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
}

/// Report whether the caller has a live session.
///
/// Never errors: a missing, expired or malformed token just means
/// "not signed in", and the frontend shows the login page.
async fn session_bootstrap(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
) -> Json<SessionResponse> {
    let session = extract_token(&jar, &request)
        .and_then(|token| decode_session(&token, &state.config.session_signing_key).ok());

    Json(match session {
        Some(session) => SessionResponse {
            authenticated: true,
            session: Some(SessionInfo::from(&session)),
        },
        None => SessionResponse {
            authenticated: false,
            session: None,
        },
    })
}

// ─── Current User ────────────────────────────────────────────

/// Get the signed-in user's session snapshot (as of login).
async fn get_me(Extension(session): Extension<Session>) -> Json<SessionInfo> {
    Json(SessionInfo::from(&session))
}
