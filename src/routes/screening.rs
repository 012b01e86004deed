// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Screening workflow routes for authenticated users.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::models::{Diagnosis, Session};
use crate::services::screening::resolve_facility;
use crate::AppState;

/// Uploads larger than this are rejected before they reach a handler.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Screening routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/screening",
            post(submit_screening)
                .get(screening_status)
                .delete(reset_screening),
        )
        .route("/api/screening/escalation", post(confirm_escalation))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

// ─── Image Format Detection ──────────────────────────────────

/// Raster formats the screening camera produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn canonical_ext(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

/// Identify the image format from its magic bytes.
fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageFormat::Jpeg);
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(ImageFormat::Png);
    }
    None
}

/// Pick the extension used for the blob key and attachment.
///
/// The filename's own extension wins when it agrees with the sniffed
/// format family; otherwise the sniffed format decides.
fn ext_for_upload(filename: &str, format: ImageFormat) -> String {
    let from_name = filename.rsplit('.').next().map(|e| e.to_ascii_lowercase());
    match (from_name.as_deref(), format) {
        (Some("jpg"), ImageFormat::Jpeg) | (Some("jpeg"), ImageFormat::Jpeg) => {
            from_name.unwrap_or_default()
        }
        (Some("png"), ImageFormat::Png) => "png".to_string(),
        _ => format.canonical_ext().to_string(),
    }
}

// ─── Submit ──────────────────────────────────────────────────

/// Response after classifying an upload.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ScreenResponse {
    pub diagnosis: Diagnosis,
    /// Whether the confidence fell below the review threshold
    pub escalation_offered: bool,
}

/// Classify an uploaded screening image.
///
/// Expects a multipart form with a single `image` field (JPEG or PNG).
async fn submit_screening(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    mut multipart: Multipart,
) -> Result<Json<ScreenResponse>> {
    let mut file_data = Vec::new();
    let mut file_name = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some("image") {
            file_name = field.file_name().unwrap_or_default().to_string();
            file_data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?
                .to_vec();
        }
    }

    if file_data.is_empty() {
        return Err(AppError::Validation("No image uploaded".to_string()));
    }

    let format = detect_image_format(&file_data).ok_or_else(|| {
        AppError::Validation("Unsupported image format; upload a JPEG or PNG".to_string())
    })?;
    let ext = ext_for_upload(&file_name, format);

    tracing::debug!(
        user_id = %session.user_id,
        bytes = file_data.len(),
        ext = %ext,
        "Screening image received"
    );

    let outcome = state
        .screening
        .submit_image(&session.sid, file_data, ext)
        .await?;

    Ok(Json(ScreenResponse {
        diagnosis: outcome.diagnosis,
        escalation_offered: outcome.escalation_offered,
    }))
}

// ─── Status / Reset ──────────────────────────────────────────

/// Workflow snapshot for a reconnecting client.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StatusResponse {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Diagnosis>,
    pub escalation_offered: bool,
    /// A record exists but its notification still needs a retry
    pub awaiting_retry: bool,
}

/// Report the session's current workflow state.
async fn screening_status(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Json<StatusResponse> {
    let status = state.screening.status(&session.sid).await;
    Json(StatusResponse {
        state: status.state.to_string(),
        diagnosis: status.diagnosis,
        escalation_offered: status.escalation_offered,
        awaiting_retry: status.awaiting_retry,
    })
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ResetResponse {
    pub success: bool,
}

/// Discard the session's attempt (the user navigated away).
async fn reset_screening(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<ResetResponse>> {
    state.screening.reset(&session.sid).await?;
    Ok(Json(ResetResponse { success: true }))
}

// ─── Escalation ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EscalateRequest {
    pub client_code: String,
    /// Required for reviewers and admins; ignored for service providers,
    /// whose profile facility always wins.
    #[serde(default)]
    pub facility: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct EscalateResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub record_id: i64,
    pub image_url: String,
}

/// Escalate the pending low-confidence screening to a clinician.
async fn confirm_escalation(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(payload): Json<EscalateRequest>,
) -> Result<Json<EscalateResponse>> {
    let facility = resolve_facility(
        &session,
        payload.facility.as_deref(),
        &state.config.facilities,
    )?;

    let outcome = state
        .screening
        .confirm_escalation(&session.sid, facility, payload.client_code)
        .await?;

    Ok(Json(EscalateResponse {
        record_id: outcome.record_id,
        image_url: outcome.image_url,
    }))
}
