// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Escalation record review routes.

use axum::{extract::State, routing::get, Extension, Json, Router};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::models::{EscalationRecord, Session};
use crate::AppState;

/// Record routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/records", get(list_records))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RecordsResponse {
    pub records: Vec<EscalationRecord>,
}

/// List all escalation records, newest first.
///
/// Open to admins and approved reviewers only.
async fn list_records(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<RecordsResponse>> {
    if !session.can_review() {
        return Err(AppError::Forbidden(
            "Record review requires an approved reviewer account".to_string(),
        ));
    }

    let records = state.screening.list_records().await?;
    Ok(Json(RecordsResponse { records }))
}
