// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin routes for reviewer account approval.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::models::Session;
use crate::AppState;

/// Admin routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/reviewers", get(pending_reviewers))
        .route("/api/admin/reviewers/{id}/approve", post(approve_reviewer))
}

fn require_admin(session: &Session) -> Result<()> {
    if !session.is_admin() {
        return Err(AppError::Forbidden(
            "Admin access required".to_string(),
        ));
    }
    Ok(())
}

/// A reviewer account waiting for approval.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReviewerSummary {
    pub id: String,
    pub username: String,
    pub email: String,
    pub facility: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PendingReviewersResponse {
    pub reviewers: Vec<ReviewerSummary>,
}

/// List reviewer accounts still waiting for approval.
async fn pending_reviewers(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<PendingReviewersResponse>> {
    require_admin(&session)?;

    let reviewers = state
        .db
        .pending_reviewers()
        .await?
        .into_iter()
        .map(|p| ReviewerSummary {
            id: p.id,
            username: p.username,
            email: p.email,
            facility: p.facility,
        })
        .collect();

    Ok(Json(PendingReviewersResponse { reviewers }))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ApproveResponse {
    pub success: bool,
    pub message: String,
}

/// Approve a pending reviewer account.
///
/// Takes effect on the reviewer's next login; live sessions keep the
/// snapshot they were minted with.
async fn approve_reviewer(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<ApproveResponse>> {
    require_admin(&session)?;

    state.db.approve_reviewer(&id).await?;

    tracing::info!(reviewer_id = %id, admin = %session.username, "Reviewer approved");

    Ok(Json(ApproveResponse {
        success: true,
        message: "Reviewer approved".to_string(),
    }))
}
