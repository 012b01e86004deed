// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Screening diagnosis and escalation record models.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Classifier output for one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Diagnosis {
    /// Predicted class label (e.g. "Positive", "Negative", "Suspicious")
    pub label: String,
    /// Model confidence in [0, 1]
    pub confidence: f64,
}

/// Whether the clinician notification for a record went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum NotificationStatus {
    /// Record persisted but the notification has not been delivered yet
    PendingNotification,
    /// Clinician notification delivered
    Notified,
}

/// Stored escalation record in the `screenings` table.
///
/// Immutable once written, except `notification_status` which flips to
/// `notified` after the clinician email goes out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct EscalationRecord {
    /// Row id assigned by the record store
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub id: Option<i64>,
    /// Public URL of the uploaded screening image
    pub image_url: String,
    /// Predicted class label at escalation time
    pub diagnosis: String,
    /// Model confidence in [0, 1]
    pub confidence_score: f64,
    /// Facility the screening was performed at
    pub facility: String,
    /// Facility-assigned client identifier
    pub client_code: String,
    /// When the record was created (ISO 8601)
    pub created_at: String,
    /// Delivery state of the clinician notification
    pub notification_status: NotificationStatus,
    /// Content digest over image bytes + client code (duplicate detection)
    pub dedupe_key: String,
}
