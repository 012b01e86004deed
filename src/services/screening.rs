// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Screening workflow service.
//!
//! Handles the core workflow:
//! 1. Classify an uploaded image
//! 2. Gate on the confidence threshold
//! 3. Collect facility + client code when review is needed
//! 4. Upload the image and persist the escalation record
//! 5. Notify the clinician and reset
//!
//! Each signed-in session owns one workflow slot, keyed by the session id
//! from the auth token. A slot's mutex serializes that session's workflow
//! operations, so a double-submitted confirmation cannot create two records.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::middleware::auth::SESSION_TTL_SECS;
use crate::models::{Diagnosis, EscalationRecord, NotificationStatus, Session, UserRole};
use crate::services::classifier::Classifier;
use crate::services::notifier::{EscalationNotice, Notifier};
use crate::time_utils;

/// Confidence at or above this never offers escalation.
pub const ESCALATION_THRESHOLD: f64 = 0.9;

/// Whether a diagnosis at this confidence is offered for escalation.
pub fn escalation_offered(confidence: f64) -> bool {
    confidence < ESCALATION_THRESHOLD
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflow state
// ─────────────────────────────────────────────────────────────────────────────

/// One classified upload, held in memory until escalated or discarded.
#[derive(Debug, Clone)]
pub struct ScreeningAttempt {
    /// Original uploaded bytes
    pub image: Vec<u8>,
    /// File extension used for the blob key and attachment ("jpg", "png", ...)
    pub ext: String,
    /// Classifier output for the image
    pub diagnosis: Diagnosis,
}

/// Durable progress of a confirmation whose notification still has to go out.
///
/// Kept so a retry re-sends the email without uploading a second blob or
/// inserting a second record.
#[derive(Debug, Clone)]
pub struct PersistedEscalation {
    pub record_id: i64,
    pub image_url: String,
    pub facility: String,
    pub client_code: String,
}

/// Per-session workflow state machine.
#[derive(Debug, Clone)]
pub enum WorkflowState {
    /// Nothing in flight
    Idle,
    /// Classified at high confidence; no escalation offered
    Classified { attempt: ScreeningAttempt },
    /// Classified below the threshold; waiting for facility + client code
    AwaitingEscalationInput {
        attempt: ScreeningAttempt,
        persisted: Option<PersistedEscalation>,
    },
    /// A confirmation is running right now
    Escalating,
}

/// Serializable snapshot of a slot's workflow, for status queries.
#[derive(Debug, Clone)]
pub struct WorkflowStatus {
    pub state: &'static str,
    pub diagnosis: Option<Diagnosis>,
    pub escalation_offered: bool,
    /// A record was persisted but its notification still has to be retried
    pub awaiting_retry: bool,
}

impl WorkflowStatus {
    fn from_state(state: &WorkflowState) -> Self {
        match state {
            WorkflowState::Idle => Self {
                state: "idle",
                diagnosis: None,
                escalation_offered: false,
                awaiting_retry: false,
            },
            WorkflowState::Classified { attempt } => Self {
                state: "classified",
                diagnosis: Some(attempt.diagnosis.clone()),
                escalation_offered: false,
                awaiting_retry: false,
            },
            WorkflowState::AwaitingEscalationInput { attempt, persisted } => Self {
                state: "awaiting_escalation_input",
                diagnosis: Some(attempt.diagnosis.clone()),
                escalation_offered: true,
                awaiting_retry: persisted.is_some(),
            },
            WorkflowState::Escalating => Self {
                state: "escalating",
                diagnosis: None,
                escalation_offered: false,
                awaiting_retry: false,
            },
        }
    }
}

/// Result of a classified upload.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub diagnosis: Diagnosis,
    pub escalation_offered: bool,
}

/// Result of a completed escalation.
#[derive(Debug)]
pub struct EscalationOutcome {
    pub record_id: i64,
    pub image_url: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Record store seam
// ─────────────────────────────────────────────────────────────────────────────

/// Durable storage for escalated screenings.
#[async_trait]
pub trait EscalationStore: Send + Sync {
    /// Upload image bytes under `key`, returning the public URL.
    async fn upload_screening_image(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String>;

    /// Insert an escalation record, returning the assigned row id.
    async fn insert_escalation(&self, record: &EscalationRecord) -> Result<i64>;

    /// Flip a persisted record's notification status to delivered.
    async fn mark_notified(&self, record_id: i64) -> Result<()>;

    /// All escalation records, newest first.
    async fn list_escalations(&self) -> Result<Vec<EscalationRecord>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// ScreeningService - per-session workflow orchestration
// ─────────────────────────────────────────────────────────────────────────────

/// One session's server-side state.
struct SessionSlot {
    workflow: WorkflowState,
    /// Identity-service access token cached for sign-out
    access_token: Option<String>,
    last_touched: DateTime<Utc>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            workflow: WorkflowState::Idle,
            access_token: None,
            last_touched: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.last_touched = Utc::now();
    }
}

/// Orchestrates the screening workflow against pluggable adapters.
#[derive(Clone)]
pub struct ScreeningService {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn EscalationStore>,
    notifier: Arc<dyn Notifier>,
    /// Per-session workflow slots (shared across requests).
    slots: Arc<DashMap<String, Arc<Mutex<SessionSlot>>>>,
}

impl ScreeningService {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn EscalationStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            classifier,
            store,
            notifier,
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Get or create the slot for a session, purging stale slots first.
    fn slot(&self, sid: &str) -> Arc<Mutex<SessionSlot>> {
        self.purge_expired();
        self.slots
            .entry(sid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionSlot::new())))
            .clone()
    }

    /// Drop slots untouched for longer than the session TTL.
    ///
    /// The auth token expires on the same clock, so a purged slot belongs
    /// to a session that can no longer reach the workflow anyway.
    fn purge_expired(&self) {
        let cutoff = Utc::now() - Duration::seconds(SESSION_TTL_SECS as i64);
        self.slots.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => guard.last_touched > cutoff,
            Err(_) => true, // in use right now
        });
    }

    // ─── Session Lifecycle ───────────────────────────────────────

    /// Create the slot for a fresh login, caching the identity-service
    /// access token for later sign-out.
    pub async fn begin_session(&self, sid: &str, access_token: Option<String>) {
        let slot = self.slot(sid);
        let mut guard = slot.lock().await;
        guard.access_token = access_token;
        guard.touch();
    }

    /// Drop a session's slot, returning the cached access token so the
    /// caller can revoke it. Any in-flight attempt is discarded.
    pub async fn end_session(&self, sid: &str) -> Option<String> {
        match self.slots.remove(sid) {
            Some((_, slot)) => {
                let guard = slot.lock().await;
                guard.access_token.clone()
            }
            None => None,
        }
    }

    // ─── Workflow Operations ─────────────────────────────────────

    /// Classify an uploaded image and decide whether to offer escalation.
    ///
    /// Replaces any previous attempt for the session. The slot stays locked
    /// across the classifier call, so one session classifies one image at
    /// a time.
    pub async fn submit_image(&self, sid: &str, image: Vec<u8>, ext: String) -> Result<SubmitOutcome> {
        let slot = self.slot(sid);
        let mut guard = slot.lock().await;
        guard.touch();

        if matches!(guard.workflow, WorkflowState::Escalating) {
            return Err(AppError::BadRequest(
                "Escalation in progress; wait for it to finish".to_string(),
            ));
        }

        let diagnosis = self.classifier.classify(&image).await?;

        tracing::info!(
            label = %diagnosis.label,
            confidence = diagnosis.confidence,
            "Image classified"
        );

        let offered = escalation_offered(diagnosis.confidence);
        let attempt = ScreeningAttempt {
            image,
            ext,
            diagnosis: diagnosis.clone(),
        };
        guard.workflow = if offered {
            WorkflowState::AwaitingEscalationInput {
                attempt,
                persisted: None,
            }
        } else {
            WorkflowState::Classified { attempt }
        };

        Ok(SubmitOutcome {
            diagnosis,
            escalation_offered: offered,
        })
    }

    /// Escalate the pending low-confidence attempt.
    ///
    /// Uploads the image, persists the record, emails the clinician and
    /// resets the workflow, in that order. A failure puts the workflow back
    /// to `AwaitingEscalationInput`; if the record was already persisted,
    /// the retry re-sends the notification only.
    pub async fn confirm_escalation(
        &self,
        sid: &str,
        facility: String,
        client_code: String,
    ) -> Result<EscalationOutcome> {
        let client_code = client_code.trim().to_string();
        if client_code.is_empty() {
            return Err(AppError::Validation("Client code is required".to_string()));
        }

        let slot = self.slot(sid);

        // 1. Take the pending attempt and mark the workflow in flight
        let (attempt, persisted) = {
            let mut guard = slot.lock().await;
            guard.touch();
            match std::mem::replace(&mut guard.workflow, WorkflowState::Escalating) {
                WorkflowState::AwaitingEscalationInput { attempt, persisted } => {
                    (attempt, persisted)
                }
                WorkflowState::Escalating => {
                    return Err(AppError::BadRequest(
                        "Escalation already in progress".to_string(),
                    ));
                }
                other => {
                    guard.workflow = other;
                    return Err(AppError::BadRequest(
                        "No screening awaiting escalation".to_string(),
                    ));
                }
            }
        };

        // 2. Run the fallible pipeline outside the lock
        let result = self
            .run_escalation(&attempt, persisted, &facility, &client_code)
            .await;

        // 3. Record the outcome
        let mut guard = slot.lock().await;
        guard.touch();
        match result {
            Ok(outcome) => {
                guard.workflow = WorkflowState::Idle;
                tracing::info!(
                    record_id = outcome.record_id,
                    client_code = %client_code,
                    "Escalation complete"
                );
                Ok(outcome)
            }
            Err((error, persisted)) => {
                guard.workflow = WorkflowState::AwaitingEscalationInput { attempt, persisted };
                Err(error)
            }
        }
    }

    /// The blob-upload → record-insert → notify pipeline.
    ///
    /// Errors carry the persistence progress made so far, so the caller can
    /// park it in the slot for a retry.
    async fn run_escalation(
        &self,
        attempt: &ScreeningAttempt,
        persisted: Option<PersistedEscalation>,
        facility: &str,
        client_code: &str,
    ) -> std::result::Result<EscalationOutcome, (AppError, Option<PersistedEscalation>)> {
        // Upload and insert once; a retry whose record already exists skips
        // straight to the notification, keeping the persisted facility and
        // client code.
        let persisted = match persisted {
            Some(p) => p,
            None => {
                let now = Utc::now();
                let key = build_blob_key(client_code, &attempt.ext, now);
                let content_type = content_type_for_ext(&attempt.ext);

                let image_url = self
                    .store
                    .upload_screening_image(&key, &attempt.image, content_type)
                    .await
                    .map_err(|e| (e, None))?;

                let record = EscalationRecord {
                    id: None,
                    image_url: image_url.clone(),
                    diagnosis: attempt.diagnosis.label.clone(),
                    confidence_score: attempt.diagnosis.confidence,
                    facility: facility.to_string(),
                    client_code: client_code.to_string(),
                    created_at: time_utils::format_utc_rfc3339(now),
                    notification_status: NotificationStatus::PendingNotification,
                    dedupe_key: compute_dedupe_key(&attempt.image, client_code),
                };

                let record_id = self
                    .store
                    .insert_escalation(&record)
                    .await
                    .map_err(|e| (e, None))?;

                tracing::info!(
                    record_id,
                    client_code = %client_code,
                    facility = %facility,
                    "Escalation record persisted"
                );

                PersistedEscalation {
                    record_id,
                    image_url,
                    facility: facility.to_string(),
                    client_code: client_code.to_string(),
                }
            }
        };

        let notice = EscalationNotice {
            facility: persisted.facility.clone(),
            client_code: persisted.client_code.clone(),
            diagnosis: attempt.diagnosis.label.clone(),
            confidence: attempt.diagnosis.confidence,
            image_bytes: attempt.image.clone(),
            attachment_filename: format!("Image.{}", attempt.ext),
            content_type: content_type_for_ext(&attempt.ext).to_string(),
        };

        if let Err(e) = self.notifier.notify(&notice).await {
            // The record stays; only the send is retried next time.
            return Err((e, Some(persisted)));
        }

        // The email went out; losing this status flip is tolerable, so log
        // instead of failing the confirmation.
        if let Err(e) = self.store.mark_notified(persisted.record_id).await {
            tracing::warn!(
                record_id = persisted.record_id,
                error = %e,
                "Failed to mark record notified"
            );
        }

        Ok(EscalationOutcome {
            record_id: persisted.record_id,
            image_url: persisted.image_url,
        })
    }

    /// Discard the session's attempt (the user navigated away).
    pub async fn reset(&self, sid: &str) -> Result<()> {
        let slot = self.slot(sid);
        let mut guard = slot.lock().await;
        guard.touch();

        if matches!(guard.workflow, WorkflowState::Escalating) {
            return Err(AppError::BadRequest(
                "Escalation in progress; wait for it to finish".to_string(),
            ));
        }
        guard.workflow = WorkflowState::Idle;
        Ok(())
    }

    /// Snapshot the session's workflow for a reconnecting client.
    pub async fn status(&self, sid: &str) -> WorkflowStatus {
        let slot = self.slot(sid);
        let guard = slot.lock().await;
        WorkflowStatus::from_state(&guard.workflow)
    }

    // ─── Record Queries ──────────────────────────────────────────

    /// All escalation records, newest first.
    pub async fn list_records(&self) -> Result<Vec<EscalationRecord>> {
        self.store.list_escalations().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pure helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve which facility an escalation is filed under.
///
/// Service providers always file under their own facility; other roles
/// must name one of the configured facilities.
pub fn resolve_facility(
    session: &Session,
    requested: Option<&str>,
    known_facilities: &[String],
) -> Result<String> {
    match session.role {
        UserRole::ServiceProvider => session
            .facility
            .clone()
            .ok_or_else(|| AppError::Validation("Profile has no facility".to_string())),
        _ => {
            let requested = requested
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .ok_or_else(|| AppError::Validation("Facility is required".to_string()))?;
            if !known_facilities.iter().any(|f| f == requested) {
                return Err(AppError::Validation(format!(
                    "Unknown facility: {}",
                    requested
                )));
            }
            Ok(requested.to_string())
        }
    }
}

/// Build the storage key for an uploaded image.
///
/// `{client_code}_{YYYYMMDD_HHMMSS}.{ext}`, with the client code
/// percent-encoded so it stays a single path segment.
pub fn build_blob_key(client_code: &str, ext: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{}",
        urlencoding::encode(client_code),
        time_utils::format_blob_timestamp(now),
        ext
    )
}

/// MIME type for an uploaded file extension.
pub fn content_type_for_ext(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

/// Content digest identifying a (image, client code) submission.
pub fn compute_dedupe_key(image: &[u8], client_code: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(image);
    hasher.update(client_code.as_bytes());
    hex::encode(hasher.finalize())
}
