// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test harness: an app wired to in-memory fakes.
//!
//! The classifier, record store and notifier are replaced with
//! deterministic doubles so workflow tests can assert exactly what was
//! stored and sent. The identity store stays an offline mock; requests
//! that reach it fail with its offline error.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use screening_portal::config::Config;
use screening_portal::db::SupabaseDb;
use screening_portal::error::AppError;
use screening_portal::middleware::auth::create_session_jwt;
use screening_portal::models::{Diagnosis, EscalationRecord, NotificationStatus, Session, UserRole};
use screening_portal::routes::create_router;
use screening_portal::services::notifier::EscalationNotice;
use screening_portal::services::{Classifier, EscalationStore, Notifier, ScreeningService};
use screening_portal::AppState;

// ─── Image Fixtures ──────────────────────────────────────────

/// Minimal bytes that sniff as JPEG.
#[allow(dead_code)]
pub const JPEG_BYTES: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01,
];

/// Minimal bytes that sniff as PNG.
#[allow(dead_code)]
pub const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
];

// ─── Classifier Double ───────────────────────────────────────

/// Classifier that returns a configured diagnosis for every image.
pub struct FixedClassifier {
    diagnosis: Mutex<Diagnosis>,
}

#[allow(dead_code)]
impl FixedClassifier {
    pub fn new(label: &str, confidence: f64) -> Self {
        Self {
            diagnosis: Mutex::new(Diagnosis {
                label: label.to_string(),
                confidence,
            }),
        }
    }

    /// Change what the next classifications return.
    pub fn set(&self, label: &str, confidence: f64) {
        *self.diagnosis.lock().unwrap() = Diagnosis {
            label: label.to_string(),
            confidence,
        };
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _image: &[u8]) -> Result<Diagnosis, AppError> {
        Ok(self.diagnosis.lock().unwrap().clone())
    }
}

// ─── Record Store Double ─────────────────────────────────────

/// One blob handed to the store, as seen by the upload call.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct UploadedBlob {
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

/// In-memory escalation store recording every upload and insert.
pub struct MemoryStore {
    records: Mutex<Vec<EscalationRecord>>,
    uploads: Mutex<Vec<UploadedBlob>>,
    next_id: AtomicI64,
    fail_next_insert: AtomicBool,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            fail_next_insert: AtomicBool::new(false),
        }
    }

    /// Make the next insert fail once, as if the store were down.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<EscalationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<UploadedBlob> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl EscalationStore for MemoryStore {
    async fn upload_screening_image(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, AppError> {
        self.uploads.lock().unwrap().push(UploadedBlob {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len(),
        });
        Ok(format!("http://storage.test/screening_images/{}", key))
    }

    async fn insert_escalation(&self, record: &EscalationRecord) -> Result<i64, AppError> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(AppError::Persistence("record store down".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = record.clone();
        stored.id = Some(id);
        self.records.lock().unwrap().push(stored);
        Ok(id)
    }

    async fn mark_notified(&self, record_id: i64) -> Result<(), AppError> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == Some(record_id)) {
            Some(record) => {
                record.notification_status = NotificationStatus::Notified;
                Ok(())
            }
            None => Err(AppError::Persistence(format!(
                "no record with id {}",
                record_id
            ))),
        }
    }

    async fn list_escalations(&self) -> Result<Vec<EscalationRecord>, AppError> {
        // Newest first, matching the real store's descending created_at order
        let mut records = self.records.lock().unwrap().clone();
        records.reverse();
        Ok(records)
    }
}

// ─── Notifier Double ─────────────────────────────────────────

/// Notifier that records every notice instead of sending email.
pub struct RecordingNotifier {
    sent: Mutex<Vec<EscalationNotice>>,
    fail_sends: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    /// Make sends fail until turned off again.
    pub fn set_failing(&self, failing: bool) {
        self.fail_sends.store(failing, Ordering::SeqCst);
    }

    /// Hold each send for `delay` before completing.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn sent(&self) -> Vec<EscalationNotice> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &EscalationNotice) -> Result<(), AppError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(AppError::Notification("SMTP relay refused".to_string()));
        }
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

// ─── App Harness ─────────────────────────────────────────────

/// Handles to the fakes behind a test app.
pub struct TestBackends {
    pub classifier: Arc<FixedClassifier>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Create a test app over in-memory fakes.
///
/// The classifier starts at high confidence ("Negative", 0.97); tests
/// that need an escalation lower it via `backends.classifier.set(...)`.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, TestBackends) {
    let config = Config::default();
    let db = SupabaseDb::new_mock();

    let classifier = Arc::new(FixedClassifier::new("Negative", 0.97));
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let screening = ScreeningService::new(classifier.clone(), store.clone(), notifier.clone());

    let state = Arc::new(AppState {
        config,
        db,
        screening,
    });

    (
        create_router(state.clone()),
        state,
        TestBackends {
            classifier,
            store,
            notifier,
        },
    )
}

// ─── Session Helpers ─────────────────────────────────────────

/// A session snapshot like login would mint, with a fresh session id.
#[allow(dead_code)]
pub fn test_session(role: UserRole, approved: bool) -> Session {
    Session {
        user_id: "user-1".to_string(),
        sid: uuid::Uuid::new_v4().to_string(),
        username: "nurse_jane".to_string(),
        facility: Some("Kawempe General".to_string()),
        role,
        approved,
        login_time: chrono::Utc::now().to_rfc3339(),
    }
}

/// Sign a session the way the login handler does.
#[allow(dead_code)]
pub fn create_test_jwt(session: &Session, signing_key: &[u8]) -> String {
    create_session_jwt(session, signing_key).expect("Failed to create session JWT")
}

// ─── Request Helpers ─────────────────────────────────────────

/// Boundary used by `multipart_image`.
#[allow(dead_code)]
pub const TEST_BOUNDARY: &str = "screening-test-boundary";

/// Build a multipart/form-data body with a single file field.
#[allow(dead_code)]
pub fn multipart_image(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", TEST_BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", TEST_BOUNDARY).as_bytes());
    body
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&bytes).expect("Response body was not JSON")
}
