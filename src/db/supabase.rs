// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase client wrapper with typed operations.
//!
//! One adapter covers the three Supabase surfaces the portal uses:
//! - GoTrue auth (`/auth/v1/*`) for sign-up, sign-in and sign-out
//! - PostgREST (`/rest/v1/*`) for the `profiles` and `screenings` tables
//! - Storage (`/storage/v1/*`) for the screening-image bucket

use serde::Deserialize;

use crate::db::{buckets, tables};
use crate::error::AppError;
use crate::models::{EscalationRecord, Profile};
use crate::services::screening::EscalationStore;

/// Supabase REST client.
#[derive(Clone)]
pub struct SupabaseDb {
    http: Option<reqwest::Client>,
    base_url: String,
    service_key: String,
}

/// Tokens returned by a successful password sign-in.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub user: AuthUserRef,
}

/// The identity-service user a token belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUserRef {
    pub id: String,
}

impl SupabaseDb {
    /// Create a new Supabase client.
    pub fn new(base_url: &str, service_key: &str) -> Self {
        tracing::info!(url = base_url, "Supabase client configured");
        Self {
            http: Some(reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }

    /// Create a mock Supabase client for testing (offline mode).
    ///
    /// All operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            http: None,
            base_url: "http://offline.invalid".to_string(),
            service_key: String::new(),
        }
    }

    /// Helper to get the HTTP client or return an error if offline.
    fn get_http(&self) -> Result<&reqwest::Client, AppError> {
        self.http.as_ref().ok_or_else(|| {
            AppError::Persistence("Record store not connected (offline mode)".to_string())
        })
    }

    // ─── Auth Operations (GoTrue) ────────────────────────────────

    /// Register a new identity, returning its user id.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<String, AppError> {
        let url = format!("{}/auth/v1/signup", self.base_url);
        let response = self
            .get_http()?
            .post(&url)
            .header("apikey", &self.service_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Sign-up request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if body.contains("already registered") || body.contains("already exists") {
                return Err(AppError::Validation("Email already registered".to_string()));
            }
            return Err(AppError::Persistence(format!(
                "Sign-up failed: HTTP {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Persistence(format!("Sign-up JSON parse error: {}", e)))?;

        // GoTrue returns the user object directly, or nested under "user"
        // depending on whether email confirmation is enabled.
        body.get("id")
            .or_else(|| body.get("user").and_then(|u| u.get("id")))
            .and_then(|id| id.as_str())
            .map(|id| id.to_string())
            .ok_or_else(|| {
                AppError::Persistence("Sign-up response did not include a user id".to_string())
            })
    }

    /// Exchange credentials for an access token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthTokens, AppError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .get_http()?
            .post(&url)
            .header("apikey", &self.service_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Sign-in request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 401 {
            // GoTrue reports bad credentials as invalid_grant
            return Err(AppError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Persistence(format!(
                "Sign-in failed: HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Persistence(format!("Sign-in JSON parse error: {}", e)))
    }

    /// Revoke an access token. Callers treat failures as best-effort.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let url = format!("{}/auth/v1/logout", self.base_url);
        let response = self
            .get_http()?
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Sign-out request failed: {}", e)))?;

        self.check_response(response, "Sign-out").await
    }

    // ─── Profile Operations ──────────────────────────────────────

    /// Get a profile by identity-service user id.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError> {
        let url = format!(
            "{}/rest/v1/{}?id=eq.{}&limit=1",
            self.base_url,
            tables::PROFILES,
            urlencoding::encode(user_id)
        );
        let rows: Vec<Profile> = self.get_json(&url).await?;
        Ok(rows.into_iter().next())
    }

    /// Whether a username is already claimed by any profile.
    pub async fn username_taken(&self, username: &str) -> Result<bool, AppError> {
        let url = format!(
            "{}/rest/v1/{}?username=eq.{}&select=id&limit=1",
            self.base_url,
            tables::PROFILES,
            urlencoding::encode(username)
        );
        let rows: Vec<serde_json::Value> = self.get_json(&url).await?;
        Ok(!rows.is_empty())
    }

    /// Insert a freshly registered profile.
    pub async fn insert_profile(&self, profile: &Profile) -> Result<(), AppError> {
        let url = format!("{}/rest/v1/{}", self.base_url, tables::PROFILES);
        let response = self
            .get_http()?
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .json(profile)
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Profile insert failed: {}", e)))?;

        if response.status().as_u16() == 409 {
            // Unique constraint on username
            return Err(AppError::Validation("Username already taken".to_string()));
        }
        self.check_response(response, "Profile insert").await
    }

    /// List reviewer profiles still waiting for approval.
    pub async fn pending_reviewers(&self) -> Result<Vec<Profile>, AppError> {
        let url = format!(
            "{}/rest/v1/{}?user_category=eq.reviewer&approved=eq.false&order=username.asc",
            self.base_url,
            tables::PROFILES
        );
        self.get_json(&url).await
    }

    /// Flip a reviewer profile to approved.
    pub async fn approve_reviewer(&self, user_id: &str) -> Result<(), AppError> {
        let url = format!(
            "{}/rest/v1/{}?id=eq.{}&user_category=eq.reviewer",
            self.base_url,
            tables::PROFILES,
            urlencoding::encode(user_id)
        );
        let response = self
            .get_http()?
            .patch(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "approved": true }))
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Approval update failed: {}", e)))?;

        let updated: Vec<serde_json::Value> = self.check_response_json(response).await?;
        if updated.is_empty() {
            return Err(AppError::NotFound(format!(
                "No pending reviewer with id {}",
                user_id
            )));
        }
        Ok(())
    }

    // ─── Response Helpers ────────────────────────────────────────

    /// Generic authenticated GET with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, AppError> {
        let response = self
            .get_http()?
            .get(url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Record store request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// Check response status and return error if not successful.
    async fn check_response(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<(), AppError> {
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Persistence(format!(
            "{} failed: HTTP {}: {}",
            what, status, body
        )))
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Persistence(format!(
                "Record store error: HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Persistence(format!("JSON parse error: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EscalationStore - the workflow's durable storage seam
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl EscalationStore for SupabaseDb {
    /// Upload image bytes to the screening bucket, returning the public URL.
    async fn upload_screening_image(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, AppError> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            buckets::SCREENING_IMAGES,
            key
        );
        let response = self
            .get_http()?
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Content-Type", content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Image upload failed: {}", e)))?;

        self.check_response(response, "Image upload").await?;

        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            buckets::SCREENING_IMAGES,
            key
        ))
    }

    /// Insert an escalation record, returning the assigned row id.
    async fn insert_escalation(&self, record: &EscalationRecord) -> Result<i64, AppError> {
        let url = format!("{}/rest/v1/{}", self.base_url, tables::SCREENINGS);
        let response = self
            .get_http()?
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Record insert failed: {}", e)))?;

        let rows: Vec<EscalationRecord> = self.check_response_json(response).await?;
        rows.into_iter().next().and_then(|r| r.id).ok_or_else(|| {
            AppError::Persistence("Record insert did not return a row id".to_string())
        })
    }

    /// Mark a persisted record's notification as delivered.
    async fn mark_notified(&self, record_id: i64) -> Result<(), AppError> {
        let url = format!(
            "{}/rest/v1/{}?id=eq.{}",
            self.base_url,
            tables::SCREENINGS,
            record_id
        );
        let response = self
            .get_http()?
            .patch(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "notification_status": "notified" }))
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Status update failed: {}", e)))?;

        self.check_response(response, "Status update").await
    }

    /// List all escalation records, newest first.
    async fn list_escalations(&self) -> Result<Vec<EscalationRecord>, AppError> {
        let url = format!(
            "{}/rest/v1/{}?order=created_at.desc",
            self.base_url,
            tables::SCREENINGS
        );
        self.get_json(&url).await
    }
}
