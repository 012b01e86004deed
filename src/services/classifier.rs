// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Image classifier adapter.
//!
//! The model itself runs behind an HTTP inference service; this module
//! defines the `Classifier` seam the workflow depends on and the production
//! client that posts images to that service.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::Diagnosis;

/// Anything that can turn image bytes into a diagnosis.
///
/// Implementations must be deterministic: the same bytes always produce the
/// same label and confidence.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<Diagnosis, AppError>;
}

/// Request body for the inference service.
#[derive(Serialize)]
struct ClassifyRequest {
    /// Base64-encoded image bytes
    image_data: String,
}

/// Response body from the inference service.
#[derive(Deserialize)]
struct ClassifyResponse {
    label: String,
    confidence: f64,
}

/// HTTP client for the inference service.
#[derive(Clone)]
pub struct HttpClassifier {
    http: reqwest::Client,
    base_url: String,
}

impl HttpClassifier {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Probe the inference service once at startup.
    ///
    /// The portal cannot screen anything without its model, so callers
    /// treat a failed probe as fatal.
    pub async fn ready(&self) -> Result<(), AppError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Classifier(format!("Inference service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Classifier(format!(
                "Inference service unhealthy: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Diagnosis, AppError> {
        let url = format!("{}/classify", self.base_url);
        let request = ClassifyRequest {
            image_data: STANDARD.encode(image),
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Classifier(format!("Inference request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Classifier(format!(
                "Inference failed: HTTP {}: {}",
                status, body
            )));
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| AppError::Classifier(format!("Inference JSON parse error: {}", e)))?;

        if !parsed.confidence.is_finite() || !(0.0..=1.0).contains(&parsed.confidence) {
            return Err(AppError::Classifier(format!(
                "Inference returned confidence outside [0, 1]: {}",
                parsed.confidence
            )));
        }

        Ok(Diagnosis {
            label: parsed.label,
            confidence: parsed.confidence,
        })
    }
}
