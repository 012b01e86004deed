// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Clinician notification over SMTP.
//!
//! A low-confidence escalation produces exactly one email to the configured
//! clinician address: a fixed-format summary with the screening image
//! attached. Transport failures surface as `Notification` errors; the
//! caller keeps the persisted record and may retry the send.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::AppError;

/// Subject line for every escalation email.
const ESCALATION_SUBJECT: &str = "Diagnosis Escalation";

/// Everything the notifier needs to compose one escalation message.
#[derive(Debug, Clone)]
pub struct EscalationNotice {
    pub facility: String,
    pub client_code: String,
    pub diagnosis: String,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    /// Original uploaded image bytes
    pub image_bytes: Vec<u8>,
    /// Attachment filename (e.g. "Image.jpg")
    pub attachment_filename: String,
    /// MIME type of the attachment
    pub content_type: String,
}

/// Delivers escalation notices to the reviewing clinician.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &EscalationNotice) -> Result<(), AppError>;
}

/// Build the fixed escalation email body.
pub fn build_escalation_body(notice: &EscalationNotice) -> String {
    format!(
        "URGENT REVIEW NEEDED\n\
         Facility: {}\n\
         Client Code: {}\n\
         Diagnosis: {}\n\
         Confidence Score: {:.2}%\n\
         Please review the attached image.",
        notice.facility,
        notice.client_code,
        notice.diagnosis,
        notice.confidence * 100.0
    )
}

/// SMTP notifier using a STARTTLS relay.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: String,
    recipient: String,
}

impl SmtpNotifier {
    /// Build a notifier for the given relay and credentials.
    pub fn new(
        smtp_host: &str,
        sender: &str,
        recipient: &str,
        app_password: &str,
    ) -> Result<Self, AppError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
            .map_err(|e| AppError::Notification(format!("SMTP relay setup failed: {}", e)))?
            .credentials(Credentials::new(
                sender.to_string(),
                app_password.to_string(),
            ))
            .build();

        Ok(Self {
            transport,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, notice: &EscalationNotice) -> Result<(), AppError> {
        let content_type = ContentType::parse(&notice.content_type)
            .map_err(|e| AppError::Notification(format!("Bad attachment MIME type: {}", e)))?;

        let attachment = Attachment::new(notice.attachment_filename.clone())
            .body(notice.image_bytes.clone(), content_type);

        let email = Message::builder()
            .from(
                self.sender
                    .parse()
                    .map_err(|e| AppError::Notification(format!("Bad sender address: {}", e)))?,
            )
            .to(self
                .recipient
                .parse()
                .map_err(|e| AppError::Notification(format!("Bad recipient address: {}", e)))?)
            .subject(ESCALATION_SUBJECT)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(build_escalation_body(notice)))
                    .singlepart(attachment),
            )
            .map_err(|e| AppError::Notification(format!("Email build failed: {}", e)))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| AppError::Notification(format!("SMTP send failed: {}", e)))?;

        tracing::info!(
            client_code = %notice.client_code,
            facility = %notice.facility,
            "Escalation email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_notice() -> EscalationNotice {
        EscalationNotice {
            facility: "Kawempe General".to_string(),
            client_code: "KW-0042".to_string(),
            diagnosis: "Suspicious".to_string(),
            confidence: 0.7234,
            image_bytes: vec![0xff, 0xd8, 0xff],
            attachment_filename: "Image.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn test_body_template() {
        let body = build_escalation_body(&test_notice());
        assert_eq!(
            body,
            "URGENT REVIEW NEEDED\n\
             Facility: Kawempe General\n\
             Client Code: KW-0042\n\
             Diagnosis: Suspicious\n\
             Confidence Score: 72.34%\n\
             Please review the attached image."
        );
    }

    #[test]
    fn test_confidence_rendered_as_percent() {
        let mut notice = test_notice();
        notice.confidence = 0.5;
        assert!(build_escalation_body(&notice).contains("Confidence Score: 50.00%"));

        notice.confidence = 0.899;
        assert!(build_escalation_body(&notice).contains("Confidence Score: 89.90%"));
    }
}
