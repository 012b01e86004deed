//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup; nothing re-reads the environment at
//! request time.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Service endpoints ---
    /// Supabase project base URL (auth, tables, storage)
    pub supabase_url: String,
    /// Supabase service key sent as `apikey` on every REST call
    pub supabase_service_key: String,
    /// Base URL of the image classification service
    pub classifier_url: String,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,

    // --- Session & domain ---
    /// JWT signing key for session tokens (raw bytes)
    pub session_signing_key: Vec<u8>,
    /// Facilities a screening can be attributed to
    pub facilities: Vec<String>,

    // --- Escalation email ---
    /// SMTP relay host
    pub smtp_host: String,
    /// Address escalation emails are sent from
    pub sender_email: String,
    /// Clinician address escalation emails go to
    pub recipient_email: String,
    /// App password for the SMTP relay
    pub smtp_app_password: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test_service_key".to_string(),
            classifier_url: "http://localhost:9090".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            session_signing_key: b"test_session_key_32_bytes_min!!".to_vec(),
            facilities: vec![
                "Kawempe General".to_string(),
                "Mulago Specialised".to_string(),
            ],
            smtp_host: "smtp.gmail.com".to_string(),
            sender_email: "sender@example.com".to_string(),
            recipient_email: "clinician@example.com".to_string(),
            smtp_app_password: "test_app_password".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_SERVICE_KEY"))?,
            classifier_url: env::var("CLASSIFIER_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("CLASSIFIER_URL"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            session_signing_key: env::var("SESSION_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("SESSION_SIGNING_KEY"))?
                .into_bytes(),
            facilities: env::var("FACILITIES")
                .map_err(|_| ConfigError::Missing("FACILITIES"))
                .map(|v| parse_facilities(&v))?,

            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            sender_email: env::var("SENDER_EMAIL")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SENDER_EMAIL"))?,
            recipient_email: env::var("RECIPIENT_EMAIL")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("RECIPIENT_EMAIL"))?,
            smtp_app_password: env::var("SMTP_APP_PASSWORD")
                .map_err(|_| ConfigError::Missing("SMTP_APP_PASSWORD"))?,
        })
    }

    /// Whether `facility` is one of the configured facility names.
    pub fn is_known_facility(&self, facility: &str) -> bool {
        self.facilities.iter().any(|f| f == facility)
    }
}

/// Split the comma-separated FACILITIES value, dropping empty entries.
fn parse_facilities(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(|f| f.to_string())
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
