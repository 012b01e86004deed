// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Screening Portal API Server
//!
//! Classifies uploaded cervical-screening images and escalates
//! low-confidence results to clinicians for review.

use screening_portal::{
    config::Config,
    db::SupabaseDb,
    services::{HttpClassifier, ScreeningService, SmtpNotifier},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Screening Portal API");

    // Initialize the Supabase adapter (auth, tables, storage)
    let db = SupabaseDb::new(&config.supabase_url, &config.supabase_service_key);

    // Initialize the classifier and make sure the inference service is up.
    // The portal is useless without its model, so a failed probe is fatal.
    let classifier = HttpClassifier::new(&config.classifier_url);
    classifier
        .ready()
        .await
        .expect("Inference service not ready");
    tracing::info!(url = %config.classifier_url, "Inference service ready");

    // Initialize the escalation notifier
    let notifier = SmtpNotifier::new(
        &config.smtp_host,
        &config.sender_email,
        &config.recipient_email,
        &config.smtp_app_password,
    )
    .expect("Failed to configure SMTP notifier");
    tracing::info!(host = %config.smtp_host, "SMTP notifier configured");

    // Wire the screening workflow
    let screening = ScreeningService::new(
        Arc::new(classifier),
        Arc::new(db.clone()),
        Arc::new(notifier),
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        screening,
    });

    // Build router
    let app = screening_portal::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("screening_portal=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
