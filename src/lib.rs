// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Screening Portal: cervical-screening backend with classifier triage
//!
//! This crate provides the backend API for screening-image classification,
//! low-confidence escalation to clinicians, and reviewer record access.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SupabaseDb;
use services::ScreeningService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: SupabaseDb,
    pub screening: ScreeningService,
}
