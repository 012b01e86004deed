// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod profile;
pub mod screening;
pub mod session;

pub use profile::{Profile, UserRole};
pub use screening::{Diagnosis, EscalationRecord, NotificationStatus};
pub use session::Session;
