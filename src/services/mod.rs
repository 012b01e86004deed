// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod classifier;
pub mod notifier;
pub mod screening;

pub use classifier::{Classifier, HttpClassifier};
pub use notifier::{EscalationNotice, Notifier, SmtpNotifier};
pub use screening::{EscalationStore, ScreeningService, ESCALATION_THRESHOLD};
