//! User profile model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// What a user is allowed to do in the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum UserRole {
    /// Screens clients at a facility and uploads images
    ServiceProvider,
    /// Reviews escalated records (once approved by an admin)
    Reviewer,
    /// Approves reviewer accounts
    Admin,
}

/// User profile row in the `profiles` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Identity-service user id (also the row's primary key)
    pub id: String,
    /// Display name, unique across the portal
    pub username: String,
    /// Email address used to sign in
    pub email: String,
    /// Facility the user works at (always set for service providers)
    pub facility: Option<String>,
    /// Role assigned at registration
    pub user_category: UserRole,
    /// Whether an admin has approved this account for review access
    pub approved: bool,
}
