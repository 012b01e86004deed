//! Authenticated session snapshot.
//!
//! Minted once at login from the user's profile and carried in a signed
//! token; handlers read it instead of re-fetching the profile on every
//! request. A session expires four hours after login.

use serde::{Deserialize, Serialize};

use crate::models::UserRole;

/// Everything the request path needs to know about the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Identity-service user id
    pub user_id: String,
    /// Per-login session id, keys the server-side workflow slot
    pub sid: String,
    /// Display name
    pub username: String,
    /// Facility from the profile (always set for service providers)
    pub facility: Option<String>,
    /// Role from the profile
    pub role: UserRole,
    /// Whether an admin has approved this account
    pub approved: bool,
    /// When the user signed in (ISO 8601)
    pub login_time: String,
}

impl Session {
    /// Review pages are open to admins and approved reviewers only.
    pub fn can_review(&self) -> bool {
        match self.role {
            UserRole::Admin => true,
            UserRole::Reviewer => self.approved,
            UserRole::ServiceProvider => false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
