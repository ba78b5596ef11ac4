use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Authentication collaborator
// ---------------------------------------------------------------------------

/// Body returned by login and OTP verification. Only `token` and `message`
/// are consumed; the `admin` / `user` payloads are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Subscription-status collaborator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    #[serde(default)]
    pub plan_name: Option<String>,
    /// `active`, `pending`, `cancelled`, ... A missing status is read as
    /// active.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl SubscriptionRecord {
    pub fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("active"))
            .unwrap_or(true)
    }
}

/// `GET` subscription status: `{ subscription, pending_subscriptions, is_master }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionStatusResponse {
    #[serde(default)]
    pub subscription: Option<SubscriptionRecord>,
    #[serde(default)]
    pub pending_subscriptions: Vec<serde_json::Value>,
    #[serde(default)]
    pub is_master: bool,
}

// ---------------------------------------------------------------------------
// Profile collaborator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminProfile {
    #[serde(default)]
    pub profile_photo: Option<String>,
}

/// `{ admin: { profile_photo } }`. Cosmetic only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub admin: AdminProfile,
}

impl ProfileResponse {
    pub fn photo(&self) -> Option<String> {
        self.admin
            .profile_photo
            .as_ref()
            .filter(|p| !p.is_empty())
            .cloned()
    }
}
