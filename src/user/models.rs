//! User directory models.

use serde::Serialize;
use sqlx::FromRow;

/// A mirrored user row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Denormalized sender/participant fields embedded in API payloads so the
/// receiving UI needs no extra round trip.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<UserProfile> for UserSummary {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
        }
    }
}

impl UserSummary {
    /// Placeholder summary for an identifier with no mirrored profile row.
    /// Keeps reads working when the directory lags behind the identity
    /// subsystem.
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: id.to_string(),
            avatar_url: None,
        }
    }
}
