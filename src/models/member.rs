//! Member model used for identity and role lookups.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role of a member within the collaboration backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Member,
    Admin,
}

impl From<&str> for MemberRole {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "admin" => Self::Admin,
            _ => Self::Member,
        }
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Member => write!(f, "member"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// A member as resolved by the identity lookup.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    pub name: String,
    /// Role: `member` or `admin`.
    pub role: String,
    pub created_at: i64,
}

impl Member {
    /// Parse the role string into an enum.
    pub fn role_enum(&self) -> MemberRole {
        MemberRole::from(self.role.as_str())
    }

    /// Check if the member holds the administrative role.
    pub fn is_admin(&self) -> bool {
        self.role_enum() == MemberRole::Admin
    }
}
