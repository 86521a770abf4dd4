//! Status transition audit log model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What caused a request's status to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionCause {
    /// A response was recorded.
    Response,
    /// An approver designation was removed.
    Removal,
    /// A response was withdrawn.
    Withdrawal,
}

impl std::fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response => write!(f, "response"),
            Self::Removal => write!(f, "removal"),
            Self::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

/// One recorded status change.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RequestTransition {
    pub id: i64,
    pub request_id: i64,
    pub from_status: String,
    pub to_status: String,
    /// Cause: `response`, `removal`, `withdrawal`.
    pub cause: String,
    pub actor_id: Option<i64>,
    pub created_at: i64,
}
