//! Request model.

use super::response::Response;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Status of a request, derived from the aggregate of its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// No responses yet.
    Pending,
    /// At least one approval, not yet unanimous, no rejection.
    Approving,
    Approved,
    Rejected,
}

impl RequestStatus {
    /// `Approved` and `Rejected` accept no further responses.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// Statuses are only read back from storage; an unknown value means a
/// corrupt row, never a default.
impl FromStr for RequestStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approving" => Ok(Self::Approving),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(AppError::internal(format!(
                "unknown request status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approving => write!(f, "approving"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A unit of work requiring approval from a designated set of members.
///
/// Note: `links` is stored as a JSON array string in SQLite.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: i64,

    /// Collaboration context the request belongs to.
    pub stage_id: i64,

    pub author_id: i64,

    pub title: String,

    pub content: String,

    /// JSON array of attached links.
    pub links: String,

    /// The rejected request this one re-requests.
    pub parent_id: Option<i64>,

    /// Status: `pending`, `approving`, `approved`, `rejected`.
    pub status: String,

    /// Bumped by every unit of work that locks the row.
    pub version: i64,

    pub created_at: i64,

    /// When a terminal status was reached.
    pub resolved_at: Option<i64>,

    /// Soft-deletion (abandon) timestamp.
    pub deleted_at: Option<i64>,
}

impl Request {
    /// Parse the status string into an enum.
    pub fn status_enum(&self) -> Result<RequestStatus, AppError> {
        self.status.parse()
    }

    /// Parse links from JSON string.
    pub fn links_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.links).unwrap_or_default()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for creating a request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub stage_id: i64,
    pub author_id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub links: Vec<String>,
    pub approver_ids: Vec<i64>,
}

/// Projection returned by every workflow operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    pub id: i64,
    pub status: RequestStatus,
    pub author_id: i64,
    pub parent_id: Option<i64>,
    /// Current number of designated approvers.
    pub approver_count: i64,
    /// Live approvals from current approvers.
    pub approvals: i64,
    /// Live rejections from current approvers.
    pub rejections: i64,
    /// The response recorded by the operation, if it recorded one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
}
