//! Response model: one approver's decision on a request.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// An approver's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Decisions arrive from outside the engine, so unknown values are an
/// input error rather than a silent fallback.
impl FromStr for Decision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approved" | "approve" => Ok(Self::Approved),
            "rejected" | "reject" => Ok(Self::Rejected),
            other => Err(AppError::invalid_input_field(
                format!("unknown decision '{}'", other),
                "decision",
            )),
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A recorded decision.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: i64,
    pub request_id: i64,
    pub member_id: i64,
    /// Decision: `approved` or `rejected`.
    pub decision: String,
    pub comment: String,
    /// JSON array of attached links.
    pub links: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// Set when the response is withdrawn.
    pub deleted_at: Option<i64>,
}

impl Response {
    /// Parse the stored decision. Rows are only ever written from a
    /// `Decision`, so anything else is a corrupt row.
    pub fn decision_enum(&self) -> Result<Decision, AppError> {
        self.decision.parse().map_err(|_: AppError| {
            AppError::internal(format!(
                "response {} has unknown decision '{}'",
                self.id, self.decision
            ))
        })
    }

    pub fn links_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.links).unwrap_or_default()
    }
}

/// Input for recording a response.
#[derive(Debug, Clone)]
pub struct NewResponse {
    pub request_id: i64,
    pub member_id: i64,
    pub decision: Decision,
    pub comment: String,
    pub links: Vec<String>,
}

/// Live decision tallies from current approvers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct DecisionCounts {
    pub approvals: i64,
    pub rejections: i64,
}
