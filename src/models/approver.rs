//! Approver designation model.

use serde::Serialize;
use sqlx::FromRow;

/// Authorizes one member to respond to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ApproverDesignation {
    pub id: i64,
    pub request_id: i64,
    pub member_id: i64,
    pub created_at: i64,
}
