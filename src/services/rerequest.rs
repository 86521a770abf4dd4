//! Re-request chain manager.
//!
//! A rejected request may spawn exactly one live successor that restarts the
//! approval cycle. The chain is a singly linked list through `parent_id`; the
//! parent keeps its `rejected` status and content.

use crate::error::AppError;
use crate::models::{Member, Request, RequestStatus};
use crate::services::approver_registry;
use crate::services::requests::{self, RequestDraft};
use serde::Deserialize;
use sqlx::SqliteConnection;

/// Content of a successor request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub links: Vec<String>,
    /// Fresh approver set; may repeat the parent's approvers.
    pub approver_ids: Vec<i64>,
}

/// Create the successor of a rejected request.
///
/// `parent` must be locked by the caller, which serializes concurrent
/// attempts on the same parent; the loser finds the live child and gets
/// `Conflict`. The unique index on live children backs this up.
pub async fn create(
    conn: &mut SqliteConnection,
    parent: &Request,
    actor: &Member,
    input: &ReRequest,
) -> Result<Request, AppError> {
    if input.title.trim().is_empty() {
        return Err(AppError::invalid_input_field("title must not be empty", "title"));
    }

    if actor.id != parent.author_id && !actor.is_admin() {
        return Err(AppError::forbidden(format!(
            "member {} may not re-request request {}",
            actor.id, parent.id
        )));
    }

    if parent.status_enum()? != RequestStatus::Rejected {
        return Err(AppError::invalid_state_with_status(
            format!("request {} is not rejected", parent.id),
            parent.status.clone(),
        ));
    }

    if let Some(child_id) = requests::live_child(&mut *conn, parent.id).await? {
        return Err(AppError::conflict(format!(
            "request {} was already re-requested as {}",
            parent.id, child_id
        )));
    }

    let child = requests::insert_request(
        &mut *conn,
        RequestDraft {
            stage_id: parent.stage_id,
            author_id: parent.author_id,
            title: &input.title,
            content: &input.content,
            links: &input.links,
            parent_id: Some(parent.id),
        },
    )
    .await?;

    approver_registry::designate(&mut *conn, child.id, &input.approver_ids).await?;

    Ok(child)
}
