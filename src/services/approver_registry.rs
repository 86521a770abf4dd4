//! Approver registry.
//!
//! Holds the set of members designated to approve a request. The set is
//! fixed at creation; single designations may be removed until the request
//! resolves. Consensus recomputation after a removal is the orchestrator's
//! job.

use crate::db::members;
use crate::error::AppError;
use crate::models::{ApproverDesignation, Member, Request};
use crate::services::requests::{self, now};
use sqlx::SqliteConnection;
use std::collections::HashSet;

/// Attach `member_ids` to a request as its approvers.
///
/// Fails with `InvalidInput` on an empty or duplicated set and `NotFound`
/// for unknown members.
pub async fn designate(
    conn: &mut SqliteConnection,
    request_id: i64,
    member_ids: &[i64],
) -> Result<Vec<ApproverDesignation>, AppError> {
    if member_ids.is_empty() {
        return Err(AppError::invalid_input_field(
            "at least one approver is required",
            "approverIds",
        ));
    }

    let mut seen = HashSet::with_capacity(member_ids.len());
    if let Some(duplicate) = member_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(AppError::invalid_input_field(
            format!("member {} is designated more than once", duplicate),
            "approverIds",
        ));
    }

    let created_at = now();
    let mut designations = Vec::with_capacity(member_ids.len());

    for &member_id in member_ids {
        if members::get_member(&mut *conn, member_id).await?.is_none() {
            return Err(AppError::not_found_with_id("Member", member_id.to_string()));
        }

        let designation = sqlx::query_as::<_, ApproverDesignation>(
            r#"
            INSERT INTO approver_designations (request_id, member_id, created_at)
            VALUES (?, ?, ?)
            RETURNING id, request_id, member_id, created_at
            "#,
        )
        .bind(request_id)
        .bind(member_id)
        .bind(created_at)
        .fetch_one(&mut *conn)
        .await?;

        designations.push(designation);
    }

    Ok(designations)
}

/// Current designations for a request, in designation order.
pub async fn approvers(
    conn: &mut SqliteConnection,
    request_id: i64,
) -> Result<Vec<ApproverDesignation>, AppError> {
    let rows = sqlx::query_as::<_, ApproverDesignation>(
        r#"
        SELECT id, request_id, member_id, created_at
        FROM approver_designations
        WHERE request_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Size of the current approver set.
pub async fn count(conn: &mut SqliteConnection, request_id: i64) -> Result<i64, AppError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM approver_designations WHERE request_id = ?")
            .bind(request_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(count)
}

/// Check whether a member is currently designated on a request.
pub async fn is_approver(
    conn: &mut SqliteConnection,
    request_id: i64,
    member_id: i64,
) -> Result<bool, AppError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM approver_designations WHERE request_id = ? AND member_id = ?",
    )
    .bind(request_id)
    .bind(member_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.is_some())
}

/// Remove one designation from a locked request.
///
/// The actor must be the request's author or an admin, and the request must
/// not be resolved or abandoned. The last remaining designation cannot be
/// removed.
pub async fn remove(
    conn: &mut SqliteConnection,
    request: &Request,
    designation_id: i64,
    actor: &Member,
) -> Result<ApproverDesignation, AppError> {
    let designation = sqlx::query_as::<_, ApproverDesignation>(
        r#"
        SELECT id, request_id, member_id, created_at
        FROM approver_designations
        WHERE id = ? AND request_id = ?
        "#,
    )
    .bind(designation_id)
    .bind(request.id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found_with_id("ApproverDesignation", designation_id.to_string()))?;

    if actor.id != request.author_id && !actor.is_admin() {
        return Err(AppError::forbidden(format!(
            "member {} may not change the approvers of request {}",
            actor.id, request.id
        )));
    }

    requests::ensure_open(request)?;

    if count(&mut *conn, request.id).await? <= 1 {
        return Err(AppError::invalid_input(format!(
            "request {} must keep at least one approver",
            request.id
        )));
    }

    sqlx::query("DELETE FROM approver_designations WHERE id = ?")
        .bind(designation.id)
        .execute(&mut *conn)
        .await?;

    Ok(designation)
}
