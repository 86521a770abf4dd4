//! Response ledger.
//!
//! Append-only record of approve/reject decisions. At most one live response
//! per approver and request; a withdrawn response is kept for audit and no
//! longer counts, which frees the approver to respond again. The ledger never
//! touches request status.

use crate::error::AppError;
use crate::models::{DecisionCounts, NewResponse, Request, Response};
use crate::services::approver_registry;
use crate::services::requests::{self, now};
use sqlx::SqliteConnection;

const RESPONSE_COLUMNS: &str =
    "id, request_id, member_id, decision, comment, links, created_at, updated_at, deleted_at";

/// Record a decision against a locked request.
///
/// Fails with `Forbidden` if the member is not a current approver,
/// `InvalidState` if the request is resolved or abandoned, and `Conflict` if
/// the member already has a live response.
pub async fn submit(
    conn: &mut SqliteConnection,
    request: &Request,
    input: &NewResponse,
) -> Result<Response, AppError> {
    if !approver_registry::is_approver(&mut *conn, request.id, input.member_id).await? {
        return Err(AppError::forbidden(format!(
            "member {} is not an approver of request {}",
            input.member_id, request.id
        )));
    }

    requests::ensure_open(request)?;

    if live_response(&mut *conn, request.id, input.member_id)
        .await?
        .is_some()
    {
        return Err(AppError::conflict(format!(
            "member {} already responded to request {}",
            input.member_id, request.id
        )));
    }

    let links = serde_json::to_string(&input.links)?;
    let created_at = now();

    let response = sqlx::query_as::<_, Response>(&format!(
        r#"
        INSERT INTO responses (request_id, member_id, decision, comment, links, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        RESPONSE_COLUMNS
    ))
    .bind(request.id)
    .bind(input.member_id)
    .bind(input.decision.to_string())
    .bind(&input.comment)
    .bind(links)
    .bind(created_at)
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(response)
}

/// Live approve/reject tallies from the request's current approvers.
///
/// Responses from members whose designation was removed are ignored.
pub async fn count_decisions(
    conn: &mut SqliteConnection,
    request_id: i64,
) -> Result<DecisionCounts, AppError> {
    let counts = sqlx::query_as::<_, DecisionCounts>(
        r#"
        SELECT
            COUNT(CASE WHEN r.decision = 'approved' THEN 1 END) AS approvals,
            COUNT(CASE WHEN r.decision = 'rejected' THEN 1 END) AS rejections
        FROM responses r
        JOIN approver_designations d
            ON d.request_id = r.request_id AND d.member_id = r.member_id
        WHERE r.request_id = ? AND r.deleted_at IS NULL
        "#,
    )
    .bind(request_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(counts)
}

/// The member's live response on a request, if any.
pub async fn live_response(
    conn: &mut SqliteConnection,
    request_id: i64,
    member_id: i64,
) -> Result<Option<Response>, AppError> {
    let response = sqlx::query_as::<_, Response>(&format!(
        "SELECT {} FROM responses WHERE request_id = ? AND member_id = ? AND deleted_at IS NULL",
        RESPONSE_COLUMNS
    ))
    .bind(request_id)
    .bind(member_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(response)
}

/// Withdraw the member's live response on a locked, unresolved request.
pub async fn withdraw(
    conn: &mut SqliteConnection,
    request: &Request,
    member_id: i64,
) -> Result<Response, AppError> {
    requests::ensure_open(request)?;

    let live = live_response(&mut *conn, request.id, member_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found_with_id("Response", format!("{}/{}", request.id, member_id))
        })?;

    let deleted_at = now();
    let withdrawn = sqlx::query_as::<_, Response>(&format!(
        "UPDATE responses SET deleted_at = ?, updated_at = ? WHERE id = ? RETURNING {}",
        RESPONSE_COLUMNS
    ))
    .bind(deleted_at)
    .bind(deleted_at)
    .bind(live.id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(withdrawn)
}

/// Every response on a request, withdrawn ones included, oldest first.
pub async fn list(conn: &mut SqliteConnection, request_id: i64) -> Result<Vec<Response>, AppError> {
    let responses = sqlx::query_as::<_, Response>(&format!(
        "SELECT {} FROM responses WHERE request_id = ? ORDER BY id ASC",
        RESPONSE_COLUMNS
    ))
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(responses)
}
