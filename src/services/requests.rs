//! Request persistence service.
//!
//! Row-level helpers shared by the orchestrator and the re-request chain:
//! locking, status transitions with their audit rows, soft deletion and
//! chain lookups. Every helper runs on a caller-supplied connection so it can
//! take part in the caller's transaction.

use crate::error::AppError;
use crate::models::{Request, RequestStatus, RequestTransition, TransitionCause};
use sqlx::SqliteConnection;

const REQUEST_COLUMNS: &str = "id, stage_id, author_id, title, content, links, parent_id, status, version, created_at, resolved_at, deleted_at";

/// Get the current Unix timestamp.
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Fields for a new request row.
#[derive(Debug, Clone)]
pub struct RequestDraft<'a> {
    pub stage_id: i64,
    pub author_id: i64,
    pub title: &'a str,
    pub content: &'a str,
    pub links: &'a [String],
    pub parent_id: Option<i64>,
}

/// Insert a request in `pending` status.
pub async fn insert_request(
    conn: &mut SqliteConnection,
    draft: RequestDraft<'_>,
) -> Result<Request, AppError> {
    let links = serde_json::to_string(draft.links)?;

    let request = sqlx::query_as::<_, Request>(&format!(
        r#"
        INSERT INTO requests (stage_id, author_id, title, content, links, parent_id, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        REQUEST_COLUMNS
    ))
    .bind(draft.stage_id)
    .bind(draft.author_id)
    .bind(draft.title)
    .bind(draft.content)
    .bind(links)
    .bind(draft.parent_id)
    .bind(RequestStatus::Pending.to_string())
    .bind(now())
    .fetch_one(&mut *conn)
    .await?;

    Ok(request)
}

/// Read a request without locking it.
pub async fn fetch_request(conn: &mut SqliteConnection, request_id: i64) -> Result<Request, AppError> {
    sqlx::query_as::<_, Request>(&format!(
        "SELECT {} FROM requests WHERE id = ?",
        REQUEST_COLUMNS
    ))
    .bind(request_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found_with_id("Request", request_id.to_string()))
}

/// Lock a request for the rest of the transaction and return its row.
///
/// This must be the first statement of the transaction: writing before
/// reading makes SQLite take the write lock (waiting out the busy timeout)
/// instead of failing a read-to-write upgrade later. Every decision-set read
/// that follows sees the state left by the previous holder.
pub async fn lock_request(conn: &mut SqliteConnection, request_id: i64) -> Result<Request, AppError> {
    sqlx::query_as::<_, Request>(&format!(
        "UPDATE requests SET version = version + 1 WHERE id = ? RETURNING {}",
        REQUEST_COLUMNS
    ))
    .bind(request_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found_with_id("Request", request_id.to_string()))
}

/// Fail unless the request can still change: not abandoned, not resolved.
pub fn ensure_open(request: &Request) -> Result<(), AppError> {
    if request.is_deleted() {
        return Err(AppError::invalid_state(format!(
            "request {} was abandoned",
            request.id
        )));
    }
    if request.status_enum()?.is_terminal() {
        return Err(AppError::invalid_state_with_status(
            format!("request {} is already resolved", request.id),
            request.status.clone(),
        ));
    }
    Ok(())
}

/// Persist a recomputed status if it differs from the stored one.
///
/// Writes the audit row in the same transaction. Returns whether the status
/// changed.
pub async fn apply_status(
    conn: &mut SqliteConnection,
    request: &Request,
    status: RequestStatus,
    cause: TransitionCause,
    actor_id: Option<i64>,
) -> Result<bool, AppError> {
    let current = request.status_enum()?;
    if current == status {
        return Ok(false);
    }

    let at = now();
    let resolved_at = status.is_terminal().then_some(at);

    sqlx::query("UPDATE requests SET status = ?, resolved_at = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(resolved_at)
        .bind(request.id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO request_transitions (request_id, from_status, to_status, cause, actor_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(request.id)
    .bind(current.to_string())
    .bind(status.to_string())
    .bind(cause.to_string())
    .bind(actor_id)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    log::info!(
        "[workflow] Request {} {} -> {} ({})",
        request.id,
        current,
        status,
        cause
    );

    Ok(true)
}

/// Soft-delete a request.
pub async fn soft_delete(conn: &mut SqliteConnection, request_id: i64) -> Result<(), AppError> {
    sqlx::query("UPDATE requests SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now())
        .bind(request_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// ID of the live re-request chained to `parent_id`, if any.
pub async fn live_child(conn: &mut SqliteConnection, parent_id: i64) -> Result<Option<i64>, AppError> {
    let child: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM requests WHERE parent_id = ? AND deleted_at IS NULL")
            .bind(parent_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(child.map(|(id,)| id))
}

/// Walk the re-request chain from its root down to `request_id`.
pub async fn lineage(conn: &mut SqliteConnection, request_id: i64) -> Result<Vec<Request>, AppError> {
    let chain = sqlx::query_as::<_, Request>(
        r#"
        WITH RECURSIVE chain(id, parent_id, depth) AS (
            SELECT id, parent_id, 0 FROM requests WHERE id = ?
            UNION ALL
            SELECT r.id, r.parent_id, chain.depth + 1
            FROM requests r
            JOIN chain ON r.id = chain.parent_id
        )
        SELECT r.id, r.stage_id, r.author_id, r.title, r.content, r.links, r.parent_id,
               r.status, r.version, r.created_at, r.resolved_at, r.deleted_at
        FROM requests r
        JOIN chain ON r.id = chain.id
        ORDER BY chain.depth DESC
        "#,
    )
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await?;

    if chain.is_empty() {
        return Err(AppError::not_found_with_id("Request", request_id.to_string()));
    }

    Ok(chain)
}

/// Status changes recorded for a request, oldest first.
pub async fn transitions(
    conn: &mut SqliteConnection,
    request_id: i64,
) -> Result<Vec<RequestTransition>, AppError> {
    let rows = sqlx::query_as::<_, RequestTransition>(
        r#"
        SELECT id, request_id, from_status, to_status, cause, actor_id, created_at
        FROM request_transitions
        WHERE request_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}
