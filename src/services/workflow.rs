//! Workflow orchestrator.
//!
//! The transactional entry point of the approval engine. Every mutating
//! operation runs as one unit of work:
//! 1. Lock the request row, or the author row for a new request (first
//!    statement of the transaction)
//! 2. Apply the change through the registry, ledger or chain manager
//! 3. Recompute consensus from the decision set read under the lock
//! 4. Persist the new status and its audit row
//! 5. Commit, then notify the sink of terminal transitions
//!
//! Units of work that hit storage contention are retried as a whole with
//! bounded attempts.

use crate::config::EngineConfig;
use crate::db::members;
use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{
    ApproverDesignation, Decision, Member, NewRequest, NewResponse, Request, RequestSnapshot,
    RequestStatus, RequestTransition, Response, TransitionCause,
};
use crate::services::notifications::{NotificationSink, TransitionEvent};
use crate::services::rerequest::{self, ReRequest};
use crate::services::requests::{self, RequestDraft};
use crate::services::{approver_registry, consensus, response_ledger};
use sqlx::SqliteConnection;
use std::future::Future;
use std::sync::Arc;

/// Outcome of a committed unit of work.
struct Committed {
    snapshot: RequestSnapshot,
    /// Set when the unit of work moved the request into a terminal status.
    event: Option<TransitionEvent>,
}

/// Approval workflow engine.
///
/// Cheap to clone; clones share the pool and the notification sink.
#[derive(Clone)]
pub struct WorkflowEngine {
    pool: DbPool,
    sink: Arc<dyn NotificationSink>,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Create an engine over an initialized pool.
    pub fn new(pool: DbPool, sink: Arc<dyn NotificationSink>, config: EngineConfig) -> Self {
        Self { pool, sink, config }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a request with its approver set.
    pub async fn create_request(&self, input: NewRequest) -> Result<RequestSnapshot, AppError> {
        if input.title.trim().is_empty() {
            return Err(AppError::invalid_input_field("title must not be empty", "title"));
        }

        self.with_retry("create_request", || self.create_request_once(&input))
            .await
    }

    async fn create_request_once(&self, input: &NewRequest) -> Result<RequestSnapshot, AppError> {
        let mut tx = self.pool.begin().await?;

        members::lock_member(&mut *tx, input.author_id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("Member", input.author_id.to_string()))?;

        let request = requests::insert_request(
            &mut tx,
            RequestDraft {
                stage_id: input.stage_id,
                author_id: input.author_id,
                title: &input.title,
                content: &input.content,
                links: &input.links,
                parent_id: None,
            },
        )
        .await?;
        let designations = approver_registry::designate(&mut tx, request.id, &input.approver_ids).await?;

        tx.commit().await?;

        log::debug!(
            "[workflow] Created request {} with {} approver(s)",
            request.id,
            designations.len()
        );

        Ok(fresh_snapshot(&request, designations.len() as i64))
    }

    /// Record one approver's decision and recompute the request status.
    ///
    /// A second response from the same approver is a `Conflict`; responses
    /// are distinct decision events, not idempotent updates.
    pub async fn submit_response(
        &self,
        request_id: i64,
        approver_id: i64,
        decision: Decision,
        comment: impl Into<String>,
        links: Vec<String>,
    ) -> Result<RequestSnapshot, AppError> {
        let input = NewResponse {
            request_id,
            member_id: approver_id,
            decision,
            comment: comment.into(),
            links,
        };

        let committed = self
            .with_retry("submit_response", || self.submit_response_once(&input))
            .await?;
        Ok(self.finish(committed).await)
    }

    async fn submit_response_once(&self, input: &NewResponse) -> Result<Committed, AppError> {
        let mut tx = self.pool.begin().await?;

        let request = requests::lock_request(&mut tx, input.request_id).await?;
        let response = response_ledger::submit(&mut tx, &request, input).await?;

        let mut committed = recompute(
            &mut tx,
            &request,
            TransitionCause::Response,
            Some(input.member_id),
        )
        .await?;
        committed.snapshot.response = Some(response);

        tx.commit().await?;
        Ok(committed)
    }

    /// Remove one approver designation and recompute the request status.
    ///
    /// Shrinking the approver set can resolve the request: if every remaining
    /// approver already approved, the request becomes `approved`.
    pub async fn remove_approver(
        &self,
        request_id: i64,
        designation_id: i64,
        acting_member_id: i64,
    ) -> Result<RequestSnapshot, AppError> {
        let committed = self
            .with_retry("remove_approver", || {
                self.remove_approver_once(request_id, designation_id, acting_member_id)
            })
            .await?;
        Ok(self.finish(committed).await)
    }

    async fn remove_approver_once(
        &self,
        request_id: i64,
        designation_id: i64,
        acting_member_id: i64,
    ) -> Result<Committed, AppError> {
        let mut tx = self.pool.begin().await?;

        let request = requests::lock_request(&mut tx, request_id).await?;
        let actor = require_member(&mut tx, acting_member_id).await?;
        approver_registry::remove(&mut tx, &request, designation_id, &actor).await?;

        let committed = recompute(
            &mut tx,
            &request,
            TransitionCause::Removal,
            Some(acting_member_id),
        )
        .await?;

        tx.commit().await?;
        Ok(committed)
    }

    /// Withdraw an approver's live response on an unresolved request.
    pub async fn withdraw_response(
        &self,
        request_id: i64,
        approver_id: i64,
    ) -> Result<RequestSnapshot, AppError> {
        let committed = self
            .with_retry("withdraw_response", || {
                self.withdraw_response_once(request_id, approver_id)
            })
            .await?;
        Ok(self.finish(committed).await)
    }

    async fn withdraw_response_once(
        &self,
        request_id: i64,
        approver_id: i64,
    ) -> Result<Committed, AppError> {
        let mut tx = self.pool.begin().await?;

        let request = requests::lock_request(&mut tx, request_id).await?;
        response_ledger::withdraw(&mut tx, &request, approver_id).await?;

        let committed = recompute(
            &mut tx,
            &request,
            TransitionCause::Withdrawal,
            Some(approver_id),
        )
        .await?;

        tx.commit().await?;
        Ok(committed)
    }

    /// Create the single successor of a rejected request.
    pub async fn create_re_request(
        &self,
        parent_request_id: i64,
        acting_member_id: i64,
        input: ReRequest,
    ) -> Result<RequestSnapshot, AppError> {
        if input.title.trim().is_empty() {
            return Err(AppError::invalid_input_field("title must not be empty", "title"));
        }

        self.with_retry("create_re_request", || {
            self.create_re_request_once(parent_request_id, acting_member_id, &input)
        })
        .await
    }

    async fn create_re_request_once(
        &self,
        parent_request_id: i64,
        acting_member_id: i64,
        input: &ReRequest,
    ) -> Result<RequestSnapshot, AppError> {
        let mut tx = self.pool.begin().await?;

        let parent = requests::lock_request(&mut tx, parent_request_id).await?;
        let actor = require_member(&mut tx, acting_member_id).await?;
        let child = rerequest::create(&mut tx, &parent, &actor, input).await?;
        let approver_count = approver_registry::count(&mut tx, child.id).await?;

        tx.commit().await?;

        log::info!(
            "[workflow] Request {} re-requested as {}",
            parent_request_id,
            child.id
        );

        Ok(fresh_snapshot(&child, approver_count))
    }

    /// Abandon (soft-delete) an unresolved request.
    ///
    /// Only the author or an admin may abandon. Afterwards the request
    /// accepts no responses, removals or withdrawals.
    pub async fn abandon_request(
        &self,
        request_id: i64,
        acting_member_id: i64,
    ) -> Result<RequestSnapshot, AppError> {
        self.with_retry("abandon_request", || {
            self.abandon_request_once(request_id, acting_member_id)
        })
        .await
    }

    async fn abandon_request_once(
        &self,
        request_id: i64,
        acting_member_id: i64,
    ) -> Result<RequestSnapshot, AppError> {
        let mut tx = self.pool.begin().await?;

        let request = requests::lock_request(&mut tx, request_id).await?;
        let actor = require_member(&mut tx, acting_member_id).await?;

        if actor.id != request.author_id && !actor.is_admin() {
            return Err(AppError::forbidden(format!(
                "member {} may not abandon request {}",
                actor.id, request.id
            )));
        }
        requests::ensure_open(&request)?;
        requests::soft_delete(&mut tx, request.id).await?;

        let snapshot = load_snapshot(&mut tx, &request).await?;
        tx.commit().await?;

        log::info!("[workflow] Request {} abandoned by member {}", request.id, actor.id);

        Ok(snapshot)
    }

    /// Current projection of a request.
    pub async fn get_request(&self, request_id: i64) -> Result<RequestSnapshot, AppError> {
        let mut conn = self.pool.acquire().await?;
        let request = requests::fetch_request(&mut conn, request_id).await?;
        load_snapshot(&mut conn, &request).await
    }

    /// Full request row.
    pub async fn request(&self, request_id: i64) -> Result<Request, AppError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_request(&mut conn, request_id).await
    }

    /// Current approver designations of a request.
    pub async fn approvers(&self, request_id: i64) -> Result<Vec<ApproverDesignation>, AppError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_request(&mut conn, request_id).await?;
        approver_registry::approvers(&mut conn, request_id).await
    }

    /// Every response on a request, withdrawn ones included.
    pub async fn list_responses(&self, request_id: i64) -> Result<Vec<Response>, AppError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_request(&mut conn, request_id).await?;
        response_ledger::list(&mut conn, request_id).await
    }

    /// The re-request chain from its root down to `request_id`.
    pub async fn lineage(&self, request_id: i64) -> Result<Vec<Request>, AppError> {
        let mut conn = self.pool.acquire().await?;
        requests::lineage(&mut conn, request_id).await
    }

    /// Status changes recorded for a request.
    pub async fn transitions(&self, request_id: i64) -> Result<Vec<RequestTransition>, AppError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_request(&mut conn, request_id).await?;
        requests::transitions(&mut conn, request_id).await
    }

    /// Run a unit of work, retrying it while storage is contended.
    ///
    /// Exhausted retries surface as `Conflict`.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut unit: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let retry = &self.config.retry;
        let mut attempt = 1;

        loop {
            match unit().await {
                Err(err) if err.is_retryable() => {
                    if attempt >= retry.max_attempts {
                        log::warn!(
                            "[workflow] {} gave up after {} attempt(s): {}",
                            operation,
                            attempt,
                            err
                        );
                        return Err(AppError::conflict(format!(
                            "{} could not complete due to concurrent updates; retry later",
                            operation
                        )));
                    }

                    log::warn!(
                        "[workflow] {} contended (attempt {}/{}): {}",
                        operation,
                        attempt,
                        retry.max_attempts,
                        err
                    );
                    tokio::time::sleep(retry.backoff_for(attempt)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Notify the sink of a committed terminal transition.
    ///
    /// Runs after commit, bounded by the configured timeout. Failures are
    /// logged and never change the operation's result.
    async fn finish(&self, committed: Committed) -> RequestSnapshot {
        if let Some(event) = committed.event {
            match tokio::time::timeout(self.config.notify_timeout(), self.sink.notify(&event)).await
            {
                Ok(Ok(())) => log::debug!(
                    "[notify] Delivered {} for request {}",
                    event.status,
                    event.request_id
                ),
                Ok(Err(e)) => log::warn!(
                    "[notify] Failed to notify {} for request {}: {}",
                    event.status,
                    event.request_id,
                    e
                ),
                Err(_) => log::warn!(
                    "[notify] Timed out notifying {} for request {}",
                    event.status,
                    event.request_id
                ),
            }
        }

        committed.snapshot
    }
}

/// Resolve a member or fail with `NotFound`.
async fn require_member(conn: &mut SqliteConnection, member_id: i64) -> Result<Member, AppError> {
    members::get_member(&mut *conn, member_id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("Member", member_id.to_string()))
}

/// Recompute consensus for a locked request and persist any change.
async fn recompute(
    conn: &mut SqliteConnection,
    request: &Request,
    cause: TransitionCause,
    actor_id: Option<i64>,
) -> Result<Committed, AppError> {
    let approver_count = approver_registry::count(&mut *conn, request.id).await?;
    let counts = response_ledger::count_decisions(&mut *conn, request.id).await?;
    let status = consensus::evaluate_counts(approver_count, counts);

    let changed = requests::apply_status(&mut *conn, request, status, cause, actor_id).await?;
    let event = (changed && status.is_terminal()).then(|| TransitionEvent::new(request, status));

    Ok(Committed {
        snapshot: RequestSnapshot {
            id: request.id,
            status,
            author_id: request.author_id,
            parent_id: request.parent_id,
            approver_count,
            approvals: counts.approvals,
            rejections: counts.rejections,
            response: None,
        },
        event,
    })
}

/// Snapshot of a request as currently stored.
async fn load_snapshot(
    conn: &mut SqliteConnection,
    request: &Request,
) -> Result<RequestSnapshot, AppError> {
    let approver_count = approver_registry::count(&mut *conn, request.id).await?;
    let counts = response_ledger::count_decisions(&mut *conn, request.id).await?;

    Ok(RequestSnapshot {
        id: request.id,
        status: request.status_enum()?,
        author_id: request.author_id,
        parent_id: request.parent_id,
        approver_count,
        approvals: counts.approvals,
        rejections: counts.rejections,
        response: None,
    })
}

/// Snapshot of a request that has no responses yet.
fn fresh_snapshot(request: &Request, approver_count: i64) -> RequestSnapshot {
    RequestSnapshot {
        id: request.id,
        status: RequestStatus::Pending,
        author_id: request.author_id,
        parent_id: request.parent_id,
        approver_count,
        approvals: 0,
        rejections: 0,
        response: None,
    }
}
