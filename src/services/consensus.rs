//! Consensus evaluation.
//!
//! Maps the size of a request's approver set and its live decision tallies to
//! a request status. A single rejection vetoes; otherwise every current
//! approver must approve.

use crate::models::{DecisionCounts, RequestStatus};

/// Derive a request status from approver and decision counts.
///
/// Deterministic and side-effect free: the submission, withdrawal and
/// approver-removal paths all call it with counts read under the request lock.
pub fn evaluate(approver_count: i64, approve_count: i64, reject_count: i64) -> RequestStatus {
    if reject_count >= 1 {
        RequestStatus::Rejected
    } else if approver_count > 0 && approve_count == approver_count {
        RequestStatus::Approved
    } else if approve_count + reject_count == 0 {
        RequestStatus::Pending
    } else {
        RequestStatus::Approving
    }
}

/// Convenience wrapper over [`evaluate`] for tallies read from the ledger.
pub fn evaluate_counts(approver_count: i64, counts: DecisionCounts) -> RequestStatus {
    evaluate(approver_count, counts.approvals, counts.rejections)
}
