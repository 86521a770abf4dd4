//! Concurrency tests.
//!
//! Units of work touching the same request are serialized by the request
//! lock. These tests race responses, removals and re-requests from multiple
//! tasks and check that the outcome matches some sequential ordering. Units
//! on different requests must never fail each other. Everything runs with
//! the default retry budget.

use stage_approvals::db::members::insert_member;
use stage_approvals::models::{MemberRole, NewRequest};
use stage_approvals::services::{ChannelSink, ReRequest, TransitionEvent};
use stage_approvals::{Decision, EngineConfig, ErrorKind, RequestStatus, WorkflowEngine};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;

const APPROVERS: usize = 8;

struct Harness {
    engine: WorkflowEngine,
    events: mpsc::Receiver<TransitionEvent>,
    author: i64,
    approvers: Vec<i64>,
    _dir: TempDir,
}

async fn setup() -> Harness {
    let dir = tempdir().unwrap();
    let pool = stage_approvals::db::initialize(&dir.path().join("test.db"))
        .await
        .unwrap();

    let author = insert_member(&pool, "author", MemberRole::Member).await.unwrap().id;
    let mut approvers = Vec::new();
    for i in 0..APPROVERS {
        let name = format!("approver-{}", i);
        approvers.push(insert_member(&pool, &name, MemberRole::Member).await.unwrap().id);
    }

    let (sink, events) = ChannelSink::new(256);

    Harness {
        engine: WorkflowEngine::new(pool, Arc::new(sink), EngineConfig::default()),
        events,
        author,
        approvers,
        _dir: dir,
    }
}

impl Harness {
    async fn request_with(&self, approver_ids: Vec<i64>) -> i64 {
        self.engine
            .create_request(NewRequest {
                stage_id: 1,
                author_id: self.author,
                title: "Release 2.0".to_string(),
                content: String::new(),
                links: vec![],
                approver_ids,
            })
            .await
            .unwrap()
            .id
    }

    fn drain_events(&mut self) -> Vec<TransitionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_resolve_once() {
    let mut h = setup().await;
    let r = h.request_with(h.approvers.clone()).await;

    let handles: Vec<_> = h
        .approvers
        .iter()
        .map(|&member| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .submit_response(r, member, Decision::Approved, "", vec![])
                    .await
            })
        })
        .collect();

    let mut approved_snapshots = 0;
    for handle in handles {
        let snap = handle.await.unwrap().unwrap();
        if snap.status == RequestStatus::Approved {
            approved_snapshots += 1;
        }
    }
    // Only the last approval observed unanimity
    assert_eq!(approved_snapshots, 1);

    let snap = h.engine.get_request(r).await.unwrap();
    assert_eq!(snap.status, RequestStatus::Approved);
    assert_eq!(snap.approvals, APPROVERS as i64);

    let events = h.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, RequestStatus::Approved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_responses_with_one_veto() {
    let mut h = setup().await;
    let r = h.request_with(h.approvers.clone()).await;
    let vetoer = h.approvers[APPROVERS / 2];

    let handles: Vec<_> = h
        .approvers
        .iter()
        .map(|&member| {
            let engine = h.engine.clone();
            let decision = if member == vetoer {
                Decision::Rejected
            } else {
                Decision::Approved
            };
            tokio::spawn(async move {
                engine.submit_response(r, member, decision, "", vec![]).await
            })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::InvalidState),
        }
    }

    let snap = h.engine.get_request(r).await.unwrap();
    assert_eq!(snap.status, RequestStatus::Rejected);
    assert_eq!(snap.rejections, 1);
    // Every accepted response was recorded before the veto closed the request
    assert_eq!(snap.approvals + snap.rejections, accepted);

    let responses = h.engine.list_responses(r).await.unwrap();
    assert_eq!(responses.len() as i64, accepted);

    assert_eq!(h.drain_events().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_submissions_race() {
    let h = setup().await;
    let r = h.request_with(h.approvers.clone()).await;
    let member = h.approvers[0];

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .submit_response(r, member, Decision::Approved, "", vec![])
                    .await
            })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(ok, 1);

    let snap = h.engine.get_request(r).await.unwrap();
    assert_eq!(snap.approvals, 1);
    assert_eq!(snap.status, RequestStatus::Approving);
}

/// A's approval is on record. B approves while the author removes A. In every
/// serialization the request ends approved.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_approval_races_removal() {
    let mut h = setup().await;

    for _ in 0..10 {
        let (a, b) = (h.approvers[0], h.approvers[1]);
        let r = h.request_with(vec![a, b]).await;
        h.engine
            .submit_response(r, a, Decision::Approved, "", vec![])
            .await
            .unwrap();

        let designation_a = h
            .engine
            .approvers(r)
            .await
            .unwrap()
            .into_iter()
            .find(|d| d.member_id == a)
            .unwrap();

        let approve = {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .submit_response(r, b, Decision::Approved, "", vec![])
                    .await
            })
        };
        let remove = {
            let engine = h.engine.clone();
            let author = h.author;
            tokio::spawn(async move { engine.remove_approver(r, designation_a.id, author).await })
        };

        let approve = approve.await.unwrap();
        let remove = remove.await.unwrap();

        assert!(approve.unwrap().approvals >= 1);
        if let Err(err) = remove {
            // Removal serialized after the request was already approved
            assert_eq!(err.kind(), ErrorKind::InvalidState);
        }

        let snap = h.engine.get_request(r).await.unwrap();
        assert_eq!(snap.status, RequestStatus::Approved);

        let events = h.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_id, r);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rerequests_create_one_successor() {
    let h = setup().await;
    let r = h.request_with(vec![h.approvers[0]]).await;
    h.engine
        .submit_response(r, h.approvers[0], Decision::Rejected, "", vec![])
        .await
        .unwrap();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let engine = h.engine.clone();
            let author = h.author;
            let approver = h.approvers[1];
            tokio::spawn(async move {
                engine
                    .create_re_request(
                        r,
                        author,
                        ReRequest {
                            title: format!("Release 2.0 attempt {}", i),
                            content: String::new(),
                            links: vec![],
                            approver_ids: vec![approver],
                        },
                    )
                    .await
            })
        })
        .collect();

    let mut successors = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(snap) => successors.push(snap.id),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(successors.len(), 1);

    let lineage = h.engine.lineage(successors[0]).await.unwrap();
    assert_eq!(lineage.len(), 2);
    assert_eq!(lineage[0].id, r);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rerequests_on_distinct_parents_never_conflict() {
    let h = setup().await;
    let approver = h.approvers[0];

    let mut parents = Vec::new();
    for _ in 0..32 {
        let r = h.request_with(vec![approver]).await;
        h.engine
            .submit_response(r, approver, Decision::Rejected, "", vec![])
            .await
            .unwrap();
        parents.push(r);
    }

    let handles: Vec<_> = parents
        .iter()
        .map(|&parent| {
            let engine = h.engine.clone();
            let author = h.author;
            let next_approver = h.approvers[1];
            tokio::spawn(async move {
                engine
                    .create_re_request(
                        parent,
                        author,
                        ReRequest {
                            title: format!("Follow-up to {}", parent),
                            content: String::new(),
                            links: vec![],
                            approver_ids: vec![next_approver],
                        },
                    )
                    .await
            })
        })
        .collect();

    for (handle, &parent) in handles.into_iter().zip(&parents) {
        let child = handle.await.unwrap().unwrap();
        assert_eq!(child.parent_id, Some(parent));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_units_across_requests_never_fail() {
    let h = setup().await;

    let mut open_requests = Vec::new();
    for _ in 0..16 {
        open_requests.push(h.request_with(vec![h.approvers[0], h.approvers[1]]).await);
    }

    let mut handles = Vec::new();
    for &r in &open_requests {
        let engine = h.engine.clone();
        let approver = h.approvers[0];
        handles.push(tokio::spawn(async move {
            engine
                .submit_response(r, approver, Decision::Approved, "", vec![])
                .await
                .map(|snap| snap.id)
        }));

        let engine = h.engine.clone();
        let author = h.author;
        let approvers = vec![h.approvers[2], h.approvers[3]];
        handles.push(tokio::spawn(async move {
            engine
                .create_request(NewRequest {
                    stage_id: 7,
                    author_id: author,
                    title: "Parallel request".to_string(),
                    content: String::new(),
                    links: vec![],
                    approver_ids: approvers,
                })
                .await
                .map(|snap| snap.id)
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for r in open_requests {
        let snap = h.engine.get_request(r).await.unwrap();
        assert_eq!(snap.status, RequestStatus::Approving);
    }
}
