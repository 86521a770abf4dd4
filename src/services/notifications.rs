//! Notification sink for terminal status transitions.
//!
//! The engine owns no notification state: the host injects a sink and the
//! engine hands it one [`TransitionEvent`] per request that reaches
//! `approved` or `rejected`. Delivery is best-effort.

use crate::models::{Request, RequestStatus};
use crate::services::requests::now;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Event: request-resolved
/// Emitted when a request reaches a terminal status.
pub const REQUEST_RESOLVED_EVENT: &str = "request-resolved";

/// Payload for request-resolved events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    /// Unique per emission; sinks may use it to drop duplicates.
    pub event_id: Uuid,

    pub request_id: i64,

    /// Final status: `approved` or `rejected`.
    pub status: RequestStatus,

    /// Author of the request, the usual recipient.
    pub author_id: i64,

    /// Whether a re-request can now be created.
    pub rerequest_eligible: bool,

    pub occurred_at: i64,
}

impl TransitionEvent {
    pub fn new(request: &Request, status: RequestStatus) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            request_id: request.id,
            status,
            author_id: request.author_id,
            rerequest_eligible: status == RequestStatus::Rejected,
            occurred_at: now(),
        }
    }
}

/// Notification delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Receives terminal transition events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError>;
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        log::info!(
            "[notify] {}: request {} is {} (author {}, re-request eligible: {})",
            REQUEST_RESOLVED_EVENT,
            event.request_id,
            event.status,
            event.author_id,
            event.rerequest_eligible
        );
        Ok(())
    }
}

/// Forwards events into a bounded channel drained by the host.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<TransitionEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver the host drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransitionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| NotifyError::Closed)
    }
}

/// Delivers every event to each inner sink concurrently.
///
/// All sinks are attempted; the call fails if any of them failed.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        let results = join_all(self.sinks.iter().map(|sink| sink.notify(event))).await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Delivery(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&self, _event: &TransitionEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp unreachable".to_string()))
        }
    }

    fn event(status: RequestStatus) -> TransitionEvent {
        TransitionEvent {
            event_id: Uuid::new_v4(),
            request_id: 7,
            status,
            author_id: 3,
            rerequest_eligible: status == RequestStatus::Rejected,
            occurred_at: 0,
        }
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&event(RequestStatus::Rejected)).unwrap();
        assert!(json.contains("\"requestId\":7"));
        assert!(json.contains("\"status\":\"rejected\""));
        assert!(json.contains("\"rerequestEligible\":true"));
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::new(4);
        let sent = event(RequestStatus::Approved);

        sink.notify(&sent).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), sent);
    }

    #[tokio::test]
    async fn test_channel_sink_closed_receiver() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);

        let err = sink.notify(&event(RequestStatus::Approved)).await.unwrap_err();
        assert!(matches!(err, NotifyError::Closed));
    }

    #[tokio::test]
    async fn test_fanout_attempts_every_sink() {
        let (channel, mut rx) = ChannelSink::new(4);
        let fanout = FanoutSink::new(vec![
            Arc::new(FailingSink),
            Arc::new(channel),
            Arc::new(LogSink),
        ]);

        let err = fanout.notify(&event(RequestStatus::Rejected)).await.unwrap_err();
        assert!(err.to_string().contains("smtp unreachable"));

        // The healthy sink still received the event
        assert_eq!(rx.recv().await.unwrap().request_id, 7);
    }
}
