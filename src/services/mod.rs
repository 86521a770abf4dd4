//! Workflow services.
//!
//! Leaves first: the approver registry and response ledger record facts, the
//! consensus evaluator derives status from them, the re-request chain manager
//! links successors to rejected requests, and the workflow orchestrator ties
//! them together under the per-request lock.
//!
//! Services other than the orchestrator take a `&mut SqliteConnection` so
//! they can run inside the orchestrator's transaction.

pub mod approver_registry;
pub mod consensus;
pub mod notifications;
pub mod requests;
pub mod rerequest;
pub mod response_ledger;
pub mod workflow;

pub use notifications::{
    ChannelSink, FanoutSink, LogSink, NotificationSink, NotifyError, TransitionEvent,
};
pub use rerequest::ReRequest;
pub use workflow::WorkflowEngine;
