//! Stage approvals - multi-approver request/response workflow engine.
//!
//! A requester submits a request to one or more designated approvers; each
//! approver independently approves or rejects. The request status is derived
//! from the aggregate of responses (a single rejection vetoes, otherwise
//! approval must be unanimous), and a rejected request may spawn exactly one
//! chained re-request.
//!
//! The engine is a library: the surrounding service layer owns transport,
//! authentication and listing endpoints, and injects a
//! [`services::NotificationSink`] for terminal transitions.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::EngineConfig;
pub use error::{AppError, ErrorKind};
pub use models::{Decision, RequestSnapshot, RequestStatus};
pub use services::WorkflowEngine;
