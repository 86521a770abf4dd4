//! Data models for the approval workflow.
//!
//! These models represent the entities stored in the SQLite database and the
//! projections returned to the surrounding service layer.
//!
//! Row models derive Serialize and FromRow; enum-valued columns are stored as
//! lowercase strings and parsed on demand.

pub mod approver;
pub mod member;
pub mod request;
pub mod response;
pub mod transition;

// Re-exports for convenient access
pub use approver::ApproverDesignation;
pub use member::{Member, MemberRole};
pub use request::{NewRequest, Request, RequestSnapshot, RequestStatus};
pub use response::{Decision, DecisionCounts, NewResponse, Response};
pub use transition::{RequestTransition, TransitionCause};
