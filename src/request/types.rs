//! Core types for the anonymization-request lifecycle.
//!
//! This module defines the type-safe request lifecycle using the typestate
//! pattern. Each request progresses through distinct states, enforced at
//! compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::owner::OwnerRef;

/// Marker trait for valid request states.
///
/// This trait enables the typestate pattern, ensuring that operations
/// are only performed on requests in valid states.
pub trait RequestState: Send + Sync {}

/// An anonymization request tracking one workflow instance for one owner.
///
/// Uses the typestate pattern to ensure type-safe state transitions.
/// The generic parameter `T` represents the current state of the request.
#[derive(Debug, Clone, Serialize)]
pub struct Request<T: RequestState> {
    /// The current state of the request.
    pub state: T,
    /// The immutable request record.
    pub data: RequestData,
}

/// Immutable record fields of a request, persisted alongside its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestData {
    /// The ID with which the request was created.
    pub id: RequestId,

    /// The owner whose data is subject to anonymization.
    pub owner: OwnerRef,

    /// The actor that raised the request, if any was recorded.
    pub requested_by: Option<String>,

    /// When the request was created.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Request States
// ============================================================================

/// Request is waiting for an approval decision.
///
/// This is the initial state for all newly created requests.
#[derive(Debug, Clone, Serialize)]
pub struct WaitingForApproval {}

impl RequestState for WaitingForApproval {}

/// Request has been approved but dispatch has not started executing yet.
#[derive(Debug, Clone, Serialize)]
pub struct Pending {
    pub approved_at: DateTime<Utc>,
}

impl RequestState for Pending {}

/// Dispatch is underway: services are being notified and/or local
/// anonymization is executing.
#[derive(Debug, Clone, Serialize)]
pub struct Running {
    pub approved_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

impl RequestState for Running {}

/// Local anonymization completed (terminal).
#[derive(Debug, Clone, Serialize)]
pub struct Done {
    pub approved_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RequestState for Done {}

/// Request was denied by an approver (terminal).
#[derive(Debug, Clone, Serialize)]
pub struct Denied {
    pub denied_at: DateTime<Utc>,
}

impl RequestState for Denied {}

/// Request was canceled before a decision (terminal).
#[derive(Debug, Clone, Serialize)]
pub struct Canceled {
    pub canceled_at: DateTime<Utc>,
}

impl RequestState for Canceled {}

/// Unique identifier for a request in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        RequestId(uuid)
    }
}

impl std::ops::Deref for RequestId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Post-Commit Effects
// ============================================================================

/// Deferred side effect produced by a committed transition.
///
/// Transitions never execute effects themselves; they persist the new state
/// and hand one of these back to the caller, which runs it only once the
/// persist has returned successfully. If persistence fails, no effect value
/// is ever produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Notify every configured external service (approve's effect).
    DispatchServices,
    /// Anonymize the owner's data locally (run's effect).
    AnonymizeLocally,
}

/// External event surface of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    Approve,
    Cancel,
    Deny,
    Run,
    Done,
}

impl RequestEvent {
    /// State label an event requires the request to be in.
    pub fn expected_state(&self) -> &'static str {
        match self {
            RequestEvent::Approve | RequestEvent::Cancel | RequestEvent::Deny => {
                "waiting_for_approval"
            }
            RequestEvent::Run => "pending",
            RequestEvent::Done => "running",
        }
    }
}

// ============================================================================
// Unified Request Representation
// ============================================================================

/// Enum that can hold a request in any state.
///
/// This is used for storage and lookups where we need to handle requests
/// uniformly regardless of their current state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", content = "request", rename_all = "snake_case")]
pub enum AnyRequest {
    WaitingForApproval(Request<WaitingForApproval>),
    Pending(Request<Pending>),
    Running(Request<Running>),
    Done(Request<Done>),
    Denied(Request<Denied>),
    Canceled(Request<Canceled>),
}

impl AnyRequest {
    /// Get the request ID regardless of state.
    pub fn id(&self) -> RequestId {
        self.data().id
    }

    /// Get the request record regardless of state.
    pub fn data(&self) -> &RequestData {
        match self {
            AnyRequest::WaitingForApproval(r) => &r.data,
            AnyRequest::Pending(r) => &r.data,
            AnyRequest::Running(r) => &r.data,
            AnyRequest::Done(r) => &r.data,
            AnyRequest::Denied(r) => &r.data,
            AnyRequest::Canceled(r) => &r.data,
        }
    }

    /// The persisted state label of the current state.
    pub fn state_label(&self) -> &'static str {
        match self {
            AnyRequest::WaitingForApproval(_) => "waiting_for_approval",
            AnyRequest::Pending(_) => "pending",
            AnyRequest::Running(_) => "running",
            AnyRequest::Done(_) => "done",
            AnyRequest::Denied(_) => "denied",
            AnyRequest::Canceled(_) => "canceled",
        }
    }

    /// Check if this request counts against the one-active-request-per-owner
    /// invariant (waiting_for_approval, pending, or running).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AnyRequest::WaitingForApproval(_) | AnyRequest::Pending(_) | AnyRequest::Running(_)
        )
    }

    /// Check if this request is in a terminal state (done, denied, canceled).
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

// Conversion traits for going from typed Request to AnyRequest

impl From<Request<WaitingForApproval>> for AnyRequest {
    fn from(r: Request<WaitingForApproval>) -> Self {
        AnyRequest::WaitingForApproval(r)
    }
}

impl From<Request<Pending>> for AnyRequest {
    fn from(r: Request<Pending>) -> Self {
        AnyRequest::Pending(r)
    }
}

impl From<Request<Running>> for AnyRequest {
    fn from(r: Request<Running>) -> Self {
        AnyRequest::Running(r)
    }
}

impl From<Request<Done>> for AnyRequest {
    fn from(r: Request<Done>) -> Self {
        AnyRequest::Done(r)
    }
}

impl From<Request<Denied>> for AnyRequest {
    fn from(r: Request<Denied>) -> Self {
        AnyRequest::Denied(r)
    }
}

impl From<Request<Canceled>> for AnyRequest {
    fn from(r: Request<Canceled>) -> Self {
        AnyRequest::Canceled(r)
    }
}
