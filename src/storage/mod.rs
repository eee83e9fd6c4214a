//! Persistence boundary for anonymization requests.
//!
//! The persistence engine itself is a collaborator; this crate only defines
//! the contract it must satisfy. The typestate layer guarantees that only
//! table-legal transitions reach `persist`, but implementations still have to
//! defend against concurrent writers (see the trait docs).

use async_trait::async_trait;

use crate::error::Result;
use crate::owner::OwnerRef;
use crate::request::{AnyRequest, Request, RequestId, RequestState, WaitingForApproval};

pub mod memory;

pub use memory::MemoryStorage;

/// Storage trait for persisting and querying requests.
///
/// Persisted fields per request: id, owner type, owner id, requesting actor
/// (nullable), state, created-at.
///
/// # Concurrency contract
/// - `persist` must detect lost updates: when two callers race the same
///   transition, at most one may succeed, under at least read-committed
///   isolation (optimistic check or row locking).
/// - `insert` must re-validate the one-active-request-per-owner invariant
///   atomically with the write. The [`UniquenessGuard`](crate::guard::UniquenessGuard)
///   check that precedes it is not atomic on its own.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a newly created request in its initial state.
    ///
    /// # Errors
    /// Returns `DuplicateRequest` if the owner already has an active request.
    async fn insert(&self, request: &Request<WaitingForApproval>) -> Result<()>;

    /// Durably commit a state transition.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the stored state is no longer the
    /// transition's from-state (lost update), `RequestNotFound` if the row
    /// does not exist.
    async fn persist<T: RequestState + Clone>(&self, request: &Request<T>) -> Result<()>
    where
        AnyRequest: From<Request<T>>;

    /// Get a request by ID.
    async fn get(&self, id: RequestId) -> Result<AnyRequest>;

    /// Count requests for `owner` whose state is active
    /// (waiting_for_approval, pending, or running).
    async fn count_active_for_owner(&self, owner: &OwnerRef) -> Result<usize>;
}
