//! In-memory request store.
//!
//! Backs tests and embedders that do not bring a database. One `RwLock`
//! serializes the check-then-insert and gives `persist` its lost-update
//! detection: a transition whose from-state no longer matches the stored row
//! is rejected.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{ExpungeError, Result};
use crate::owner::OwnerRef;
use crate::request::{AnyRequest, Request, RequestId, RequestState, WaitingForApproval};
use crate::storage::Storage;

/// In-process [`Storage`] implementation.
#[derive(Default)]
pub struct MemoryStorage {
    rows: RwLock<HashMap<RequestId, AnyRequest>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests, across all states.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

/// States a request must currently be in for `next` to be a legal write.
///
/// Derived from the transition table; the initial state is never re-persisted.
fn allowed_prior(next: &AnyRequest) -> &'static [&'static str] {
    match next {
        AnyRequest::WaitingForApproval(_) => &[],
        AnyRequest::Pending(_) => &["waiting_for_approval"],
        AnyRequest::Running(_) => &["pending"],
        AnyRequest::Done(_) => &["running"],
        AnyRequest::Denied(_) | AnyRequest::Canceled(_) => &["waiting_for_approval"],
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert(&self, request: &Request<WaitingForApproval>) -> Result<()> {
        let mut rows = self.rows.write();

        // Final atomic uniqueness check, under the same lock as the write.
        let owner = &request.data.owner;
        let active = rows
            .values()
            .filter(|r| r.data().owner == *owner && r.is_active())
            .count();
        if active > 0 {
            return Err(ExpungeError::DuplicateRequest {
                owner_type: owner.owner_type.clone(),
                owner_id: owner.owner_id.clone(),
            });
        }

        rows.insert(request.data.id, AnyRequest::from(request.clone()));
        Ok(())
    }

    async fn persist<T: RequestState + Clone>(&self, request: &Request<T>) -> Result<()>
    where
        AnyRequest: From<Request<T>>,
    {
        let incoming = AnyRequest::from(request.clone());
        let id = incoming.id();
        let mut rows = self.rows.write();

        let current = rows
            .get(&id)
            .ok_or(ExpungeError::RequestNotFound(id))?;

        let allowed = allowed_prior(&incoming);
        if !allowed.contains(&current.state_label()) {
            return Err(ExpungeError::InvalidTransition {
                id,
                actual: current.state_label().to_string(),
                expected: allowed.join(" or "),
            });
        }

        rows.insert(id, incoming);
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<AnyRequest> {
        self.rows
            .read()
            .get(&id)
            .cloned()
            .ok_or(ExpungeError::RequestNotFound(id))
    }

    async fn count_active_for_owner(&self, owner: &OwnerRef) -> Result<usize> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|r| r.data().owner == *owner && r.is_active())
            .count())
    }
}
