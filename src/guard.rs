//! Creation-time uniqueness invariant.
//!
//! For a given owner, at most one request may exist whose state is
//! waiting_for_approval, pending, or running. The guard runs once, before the
//! insert; it is not a continuous constraint, and check-then-insert is only
//! race-free if the storage implementation serializes it (see the
//! [`Storage`] contract).

use metrics::counter;

use crate::error::{ExpungeError, Result};
use crate::owner::OwnerRef;
use crate::storage::Storage;

/// Validates the one-active-request-per-owner invariant at creation.
pub struct UniquenessGuard;

impl UniquenessGuard {
    /// Fail with `DuplicateRequest` if `owner` already has an active request.
    ///
    /// No side effects on success.
    pub async fn check<S: Storage + ?Sized>(storage: &S, owner: &OwnerRef) -> Result<()> {
        let active = storage.count_active_for_owner(owner).await?;
        if active > 0 {
            counter!("expunge_duplicate_requests_total").increment(1);
            tracing::warn!(
                owner = %owner,
                active,
                "Rejecting request creation, owner already has an active request"
            );
            return Err(ExpungeError::DuplicateRequest {
                owner_type: owner.owner_type.clone(),
                owner_id: owner.owner_id.clone(),
            });
        }
        Ok(())
    }
}
