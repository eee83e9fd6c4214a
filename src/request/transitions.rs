//! State transitions for anonymization requests using the typestate pattern.
//!
//! Each transition persists the new state through [`Storage`] and only then
//! returns. Transitions that carry a post-commit side effect hand back an
//! [`Effect`] value instead of running it, so the effect can only ever be
//! executed after the persist has succeeded:
//!
//! ```text
//! Request<WaitingForApproval> ──approve()──> (Request<Pending>, DispatchServices)
//!            │
//!            ├──cancel()──> Request<Canceled>
//!            └──deny()────> Request<Denied>
//!
//! Request<Pending> ──run()──> (Request<Running>, AnonymizeLocally)
//! Request<Running> ──finish()──> Request<Done>
//! ```
//!
//! If `storage.persist` fails, the method returns the error and no effect
//! value exists; state observed through storage is unchanged.

use chrono::Utc;
use metrics::counter;

use crate::error::Result;
use crate::storage::Storage;

use super::types::{
    Canceled, Denied, Done, Effect, Pending, Request, Running, WaitingForApproval,
};

impl Request<WaitingForApproval> {
    /// Approve the request. Post-commit effect: dispatch to other services.
    pub async fn approve<S: Storage + ?Sized>(
        self,
        storage: &S,
    ) -> Result<(Request<Pending>, Effect)> {
        let request = Request {
            data: self.data,
            state: Pending {
                approved_at: Utc::now(),
            },
        };
        storage.persist(&request).await?;
        counter!("expunge_transitions_total", "event" => "approve").increment(1);
        tracing::info!(request_id = %request.data.id, owner = %request.data.owner, "Request approved");
        Ok((request, Effect::DispatchServices))
    }

    /// Cancel the request before a decision. No effect.
    pub async fn cancel<S: Storage + ?Sized>(self, storage: &S) -> Result<Request<Canceled>> {
        let request = Request {
            data: self.data,
            state: Canceled {
                canceled_at: Utc::now(),
            },
        };
        storage.persist(&request).await?;
        counter!("expunge_transitions_total", "event" => "cancel").increment(1);
        tracing::info!(request_id = %request.data.id, "Request canceled");
        Ok(request)
    }

    /// Deny the request. No effect.
    pub async fn deny<S: Storage + ?Sized>(self, storage: &S) -> Result<Request<Denied>> {
        let request = Request {
            data: self.data,
            state: Denied {
                denied_at: Utc::now(),
            },
        };
        storage.persist(&request).await?;
        counter!("expunge_transitions_total", "event" => "deny").increment(1);
        tracing::info!(request_id = %request.data.id, "Request denied");
        Ok(request)
    }
}

impl Request<Pending> {
    /// Start executing the request. Post-commit effect: local anonymization.
    pub async fn run<S: Storage + ?Sized>(
        self,
        storage: &S,
    ) -> Result<(Request<Running>, Effect)> {
        let request = Request {
            state: Running {
                approved_at: self.state.approved_at,
                started_at: Utc::now(),
            },
            data: self.data,
        };
        storage.persist(&request).await?;
        counter!("expunge_transitions_total", "event" => "run").increment(1);
        tracing::info!(request_id = %request.data.id, "Request running");
        Ok((request, Effect::AnonymizeLocally))
    }
}

impl Request<Running> {
    /// Record that local anonymization completed. No effect.
    pub async fn finish<S: Storage + ?Sized>(self, storage: &S) -> Result<Request<Done>> {
        let request = Request {
            state: Done {
                approved_at: self.state.approved_at,
                started_at: self.state.started_at,
                finished_at: Utc::now(),
            },
            data: self.data,
        };
        storage.persist(&request).await?;
        counter!("expunge_transitions_total", "event" => "done").increment(1);
        tracing::info!(request_id = %request.data.id, owner = %request.data.owner, "Request done");
        Ok(request)
    }
}
