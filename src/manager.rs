//! Request lifecycle front door.
//!
//! `RequestManager` composes storage, the dispatch coordinator, and the
//! optional collaborators behind one entry type: it creates requests (running
//! the uniqueness guard and the mailer fallback) and applies external events,
//! handing each committed transition's effect to the coordinator.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use uuid::Uuid;

use crate::config::Config;
use crate::dispatch::DispatchCoordinator;
use crate::error::{ExpungeError, Result};
use crate::guard::UniquenessGuard;
use crate::http::HttpClient;
use crate::mailer::Mailer;
use crate::owner::{OwnerRef, OwnerRegistry};
use crate::request::{
    AnyRequest, Request, RequestData, RequestEvent, RequestId, WaitingForApproval,
};
use crate::scheduler::{JobDescriptor, Scheduler};
use crate::storage::Storage;

/// Entry point for creating anonymization requests and driving their events.
pub struct RequestManager<S: Storage, H: HttpClient> {
    storage: Arc<S>,
    coordinator: DispatchCoordinator<S, H>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl<S: Storage, H: HttpClient> RequestManager<S, H> {
    pub fn new(config: Config, storage: Arc<S>, http: H, owners: OwnerRegistry) -> Self {
        let coordinator =
            DispatchCoordinator::new(Arc::new(config), storage.clone(), http, Arc::new(owners));
        RequestManager {
            storage,
            coordinator,
            mailer: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.coordinator = self.coordinator.with_scheduler(scheduler);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Create a new request for `owner`, initially waiting for approval.
    ///
    /// # Errors
    /// Returns `DuplicateRequest` if the owner already has an active request;
    /// nothing is persisted in that case.
    pub async fn create(
        &self,
        owner: OwnerRef,
        requested_by: Option<String>,
    ) -> Result<Request<WaitingForApproval>> {
        UniquenessGuard::check(self.storage.as_ref(), &owner).await?;

        let request = Request {
            state: WaitingForApproval {},
            data: RequestData {
                id: RequestId::from(Uuid::new_v4()),
                owner,
                requested_by,
                created_at: Utc::now(),
            },
        };
        self.storage.insert(&request).await?;
        counter!("expunge_requests_created_total").increment(1);
        tracing::info!(
            request_id = %request.data.id,
            owner = %request.data.owner,
            "Anonymization request created"
        );

        // Narrow fallback, kept exactly as the original system behaves: only
        // an unattributed request in a process without a scheduler emails the
        // requester. Best-effort: the request is already committed, so a mail
        // failure must not surface as a failed creation and strand the row.
        if request.data.requested_by.is_none()
            && self.coordinator.scheduler().is_none()
            && let Some(mailer) = &self.mailer
            && let Err(e) = mailer.notify_requester(request.data.id).await
        {
            tracing::warn!(
                request_id = %request.data.id,
                error = %e,
                "Failed to notify requester by mail, request created anyway"
            );
        }

        Ok(request)
    }

    /// Get a request by ID.
    pub async fn get(&self, id: RequestId) -> Result<AnyRequest> {
        self.storage.get(id).await
    }

    /// Apply an external event to a request.
    pub async fn apply(&self, id: RequestId, event: RequestEvent) -> Result<()> {
        match event {
            RequestEvent::Approve => self.approve(id).await,
            RequestEvent::Cancel => self.cancel(id).await,
            RequestEvent::Deny => self.deny(id).await,
            RequestEvent::Run => self.run(id).await,
            RequestEvent::Done => self.finish(id).await,
        }
    }

    /// Approve a waiting request. Once the transition is committed, dispatch
    /// to other services fires; in inline mode this call blocks until every
    /// service has been notified and local anonymization has completed.
    pub async fn approve(&self, id: RequestId) -> Result<()> {
        match self.storage.get(id).await? {
            AnyRequest::WaitingForApproval(request) => {
                let (pending, effect) = request.approve(self.storage.as_ref()).await?;
                self.coordinator
                    .execute(AnyRequest::Pending(pending), effect)
                    .await
            }
            other => Err(invalid_transition(&other, RequestEvent::Approve)),
        }
    }

    /// Cancel a waiting request.
    pub async fn cancel(&self, id: RequestId) -> Result<()> {
        match self.storage.get(id).await? {
            AnyRequest::WaitingForApproval(request) => {
                request.cancel(self.storage.as_ref()).await?;
                Ok(())
            }
            other => Err(invalid_transition(&other, RequestEvent::Cancel)),
        }
    }

    /// Deny a waiting request.
    pub async fn deny(&self, id: RequestId) -> Result<()> {
        match self.storage.get(id).await? {
            AnyRequest::WaitingForApproval(request) => {
                request.deny(self.storage.as_ref()).await?;
                Ok(())
            }
            other => Err(invalid_transition(&other, RequestEvent::Deny)),
        }
    }

    /// Start executing a pending request. Once the transition is committed,
    /// local anonymization fires.
    pub async fn run(&self, id: RequestId) -> Result<()> {
        match self.storage.get(id).await? {
            AnyRequest::Pending(request) => {
                let (running, effect) = request.run(self.storage.as_ref()).await?;
                self.coordinator
                    .execute(AnyRequest::Running(running), effect)
                    .await
            }
            other => Err(invalid_transition(&other, RequestEvent::Run)),
        }
    }

    /// Record that a running request has completed.
    pub async fn finish(&self, id: RequestId) -> Result<()> {
        match self.storage.get(id).await? {
            AnyRequest::Running(request) => {
                request.finish(self.storage.as_ref()).await?;
                Ok(())
            }
            other => Err(invalid_transition(&other, RequestEvent::Done)),
        }
    }

    /// Execute a dequeued scheduler job. Scheduler workers call this with
    /// each descriptor they pull off the queue.
    pub async fn perform(&self, job: JobDescriptor) -> Result<()> {
        self.coordinator.perform(job).await
    }
}

fn invalid_transition(actual: &AnyRequest, event: RequestEvent) -> ExpungeError {
    ExpungeError::InvalidTransition {
        id: actual.id(),
        actual: actual.state_label().to_string(),
        expected: event.expected_state().to_string(),
    }
}
