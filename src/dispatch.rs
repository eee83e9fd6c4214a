//! Post-approval dispatch orchestration.
//!
//! The coordinator executes the deferred effects produced by committed
//! transitions: notifying every configured external service once per approved
//! request, and triggering local anonymization. Work runs either inline on
//! the caller's task or as one scheduler job per unit, chosen statically by
//! [`DispatchMode`]. The coordinator performs no retries; classified errors
//! propagate to whichever context invoked it.

use std::sync::Arc;

use crate::config::{Config, DispatchMode};
use crate::error::{ExpungeError, Result};
use crate::http::HttpClient;
use crate::notifier::ServiceNotifier;
use crate::owner::{Identifier, OwnerRegistry};
use crate::request::{AnyRequest, Effect, RequestId};
use crate::scheduler::{JobDescriptor, Scheduler};
use crate::storage::Storage;

/// Orchestrates service notification and local anonymization for a request.
pub struct DispatchCoordinator<S: Storage, H: HttpClient> {
    config: Arc<Config>,
    storage: Arc<S>,
    notifier: ServiceNotifier<H>,
    owners: Arc<OwnerRegistry>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl<S: Storage, H: HttpClient> DispatchCoordinator<S, H> {
    pub fn new(
        config: Arc<Config>,
        storage: Arc<S>,
        http: H,
        owners: Arc<OwnerRegistry>,
    ) -> Self {
        let notifier = ServiceNotifier::new(config.clone(), http);
        DispatchCoordinator {
            config,
            storage,
            notifier,
            owners,
            scheduler: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn scheduler(&self) -> Option<&Arc<dyn Scheduler>> {
        self.scheduler.as_ref()
    }

    /// Execute a post-commit effect for `request`.
    ///
    /// Callers must only invoke this after the transition that produced the
    /// effect has been durably persisted.
    pub async fn execute(&self, request: AnyRequest, effect: Effect) -> Result<()> {
        match effect {
            Effect::DispatchServices => self.dispatch_approved(request).await,
            Effect::AnonymizeLocally => self.dispatch_anonymize(request.id()).await,
        }
    }

    /// Approve's post-commit effect: force `run`, then notify every
    /// configured service once.
    #[tracing::instrument(skip(self, request), fields(request_id = %request.id()))]
    async fn dispatch_approved(&self, request: AnyRequest) -> Result<()> {
        let id = request.id();
        let owner_ref = request.data().owner.clone();

        // Force `run` first if not already running. This is an internal
        // transition owned by dispatch, not an external event, so the `run`
        // guard is exercised exactly once. Its own effect (local anonymize)
        // executes here as well, after the running state is committed.
        match request {
            AnyRequest::Pending(req) => {
                let (_running, effect) = req.run(self.storage.as_ref()).await?;
                if effect == Effect::AnonymizeLocally {
                    self.dispatch_anonymize(id).await?;
                }
            }
            AnyRequest::Running(_) => {}
            other => {
                return Err(ExpungeError::InvalidTransition {
                    id,
                    actual: other.state_label().to_string(),
                    expected: "pending or running".to_string(),
                });
            }
        }

        let owner = self.owners.resolve(&owner_ref)?;
        let identifier = owner.external_identifier().await?;
        tracing::debug!(
            request_id = %id,
            services = self.config.services.len(),
            "Dispatching notifications to configured services"
        );

        for name in self.config.services.keys() {
            match self.config.dispatch_mode {
                DispatchMode::Inline => {
                    self.notifier.notify(name, &identifier).await?;
                }
                DispatchMode::Queued => {
                    self.require_scheduler()?
                        .enqueue(JobDescriptor::NotifyService {
                            request_id: id,
                            service: name.clone(),
                            user: identifier.to_string(),
                        })
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Run's post-commit effect: anonymize the owner's data locally, inline
    /// or as a scheduler job.
    async fn dispatch_anonymize(&self, id: RequestId) -> Result<()> {
        match self.config.dispatch_mode {
            DispatchMode::Inline => self.anonymize_now(id).await,
            DispatchMode::Queued => {
                self.require_scheduler()?
                    .enqueue(JobDescriptor::AnonymizeOwner { request_id: id })
                    .await
            }
        }
    }

    /// Execute a dequeued scheduler job. This is the worker-side entry point.
    pub async fn perform(&self, job: JobDescriptor) -> Result<()> {
        match job {
            JobDescriptor::NotifyService {
                request_id,
                service,
                user,
            } => {
                let outcome = self
                    .notifier
                    .notify(&service, &Identifier::from(user))
                    .await?;
                tracing::info!(
                    request_id = %request_id,
                    service = %service,
                    delivered = outcome.is_delivered(),
                    "Processed service notification job"
                );
                Ok(())
            }
            JobDescriptor::AnonymizeOwner { request_id } => self.anonymize_now(request_id).await,
        }
    }

    /// Anonymize locally and record `done`.
    ///
    /// A failing owner capability propagates uncaught and leaves the request
    /// in `running`: an observable, resumable state rather than a silent
    /// revert. Re-running the job retries from there.
    async fn anonymize_now(&self, id: RequestId) -> Result<()> {
        match self.storage.get(id).await? {
            AnyRequest::Running(request) => {
                let owner = self.owners.resolve(&request.data.owner)?;
                owner.anonymize_locally().await?;
                request.finish(self.storage.as_ref()).await?;
                Ok(())
            }
            other => Err(ExpungeError::InvalidTransition {
                id,
                actual: other.state_label().to_string(),
                expected: "running".to_string(),
            }),
        }
    }

    fn require_scheduler(&self) -> Result<&Arc<dyn Scheduler>> {
        self.scheduler.as_ref().ok_or_else(|| {
            ExpungeError::Other(anyhow::anyhow!(
                "dispatch mode is queued but no scheduler is configured"
            ))
        })
    }
}
