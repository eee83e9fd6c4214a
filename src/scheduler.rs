//! Scheduler collaborator interface.
//!
//! In queued dispatch mode, every unit of post-approval work is handed to an
//! external task scheduler as a [`JobDescriptor`]. The scheduler owns
//! delivery guarantees, concurrency limits, and retry/backoff; this crate
//! assumes at-least-once execution of enqueued work and performs no retries
//! of its own. Workers execute a dequeued descriptor by calling
//! [`DispatchCoordinator::perform`](crate::dispatch::DispatchCoordinator::perform).

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::request::RequestId;

/// One schedulable unit of dispatch work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum JobDescriptor {
    /// Notify one external service that `user`'s data must be anonymized.
    NotifyService {
        request_id: RequestId,
        service: String,
        user: String,
    },
    /// Anonymize the owner's data locally and record `done`.
    AnonymizeOwner { request_id: RequestId },
}

impl JobDescriptor {
    pub fn request_id(&self) -> RequestId {
        match self {
            JobDescriptor::NotifyService { request_id, .. } => *request_id,
            JobDescriptor::AnonymizeOwner { request_id } => *request_id,
        }
    }
}

/// Work-queue collaborator executing deferred dispatch effects.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Submit one unit of work for later execution.
    async fn enqueue(&self, job: JobDescriptor) -> Result<()>;
}

/// Mock scheduler for testing: records enqueued jobs without executing them.
#[derive(Clone, Default)]
pub struct MockScheduler {
    jobs: Arc<Mutex<Vec<JobDescriptor>>>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all jobs enqueued so far.
    pub fn jobs(&self) -> Vec<JobDescriptor> {
        self.jobs.lock().clone()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Remove and return all enqueued jobs, oldest first.
    pub fn drain(&self) -> Vec<JobDescriptor> {
        std::mem::take(&mut *self.jobs.lock())
    }
}

#[async_trait]
impl Scheduler for MockScheduler {
    async fn enqueue(&self, job: JobDescriptor) -> Result<()> {
        tracing::debug!(request_id = %job.request_id(), ?job, "Mock scheduler recorded job");
        self.jobs.lock().push(job);
        Ok(())
    }
}
