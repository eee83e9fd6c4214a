//! Mailer collaborator interface.
//!
//! A narrow creation-time fallback: when a request records no requesting
//! actor AND no scheduler is configured, the mailer is asked to notify the
//! requester once. The condition is preserved exactly as the original system
//! behaves; no broader intent is inferred.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::request::RequestId;

/// Email-notification collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Notify the requester that an anonymization request was created.
    async fn notify_requester(&self, request_id: RequestId) -> Result<()>;
}

/// Mock mailer for testing: records notified request IDs.
#[derive(Clone, Default)]
pub struct MockMailer {
    notified: Arc<Mutex<Vec<RequestId>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request IDs passed to `notify_requester`, in order.
    pub fn notified(&self) -> Vec<RequestId> {
        self.notified.lock().clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn notify_requester(&self, request_id: RequestId) -> Result<()> {
        tracing::debug!(request_id = %request_id, "Mock mailer notified requester");
        self.notified.lock().push(request_id);
        Ok(())
    }
}
