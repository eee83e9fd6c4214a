//! End-to-end tests for the anonymization-request lifecycle, using the mock
//! HTTP client, scheduler, and mailer collaborators against the in-memory
//! store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use expunge::{
    Config, DispatchMode, ExpungeError, HttpResponse, Identifier, JobDescriptor, MemoryStorage,
    MockHttpClient, MockScheduler, Owner, OwnerRef, OwnerRegistry, RequestManager, Result,
    ServiceConfig, signed_payload,
};

/// Owner double: counts anonymize calls and can fail a configured number of
/// times before succeeding.
#[derive(Clone)]
struct TestOwner {
    identifier: String,
    anonymize_calls: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl TestOwner {
    fn new(identifier: &str) -> Self {
        TestOwner {
            identifier: identifier.to_string(),
            anonymize_calls: Arc::new(AtomicUsize::new(0)),
            failures_left: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing_times(identifier: &str, failures: usize) -> Self {
        let owner = Self::new(identifier);
        owner.failures_left.store(failures, Ordering::SeqCst);
        owner
    }
}

#[async_trait]
impl Owner for TestOwner {
    async fn external_identifier(&self) -> Result<Identifier> {
        Ok(Identifier::from(self.identifier.as_str()))
    }

    async fn anonymize_locally(&self) -> Result<()> {
        self.anonymize_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ExpungeError::Other(anyhow::anyhow!(
                "local anonymization failed"
            )));
        }
        Ok(())
    }
}

fn registry_with(owner: TestOwner) -> OwnerRegistry {
    let mut registry = OwnerRegistry::new();
    registry.register("user", move |_ref| {
        Ok(Arc::new(owner.clone()) as Arc<dyn Owner>)
    });
    registry
}

fn two_service_config() -> Config {
    Config::new("global-secret", "/anonymize")
        .service("billing", ServiceConfig::new("https://billing.example.com"))
        .service(
            "crm",
            ServiceConfig::new("https://crm.example.com").with_token("crm-secret"),
        )
}

fn ok_response() -> Result<HttpResponse> {
    Ok(HttpResponse {
        status: 200,
        body: r#"{"result":"ok"}"#.to_string(),
    })
}

#[test_log::test(tokio::test)]
async fn test_inline_approve_notifies_each_service_and_reaches_done() {
    let owner = TestOwner::new("owner-a@example.com");
    let http = MockHttpClient::new();
    http.add_response("https://billing.example.com/anonymize", ok_response());
    http.add_response("https://crm.example.com/anonymize", ok_response());

    let storage = Arc::new(MemoryStorage::new());
    let manager = RequestManager::new(
        two_service_config(),
        storage.clone(),
        http.clone(),
        registry_with(owner.clone()),
    );

    let request = manager
        .create(OwnerRef::new("user", "a"), Some("admin".to_string()))
        .await
        .expect("creation succeeds");
    let id = request.data.id;
    assert_eq!(
        manager.get(id).await.unwrap().state_label(),
        "waiting_for_approval"
    );

    // Inline mode: approve blocks for run, local anonymize, and both
    // notifications.
    manager.approve(id).await.expect("approve flow succeeds");

    assert_eq!(manager.get(id).await.unwrap().state_label(), "done");
    assert_eq!(owner.anonymize_calls.load(Ordering::SeqCst), 1);

    // Exactly one signed POST per service.
    let identifier = Identifier::from("owner-a@example.com");
    let billing_calls = http.calls_for("https://billing.example.com/anonymize");
    assert_eq!(billing_calls.len(), 1);
    assert_eq!(billing_calls[0].body["user"], "owner-a@example.com");
    assert_eq!(
        billing_calls[0].body["hash"],
        signed_payload(&identifier, "global-secret").hash
    );
    assert_eq!(billing_calls[0].timeout_ms, 60_000);

    let crm_calls = http.calls_for("https://crm.example.com/anonymize");
    assert_eq!(crm_calls.len(), 1);
    assert_eq!(
        crm_calls[0].body["hash"],
        signed_payload(&identifier, "crm-secret").hash
    );
}

#[test_log::test(tokio::test)]
async fn test_second_creation_for_same_owner_is_rejected() {
    let storage = Arc::new(MemoryStorage::new());
    let manager = RequestManager::new(
        two_service_config(),
        storage.clone(),
        MockHttpClient::new(),
        registry_with(TestOwner::new("owner-a@example.com")),
    );

    manager
        .create(OwnerRef::new("user", "a"), Some("admin".to_string()))
        .await
        .unwrap();

    let err = manager
        .create(OwnerRef::new("user", "a"), Some("admin".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExpungeError::DuplicateRequest { ref owner_id, .. } if owner_id == "a"
    ));

    // No second row persisted; a different owner is unaffected.
    assert_eq!(storage.len(), 1);
    manager
        .create(OwnerRef::new("user", "b"), Some("admin".to_string()))
        .await
        .unwrap();
}

#[test_log::test(tokio::test)]
async fn test_concurrent_creations_for_one_owner_have_one_winner() {
    let storage = Arc::new(MemoryStorage::new());
    let manager = Arc::new(RequestManager::new(
        two_service_config(),
        storage.clone(),
        MockHttpClient::new(),
        registry_with(TestOwner::new("owner-a@example.com")),
    ));

    // Race N creations for the same owner; each must either win or fail
    // with DuplicateRequest.
    let mut handles = Vec::new();
    for _ in 0..32 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .create(OwnerRef::new("user", "a"), Some("admin".to_string()))
                .await
        }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(ExpungeError::DuplicateRequest { .. }) => rejected += 1,
            Err(other) => panic!("unexpected creation error: {other}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(rejected, 31);
    assert_eq!(storage.len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_cancel_then_approve_is_rejected() {
    let manager = RequestManager::new(
        two_service_config(),
        Arc::new(MemoryStorage::new()),
        MockHttpClient::new(),
        registry_with(TestOwner::new("owner-a@example.com")),
    );

    let request = manager
        .create(OwnerRef::new("user", "a"), Some("admin".to_string()))
        .await
        .unwrap();
    let id = request.data.id;

    manager.cancel(id).await.unwrap();
    assert_eq!(manager.get(id).await.unwrap().state_label(), "canceled");

    let err = manager.approve(id).await.unwrap_err();
    assert!(matches!(
        err,
        ExpungeError::InvalidTransition { ref actual, .. } if actual == "canceled"
    ));
    assert_eq!(manager.get(id).await.unwrap().state_label(), "canceled");
}

#[test_log::test(tokio::test)]
async fn test_queued_mode_enqueues_jobs_and_workers_complete_the_flow() {
    let owner = TestOwner::new("owner-a@example.com");
    let http = MockHttpClient::new();
    http.add_response("https://billing.example.com/anonymize", ok_response());
    http.add_response("https://crm.example.com/anonymize", ok_response());

    let scheduler = MockScheduler::new();
    let manager = RequestManager::new(
        two_service_config().dispatch_mode(DispatchMode::Queued),
        Arc::new(MemoryStorage::new()),
        http.clone(),
        registry_with(owner.clone()),
    )
    .with_scheduler(Arc::new(scheduler.clone()));

    let request = manager
        .create(OwnerRef::new("user", "a"), None)
        .await
        .unwrap();
    let id = request.data.id;

    // Approve returns after enqueueing; nothing has executed yet.
    manager.approve(id).await.unwrap();
    assert_eq!(manager.get(id).await.unwrap().state_label(), "running");
    assert_eq!(owner.anonymize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(http.call_count(), 0);

    // One anonymize job plus one notify job per configured service.
    let jobs = scheduler.drain();
    assert_eq!(jobs.len(), 3);
    let notify_jobs: Vec<_> = jobs
        .iter()
        .filter(|j| matches!(j, JobDescriptor::NotifyService { .. }))
        .collect();
    assert_eq!(notify_jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.request_id() == id));

    // Workers execute the dequeued descriptors.
    for job in jobs {
        manager.perform(job).await.unwrap();
    }

    assert_eq!(manager.get(id).await.unwrap().state_label(), "done");
    assert_eq!(owner.anonymize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        http.calls_for("https://billing.example.com/anonymize").len(),
        1
    );
    assert_eq!(http.calls_for("https://crm.example.com/anonymize").len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_anonymize_failure_leaves_request_running_and_resumable() {
    // Owner fails its first anonymize attempt and succeeds afterwards.
    let owner = TestOwner::failing_times("owner-a@example.com", 1);
    let http = MockHttpClient::new();

    let manager = RequestManager::new(
        two_service_config(),
        Arc::new(MemoryStorage::new()),
        http.clone(),
        registry_with(owner.clone()),
    );

    let request = manager
        .create(OwnerRef::new("user", "a"), Some("admin".to_string()))
        .await
        .unwrap();
    let id = request.data.id;

    // Inline approve: local anonymize runs before the notification loop, so
    // its failure aborts dispatch entirely.
    let err = manager.approve(id).await.unwrap_err();
    assert!(matches!(err, ExpungeError::Other(_)));
    assert_eq!(manager.get(id).await.unwrap().state_label(), "running");
    assert_eq!(http.call_count(), 0);

    // External retry of the anonymize unit of work completes the request.
    manager
        .perform(JobDescriptor::AnonymizeOwner { request_id: id })
        .await
        .unwrap();
    assert_eq!(manager.get(id).await.unwrap().state_label(), "done");
    assert_eq!(owner.anonymize_calls.load(Ordering::SeqCst), 2);
}

#[test_log::test(tokio::test)]
async fn test_classified_service_error_propagates_to_approver() {
    let owner = TestOwner::new("owner-a@example.com");
    let http = MockHttpClient::new();
    http.add_response(
        "https://billing.example.com/anonymize",
        Ok(HttpResponse {
            status: 500,
            body: "boom".to_string(),
        }),
    );

    // Single service so the failing call is deterministic.
    let config = Config::new("global-secret", "/anonymize")
        .service("billing", ServiceConfig::new("https://billing.example.com"));
    let manager = RequestManager::new(
        config,
        Arc::new(MemoryStorage::new()),
        http.clone(),
        registry_with(owner.clone()),
    );

    let request = manager
        .create(OwnerRef::new("user", "a"), Some("admin".to_string()))
        .await
        .unwrap();
    let id = request.data.id;

    let err = manager.approve(id).await.unwrap_err();
    assert!(matches!(
        err,
        ExpungeError::Service { ref service, ref body } if service == "billing" && body == "boom"
    ));

    // Local anonymization had already completed before the notification loop.
    assert_eq!(manager.get(id).await.unwrap().state_label(), "done");
    assert_eq!(owner.anonymize_calls.load(Ordering::SeqCst), 1);
}

#[test_log::test(tokio::test)]
async fn test_service_without_host_is_skipped_inline() {
    let owner = TestOwner::new("owner-a@example.com");
    let http = MockHttpClient::new();
    http.add_response("https://billing.example.com/anonymize", ok_response());

    let config = Config::new("global-secret", "/anonymize")
        .service("billing", ServiceConfig::new("https://billing.example.com"))
        .service("misconfigured", ServiceConfig::default());
    let manager = RequestManager::new(
        config,
        Arc::new(MemoryStorage::new()),
        http.clone(),
        registry_with(owner),
    );

    let request = manager
        .create(OwnerRef::new("user", "a"), Some("admin".to_string()))
        .await
        .unwrap();
    let id = request.data.id;

    // The host-less service soft-fails; the flow still completes.
    manager.approve(id).await.unwrap();
    assert_eq!(manager.get(id).await.unwrap().state_label(), "done");
    assert_eq!(http.call_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_new_request_allowed_once_previous_is_terminal() {
    let owner = TestOwner::new("owner-a@example.com");
    let http = MockHttpClient::new();
    http.add_response("https://billing.example.com/anonymize", ok_response());
    http.add_response("https://crm.example.com/anonymize", ok_response());
    // Responses for the second flow
    http.add_response("https://billing.example.com/anonymize", ok_response());
    http.add_response("https://crm.example.com/anonymize", ok_response());

    let manager = RequestManager::new(
        two_service_config(),
        Arc::new(MemoryStorage::new()),
        http,
        registry_with(owner),
    );

    let first = manager
        .create(OwnerRef::new("user", "a"), Some("admin".to_string()))
        .await
        .unwrap();
    manager.approve(first.data.id).await.unwrap();
    assert_eq!(
        manager.get(first.data.id).await.unwrap().state_label(),
        "done"
    );

    // First request is terminal, so the invariant allows a new one.
    let second = manager
        .create(OwnerRef::new("user", "a"), Some("admin".to_string()))
        .await
        .unwrap();
    assert_ne!(first.data.id, second.data.id);
}
