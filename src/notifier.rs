//! Signed notification of external services.
//!
//! Each configured service receives a POST of `{"user": <identifier>,
//! "hash": <hex HMAC-SHA512>}` at `{host}{notification_path}` and its
//! response status is classified into a [`ServiceCallOutcome`] or a raised
//! error. The signature is keyed with the service's own token when it defines
//! one, otherwise the global token, so receivers can verify with either
//! secret.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use crate::config::Config;
use crate::error::{ExpungeError, Result};
use crate::http::{HttpClient, HttpResponse};
use crate::owner::Identifier;

type HmacSha512 = Hmac<Sha512>;

/// Wire payload of a notification POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyPayload {
    /// External-facing owner identifier.
    pub user: String,
    /// Hex-encoded HMAC-SHA512 of `user`, keyed with the signing token.
    pub hash: String,
}

/// Build the signed payload for `identifier` under `token`.
///
/// Deterministic and keyed: the same identifier and token always produce the
/// same hash; different tokens produce different hashes.
pub fn signed_payload(identifier: &Identifier, token: &str) -> NotifyPayload {
    let mut mac =
        HmacSha512::new_from_slice(token.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(identifier.as_str().as_bytes());
    NotifyPayload {
        user: identifier.to_string(),
        hash: hex::encode(mac.finalize().into_bytes()),
    }
}

/// Outcome of one notification attempt that did not raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCallOutcome {
    /// The service accepted the notification (2xx).
    Delivered { status: u16, body: String },
    /// The service has no host configured; the call was skipped.
    ///
    /// Deliberate soft-fail for misconfigured services, distinct from the
    /// raised classification errors.
    Skipped,
}

impl ServiceCallOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ServiceCallOutcome::Delivered { .. })
    }
}

/// Builds signed payloads and classifies HTTP responses per service.
pub struct ServiceNotifier<H: HttpClient> {
    config: Arc<Config>,
    http: H,
}

impl<H: HttpClient> ServiceNotifier<H> {
    pub fn new(config: Arc<Config>, http: H) -> Self {
        ServiceNotifier { config, http }
    }

    /// Notify one configured service that `identifier`'s data must be
    /// anonymized there.
    ///
    /// # Errors
    /// Returns `UnknownService` for an unconfigured name, a classified error
    /// for 404/401/422/5xx/unmapped statuses, or the transport error for
    /// network failures. A missing host is NOT an error; see
    /// [`ServiceCallOutcome::Skipped`].
    #[tracing::instrument(skip_all, fields(service = %service_name))]
    pub async fn notify(
        &self,
        service_name: &str,
        identifier: &Identifier,
    ) -> Result<ServiceCallOutcome> {
        let service = self
            .config
            .services
            .get(service_name)
            .ok_or_else(|| ExpungeError::UnknownService(service_name.to_string()))?;

        let Some(host) = &service.host else {
            counter!("expunge_notifications_total", "service" => service_name.to_string(), "outcome" => "skipped")
                .increment(1);
            tracing::warn!(service = %service_name, "Service has no host configured, skipping notification");
            return Ok(ServiceCallOutcome::Skipped);
        };

        let token = service.token.as_deref().unwrap_or(&self.config.token);
        let payload = signed_payload(identifier, token);
        let url = format!("{}{}", host, self.config.notification_path);

        let response = self
            .http
            .post_json(
                &url,
                &serde_json::to_value(&payload)?,
                self.config.notification_timeout_ms,
            )
            .await?;

        let outcome = classify(service_name, response);
        let label = match &outcome {
            Ok(_) => "delivered",
            Err(_) => "failed",
        };
        counter!("expunge_notifications_total", "service" => service_name.to_string(), "outcome" => label)
            .increment(1);
        outcome
    }
}

/// Classify the numeric response status of a notification attempt.
///
/// The mapping is total: every status lands in exactly one arm.
fn classify(service: &str, response: HttpResponse) -> Result<ServiceCallOutcome> {
    match response.status {
        200..=299 => Ok(ServiceCallOutcome::Delivered {
            status: response.status,
            body: response.body,
        }),
        404 => Err(ExpungeError::NotFound {
            service: service.to_string(),
        }),
        401 => Err(ExpungeError::Unauthorized {
            service: service.to_string(),
        }),
        422 => Err(ExpungeError::Unprocessable {
            service: service.to_string(),
            body: response.body,
        }),
        500..=599 => Err(ExpungeError::Service {
            service: service.to_string(),
            body: response.body,
        }),
        status => Err(ExpungeError::UnhandledStatus {
            service: service.to_string(),
            status,
            body: response.body,
        }),
    }
}
