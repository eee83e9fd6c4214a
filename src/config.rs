//! Process-wide configuration for the anonymization-request system.
//!
//! `Config` is built once at process start and passed into each component
//! explicitly; nothing in this crate reads hidden global state. The sync/async
//! dispatch choice is an explicit [`DispatchMode`] field rather than a runtime
//! probe for a job framework.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default client timeout for a single service notification: 60 seconds.
pub const DEFAULT_NOTIFICATION_TIMEOUT_MS: u64 = 60_000;

/// How dispatch work is executed once a request is approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Run notifications and local anonymization inline on the caller's task.
    /// The caller blocks for the duration of all service calls.
    Inline,
    /// Submit one unit of work per service (plus one for local anonymization)
    /// to the configured scheduler collaborator.
    Queued,
}

/// Configuration for one external service that must be notified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the service (e.g., <https://other-app.example.com>).
    ///
    /// A service without a host is skipped at notification time rather than
    /// raising an error.
    pub host: Option<String>,

    /// Per-service signing token. Falls back to the global [`Config::token`]
    /// when absent; the payload shape and algorithm are identical either way.
    pub token: Option<String>,
}

impl ServiceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        ServiceConfig {
            host: Some(host.into()),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Immutable process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Global signing token, used for any service that does not define its own.
    pub token: String,

    /// External services to notify once a request is approved, by name.
    pub services: HashMap<String, ServiceConfig>,

    /// Path appended to each service host for the notification POST.
    pub notification_path: String,

    /// Client timeout for a single notification request, in milliseconds.
    pub notification_timeout_ms: u64,

    /// Whether dispatch runs inline or through the scheduler collaborator.
    pub dispatch_mode: DispatchMode,
}

impl Config {
    /// Create a configuration with no services, a 60s notification timeout,
    /// and inline dispatch.
    pub fn new(token: impl Into<String>, notification_path: impl Into<String>) -> Self {
        Config {
            token: token.into(),
            services: HashMap::new(),
            notification_path: notification_path.into(),
            notification_timeout_ms: DEFAULT_NOTIFICATION_TIMEOUT_MS,
            dispatch_mode: DispatchMode::Inline,
        }
    }

    /// Register an external service under `name`.
    pub fn service(mut self, name: impl Into<String>, service: ServiceConfig) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    pub fn notification_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.notification_timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("secret", "/anonymize");
        assert_eq!(config.notification_timeout_ms, 60_000);
        assert_eq!(config.dispatch_mode, DispatchMode::Inline);
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_builder() {
        let config = Config::new("secret", "/anonymize")
            .service("billing", ServiceConfig::new("https://billing.example.com"))
            .service(
                "crm",
                ServiceConfig::new("https://crm.example.com").with_token("crm-secret"),
            )
            .dispatch_mode(DispatchMode::Queued);

        assert_eq!(config.services.len(), 2);
        assert_eq!(config.dispatch_mode, DispatchMode::Queued);
        assert_eq!(
            config.services["crm"].token.as_deref(),
            Some("crm-secret")
        );
        assert!(config.services["billing"].token.is_none());
    }
}
