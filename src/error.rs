//! Error types for the anonymization-request system.

use thiserror::Error;

use crate::request::RequestId;

/// Result type alias using the expunge error type.
pub type Result<T> = std::result::Result<T, ExpungeError>;

/// Main error type for the anonymization-request system.
#[derive(Error, Debug)]
pub enum ExpungeError {
    /// Request not found
    #[error("Request not found: {0}")]
    RequestNotFound(RequestId),

    /// An active request already exists for the owner (creation-time invariant)
    #[error("An active anonymization request already exists for owner {owner_type}/{owner_id}")]
    DuplicateRequest {
        owner_type: String,
        owner_id: String,
    },

    /// Event attempted from a state that does not permit it
    #[error("Invalid state transition: request {id} is in state '{actual}', expected '{expected}'")]
    InvalidTransition {
        id: RequestId,
        actual: String,
        expected: String,
    },

    /// No resolver registered for the owner type
    #[error("No owner resolver registered for type '{0}'")]
    UnknownOwnerType(String),

    /// Notification attempted for a service name that is not configured
    #[error("No external service named '{0}' is configured")]
    UnknownService(String),

    /// Service responded 404: it does not know the given user
    #[error("Service '{service}' was unable to find the given user")]
    NotFound { service: String },

    /// Service responded 401
    #[error("Service '{service}' returned unauthorized")]
    Unauthorized { service: String },

    /// Service responded 422
    #[error("Service '{service}' cannot process the notification payload, and returned {body}")]
    Unprocessable { service: String, body: String },

    /// Service responded 5xx
    #[error("Service '{service}' has an internal server error, and returned {body}")]
    Service { service: String, body: String },

    /// Service responded with a status code outside the classified set
    #[error("Service '{service}' returned unhandled status code ({status}) with body {body}, aborting")]
    UnhandledStatus {
        service: String,
        status: u16,
        body: String,
    },

    /// HTTP client error (transport-level, before any status classification)
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow (owner capability failures land here)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
