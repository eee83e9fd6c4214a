//! Lifecycle engine for data-anonymization requests.
//!
//! This crate manages anonymization requests raised for an "owner" entity
//! (e.g., a user account). It enforces a single active request per owner and
//! drives each request through an approval/execution workflow. Once a request
//! is approved, a configurable set of external services is notified with a
//! signed payload before the owner's data is anonymized locally.
//!
//! Side effects are deferred: a transition is durably persisted first, and
//! its effect (service notification, local anonymization) only runs after
//! that persist succeeds. Effects execute inline or through an external
//! scheduler collaborator, chosen by [`DispatchMode`] at construction.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod http;
pub mod mailer;
pub mod manager;
pub mod notifier;
pub mod owner;
pub mod request;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types
pub use config::{Config, DispatchMode, ServiceConfig};
pub use dispatch::DispatchCoordinator;
pub use error::{ExpungeError, Result};
pub use guard::UniquenessGuard;
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use mailer::{Mailer, MockMailer};
pub use manager::RequestManager;
pub use notifier::{NotifyPayload, ServiceCallOutcome, ServiceNotifier, signed_payload};
pub use owner::{Identifier, Owner, OwnerRef, OwnerRegistry};
pub use request::*;
pub use scheduler::{JobDescriptor, MockScheduler, Scheduler};
pub use storage::{MemoryStorage, Storage};
