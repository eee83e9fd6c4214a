//! Owner capabilities and the owner-type registry.
//!
//! An owner is any entity whose data is subject to anonymization. Requests
//! hold a non-owning [`OwnerRef`] (type + id); the concrete capabilities are
//! resolved through an explicit [`OwnerRegistry`] keyed by owner type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ExpungeError, Result};

/// External-facing owner identifier shared with other services.
///
/// Distinct from internal primary keys; this is the value the receiving
/// service uses to look the user up on its side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier(s)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier(s.to_string())
    }
}

/// Polymorphic reference to the entity a request was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    /// Owner type discriminant (e.g., "user").
    pub owner_type: String,
    /// Owner identifier within its type, as stored by the embedding application.
    pub owner_id: String,
}

impl OwnerRef {
    pub fn new(owner_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        OwnerRef {
            owner_type: owner_type.into(),
            owner_id: owner_id.into(),
        }
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner_type, self.owner_id)
    }
}

/// Capabilities an owner must expose to the anonymization workflow.
///
/// `anonymize_locally` is assumed idempotent by callers; a failed attempt
/// leaves the request resumable and may be retried with another call.
#[async_trait]
pub trait Owner: Send + Sync {
    /// Resolve the external-service-facing identifier for this owner.
    async fn external_identifier(&self) -> Result<Identifier>;

    /// Perform the actual local data anonymization.
    async fn anonymize_locally(&self) -> Result<()>;
}

/// Resolver from a persisted [`OwnerRef`] to live owner capabilities.
pub type OwnerResolver = dyn Fn(&OwnerRef) -> Result<Arc<dyn Owner>> + Send + Sync;

/// Explicit registry mapping owner types to capability resolvers.
///
/// Replaces duck-typed method lookup: every owner type that can raise a
/// request must be registered up front.
#[derive(Default)]
pub struct OwnerRegistry {
    resolvers: HashMap<String, Box<OwnerResolver>>,
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver for `owner_type`, replacing any previous one.
    pub fn register<F>(&mut self, owner_type: impl Into<String>, resolver: F)
    where
        F: Fn(&OwnerRef) -> Result<Arc<dyn Owner>> + Send + Sync + 'static,
    {
        self.resolvers.insert(owner_type.into(), Box::new(resolver));
    }

    /// Resolve the capabilities for `owner`.
    ///
    /// # Errors
    /// Returns `UnknownOwnerType` if no resolver is registered for the
    /// owner's type.
    pub fn resolve(&self, owner: &OwnerRef) -> Result<Arc<dyn Owner>> {
        let resolver = self
            .resolvers
            .get(&owner.owner_type)
            .ok_or_else(|| ExpungeError::UnknownOwnerType(owner.owner_type.clone()))?;
        resolver(owner)
    }
}
