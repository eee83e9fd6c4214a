//! Request aggregate - domain model and state transitions.
//!
//! This module contains the core domain logic for anonymization requests:
//! - Request types and states (typestate pattern)
//! - State transition methods with deferred post-commit effects

pub mod transitions;
pub mod types;

// Re-export commonly used types
pub use types::*;
