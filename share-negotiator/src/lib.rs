//! Share Negotiator Library
//!
//! Orchestrates incoming resource negotiations: maps the resource roots a peer
//! offers onto local containers, shows what local content would be lost, and
//! runs the approved synchronization in the background.

pub mod config;
pub mod documents;
pub mod events;
pub mod fs;
pub mod manifest;
pub mod mapping;
pub mod model;
pub mod negotiation;
pub mod notify;
pub mod progress;
pub mod utils;
pub mod workspace;

// Re-export commonly used types
pub use config::Config;
pub use negotiation::orchestrator::{Collaborators, NegotiationHandle, NegotiationOrchestrator};
pub use utils::errors::NegotiationError;
pub type Result<T> = std::result::Result<T, NegotiationError>;
