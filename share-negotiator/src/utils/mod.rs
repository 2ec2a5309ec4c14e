//! Utility modules for the share negotiator.

pub mod errors;
pub mod logger;

pub use errors::{NegotiationError, Result};
