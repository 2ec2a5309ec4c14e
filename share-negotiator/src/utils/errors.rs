//! Error types for the share negotiator.

use crate::model::{CancelLocation, NegotiationOutcome};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller selection that cannot be honoured; the negotiation is not started.
    #[error("Invalid target selection: {0}")]
    Validation(String),

    /// Scanning local content failed; no partial diff is ever surfaced.
    #[error("Failed to scan local content of '{root}': {source}")]
    DiffComputation {
        root: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Negotiation cancelled locally{}", fmt_message(.0))]
    CancelledByUser(Option<String>),

    #[error("Negotiation cancelled by peer{}", fmt_message(.0))]
    CancelledByPeer(Option<String>),

    #[error("Unsaved documents under the target containers: {}", fmt_paths(.0))]
    DirtyDocuments(Vec<PathBuf>),

    #[error("Invalid negotiation state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A synchronization step panicked; the outcome is still reported.
    #[error("Synchronization aborted: {0}")]
    Aborted(String),

    #[error("Malformed name mapping: {0}")]
    MalformedMapping(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl NegotiationError {
    /// Build the cancellation error matching where the signal came from.
    pub fn cancelled(location: CancelLocation, message: Option<String>) -> Self {
        match location {
            CancelLocation::Local => Self::CancelledByUser(message),
            CancelLocation::Remote => Self::CancelledByPeer(message),
        }
    }

    /// Cancellations are reported as outcomes, not failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::CancelledByUser(_) | Self::CancelledByPeer(_))
    }

    pub fn outcome(&self) -> NegotiationOutcome {
        if self.is_cancellation() {
            NegotiationOutcome::Cancelled
        } else {
            NegotiationOutcome::Error
        }
    }
}

fn fmt_message(message: &Option<String>) -> String {
    match message {
        Some(m) if !m.is_empty() => format!(": {}", m),
        _ => String::new(),
    }
}

fn fmt_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, NegotiationError>;
