//! Terminal status reporting.

use crate::model::{CancelLocation, CancelSignal, NegotiationOutcome};
use crate::progress::TransferProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A message meant for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

/// Everything known about a finished negotiation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub negotiation_id: String,
    pub peer_id: String,
    pub outcome: NegotiationOutcome,
    /// Local container names of every root in the negotiation.
    pub roots: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel: Option<CancelSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl OutcomeReport {
    pub fn new(
        negotiation_id: &str,
        peer_id: &str,
        outcome: NegotiationOutcome,
        roots: Vec<String>,
    ) -> Self {
        Self {
            negotiation_id: negotiation_id.to_string(),
            peer_id: peer_id.to_string(),
            outcome,
            roots,
            cancel: None,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn with_cancel(mut self, cancel: Option<CancelSignal>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// The message to show the user, if any. Local cancellations stay silent.
    pub fn notice(&self) -> Option<Notice> {
        let roots = self.roots.join(", ");
        match self.outcome {
            NegotiationOutcome::Ok => Some(Notice {
                level: NoticeLevel::Success,
                title: "Synchronization complete".to_string(),
                message: format!("Synchronized with {}: {}", self.peer_id, roots),
            }),
            NegotiationOutcome::Error => Some(Notice {
                level: NoticeLevel::Error,
                title: "Synchronization failed".to_string(),
                message: format!(
                    "Could not synchronize {} with {}: {}",
                    roots,
                    self.peer_id,
                    self.error.as_deref().unwrap_or("unknown error")
                ),
            }),
            NegotiationOutcome::Cancelled => match &self.cancel {
                Some(CancelSignal {
                    location: CancelLocation::Remote,
                    message,
                }) => Some(Notice {
                    level: NoticeLevel::Info,
                    title: "Synchronization cancelled".to_string(),
                    message: match message {
                        Some(m) => format!("{} cancelled the synchronization: {}", self.peer_id, m),
                        None => format!("{} cancelled the synchronization", self.peer_id),
                    },
                }),
                _ => None,
            },
        }
    }
}

/// Receives negotiation lifecycle updates.
pub trait Notifier: Send + Sync {
    fn started(&self, _negotiation_id: &str, _peer_id: &str, _roots: &[String]) {}

    fn progress(&self, _negotiation_id: &str, _progress: &TransferProgress) {}

    /// Called exactly once per negotiation attempt.
    fn finished(&self, report: &OutcomeReport);
}

/// Writes terminal notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn progress(&self, negotiation_id: &str, progress: &TransferProgress) {
        debug!("Negotiation {}: {}", negotiation_id, progress.summary());
    }

    fn finished(&self, report: &OutcomeReport) {
        match report.notice() {
            Some(Notice { level: NoticeLevel::Error, title, message }) => error!("{}: {}", title, message),
            Some(Notice { level: NoticeLevel::Info, title, message }) => warn!("{}: {}", title, message),
            Some(Notice { title, message, .. }) => info!("{}: {}", title, message),
            None => info!("Negotiation {} cancelled locally", report.negotiation_id),
        }
    }
}
