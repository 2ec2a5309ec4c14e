//! Negotiation lifecycle events fanned out to any number of observers.

use crate::notify::{Notice, Notifier, OutcomeReport};
use crate::progress::TransferProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum number of queued events per subscriber
const BROADCAST_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum NegotiationEvent {
    #[serde(rename = "negotiation:started")]
    Started {
        negotiation_id: String,
        peer_id: String,
        roots: Vec<String>,
        started_at: DateTime<Utc>,
    },

    #[serde(rename = "negotiation:progress")]
    Progress {
        negotiation_id: String,
        progress: TransferProgress,
    },

    #[serde(rename = "negotiation:finished")]
    Finished {
        report: OutcomeReport,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notice: Option<Notice>,
    },
}

/// Broadcast channel for negotiation events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NegotiationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// Send an event to all current subscribers; dropped if nobody listens.
    pub fn broadcast(&self, event: NegotiationEvent) {
        match self.tx.send(event) {
            Ok(count) => debug!("Broadcast negotiation event to {} subscriber(s)", count),
            Err(_) => debug!("No subscribers for negotiation event"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NegotiationEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for EventBus {
    fn started(&self, negotiation_id: &str, peer_id: &str, roots: &[String]) {
        self.broadcast(NegotiationEvent::Started {
            negotiation_id: negotiation_id.to_string(),
            peer_id: peer_id.to_string(),
            roots: roots.to_vec(),
            started_at: Utc::now(),
        });
    }

    fn progress(&self, negotiation_id: &str, progress: &TransferProgress) {
        self.broadcast(NegotiationEvent::Progress {
            negotiation_id: negotiation_id.to_string(),
            progress: progress.clone(),
        });
    }

    fn finished(&self, report: &OutcomeReport) {
        self.broadcast(NegotiationEvent::Finished {
            report: report.clone(),
            notice: report.notice(),
        });
    }
}
