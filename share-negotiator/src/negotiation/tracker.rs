//! Tracking of in-flight negotiations so they can be cancelled by id.

use super::cancellation::{CancellationCoordinator, NegotiationState};
use super::IncomingNegotiation;
use crate::model::CancelSignal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// What is needed to cancel a negotiation from this side.
#[derive(Clone)]
pub struct NegotiationControl {
    coordinator: Arc<CancellationCoordinator>,
    negotiation: Arc<dyn IncomingNegotiation>,
}

impl NegotiationControl {
    pub fn new(
        coordinator: Arc<CancellationCoordinator>,
        negotiation: Arc<dyn IncomingNegotiation>,
    ) -> Self {
        Self {
            coordinator,
            negotiation,
        }
    }

    pub fn id(&self) -> &str {
        self.negotiation.id()
    }

    pub fn state(&self) -> NegotiationState {
        self.coordinator.state()
    }

    pub fn coordinator(&self) -> &Arc<CancellationCoordinator> {
        &self.coordinator
    }

    /// Cancel locally. The peer is told only if this signal wins.
    pub fn cancel(&self, message: Option<String>) -> bool {
        let won = self
            .coordinator
            .cancel(CancelSignal::local(message.clone()));
        if won {
            self.negotiation.local_cancel(message.as_deref());
        }
        won
    }
}

/// Tracks running negotiations and provides cancellation mechanism
#[derive(Clone)]
pub struct NegotiationTracker {
    negotiations: Arc<RwLock<HashMap<String, NegotiationControl>>>,
}

impl NegotiationTracker {
    pub fn new() -> Self {
        Self {
            negotiations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, control: NegotiationControl) {
        let mut negotiations = self.negotiations.write().await;
        negotiations.insert(control.id().to_string(), control);
    }

    /// Cancel a negotiation by its ID
    pub async fn cancel(&self, negotiation_id: &str, message: Option<String>) -> bool {
        let negotiations = self.negotiations.read().await;
        match negotiations.get(negotiation_id) {
            Some(control) => {
                info!("Cancelling negotiation {} on request", negotiation_id);
                control.cancel(message)
            }
            None => false,
        }
    }

    /// Remove a negotiation from tracking once it reached a terminal outcome
    pub async fn complete(&self, negotiation_id: &str) {
        let mut negotiations = self.negotiations.write().await;
        negotiations.remove(negotiation_id);
    }

    pub async fn running_count(&self) -> usize {
        let negotiations = self.negotiations.read().await;
        negotiations.len()
    }
}

impl Default for NegotiationTracker {
    fn default() -> Self {
        Self::new()
    }
}
