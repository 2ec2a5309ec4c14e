//! Incoming negotiation flow: resolve targets, diff, confirm, run.

pub mod cancellation;
pub mod gate;
pub mod orchestrator;
pub mod resolver;
pub mod runner;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

use crate::model::{CancelSignal, ResourceRecord, TargetMapping, TransferStatus};
use crate::progress::ProgressSink;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub use cancellation::{CancellationCoordinator, NegotiationState};
pub use gate::{ConflictGate, ConflictReport, GateDecision};
pub use resolver::TargetResolver;
pub use runner::SyncRunner;
pub use tracker::{NegotiationControl, NegotiationTracker};

/// Transport-side view of one negotiation offered by a peer.
#[async_trait]
pub trait IncomingNegotiation: Send + Sync {
    fn id(&self) -> &str;

    fn peer_id(&self) -> &str;

    /// Resource roots in the order the peer offered them.
    fn resources(&self) -> &[ResourceRecord];

    /// Cancellation signals reported by the transport, tagged with their origin.
    fn cancellations(&self) -> broadcast::Receiver<CancelSignal>;

    /// Tell the peer this side gave up on the negotiation.
    fn local_cancel(&self, message: Option<&str>);

    /// Opaque transfer primitive. Expected to observe `cancel` cooperatively.
    async fn run(
        &self,
        mapping: &TargetMapping,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> TransferStatus;
}

/// Asks the user to approve destructive changes.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn confirm(&self, report: &ConflictReport) -> GateDecision;
}

/// Prompt that always gives the same answer, for unattended hosts.
#[derive(Debug, Clone, Copy)]
pub struct StaticPrompt(pub GateDecision);

#[async_trait]
impl ConfirmationPrompt for StaticPrompt {
    async fn confirm(&self, report: &ConflictReport) -> GateDecision {
        tracing::info!(
            "Answering conflict prompt with {:?} ({} change(s) across {} root(s))",
            self.0,
            report.total_changes(),
            report.roots().len()
        );
        self.0
    }
}
