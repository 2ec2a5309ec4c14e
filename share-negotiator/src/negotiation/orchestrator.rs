//! Entry point for incoming negotiations.
//!
//! `accept` resolves targets, diffs reused containers, runs the conflict gate
//! and records the name mapping on the calling task, then hands execution to
//! a background [`SyncRunner`] and returns a [`NegotiationHandle`].

use super::cancellation::{CancellationCoordinator, NegotiationState};
use super::gate::{ConflictGate, GateDecision};
use super::resolver::TargetResolver;
use super::runner::SyncRunner;
use super::tracker::{NegotiationControl, NegotiationTracker};
use super::{ConfirmationPrompt, IncomingNegotiation};
use crate::documents::DocumentRegistry;
use crate::fs::checksum::ChecksumCache;
use crate::manifest::{compute_diff, ManifestDiff};
use crate::mapping::NameMappingStore;
use crate::model::{
    ContainerHandle, NegotiationOutcome, ResourceRecord, RootSelection, TargetMapping,
};
use crate::notify::{Notifier, OutcomeReport};
use crate::utils::errors::{NegotiationError, Result};
use crate::workspace::Workspace;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub workspace: Arc<dyn Workspace>,
    pub documents: Arc<dyn DocumentRegistry>,
    pub checksums: Arc<dyn ChecksumCache>,
    pub mappings: Arc<NameMappingStore>,
    pub prompt: Arc<dyn ConfirmationPrompt>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct NegotiationOrchestrator {
    collaborators: Collaborators,
    tracker: NegotiationTracker,
}

impl NegotiationOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            tracker: NegotiationTracker::new(),
        }
    }

    pub fn tracker(&self) -> &NegotiationTracker {
        &self.tracker
    }

    /// Suggested selection per root, based on the peer's mapping history.
    pub fn default_selections(&self, negotiation: &dyn IncomingNegotiation) -> Vec<RootSelection> {
        let history = match self.collaborators.mappings.get_mapping(negotiation.peer_id()) {
            Ok(history) => history,
            Err(e) => {
                warn!(
                    "Ignoring unreadable name mapping for peer {}: {}",
                    negotiation.peer_id(),
                    e
                );
                BTreeMap::new()
            }
        };

        TargetResolver::new(&*self.collaborators.workspace)
            .default_selections(negotiation.resources(), &history)
    }

    /// Accept an offered negotiation with the given per-root selections.
    ///
    /// Returns once the synchronization has been started. Validation and scan
    /// failures, gate rejection and cancellations before the start are
    /// returned as errors; every outcome after that arrives through the
    /// handle.
    pub async fn accept(
        &self,
        negotiation: Arc<dyn IncomingNegotiation>,
        selections: Vec<RootSelection>,
    ) -> Result<NegotiationHandle> {
        let coordinator = Arc::new(CancellationCoordinator::new());
        let control = NegotiationControl::new(coordinator.clone(), negotiation.clone());
        self.spawn_cancel_listener(&negotiation, &coordinator);
        self.tracker.register(control.clone()).await;

        info!(
            "Accepting negotiation {} from {} ({} root(s))",
            negotiation.id(),
            negotiation.peer_id(),
            negotiation.resources().len()
        );

        let mapping = match TargetResolver::new(&*self.collaborators.workspace)
            .resolve(negotiation.resources(), &selections)
        {
            Ok(mapping) => mapping,
            Err(e) => {
                // Not started: nothing to report beyond the error itself
                warn!("Rejected selections for negotiation {}: {}", negotiation.id(), e);
                coordinator.finish(NegotiationOutcome::Error);
                self.tracker.complete(negotiation.id()).await;
                return Err(e);
            }
        };

        let diffs = match self.compute_diffs(negotiation.resources(), &mapping).await {
            Ok(diffs) => diffs,
            Err(e) => {
                control.cancel(Some(e.to_string()));
                return Err(self.abandon(&negotiation, &coordinator, &mapping, e).await);
            }
        };

        if let Err(e) = coordinator.advance(NegotiationState::Confirming) {
            return Err(self.abandon(&negotiation, &coordinator, &mapping, e).await);
        }

        let gate = ConflictGate::new(diffs);
        let decision = tokio::select! {
            decision = gate.confirm(&*self.collaborators.prompt) => Some(decision),
            _ = coordinator.cancelled() => None,
        };
        if decision == Some(GateDecision::Reject) {
            info!("Local changes not approved, cancelling negotiation {}", negotiation.id());
            control.cancel(None);
        }

        let pairs: BTreeMap<String, String> = mapping
            .roots()
            .iter()
            .map(|r| (r.remote_name.clone(), r.container.name().to_string()))
            .collect();
        let stored = coordinator.guard_mutation(|| {
            self.collaborators
                .mappings
                .update_mapping(negotiation.peer_id(), &pairs)
        });
        match stored {
            Ok(Ok(())) => debug!("Recorded name mapping for peer {}", negotiation.peer_id()),
            Ok(Err(e)) => warn!(
                "Failed to record name mapping for peer {}: {}",
                negotiation.peer_id(),
                e
            ),
            Err(e) => return Err(self.abandon(&negotiation, &coordinator, &mapping, e).await),
        }

        if let Err(e) = coordinator.advance(NegotiationState::Running) {
            return Err(self.abandon(&negotiation, &coordinator, &mapping, e).await);
        }

        self.collaborators.notifier.started(
            negotiation.id(),
            negotiation.peer_id(),
            &mapping.container_names(),
        );

        let runner = SyncRunner::new(
            self.collaborators.workspace.clone(),
            self.collaborators.documents.clone(),
            self.collaborators.notifier.clone(),
        );
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let tracker = self.tracker.clone();
        let task_negotiation = negotiation.clone();
        let task_coordinator = coordinator.clone();

        tokio::spawn(async move {
            let id = task_negotiation.id().to_string();
            let outcome = runner.run(task_negotiation, mapping, task_coordinator).await;
            tracker.complete(&id).await;
            let _ = outcome_tx.send(outcome);
        });

        Ok(NegotiationHandle {
            control,
            outcome: outcome_rx,
        })
    }

    /// Per-root diffs in mapping order. New containers have nothing to lose.
    async fn compute_diffs(
        &self,
        resources: &[ResourceRecord],
        mapping: &TargetMapping,
    ) -> Result<Vec<(String, ManifestDiff)>> {
        let mut diffs = Vec::with_capacity(mapping.len());

        for root in mapping.roots() {
            let diff = match &root.container {
                ContainerHandle::ToBeCreated(_) => ManifestDiff::default(),
                ContainerHandle::Existing(container) => {
                    let remote = resources
                        .iter()
                        .find(|r| r.id == root.resource_id)
                        .map(|r| r.remote_manifest.clone())
                        .unwrap_or_default();
                    let workspace = self.collaborators.workspace.clone();
                    let checksums = self.collaborators.checksums.clone();
                    let container = container.clone();
                    let name = container.name.clone();

                    tokio::task::spawn_blocking(move || {
                        compute_diff(&*workspace, &container, &remote, &*checksums)
                    })
                    .await
                    .map_err(|e| NegotiationError::DiffComputation {
                        root: name,
                        source: io::Error::new(io::ErrorKind::Other, e.to_string()),
                    })??
                }
            };
            diffs.push((root.container.name().to_string(), diff));
        }

        Ok(diffs)
    }

    /// Forward transport cancellations to the coordinator until the
    /// negotiation ends. Peer cancellations are never echoed back.
    fn spawn_cancel_listener(
        &self,
        negotiation: &Arc<dyn IncomingNegotiation>,
        coordinator: &Arc<CancellationCoordinator>,
    ) {
        let mut signals = negotiation.cancellations();
        let coordinator = coordinator.clone();
        let id = negotiation.id().to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = coordinator.terminated() => break,
                    signal = signals.recv() => match signal {
                        Ok(signal) => {
                            coordinator.cancel(signal);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Cancel listener for {} skipped {} signal(s)", id, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Cancel listener for {} stopped", id);
        });
    }

    /// End a negotiation that never reached the runner.
    async fn abandon(
        &self,
        negotiation: &Arc<dyn IncomingNegotiation>,
        coordinator: &CancellationCoordinator,
        mapping: &TargetMapping,
        error: NegotiationError,
    ) -> NegotiationError {
        let outcome = error.outcome();
        if coordinator.finish(outcome) {
            let mut report = OutcomeReport::new(
                negotiation.id(),
                negotiation.peer_id(),
                outcome,
                mapping.container_names(),
            );
            if outcome == NegotiationOutcome::Cancelled {
                report = report.with_cancel(coordinator.cancel_signal().cloned());
            } else {
                report = report.with_error(error.to_string());
            }
            self.collaborators.notifier.finished(&report);
        }

        self.tracker.complete(negotiation.id()).await;
        error
    }
}

/// Caller's view of a running negotiation.
pub struct NegotiationHandle {
    control: NegotiationControl,
    outcome: oneshot::Receiver<NegotiationOutcome>,
}

impl NegotiationHandle {
    pub fn id(&self) -> &str {
        self.control.id()
    }

    pub fn state(&self) -> NegotiationState {
        self.control.state()
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.coordinator().is_cancelled()
    }

    /// Request cancellation. Returns false if another signal got there first
    /// or the negotiation already ended.
    pub fn cancel(&self, message: Option<String>) -> bool {
        self.control.cancel(message)
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> NegotiationOutcome {
        self.outcome.await.unwrap_or(NegotiationOutcome::Error)
    }
}
