//! Background execution of an approved negotiation.
//!
//! Order of work: refuse on dirty documents, close open documents, suspend
//! automatic building, create new containers, transfer, restore the build
//! flag, reopen documents, report the outcome once.

use super::cancellation::CancellationCoordinator;
use super::IncomingNegotiation;
use crate::documents::{DocumentRegistry, OpenDocument};
use crate::model::{CancelSignal, ContainerHandle, NegotiationOutcome, TargetMapping, TransferStatus};
use crate::notify::{Notifier, OutcomeReport};
use crate::progress::ProgressSink;
use crate::utils::errors::{NegotiationError, Result};
use crate::workspace::Workspace;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct SyncRunner {
    workspace: Arc<dyn Workspace>,
    documents: Arc<dyn DocumentRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl SyncRunner {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        documents: Arc<dyn DocumentRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            workspace,
            documents,
            notifier,
        }
    }

    /// Run the negotiation to a terminal outcome and report it.
    pub async fn run(
        &self,
        negotiation: Arc<dyn IncomingNegotiation>,
        mapping: TargetMapping,
        coordinator: Arc<CancellationCoordinator>,
    ) -> NegotiationOutcome {
        info!(
            "Starting synchronization {} with {} ({} root(s))",
            negotiation.id(),
            negotiation.peer_id(),
            mapping.len()
        );

        // Steps run in their own task so a panic still ends in a reported outcome
        let steps = self.clone();
        let task_negotiation = negotiation.clone();
        let task_mapping = mapping.clone();
        let task_coordinator = coordinator.clone();
        let handle = tokio::spawn(async move {
            steps
                .execute(&task_negotiation, &task_mapping, &task_coordinator)
                .await
        });
        let result = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(NegotiationError::Aborted(panic_message(e.into_panic()))),
            Err(e) => Err(NegotiationError::Aborted(e.to_string())),
        };

        let (outcome, failure) = match result {
            Ok(()) => (NegotiationOutcome::Ok, None),
            Err(e) => {
                if e.is_cancellation() {
                    info!("Synchronization {} cancelled: {}", negotiation.id(), e);
                } else {
                    error!("Synchronization {} failed: {}", negotiation.id(), e);
                }
                (e.outcome(), Some(e))
            }
        };

        if coordinator.finish(outcome) {
            let mut report = OutcomeReport::new(
                negotiation.id(),
                negotiation.peer_id(),
                outcome,
                mapping.container_names(),
            );
            if outcome == NegotiationOutcome::Cancelled {
                report = report.with_cancel(coordinator.cancel_signal().cloned());
            }
            if let (NegotiationOutcome::Error, Some(e)) = (outcome, &failure) {
                report = report.with_error(e.to_string());
            }
            self.notifier.finished(&report);
        } else {
            warn!("Outcome of negotiation {} was already reported", negotiation.id());
        }

        outcome
    }

    async fn execute(
        &self,
        negotiation: &Arc<dyn IncomingNegotiation>,
        mapping: &TargetMapping,
        coordinator: &Arc<CancellationCoordinator>,
    ) -> Result<()> {
        if let Some(e) = coordinator.cancellation_error() {
            return Err(e);
        }

        let closed = self.close_documents(mapping)?;
        let result = self.transfer(negotiation, mapping, coordinator).await;
        self.reopen_documents(&closed);
        result
    }

    async fn transfer(
        &self,
        negotiation: &Arc<dyn IncomingNegotiation>,
        mapping: &TargetMapping,
        coordinator: &Arc<CancellationCoordinator>,
    ) -> Result<()> {
        let _build = BuildFlagGuard::suspend(self.workspace.clone());

        for root in mapping.roots() {
            if let ContainerHandle::ToBeCreated(container) = &root.container {
                info!("Creating container '{}'", container.name);
                self.workspace.create_container(&container.path)?;
            }
        }

        // Last point where cancellation prevents the transfer from starting
        if let Some(e) = coordinator.cancellation_error() {
            return Err(e);
        }

        let progress = ProgressSink::new(negotiation.id(), self.notifier.clone());
        let token = coordinator.token();
        let task_negotiation = negotiation.clone();
        let task_mapping = mapping.clone();
        let handle = tokio::spawn(async move {
            task_negotiation.run(&task_mapping, progress, token).await
        });

        match handle.await {
            Ok(TransferStatus::Ok) => {
                if coordinator.is_cancelled() {
                    info!("Transfer {} completed despite cancellation request", negotiation.id());
                }
                Ok(())
            }
            Ok(TransferStatus::Cancelled) => {
                // Cancelled without a signal on this side: the peer stopped it
                coordinator.cancel(CancelSignal::remote(None));
                Err(coordinator
                    .cancellation_error()
                    .unwrap_or(NegotiationError::CancelledByPeer(None)))
            }
            Ok(TransferStatus::Error(message)) => Err(NegotiationError::Transfer(message)),
            Err(e) if e.is_panic() => Err(NegotiationError::Transfer("transfer task panicked".to_string())),
            Err(e) => Err(NegotiationError::Transfer(format!("transfer task failed: {}", e))),
        }
    }

    /// Close every open document under a target container. Refuses while any
    /// of them has unsaved changes.
    fn close_documents(&self, mapping: &TargetMapping) -> Result<Vec<OpenDocument>> {
        let mut open: Vec<OpenDocument> = Vec::new();
        for root in mapping.roots() {
            for document in self.documents.documents_under(root.container.path()) {
                if !open.contains(&document) {
                    open.push(document);
                }
            }
        }

        let dirty: Vec<PathBuf> = open
            .iter()
            .filter(|d| self.documents.is_dirty(d))
            .map(|d| d.path.clone())
            .collect();
        if !dirty.is_empty() {
            return Err(NegotiationError::DirtyDocuments(dirty));
        }

        let mut closed = Vec::with_capacity(open.len());
        for document in open {
            if let Err(e) = self.documents.close(&document) {
                self.reopen_documents(&closed);
                return Err(e);
            }
            debug!("Closed {}", document.path.display());
            closed.push(document);
        }

        Ok(closed)
    }

    /// Best effort: one failure does not stop the others.
    fn reopen_documents(&self, documents: &[OpenDocument]) {
        for document in documents {
            if !self.workspace.exists(&document.path) {
                debug!("Not reopening {}, file is gone", document.path.display());
                continue;
            }
            if let Err(e) = self.documents.reopen(document) {
                warn!("Failed to reopen {}: {}", document.path.display(), e);
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("step panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("step panicked: {}", message)
    } else {
        "step panicked".to_string()
    }
}

/// Disables automatic building for its lifetime and restores the previous
/// value on drop, including during unwinding.
struct BuildFlagGuard {
    workspace: Arc<dyn Workspace>,
    restore: bool,
}

impl BuildFlagGuard {
    fn suspend(workspace: Arc<dyn Workspace>) -> Self {
        let restore = match workspace.is_auto_building() {
            Ok(true) => match workspace.set_auto_building(false) {
                Ok(()) => {
                    debug!("Automatic building suspended");
                    true
                }
                Err(e) => {
                    warn!("Failed to suspend automatic building: {}", e);
                    false
                }
            },
            Ok(false) => false,
            Err(e) => {
                warn!("Failed to read automatic building flag: {}", e);
                false
            }
        };

        Self { workspace, restore }
    }
}

impl Drop for BuildFlagGuard {
    fn drop(&mut self) {
        if !self.restore {
            return;
        }
        match self.workspace.set_auto_building(true) {
            Ok(()) => debug!("Automatic building restored"),
            Err(e) => warn!("Failed to restore automatic building: {}", e),
        }
    }
}
