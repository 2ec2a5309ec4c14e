//! Negotiation state machine and first-wins cancellation.
//!
//! A cancel signal can come from the local user or from the peer. The first
//! one is latched and fires a [`CancellationToken`]; later ones are ignored.
//! Mapping-store writes go through [`CancellationCoordinator::guard_mutation`],
//! which shares the state lock with [`CancellationCoordinator::cancel`], so no
//! write can start once a cancel is latched.

use crate::model::{CancelSignal, NegotiationOutcome};
use crate::utils::errors::{NegotiationError, Result};
use std::fmt;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Created,
    Confirming,
    Running,
    Completed,
    Cancelled,
    Error,
}

impl NegotiationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }

    fn can_enter(self, next: NegotiationState) -> bool {
        use NegotiationState::*;
        matches!(
            (self, next),
            (Created, Confirming)
                | (Created, Running)
                | (Created, Cancelled)
                | (Created, Error)
                | (Confirming, Running)
                | (Confirming, Cancelled)
                | (Confirming, Error)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Error)
        )
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Confirming => "CONFIRMING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

impl From<NegotiationOutcome> for NegotiationState {
    fn from(outcome: NegotiationOutcome) -> Self {
        match outcome {
            NegotiationOutcome::Ok => Self::Completed,
            NegotiationOutcome::Cancelled => Self::Cancelled,
            NegotiationOutcome::Error => Self::Error,
        }
    }
}

#[derive(Debug)]
pub struct CancellationCoordinator {
    state: Mutex<NegotiationState>,
    signal: OnceLock<CancelSignal>,
    token: CancellationToken,
    terminated: CancellationToken,
}

impl CancellationCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NegotiationState::Created),
            signal: OnceLock::new(),
            token: CancellationToken::new(),
            terminated: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        *self.lock_state()
    }

    /// Move to a non-terminal state. Fails with the latched cancellation if
    /// one has arrived.
    pub fn advance(&self, next: NegotiationState) -> Result<()> {
        let mut state = self.lock_state();
        self.check_cancelled()?;
        if next.is_terminal() || !state.can_enter(next) {
            return Err(NegotiationError::InvalidTransition {
                from: state.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Negotiation state {} -> {}", *state, next);
        *state = next;
        Ok(())
    }

    /// Latch `signal` if nothing was latched yet and the negotiation is still
    /// live. Returns true for the winning signal only.
    pub fn cancel(&self, signal: CancelSignal) -> bool {
        let state = self.lock_state();
        if state.is_terminal() {
            debug!("Ignoring {} cancellation after negotiation ended", signal.location);
            return false;
        }

        let location = signal.location;
        if self.signal.set(signal).is_err() {
            debug!("Ignoring {} cancellation, already cancelled", location);
            return false;
        }

        info!("Negotiation cancelled ({}) while {}", location, *state);
        self.token.cancel();
        true
    }

    pub fn cancel_signal(&self) -> Option<&CancelSignal> {
        self.signal.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.get().is_some()
    }

    /// Token handed to the transfer primitive.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Resolves once a terminal outcome has been recorded.
    pub async fn terminated(&self) {
        self.terminated.cancelled().await
    }

    /// The error matching the latched signal, if any.
    pub fn cancellation_error(&self) -> Option<NegotiationError> {
        self.signal
            .get()
            .map(|s| NegotiationError::cancelled(s.location, s.message.clone()))
    }

    /// Record the terminal outcome. Returns true exactly once per negotiation;
    /// only that caller may report the outcome.
    pub fn finish(&self, outcome: NegotiationOutcome) -> bool {
        let mut state = self.lock_state();
        let next = NegotiationState::from(outcome);
        if !state.can_enter(next) {
            debug!("Dropping outcome {} in state {}", outcome, *state);
            return false;
        }
        *state = next;
        self.terminated.cancel();
        true
    }

    /// Run `mutation` unless a cancellation is latched. Cancellations that
    /// arrive meanwhile wait for it to finish.
    pub fn guard_mutation<T, F>(&self, mutation: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        let _state = self.lock_state();
        self.check_cancelled()?;
        Ok(mutation())
    }

    fn check_cancelled(&self) -> Result<()> {
        match self.cancellation_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, NegotiationState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CancellationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CancelLocation;

    #[test]
    fn test_happy_path_transitions() {
        let coordinator = CancellationCoordinator::new();
        coordinator.advance(NegotiationState::Confirming).unwrap();
        coordinator.advance(NegotiationState::Running).unwrap();
        assert!(coordinator.finish(NegotiationOutcome::Ok));
        assert_eq!(coordinator.state(), NegotiationState::Completed);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let coordinator = CancellationCoordinator::new();
        coordinator.advance(NegotiationState::Running).unwrap();
        let result = coordinator.advance(NegotiationState::Confirming);
        assert!(matches!(result, Err(NegotiationError::InvalidTransition { .. })));
        assert_eq!(coordinator.state(), NegotiationState::Running);
        assert!(matches!(
            coordinator.advance(NegotiationState::Completed),
            Err(NegotiationError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_first_cancel_wins_local_then_remote() {
        let coordinator = CancellationCoordinator::new();
        assert!(coordinator.cancel(CancelSignal::local(Some("closed".to_string()))));
        assert!(!coordinator.cancel(CancelSignal::remote(None)));

        let signal = coordinator.cancel_signal().unwrap();
        assert_eq!(signal.location, CancelLocation::Local);
        assert!(coordinator.token().is_cancelled());
        assert!(matches!(
            coordinator.cancellation_error(),
            Some(NegotiationError::CancelledByUser(Some(_)))
        ));
    }

    #[test]
    fn test_first_cancel_wins_remote_then_local() {
        let coordinator = CancellationCoordinator::new();
        coordinator.advance(NegotiationState::Running).unwrap();
        assert!(coordinator.cancel(CancelSignal::remote(Some("peer left".to_string()))));
        assert!(!coordinator.cancel(CancelSignal::local(None)));
        assert_eq!(coordinator.cancel_signal().unwrap().location, CancelLocation::Remote);
    }

    #[test]
    fn test_finish_reports_once() {
        let coordinator = CancellationCoordinator::new();
        coordinator.cancel(CancelSignal::local(None));
        assert!(coordinator.finish(NegotiationOutcome::Cancelled));
        assert!(!coordinator.finish(NegotiationOutcome::Cancelled));
        assert!(!coordinator.finish(NegotiationOutcome::Error));
        assert_eq!(coordinator.state(), NegotiationState::Cancelled);
    }

    #[test]
    fn test_cancel_after_finish_ignored() {
        let coordinator = CancellationCoordinator::new();
        coordinator.advance(NegotiationState::Running).unwrap();
        coordinator.finish(NegotiationOutcome::Ok);
        assert!(!coordinator.cancel(CancelSignal::remote(None)));
        assert!(!coordinator.is_cancelled());
    }

    #[test]
    fn test_no_mutation_after_cancel() {
        let coordinator = CancellationCoordinator::new();
        assert_eq!(coordinator.guard_mutation(|| 7).unwrap(), 7);

        coordinator.cancel(CancelSignal::remote(None));
        let mut touched = false;
        let result = coordinator.guard_mutation(|| touched = true);
        assert!(matches!(result, Err(NegotiationError::CancelledByPeer(None))));
        assert!(!touched);
    }

    #[test]
    fn test_advance_refused_once_cancelled() {
        let coordinator = CancellationCoordinator::new();
        coordinator.advance(NegotiationState::Confirming).unwrap();
        coordinator.cancel(CancelSignal::local(None));
        assert!(matches!(
            coordinator.advance(NegotiationState::Running),
            Err(NegotiationError::CancelledByUser(None))
        ));
        assert_eq!(coordinator.state(), NegotiationState::Confirming);
    }

    #[tokio::test]
    async fn test_terminated_resolves_after_finish() {
        let coordinator = std::sync::Arc::new(CancellationCoordinator::new());
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.terminated().await })
        };
        coordinator.finish(NegotiationOutcome::Error);
        waiter.await.unwrap();
    }
}
