//! Progress tracking for the transfer step.
//!
//! The transport reports work units through a [`ProgressSink`]; snapshots
//! carry percentage, throughput and an ETA and are forwarded to the notifier
//! at most every 250 ms (plus once on completion).

use crate::notify::Notifier;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Progress information for a transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Total work units announced by the transport
    pub total_work: u64,

    /// Work units completed so far
    pub worked: u64,

    /// Current throughput in units/second
    pub units_per_second: u64,

    /// Estimated time remaining (seconds)
    pub eta_seconds: u64,

    /// Percentage complete (0-100)
    pub percent_complete: f64,

    /// What the transport is doing right now
    pub current_task: Option<String>,
}

impl TransferProgress {
    pub fn new(total_work: u64) -> Self {
        Self {
            total_work,
            worked: 0,
            units_per_second: 0,
            eta_seconds: 0,
            percent_complete: 0.0,
            current_task: None,
        }
    }

    pub fn update(&mut self, worked: u64) {
        self.worked = worked;
        self.percent_complete = if self.total_work > 0 {
            ((self.worked as f64 / self.total_work as f64) * 100.0).min(100.0)
        } else {
            0.0
        };
    }

    pub fn is_complete(&self) -> bool {
        self.total_work > 0 && self.worked >= self.total_work
    }

    /// One-line description for logs, e.g. `42.0% (120 units/s, 1m 5s left)`.
    pub fn summary(&self) -> String {
        let mut line = format!("{:.1}%", self.percent_complete);
        if self.units_per_second > 0 && !self.is_complete() {
            line.push_str(&format!(
                " ({} units/s, {} left)",
                self.units_per_second,
                format_duration(self.eta_seconds)
            ));
        }
        if let Some(task) = &self.current_task {
            line.push_str(&format!(": {}", task));
        }
        line
    }
}

/// Progress tracker with time-based speed calculation
pub struct ProgressTracker {
    last_update_time: Instant,
    last_worked: u64,
    progress: TransferProgress,
}

impl ProgressTracker {
    pub fn new(total_work: u64) -> Self {
        let now = Instant::now();
        Self {
            last_update_time: now,
            last_worked: 0,
            progress: TransferProgress::new(total_work),
        }
    }

    /// Update progress and calculate speed
    pub fn update(&mut self, worked: u64) -> &TransferProgress {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update_time).as_secs_f64();

        if elapsed > 0.0 {
            let diff = worked.saturating_sub(self.last_worked);
            self.progress.units_per_second = (diff as f64 / elapsed) as u64;
        }

        if self.progress.units_per_second > 0 {
            let remaining = self.progress.total_work.saturating_sub(worked);
            self.progress.eta_seconds = remaining / self.progress.units_per_second;
        }

        self.progress.update(worked);
        self.last_update_time = now;
        self.last_worked = worked;

        &self.progress
    }

    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut TransferProgress {
        &mut self.progress
    }
}

struct SinkState {
    tracker: ProgressTracker,
    last_emit: Option<Instant>,
}

/// Handed to the transfer primitive to report its progress.
#[derive(Clone)]
pub struct ProgressSink {
    negotiation_id: String,
    notifier: Arc<dyn Notifier>,
    state: Arc<Mutex<SinkState>>,
    emit_interval: Duration,
}

impl ProgressSink {
    pub fn new(negotiation_id: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            negotiation_id: negotiation_id.into(),
            notifier,
            state: Arc::new(Mutex::new(SinkState {
                tracker: ProgressTracker::new(0),
                last_emit: None,
            })),
            emit_interval: Duration::from_millis(250),
        }
    }

    /// Announce the total amount of work and restart the clock.
    pub fn begin(&self, total_work: u64) {
        self.with_state(|state| {
            state.tracker = ProgressTracker::new(total_work);
            true
        });
    }

    /// Add completed work units.
    pub fn worked(&self, units: u64) {
        self.with_state(|state| {
            let worked = state.tracker.progress().worked.saturating_add(units);
            state.tracker.update(worked);
            false
        });
    }

    pub fn subtask(&self, name: impl Into<String>) {
        let name = name.into();
        self.with_state(move |state| {
            state.tracker.progress_mut().current_task = Some(name);
            false
        });
    }

    /// Mark all announced work as done.
    pub fn done(&self) {
        self.with_state(|state| {
            let total = state.tracker.progress().total_work;
            state.tracker.update(total);
            state.tracker.progress_mut().current_task = None;
            true
        });
    }

    pub fn snapshot(&self) -> TransferProgress {
        let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.tracker.progress().clone()
    }

    /// Apply `update`; emit a snapshot if it asks to or the interval has passed.
    fn with_state<F>(&self, update: F)
    where
        F: FnOnce(&mut SinkState) -> bool,
    {
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let force = update(&mut *state);
            let now = Instant::now();
            let due = state
                .last_emit
                .map_or(true, |last| now.duration_since(last) >= self.emit_interval);
            if force || due {
                state.last_emit = Some(now);
                Some(state.tracker.progress().clone())
            } else {
                None
            }
        };

        if let Some(progress) = snapshot {
            self.notifier.progress(&self.negotiation_id, &progress);
        }
    }
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
