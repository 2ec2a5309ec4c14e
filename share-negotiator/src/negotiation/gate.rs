//! Single batch confirmation for destructive changes across all roots.

use super::ConfirmationPrompt;
use crate::manifest::ManifestDiff;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Approve,
    Reject,
}

/// Local changes one root would suffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConflicts {
    pub root: String,
    pub diff: ManifestDiff,
}

/// Aggregated, ordered view of every non-empty root diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    roots: Vec<RootConflicts>,
}

impl ConflictReport {
    /// Build from per-root diffs in negotiation order. Empty diffs are dropped.
    pub fn new<I>(diffs: I) -> Self
    where
        I: IntoIterator<Item = (String, ManifestDiff)>,
    {
        let roots = diffs
            .into_iter()
            .filter(|(_, diff)| !diff.is_empty())
            .map(|(root, diff)| RootConflicts { root, diff })
            .collect();
        Self { roots }
    }

    pub fn roots(&self) -> &[RootConflicts] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.roots.iter().map(|r| r.diff.len()).sum()
    }

    /// Root name, then its removed folders, removed files and altered files.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for conflicts in &self.roots {
            out.push_str(&conflicts.root);
            out.push_str(":\n");
            for path in &conflicts.diff.removed_folders {
                out.push_str(&format!("  removed folder: {}\n", path));
            }
            for path in &conflicts.diff.removed_files {
                out.push_str(&format!("  removed file:   {}\n", path));
            }
            for path in &conflicts.diff.altered_files {
                out.push_str(&format!("  altered file:   {}\n", path));
            }
        }
        out
    }
}

/// One-shot gate. Confirming consumes it, so a negotiation attempt can never
/// ask twice.
#[derive(Debug)]
pub struct ConflictGate {
    report: ConflictReport,
}

impl ConflictGate {
    pub fn new<I>(diffs: I) -> Self
    where
        I: IntoIterator<Item = (String, ManifestDiff)>,
    {
        Self {
            report: ConflictReport::new(diffs),
        }
    }

    /// False when every diff is empty; nothing local is at risk.
    pub fn needs_confirmation(&self) -> bool {
        !self.report.is_empty()
    }

    pub fn report(&self) -> &ConflictReport {
        &self.report
    }

    pub async fn confirm(self, prompt: &dyn ConfirmationPrompt) -> GateDecision {
        if !self.needs_confirmation() {
            return GateDecision::Approve;
        }

        info!(
            "Asking for confirmation of {} local change(s) across {} root(s)",
            self.report.total_changes(),
            self.report.roots().len()
        );
        prompt.confirm(&self.report).await
    }
}
