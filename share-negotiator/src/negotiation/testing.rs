//! Hand-written collaborators for negotiation tests.

use super::orchestrator::{Collaborators, NegotiationOrchestrator};
use super::{ConfirmationPrompt, ConflictReport, GateDecision, IncomingNegotiation};
use crate::documents::{DocumentRegistry, OpenDocument};
use crate::fs::checksum::{MemoryChecksumCache, NoChecksumCache};
use crate::manifest::{build_local_manifest, FileManifest};
use crate::mapping::{MemoryKeyValueStore, NameMappingStore};
use crate::model::{CancelSignal, ResourceRecord, TargetMapping, TransferStatus};
use crate::notify::{Notifier, OutcomeReport};
use crate::progress::ProgressSink;
use crate::utils::errors::{NegotiationError, Result};
use crate::workspace::LocalWorkspace;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

pub(crate) const PEER: &str = "bob@example.org";

pub(crate) enum Transfer {
    Succeed,
    Fail(String),
    Panic,
    AwaitCancel,
}

type Hook = Box<dyn Fn(&TargetMapping) + Send + Sync>;

pub(crate) struct FakeNegotiation {
    id: String,
    resources: Vec<ResourceRecord>,
    signals: broadcast::Sender<CancelSignal>,
    transfer: Transfer,
    hook: Option<Hook>,
    pub local_cancels: Mutex<Vec<Option<String>>>,
    pub runs: AtomicUsize,
}

impl FakeNegotiation {
    pub fn new(resources: Vec<ResourceRecord>, transfer: Transfer) -> Self {
        let (signals, _) = broadcast::channel(8);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            resources,
            signals,
            transfer,
            hook: None,
            local_cancels: Mutex::new(Vec::new()),
            runs: AtomicUsize::new(0),
        }
    }

    /// Runs inside the transfer, before it finishes.
    pub fn with_hook(mut self, hook: impl Fn(&TargetMapping) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn peer_cancel(&self, message: Option<&str>) {
        let _ = self
            .signals
            .send(CancelSignal::remote(message.map(str::to_string)));
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn local_cancels(&self) -> Vec<Option<String>> {
        self.local_cancels.lock().unwrap().clone()
    }
}

#[async_trait]
impl IncomingNegotiation for FakeNegotiation {
    fn id(&self) -> &str {
        &self.id
    }

    fn peer_id(&self) -> &str {
        PEER
    }

    fn resources(&self) -> &[ResourceRecord] {
        &self.resources
    }

    fn cancellations(&self) -> broadcast::Receiver<CancelSignal> {
        self.signals.subscribe()
    }

    fn local_cancel(&self, message: Option<&str>) {
        self.local_cancels
            .lock()
            .unwrap()
            .push(message.map(str::to_string));
    }

    async fn run(
        &self,
        mapping: &TargetMapping,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> TransferStatus {
        self.runs.fetch_add(1, Ordering::SeqCst);
        progress.begin(mapping.len() as u64);
        if let Some(hook) = &self.hook {
            hook(mapping);
        }

        match &self.transfer {
            Transfer::Succeed => {
                progress.done();
                TransferStatus::Ok
            }
            Transfer::Fail(message) => TransferStatus::Error(message.clone()),
            Transfer::Panic => panic!("transport blew up"),
            Transfer::AwaitCancel => {
                cancel.cancelled().await;
                TransferStatus::Cancelled
            }
        }
    }
}

pub(crate) struct ScriptedPrompt {
    decision: GateDecision,
    hang: bool,
    pub calls: AtomicUsize,
    pub reached: Notify,
}

impl ScriptedPrompt {
    pub fn answering(decision: GateDecision) -> Self {
        Self {
            decision,
            hang: false,
            calls: AtomicUsize::new(0),
            reached: Notify::new(),
        }
    }

    /// Never answers; the gate can only be left through cancellation.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::answering(GateDecision::Approve)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationPrompt for ScriptedPrompt {
    async fn confirm(&self, _report: &ConflictReport) -> GateDecision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reached.notify_one();
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.decision
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub started: AtomicUsize,
    pub reports: Mutex<Vec<OutcomeReport>>,
}

impl RecordingNotifier {
    pub fn reports(&self) -> Vec<OutcomeReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn started(&self, _negotiation_id: &str, _peer_id: &str, _roots: &[String]) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn finished(&self, report: &OutcomeReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

#[derive(Default)]
pub(crate) struct FakeDocuments {
    open: Mutex<Vec<(OpenDocument, bool)>>,
    failing_reopen: Mutex<HashSet<PathBuf>>,
    crashing: AtomicBool,
    pub closed: Mutex<Vec<PathBuf>>,
    pub reopened: Mutex<Vec<PathBuf>>,
}

impl FakeDocuments {
    pub fn open(&self, path: impl Into<PathBuf>, dirty: bool) {
        self.open
            .lock()
            .unwrap()
            .push((OpenDocument::new(path), dirty));
    }

    pub fn fail_reopen(&self, path: impl Into<PathBuf>) {
        self.failing_reopen.lock().unwrap().insert(path.into());
    }

    /// Make every lookup panic, as a crashed editor host would.
    pub fn crash(&self) {
        self.crashing.store(true, Ordering::SeqCst);
    }

    pub fn closed(&self) -> Vec<PathBuf> {
        self.closed.lock().unwrap().clone()
    }

    pub fn reopened(&self) -> Vec<PathBuf> {
        self.reopened.lock().unwrap().clone()
    }
}

impl DocumentRegistry for FakeDocuments {
    fn documents_under(&self, prefix: &Path) -> Vec<OpenDocument> {
        if self.crashing.load(Ordering::SeqCst) {
            panic!("editor host crashed");
        }
        self.open
            .lock()
            .unwrap()
            .iter()
            .filter(|(doc, _)| doc.path.starts_with(prefix))
            .map(|(doc, _)| doc.clone())
            .collect()
    }

    fn is_dirty(&self, document: &OpenDocument) -> bool {
        self.open
            .lock()
            .unwrap()
            .iter()
            .any(|(doc, dirty)| doc == document && *dirty)
    }

    fn close(&self, document: &OpenDocument) -> Result<()> {
        self.closed.lock().unwrap().push(document.path.clone());
        Ok(())
    }

    fn reopen(&self, document: &OpenDocument) -> Result<()> {
        if self.failing_reopen.lock().unwrap().contains(&document.path) {
            return Err(NegotiationError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "editor refused",
            )));
        }
        self.reopened.lock().unwrap().push(document.path.clone());
        Ok(())
    }
}

/// A temporary workspace wired to recording collaborators.
pub(crate) struct Fixture {
    pub dir: TempDir,
    pub workspace: Arc<LocalWorkspace>,
    pub documents: Arc<FakeDocuments>,
    pub mappings: Arc<NameMappingStore>,
    pub prompt: Arc<ScriptedPrompt>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Fixture {
    pub fn new(prompt: ScriptedPrompt) -> Self {
        let dir = TempDir::new().unwrap();
        Self {
            workspace: Arc::new(LocalWorkspace::new(dir.path()).with_auto_build(true)),
            dir,
            documents: Arc::new(FakeDocuments::default()),
            mappings: Arc::new(NameMappingStore::new(Arc::new(MemoryKeyValueStore::new()))),
            prompt: Arc::new(prompt),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn orchestrator(&self) -> NegotiationOrchestrator {
        NegotiationOrchestrator::new(Collaborators {
            workspace: self.workspace.clone(),
            documents: self.documents.clone(),
            checksums: Arc::new(MemoryChecksumCache::new()),
            mappings: self.mappings.clone(),
            prompt: self.prompt.clone(),
            notifier: self.notifier.clone(),
        })
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Create a container holding `files` (path, content).
    pub fn container(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let root = self.path(name);
        fs::create_dir_all(&root).unwrap();
        for (file, content) in files {
            let path = root.join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        root
    }

    /// Manifest of a container as it is on disk right now.
    pub fn manifest_of(&self, name: &str) -> FileManifest {
        build_local_manifest(&*self.workspace, &self.path(name), &NoChecksumCache).unwrap()
    }
}
