//! Open-document collaborator: editors that may hold files the sync replaces.

use crate::utils::errors::Result;
use std::path::{Path, PathBuf};

/// Reference to an open document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpenDocument {
    pub path: PathBuf,
}

impl OpenDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

pub trait DocumentRegistry: Send + Sync {
    /// Open documents whose file lies below `prefix`.
    fn documents_under(&self, prefix: &Path) -> Vec<OpenDocument>;

    fn is_dirty(&self, document: &OpenDocument) -> bool;

    fn close(&self, document: &OpenDocument) -> Result<()>;

    fn reopen(&self, document: &OpenDocument) -> Result<()>;
}

/// Registry for headless hosts with no editors.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpenDocuments;

impl DocumentRegistry for NoOpenDocuments {
    fn documents_under(&self, _prefix: &Path) -> Vec<OpenDocument> {
        Vec::new()
    }

    fn is_dirty(&self, _document: &OpenDocument) -> bool {
        false
    }

    fn close(&self, _document: &OpenDocument) -> Result<()> {
        Ok(())
    }

    fn reopen(&self, _document: &OpenDocument) -> Result<()> {
        Ok(())
    }
}
