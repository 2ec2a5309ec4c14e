//! Workspace collaborator: container lookup and creation, enumeration and
//! the automatic-build flag.

use crate::fs::walker::{walk_directory, FileInfo, WalkOptions};
use crate::utils::errors::{NegotiationError, Result};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// What currently occupies a container location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Missing,
    Directory,
    /// Something that is not a directory (file, special file).
    Other,
}

pub trait Workspace: Send + Sync {
    fn root(&self) -> &Path;

    /// Map a workspace-relative container name to its location on disk.
    /// Rejects names that would escape the workspace.
    fn locate(&self, name: &str) -> Result<PathBuf>;

    fn container_state(&self, path: &Path) -> io::Result<ContainerState>;

    fn create_container(&self, path: &Path) -> io::Result<()>;

    /// Every file and directory below `path`.
    fn enumerate(&self, path: &Path) -> io::Result<Vec<FileInfo>>;

    fn exists(&self, path: &Path) -> bool;

    fn is_auto_building(&self) -> io::Result<bool>;

    fn set_auto_building(&self, enabled: bool) -> io::Result<()>;
}

/// Workspace rooted at a directory on the local file system.
#[derive(Debug)]
pub struct LocalWorkspace {
    root: PathBuf,
    walk_options: WalkOptions,
    auto_build: AtomicBool,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            walk_options: WalkOptions::default(),
            auto_build: AtomicBool::new(true),
        }
    }

    pub fn with_walk_options(mut self, walk_options: WalkOptions) -> Self {
        self.walk_options = walk_options;
        self
    }

    pub fn with_auto_build(self, enabled: bool) -> Self {
        self.auto_build.store(enabled, Ordering::SeqCst);
        self
    }
}

impl Workspace for LocalWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, name: &str) -> Result<PathBuf> {
        validate_container_name(name)?;
        Ok(self.root.join(name))
    }

    fn container_state(&self, path: &Path) -> io::Result<ContainerState> {
        match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => Ok(ContainerState::Directory),
            Ok(_) => Ok(ContainerState::Other),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ContainerState::Missing),
            Err(e) => Err(e),
        }
    }

    fn create_container(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn enumerate(&self, path: &Path) -> io::Result<Vec<FileInfo>> {
        walk_directory(path, &self.walk_options)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_auto_building(&self) -> io::Result<bool> {
        Ok(self.auto_build.load(Ordering::SeqCst))
    }

    fn set_auto_building(&self, enabled: bool) -> io::Result<()> {
        self.auto_build.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

/// Container names are '/'-separated, relative, and free of `.`/`..` segments.
pub fn validate_container_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(NegotiationError::Validation("container name is empty".to_string()));
    }

    if name.chars().any(|c| c.is_control() || c == '\\') {
        return Err(NegotiationError::Validation(format!(
            "container name '{}' contains invalid characters",
            name
        )));
    }

    let path = Path::new(name);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(NegotiationError::Validation(format!(
                    "container name '{}' must be a plain relative path",
                    name
                )))
            }
        }
    }

    if name.split('/').any(|segment| segment.is_empty() || segment == ".") {
        return Err(NegotiationError::Validation(format!(
            "container name '{}' has an empty segment",
            name
        )));
    }

    Ok(())
}
