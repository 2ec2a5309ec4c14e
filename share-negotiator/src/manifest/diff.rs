//! Local manifest construction and per-root diffing.

use super::{FileManifest, ManifestDiff, ManifestEntry};
use crate::fs::checksum::{cached_checksum, ChecksumCache};
use crate::model::Container;
use crate::utils::errors::{NegotiationError, Result};
use crate::workspace::Workspace;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Enumerate a container and assemble its manifest.
///
/// Checksums come from `cache` when the file's (path, mtime, size) is known,
/// otherwise they are computed and stored back.
pub fn build_local_manifest(
    workspace: &dyn Workspace,
    root: &Path,
    cache: &dyn ChecksumCache,
) -> io::Result<FileManifest> {
    let mut manifest = FileManifest::new();

    for info in workspace.enumerate(root)? {
        if info.is_dir {
            manifest.insert(ManifestEntry::directory(&info.relative_path));
        } else {
            let checksum = cached_checksum(cache, &info)?;
            debug!("Scanned {} ({} bytes, checksum {:016x})", info.relative_path, info.size, checksum);
            manifest.insert(ManifestEntry::file(&info.relative_path, checksum));
        }
    }

    Ok(manifest)
}

/// Diff a reused container against the remote manifest.
///
/// Any I/O failure while scanning is fatal: a diff is only ever produced from
/// a complete snapshot.
pub fn compute_diff(
    workspace: &dyn Workspace,
    container: &Container,
    remote: &FileManifest,
    cache: &dyn ChecksumCache,
) -> Result<ManifestDiff> {
    let local = build_local_manifest(workspace, &container.path, cache).map_err(|source| {
        NegotiationError::DiffComputation {
            root: container.name.clone(),
            source,
        }
    })?;

    let diff = ManifestDiff::between(&local, remote);

    info!(
        "Diffed container '{}': {} local files ({} entries), {} remote files ({} entries), {} altered, {} removed files, {} removed folders",
        container.name,
        local.file_count(),
        local.len(),
        remote.file_count(),
        remote.len(),
        diff.altered_files.len(),
        diff.removed_files.len(),
        diff.removed_folders.len()
    );

    Ok(diff)
}
