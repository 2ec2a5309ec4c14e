//! File manifests and the structural diff between a local and a remote one.
//!
//! A manifest lists every path below a resource root with its checksum.
//! Directory paths end in `/`, file paths never do; two manifests are only
//! comparable when both follow that convention.

pub mod diff;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use diff::{build_local_manifest, compute_diff};

/// Metadata for a single path in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub is_directory: bool,
    /// Directories never carry a checksum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u64>,
}

impl ManifestEntry {
    pub fn file(path: &str, checksum: u64) -> Self {
        Self {
            path: normalize_path(path, false),
            is_directory: false,
            checksum: Some(checksum),
        }
    }

    /// A file whose checksum is not known.
    pub fn unchecked_file(path: &str) -> Self {
        Self {
            path: normalize_path(path, false),
            is_directory: false,
            checksum: None,
        }
    }

    pub fn directory(path: &str) -> Self {
        Self {
            path: normalize_path(path, true),
            is_directory: true,
            checksum: None,
        }
    }

    fn normalized(self) -> Self {
        if self.is_directory {
            Self::directory(&self.path)
        } else {
            Self {
                path: normalize_path(&self.path, false),
                ..self
            }
        }
    }
}

/// Ordered set of manifest entries, unique by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ManifestEntry>", into = "Vec<ManifestEntry>")]
pub struct FileManifest {
    entries: Vec<ManifestEntry>,
}

impl FileManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous entry for the same path.
    pub fn insert(&mut self, entry: ManifestEntry) {
        let entry = entry.normalized();
        match self.entries.binary_search_by(|e| e.path.as_str().cmp(&entry.path)) {
            Ok(idx) => self.entries[idx] = entry,
            Err(idx) => self.entries.insert(idx, entry),
        }
    }

    pub fn with(mut self, entry: ManifestEntry) -> Self {
        self.insert(entry);
        self
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_directory).count()
    }

    /// True if any entry lies strictly below directory path `dir` (ending in `/`).
    fn has_descendants(&self, dir: &str) -> bool {
        let start = self.entries.partition_point(|e| e.path.as_str() <= dir);
        self.entries
            .get(start)
            .map_or(false, |e| e.path.starts_with(dir))
    }

    /// Look up the counterpart of `entry` regardless of its kind on this side.
    fn counterpart(&self, entry: &ManifestEntry) -> Option<&ManifestEntry> {
        let bare = entry.path.trim_end_matches('/');
        self.get(bare).or_else(|| self.get(&format!("{}/", bare)))
    }
}

impl From<Vec<ManifestEntry>> for FileManifest {
    fn from(entries: Vec<ManifestEntry>) -> Self {
        let mut manifest = FileManifest::new();
        for entry in entries {
            manifest.insert(entry);
        }
        manifest
    }
}

impl From<FileManifest> for Vec<ManifestEntry> {
    fn from(manifest: FileManifest) -> Self {
        manifest.entries
    }
}

/// What a sync would destroy or overwrite locally.
///
/// Paths present remotely but absent locally are additions and are never
/// reported here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDiff {
    pub altered_files: BTreeSet<String>,
    pub removed_files: BTreeSet<String>,
    pub removed_folders: BTreeSet<String>,
}

impl ManifestDiff {
    /// Compare a local manifest against the remote one.
    pub fn between(local: &FileManifest, remote: &FileManifest) -> Self {
        let mut diff = ManifestDiff::default();

        for entry in local.entries() {
            match remote.counterpart(entry) {
                // Remote manifests may list files without their parent directories
                None if entry.is_directory && remote.has_descendants(&entry.path) => {}
                None => diff.record_removed(entry),
                Some(other) if other.is_directory != entry.is_directory => diff.record_removed(entry),
                Some(_) if entry.is_directory => {}
                Some(other) => {
                    let same = matches!((entry.checksum, other.checksum), (Some(a), Some(b)) if a == b);
                    if !same {
                        diff.altered_files.insert(entry.path.clone());
                    }
                }
            }
        }

        diff
    }

    fn record_removed(&mut self, entry: &ManifestEntry) {
        if entry.is_directory {
            self.removed_folders.insert(entry.path.clone());
        } else {
            self.removed_files.insert(entry.path.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.altered_files.is_empty() && self.removed_files.is_empty() && self.removed_folders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.altered_files.len() + self.removed_files.len() + self.removed_folders.len()
    }
}

fn normalize_path(path: &str, is_directory: bool) -> String {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    if is_directory {
        format!("{}/", trimmed)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_altered_file_detected() {
        let local = FileManifest::new()
            .with(ManifestEntry::file("a.txt", 1))
            .with(ManifestEntry::file("b.txt", 2));
        let remote = FileManifest::new()
            .with(ManifestEntry::file("a.txt", 1))
            .with(ManifestEntry::file("b.txt", 3));

        let diff = ManifestDiff::between(&local, &remote);
        assert_eq!(diff.altered_files, set(&["b.txt"]));
        assert!(diff.removed_files.is_empty());
        assert!(diff.removed_folders.is_empty());
    }

    #[test]
    fn test_removed_folder_detected() {
        let local = FileManifest::new()
            .with(ManifestEntry::file("a.txt", 1))
            .with(ManifestEntry::directory("old"));
        let remote = FileManifest::new().with(ManifestEntry::file("a.txt", 1));

        let diff = ManifestDiff::between(&local, &remote);
        assert_eq!(diff.removed_folders, set(&["old/"]));
        assert!(diff.altered_files.is_empty());
        assert!(diff.removed_files.is_empty());
    }

    #[test]
    fn test_folder_implied_by_remote_files_is_kept() {
        let local = FileManifest::new()
            .with(ManifestEntry::directory("src"))
            .with(ManifestEntry::directory("src/nested"))
            .with(ManifestEntry::file("src/a.rs", 1))
            .with(ManifestEntry::file("src/nested/b.rs", 2));
        let remote = FileManifest::new()
            .with(ManifestEntry::file("src/a.rs", 1))
            .with(ManifestEntry::file("src/nested/b.rs", 2));

        let diff = ManifestDiff::between(&local, &remote);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_sibling_with_shared_prefix_does_not_keep_folder() {
        let local = FileManifest::new().with(ManifestEntry::directory("src"));
        let remote = FileManifest::new().with(ManifestEntry::file("src2/a.rs", 1));

        let diff = ManifestDiff::between(&local, &remote);
        assert_eq!(diff.removed_folders, set(&["src/"]));
    }

    #[test]
    fn test_identical_manifests_yield_empty_diff() {
        let manifest = FileManifest::new()
            .with(ManifestEntry::directory("src"))
            .with(ManifestEntry::file("src/lib.rs", 9));

        let diff = ManifestDiff::between(&manifest, &manifest.clone());
        assert!(diff.is_empty());
        assert_eq!(diff.len(), 0);
    }

    #[test]
    fn test_remote_additions_are_not_reported() {
        let local = FileManifest::new();
        let remote = FileManifest::new()
            .with(ManifestEntry::directory("new"))
            .with(ManifestEntry::file("new/file.txt", 5));

        assert!(ManifestDiff::between(&local, &remote).is_empty());
    }

    #[test]
    fn test_missing_checksum_counts_as_altered() {
        let local = FileManifest::new().with(ManifestEntry::file("a.txt", 1));
        let remote = FileManifest::new().with(ManifestEntry::unchecked_file("a.txt"));

        let diff = ManifestDiff::between(&local, &remote);
        assert_eq!(diff.altered_files, set(&["a.txt"]));
    }

    #[test]
    fn test_kind_mismatch_reported_as_removal() {
        let local = FileManifest::new()
            .with(ManifestEntry::file("docs", 1))
            .with(ManifestEntry::directory("build"));
        let remote = FileManifest::new()
            .with(ManifestEntry::directory("docs"))
            .with(ManifestEntry::file("build", 2));

        let diff = ManifestDiff::between(&local, &remote);
        assert_eq!(diff.removed_files, set(&["docs"]));
        assert_eq!(diff.removed_folders, set(&["build/"]));
    }

    #[test]
    fn test_manifest_is_ordered_and_unique() {
        let manifest = FileManifest::new()
            .with(ManifestEntry::file("b.txt", 1))
            .with(ManifestEntry::file("a.txt", 1))
            .with(ManifestEntry::file("b.txt", 2));

        let paths: Vec<&str> = manifest.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
        assert_eq!(manifest.get("b.txt").unwrap().checksum, Some(2));
    }

    #[test]
    fn test_manifest_json_normalizes_paths() {
        let json = r#"[
            {"path": "z/", "is_directory": true},
            {"path": "/a.txt", "is_directory": false, "checksum": 3},
            {"path": "lib", "is_directory": true}
        ]"#;
        let manifest: FileManifest = serde_json::from_str(json).unwrap();

        let paths: Vec<&str> = manifest.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "lib/", "z/"]);
        assert_eq!(manifest.file_count(), 1);
    }
}
