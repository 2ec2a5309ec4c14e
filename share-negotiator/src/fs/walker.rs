//! Directory traversal for building local manifests.
//!
//! Reports both files and directories below a container root, with
//! '/'-separated paths relative to that root.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,

    /// File or directory names to skip entirely (exact match)
    pub exclude_patterns: Vec<String>,
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root, '/'-separated
    pub relative_path: String,

    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Last modification time
    pub modified: SystemTime,

    /// Is this a directory?
    pub is_dir: bool,

    /// Entry depth from root
    pub depth: usize,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// Symlinks are resolved to their target; broken links and links to
    /// directories (when not following links) yield None.
    fn from_entry(entry: &DirEntry, root: &Path, follow_links: bool) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();

        let metadata = if entry.path_is_symlink() {
            match std::fs::metadata(&path) {
                // Symlink to directory without link following: skip it
                Ok(resolved) if resolved.is_dir() && !follow_links => return Ok(None),
                Ok(resolved) => resolved,
                // Broken symlink
                Err(_) => return Ok(None),
            }
        } else {
            entry.metadata()?
        };

        let relative_path = relative_slash_path(&path, root);
        let is_dir = metadata.is_dir();

        Ok(Some(Self {
            path,
            relative_path,
            size: if is_dir { 0 } else { metadata.len() },
            modified: metadata.modified()?,
            is_dir,
            depth: entry.depth(),
        }))
    }
}

/// Walk a directory tree and collect every file and directory below `root`.
///
/// The root itself is not reported. Any I/O error aborts the walk so callers
/// never see a partial listing.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut entries = Vec::new();
    walk_directory_with_callback(root, options, |info| entries.push(info.clone()))?;
    Ok(entries)
}

/// Walk a directory tree with a callback for each entry
pub fn walk_directory_with_callback<F>(
    root: &Path,
    options: &WalkOptions,
    mut callback: F,
) -> std::io::Result<()>
where
    F: FnMut(&FileInfo),
{
    let mut walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let walker = walker
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !should_exclude(entry, &options.exclude_patterns));

    for entry in walker {
        let entry = entry?;

        if entry.depth() == 0 {
            continue;
        }

        if let Some(info) = FileInfo::from_entry(&entry, root, options.follow_links)? {
            callback(&info);
        }
    }

    Ok(())
}

/// Count files (not directories) below a root
pub fn count_files(root: &Path, options: &WalkOptions) -> std::io::Result<usize> {
    let mut count = 0;

    walk_directory_with_callback(root, options, |info| {
        if !info.is_dir {
            count += 1;
        }
    })?;

    Ok(count)
}

/// Render `path` relative to `root` with '/' separators regardless of platform.
pub fn relative_slash_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a directory entry should be excluded based on patterns
fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    patterns.iter().any(|pattern| file_name == pattern.as_str())
}
