//! Content checksums with a best-effort cache.
//!
//! A cache entry is only valid for the exact (path, mtime, size) it was
//! computed for; anything else is a miss and costs a recomputation.

use super::walker::FileInfo;
use dashmap::DashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Identifies one version of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

impl CacheKey {
    pub fn from_file_info(info: &FileInfo) -> Self {
        Self {
            path: info.path.clone(),
            modified: info.modified,
            size: info.size,
        }
    }

    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            modified: metadata.modified()?,
            size: metadata.len(),
        })
    }
}

/// Content-addressed checksum cache collaborator.
pub trait ChecksumCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<u64>;
    fn put(&self, key: CacheKey, checksum: u64);
}

/// Process-local cache holding the latest checksum per path.
#[derive(Debug, Default)]
pub struct MemoryChecksumCache {
    entries: DashMap<PathBuf, (SystemTime, u64, u64)>,
}

impl MemoryChecksumCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ChecksumCache for MemoryChecksumCache {
    fn get(&self, key: &CacheKey) -> Option<u64> {
        self.entries.get(&key.path).and_then(|entry| {
            let (modified, size, checksum) = *entry;
            (modified == key.modified && size == key.size).then_some(checksum)
        })
    }

    fn put(&self, key: CacheKey, checksum: u64) {
        self.entries.insert(key.path, (key.modified, key.size, checksum));
    }
}

/// Cache that never hits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChecksumCache;

impl ChecksumCache for NoChecksumCache {
    fn get(&self, _key: &CacheKey) -> Option<u64> {
        None
    }

    fn put(&self, _key: CacheKey, _checksum: u64) {}
}

/// Compute the checksum of a file: the first 8 bytes of its BLAKE3 digest, little-endian.
pub fn compute_checksum(path: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(digest_to_u64(hasher.finalize()))
}

/// Checksum of an in-memory buffer, using the same derivation as [`compute_checksum`].
pub fn checksum_bytes(data: &[u8]) -> u64 {
    digest_to_u64(blake3::hash(data))
}

/// Look the file up in the cache, computing and storing the checksum on a miss.
pub fn cached_checksum(cache: &dyn ChecksumCache, info: &FileInfo) -> io::Result<u64> {
    let key = CacheKey::from_file_info(info);
    if let Some(checksum) = cache.get(&key) {
        return Ok(checksum);
    }

    let checksum = compute_checksum(&info.path)?;
    cache.put(key, checksum);
    Ok(checksum)
}

fn digest_to_u64(hash: blake3::Hash) -> u64 {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}
