//! File opening with memoised ETags.

use std::collections::HashMap;
use std::fs::{File, Metadata};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;

use crate::ignore_poison::IgnorePoison;

/// Which metadata fields feed the ETag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EtagFlags {
    pub enabled: bool,
    pub inode: bool,
    pub size: bool,
    pub mtime: bool,
}

impl Default for EtagFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            inode: true,
            size: true,
            mtime: true,
        }
    }
}

impl EtagFlags {
    /// Builds the quoted ETag for a file, or `None` when ETags are off or no field is used.
    pub fn etag_for(&self, metadata: &Metadata) -> Option<String> {
        self.etag_from_parts(metadata.ino(), metadata.size(), metadata.mtime())
    }

    fn etag_from_parts(&self, ino: u64, size: u64, mtime: i64) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let mut parts = Vec::with_capacity(3);
        if self.inode {
            parts.push(format!("{:x}", ino));
        }
        if self.size {
            parts.push(format!("{:x}", size));
        }
        if self.mtime {
            parts.push(format!("{:x}", mtime));
        }
        if parts.is_empty() {
            return None;
        }
        Some(format!("\"{}\"", parts.join("-")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileIdentity {
    ino: u64,
    size: u64,
    mtime: i64,
}

impl From<&Metadata> for FileIdentity {
    fn from(metadata: &Metadata) -> Self {
        Self {
            ino: metadata.ino(),
            size: metadata.size(),
            mtime: metadata.mtime(),
        }
    }
}

/// An opened file with its metadata and ETag.
#[derive(Debug)]
pub struct OpenedEntry {
    pub file: File,
    pub metadata: Metadata,
    pub etag: Option<String>,
}

/// Opens files and remembers their ETags per path.
///
/// A memoised ETag is reused only while the file keeps the same inode, size, and
/// mtime; [`invalidate`](Self::invalidate) drops it explicitly after a rename.
#[derive(Debug)]
pub struct StatCache {
    flags: EtagFlags,
    memo: Mutex<HashMap<PathBuf, (FileIdentity, Option<String>)>>,
    capacity: usize,
}

/// Paths remembered before the memo starts over.
pub const STAT_MEMO_CAPACITY: usize = 4096;

impl Default for StatCache {
    fn default() -> Self {
        Self::new(EtagFlags::default())
    }
}

impl StatCache {
    pub fn new(flags: EtagFlags) -> Self {
        Self::with_capacity(flags, STAT_MEMO_CAPACITY)
    }

    pub fn with_capacity(flags: EtagFlags, capacity: usize) -> Self {
        Self {
            flags,
            memo: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn flags(&self) -> EtagFlags {
        self.flags
    }

    /// Opens a regular file for reading.
    pub fn open_entry(&self, path: &Path) -> io::Result<OpenedEntry> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
        }
        let etag = self.etag(path, &metadata);
        Ok(OpenedEntry { file, metadata, etag })
    }

    /// Returns the ETag for `path` given its current metadata.
    pub fn etag(&self, path: &Path, metadata: &Metadata) -> Option<String> {
        let identity = FileIdentity::from(metadata);
        let mut memo = self.memo.lock_ignore_poison();
        if let Some((known, etag)) = memo.get(path)
            && *known == identity
        {
            return etag.clone();
        }
        let etag = self.flags.etag_for(metadata);
        if memo.len() >= self.capacity && !memo.contains_key(path) {
            log::debug!("Stat memo reached {} paths, clearing", memo.len());
            memo.clear();
        }
        memo.insert(path.to_path_buf(), (identity, etag.clone()));
        etag
    }

    /// Forgets anything remembered about `path`.
    pub fn invalidate(&self, path: &Path) {
        self.memo.lock_ignore_poison().remove(path);
    }

    pub fn is_memoised(&self, path: &Path) -> bool {
        self.memo.lock_ignore_poison().contains_key(path)
    }

    pub fn memoised_len(&self) -> usize {
        self.memo.lock_ignore_poison().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_fields_follow_flags() {
        let all = EtagFlags::default();
        assert_eq!(all.etag_from_parts(0x10, 0x20, 0x30), Some("\"10-20-30\"".to_string()));

        let size_only = EtagFlags {
            inode: false,
            mtime: false,
            ..EtagFlags::default()
        };
        assert_eq!(size_only.etag_from_parts(1, 255, 3), Some("\"ff\"".to_string()));

        let disabled = EtagFlags {
            enabled: false,
            ..EtagFlags::default()
        };
        assert_eq!(disabled.etag_from_parts(1, 2, 3), None);

        let nothing = EtagFlags {
            enabled: true,
            inode: false,
            size: false,
            mtime: false,
        };
        assert_eq!(nothing.etag_from_parts(1, 2, 3), None);
    }

    #[test]
    fn test_open_entry_memoises_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"one").unwrap();

        let cache = StatCache::new(EtagFlags::default());
        let first = cache.open_entry(&path).unwrap();
        assert!(first.etag.is_some());
        assert!(cache.is_memoised(&path));

        cache.invalidate(&path);
        assert!(!cache.is_memoised(&path));
    }

    #[test]
    fn test_changed_file_gets_new_etag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"one").unwrap();
        let cache = StatCache::new(EtagFlags::default());
        let before = cache.open_entry(&path).unwrap().etag;

        std::fs::write(&path, b"longer content").unwrap();
        let after = cache.open_entry(&path).unwrap().etag;
        assert_ne!(before, after);
    }

    #[test]
    fn test_memo_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StatCache::with_capacity(EtagFlags::default(), 2);
        let paths: Vec<_> = (0..3).map(|i| dir.path().join(format!("f{}", i))).collect();
        for path in &paths {
            std::fs::write(path, b"x").unwrap();
            cache.open_entry(path).unwrap();
            assert!(cache.memoised_len() <= 2);
        }
        assert!(cache.is_memoised(&paths[2]));
        assert!(!cache.is_memoised(&paths[0]));

        // Re-reading a remembered path does not evict anything
        cache.open_entry(&paths[2]).unwrap();
        assert!(cache.is_memoised(&paths[2]));
    }

    #[test]
    fn test_open_entry_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StatCache::default();
        assert!(cache.open_entry(dir.path()).is_err());
    }
}
