//! Cache read path.

use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::cache::stat_cache::StatCache;
use crate::config::CacheConfig;
use crate::render::RenderMode;

/// A fresh cache entry ready to be sent.
#[derive(Debug)]
pub struct CachedListing {
    pub path: PathBuf,
    pub file: Arc<File>,
    pub len: u64,
    /// Seconds until the entry expires, always positive
    pub max_age: i64,
    pub etag: Option<String>,
}

#[derive(Debug)]
pub enum CacheLookup {
    Fresh(CachedListing),
    Miss,
}

/// Where the cache entry for a directory lives: the physical directory path is
/// mirrored under the cache root. Only normal components are kept, so the entry
/// cannot land outside the root.
pub fn cache_entry_path(cache: &CacheConfig, physical_dir: &Path, mode: RenderMode) -> PathBuf {
    let mut path = cache.path.clone();
    for component in physical_dir.components() {
        if let Component::Normal(part) = component {
            path.push(part);
        }
    }
    path.push(mode.cache_file_name());
    path
}

/// Looks up a fresh cache entry. Any failure to open or stat the entry is a miss.
/// An entry whose remaining lifetime is zero or less is stale.
pub fn lookup(cache: &CacheConfig, stat: &StatCache, physical_dir: &Path, mode: RenderMode, now: i64) -> CacheLookup {
    let path = cache_entry_path(cache, physical_dir, mode);
    let opened = match stat.open_entry(&path) {
        Ok(opened) => opened,
        Err(err) => {
            log::trace!("Listing cache miss for {}: {}", path.display(), err);
            return CacheLookup::Miss;
        }
    };
    let max_age = opened.metadata.mtime().saturating_add(cache.max_age).saturating_sub(now);
    if max_age <= 0 {
        log::debug!("Listing cache entry {} expired {}s ago", path.display(), max_age.saturating_neg());
        return CacheLookup::Miss;
    }
    CacheLookup::Fresh(CachedListing {
        len: opened.metadata.len(),
        file: Arc::new(opened.file),
        max_age,
        etag: opened.etag,
        path,
    })
}
