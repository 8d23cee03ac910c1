//! Cache write path: atomic publish of a finished body, or a temp file fed while
//! the listing streams.

use std::fs::DirBuilder;
use std::io::{self, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::body::ResponseBody;
use crate::cache::stat_cache::StatCache;

/// Error writing a cache entry. Never reaches the client.
#[derive(Debug)]
pub enum CacheWriteError {
    CreateDir { path: PathBuf, source: io::Error },
    TempFile { dir: PathBuf, source: io::Error },
    Write(io::Error),
    Persist { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for CacheWriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDir { path, source } => write!(f, "creating {} failed: {}", path.display(), source),
            Self::TempFile { dir, source } => write!(f, "creating temp file in {} failed: {}", dir.display(), source),
            Self::Write(err) => write!(f, "writing cache entry failed: {}", err),
            Self::Persist { path, source } => write!(f, "renaming into {} failed: {}", path.display(), source),
        }
    }
}

impl std::error::Error for CacheWriteError {}

impl From<io::Error> for CacheWriteError {
    fn from(err: io::Error) -> Self {
        Self::Write(err)
    }
}

/// Creates the cache directory and any missing parents with mode 0700.
/// An existing directory is fine.
pub fn ensure_cache_dir(dir: &Path) -> io::Result<()> {
    DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

fn create_temp(entry_path: &Path) -> Result<NamedTempFile, CacheWriteError> {
    let dir = entry_path.parent().unwrap_or(Path::new("."));
    ensure_cache_dir(dir).map_err(|source| CacheWriteError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let prefix = format!(
        "{}.",
        entry_path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    );
    tempfile::Builder::new()
        .prefix(&prefix)
        .rand_bytes(6)
        .tempfile_in(dir)
        .map_err(|source| CacheWriteError::TempFile {
            dir: dir.to_path_buf(),
            source,
        })
}

/// Renames a fully written temp file over `entry_path`. Returns the ETag of the
/// published file. On failure the temp file is removed.
fn persist(temp: NamedTempFile, entry_path: &Path, stat: &StatCache) -> Result<Option<String>, CacheWriteError> {
    let metadata = temp.as_file().metadata()?;
    let etag = stat.flags().etag_for(&metadata);
    temp.persist(entry_path).map_err(|err| CacheWriteError::Persist {
        path: entry_path.to_path_buf(),
        source: err.error,
    })?;
    stat.invalidate(entry_path);
    Ok(etag)
}

/// Writes a complete body to a temp file next to `entry_path` and renames it into
/// place. Returns the ETag of the published entry.
pub fn publish_whole(entry_path: &Path, body: &ResponseBody, stat: &StatCache) -> Result<Option<String>, CacheWriteError> {
    let mut temp = create_temp(entry_path)?;
    body.write_to(&mut temp)?;
    temp.flush()?;
    persist(temp, entry_path, stat)
}

/// Temp file mirroring a streamed listing. Dropping it without
/// [`publish`](Self::publish) deletes the temp file.
#[derive(Debug)]
pub struct StreamingCacheWriter {
    temp: NamedTempFile,
    entry_path: PathBuf,
    written: u64,
}

impl StreamingCacheWriter {
    pub fn create(entry_path: &Path) -> Result<Self, CacheWriteError> {
        Ok(Self {
            temp: create_temp(entry_path)?,
            entry_path: entry_path.to_path_buf(),
            written: 0,
        })
    }

    /// Appends a block that was sent to the client.
    pub fn mirror(&mut self, bytes: &[u8]) -> Result<(), CacheWriteError> {
        self.temp.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Renames the complete temp file into place.
    pub fn publish(mut self, stat: &StatCache) -> Result<Option<String>, CacheWriteError> {
        self.temp.flush()?;
        persist(self.temp, &self.entry_path, stat)
    }
}
