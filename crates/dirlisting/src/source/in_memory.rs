//! In-memory directory source for testing.
//!
//! Directories are scripted up front: entries come back in insertion order, and any
//! entry can be made to fail its metadata lookup. The source counts opens and live
//! handles so tests can check that an aborted scan closed its directory.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{DirectoryHandle, DirectorySource, EntryMetadata};

/// One scripted directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    entries: Vec<(OsString, Option<EntryMetadata>)>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: impl Into<OsString>, size: i64, mtime: i64) -> Self {
        self.entries.push((name.into(), Some(EntryMetadata::file(size, mtime))));
        self
    }

    pub fn dir(mut self, name: impl Into<OsString>, mtime: i64) -> Self {
        self.entries.push((name.into(), Some(EntryMetadata::dir(mtime))));
        self
    }

    /// An entry whose metadata lookup fails, like a file deleted mid-scan.
    pub fn vanished(mut self, name: impl Into<OsString>) -> Self {
        self.entries.push((name.into(), None));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Serves scripted directories by path.
#[derive(Debug, Default)]
pub struct InMemorySource {
    directories: HashMap<PathBuf, Arc<InMemoryDirectory>>,
    opens: AtomicUsize,
    live_handles: Arc<AtomicUsize>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(mut self, path: impl Into<PathBuf>, directory: InMemoryDirectory) -> Self {
        self.directories.insert(path.into(), Arc::new(directory));
        self
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of handles opened and not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }
}

impl DirectorySource for InMemorySource {
    fn open(&self, path: &Path) -> io::Result<Box<dyn DirectoryHandle>> {
        let directory = self.directories.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("no scripted directory at {}", path.display()),
            )
        })?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.live_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryHandle {
            directory: Arc::clone(directory),
            position: 0,
            live_handles: Arc::clone(&self.live_handles),
        }))
    }
}

struct InMemoryHandle {
    directory: Arc<InMemoryDirectory>,
    position: usize,
    live_handles: Arc<AtomicUsize>,
}

impl DirectoryHandle for InMemoryHandle {
    fn next_name(&mut self) -> Option<io::Result<OsString>> {
        let (name, _) = self.directory.entries.get(self.position)?;
        self.position += 1;
        Some(Ok(name.clone()))
    }

    fn metadata(&self, name: &OsStr) -> io::Result<EntryMetadata> {
        self.directory
            .entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, meta)| *meta)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

impl Drop for InMemoryHandle {
    fn drop(&mut self) {
        self.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
