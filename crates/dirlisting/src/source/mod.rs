//! Directory sources - where the scanner reads names and metadata from.
//!
//! `LocalDirectorySource` reads the real file system. `InMemorySource` serves
//! scripted directories for tests, including failing entries and open-handle tracking.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::Path;

mod in_memory;
mod local_posix;

pub use in_memory::{InMemoryDirectory, InMemorySource};
pub use local_posix::LocalDirectorySource;

/// Metadata of one entry, after following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub size: i64,
    /// Modification time, seconds since the Unix epoch
    pub mtime: i64,
    pub is_dir: bool,
}

impl EntryMetadata {
    pub fn file(size: i64, mtime: i64) -> Self {
        Self {
            size,
            mtime,
            is_dir: false,
        }
    }

    pub fn dir(mtime: i64) -> Self {
        Self {
            size: 0,
            mtime,
            is_dir: true,
        }
    }
}

/// Opens directories for scanning.
pub trait DirectorySource: Send + Sync {
    /// Opens a directory. Fails if the path is missing, unreadable, or not a directory.
    fn open(&self, path: &Path) -> io::Result<Box<dyn DirectoryHandle>>;
}

/// An open directory. The handle is closed when dropped.
pub trait DirectoryHandle: Send {
    /// Returns the next raw entry name, `None` at end of directory.
    /// May return `.` and `..`; the filter drops them.
    fn next_name(&mut self) -> Option<io::Result<OsString>>;

    /// Looks up metadata for an entry of this directory by name, following symlinks.
    fn metadata(&self, name: &OsStr) -> io::Result<EntryMetadata>;
}
