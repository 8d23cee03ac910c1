//! Local POSIX file system source.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use super::{DirectoryHandle, DirectorySource, EntryMetadata};

/// Reads directories from the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDirectorySource;

impl DirectorySource for LocalDirectorySource {
    fn open(&self, path: &Path) -> io::Result<Box<dyn DirectoryHandle>> {
        let entries = fs::read_dir(path)?;
        Ok(Box::new(LocalDirectoryHandle {
            path: path.to_path_buf(),
            entries,
        }))
    }
}

struct LocalDirectoryHandle {
    path: PathBuf,
    entries: fs::ReadDir,
}

impl DirectoryHandle for LocalDirectoryHandle {
    fn next_name(&mut self) -> Option<io::Result<OsString>> {
        self.entries.next().map(|entry| entry.map(|e| e.file_name()))
    }

    fn metadata(&self, name: &OsStr) -> io::Result<EntryMetadata> {
        // fs::metadata follows symlinks, so a link to a directory lists as a directory
        let meta = fs::metadata(self.path.join(name))?;
        Ok(EntryMetadata {
            size: meta.size() as i64,
            mtime: meta.mtime(),
            is_dir: meta.is_dir(),
        })
    }
}
