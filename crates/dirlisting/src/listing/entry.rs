//! Accepted directory entries and the store they collect in.

use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;

use crate::listing::sorting::{comb_sort, compare_names};

/// Spare slots added whenever an entry list runs out of capacity.
const GROWTH_BLOCK: usize = 16;

/// One listed entry. The name is kept as raw bytes from the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    /// Modification time, seconds since the Unix epoch
    pub mtime: i64,
    pub size: i64,
    pub is_dir: bool,
}

impl DirEntry {
    pub fn name_bytes(&self) -> &[u8] {
        self.name.as_bytes()
    }
}

/// Receives entries as the scanner accepts them.
pub trait EntrySink {
    fn accept(&mut self, entry: DirEntry);
}

/// Entries collected for a sorted listing, directories and files kept apart.
#[derive(Debug, Default)]
pub struct EntryStore {
    directories: Vec<DirEntry>,
    files: Vec<DirEntry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: DirEntry) {
        let list = if entry.is_dir { &mut self.directories } else { &mut self.files };
        if list.len() == list.capacity() {
            list.reserve_exact(GROWTH_BLOCK);
        }
        list.push(entry);
    }

    /// Orders both lists by name, byte-wise.
    pub fn sort(&mut self) {
        comb_sort(&mut self.directories, |a, b| compare_names(a.name_bytes(), b.name_bytes()));
        comb_sort(&mut self.files, |a, b| compare_names(a.name_bytes(), b.name_bytes()));
    }

    pub fn directories(&self) -> &[DirEntry] {
        &self.directories
    }

    pub fn files(&self) -> &[DirEntry] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.directories.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntrySink for EntryStore {
    fn accept(&mut self, entry: DirEntry) {
        self.push(entry);
    }
}
