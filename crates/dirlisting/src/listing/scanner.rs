//! Cooperative directory scanner.
//!
//! Each call to [`DirScanner::advance`] reads at most [`SCAN_BATCH`] raw names, so a
//! directory with a million entries is listed over many scheduler turns instead of
//! blocking the worker. Names go through the [`EntryFilter`], survivors get their
//! metadata looked up, and the resulting [`DirEntry`] is handed to an [`EntrySink`].

use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::listing::entry::{DirEntry, EntrySink};
use crate::listing::filter::EntryFilter;
use crate::source::{DirectoryHandle, DirectorySource};

/// Raw names read per scheduler turn.
pub const SCAN_BATCH: usize = 32;

/// Outcome of one scan turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// The batch was exhausted; call again on a later turn.
    MoreWork,
    /// End of directory reached and the handle closed.
    Finished,
}

enum ScanState {
    Unopened,
    Scanning {
        handle: Box<dyn DirectoryHandle>,
        name_max: usize,
    },
    Drained,
}

/// Scans one directory in bounded batches.
pub struct DirScanner {
    source: Arc<dyn DirectorySource>,
    path: PathBuf,
    filter: EntryFilter,
    state: ScanState,
    turns: usize,
    accepted: usize,
}

impl DirScanner {
    pub fn new(source: Arc<dyn DirectorySource>, path: impl Into<PathBuf>, filter: EntryFilter) -> Self {
        Self {
            source,
            path: path.into(),
            filter,
            state: ScanState::Unopened,
            turns: 0,
            accepted: 0,
        }
    }

    /// Opens the directory. Failure here means the listing cannot be produced at all.
    pub fn open(&mut self) -> std::io::Result<()> {
        let handle = self.source.open(&self.path)?;
        let name_max = name_max_for(&self.path);
        self.state = ScanState::Scanning { handle, name_max };
        Ok(())
    }

    /// Reads up to one batch of names and pushes accepted entries into `sink`.
    ///
    /// A read error ends the scan as if the directory were exhausted. An entry whose
    /// metadata cannot be read (typically deleted mid-scan) is skipped.
    pub fn advance(&mut self, sink: &mut dyn EntrySink) -> ScanStep {
        let ScanState::Scanning { handle, name_max } = &mut self.state else {
            return ScanStep::Finished;
        };
        self.turns += 1;

        for _ in 0..SCAN_BATCH {
            let name = match handle.next_name() {
                Some(Ok(name)) => name,
                Some(Err(err)) => {
                    log::warn!("Reading {} failed, listing what was read: {}", self.path.display(), err);
                    self.state = ScanState::Drained;
                    return ScanStep::Finished;
                }
                None => {
                    self.state = ScanState::Drained;
                    return ScanStep::Finished;
                }
            };
            if self.filter.check(name.as_bytes(), *name_max).is_some() {
                continue;
            }
            let metadata = match handle.metadata(&name) {
                Ok(metadata) => metadata,
                Err(err) => {
                    log::trace!(
                        "Skipping {:?} in {}: {}",
                        name,
                        self.path.display(),
                        err
                    );
                    continue;
                }
            };
            self.accepted += 1;
            sink.accept(DirEntry {
                name,
                mtime: metadata.mtime,
                size: metadata.size,
                is_dir: metadata.is_dir,
            });
        }
        ScanStep::MoreWork
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ScanState::Scanning { .. })
    }

    /// Number of scan turns taken so far.
    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Number of entries handed to the sink so far.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Longest entry name that still yields a path within `PATH_MAX`.
fn name_max_for(dir: &Path) -> usize {
    (libc::PATH_MAX as usize).saturating_sub(dir.as_os_str().len() + 1)
}

impl std::fmt::Debug for DirScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirScanner")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("turns", &self.turns)
            .field("accepted", &self.accepted)
            .finish()
    }
}
