//! Directory scanning - entry records, filtering, ordering, and the batch scanner.

pub mod entry;
pub mod filter;
pub mod scanner;
pub mod sorting;

pub use entry::{DirEntry, EntrySink, EntryStore};
pub use filter::{EntryFilter, Exclusion, MatchError, NameMatcher};
pub use scanner::{DirScanner, SCAN_BATCH, ScanStep};
pub use sorting::{comb_sort, compare_names};

#[cfg(test)]
mod sorting_test;
