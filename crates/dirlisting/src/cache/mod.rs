//! On-disk listing cache.
//!
//! A rendered listing is stored at `<cache root>/<physical dir>/dirlist.html` (or
//! `dirlist.json`) and served from there while `mtime + max_age` is in the future.
//! Entries are written under a temp name in the same directory and renamed into
//! place, so readers never see a partial file. Cache failures never affect the live
//! response; they only mean the next request scans again.

mod lookup;
mod stat_cache;
mod writer;

pub use lookup::{CacheLookup, CachedListing, cache_entry_path, lookup};
pub use stat_cache::{EtagFlags, OpenedEntry, StatCache};
pub use writer::{CacheWriteError, StreamingCacheWriter, ensure_cache_dir, publish_whole};

#[cfg(test)]
mod cache_test;
