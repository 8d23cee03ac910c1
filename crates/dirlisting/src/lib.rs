//! Directory listing engine for HTTP servers.
//!
//! Produces HTML or JSON listings of a directory on behalf of a request whose path
//! resolves to a directory without an index file. Scanning is cooperative: each call
//! to [`ListingTask::advance`] reads a bounded batch of entries so the caller can
//! interleave many listings on one event loop. Rendered listings can be persisted to
//! an on-disk cache and served from there until they expire.
//!
//! The host server owns a [`WorkerContext`] per worker and calls [`dispatch`] for
//! every candidate request.

#![cfg(unix)]

pub mod body;
pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
mod ignore_poison;
pub mod limiter;
pub mod listing;
pub mod render;
pub mod response;
pub mod source;

pub use body::{BodyChunk, BoundedSink, ResponseBody};
pub use cache::{CacheLookup, EtagFlags, StatCache};
pub use config::{CacheConfig, DirListingConfig, ExcludePatterns};
pub use error::{ConfigError, DirListingError};
pub use handler::{
    Dispatch, Framing, ListingRequest, ListingResponse, ListingTask, RequestMethod, TaskStep, TransportState,
    WorkerContext, dispatch,
};
pub use limiter::{AdmissionPermit, ConcurrencyLimiter};
pub use listing::{DirEntry, DirScanner, EntryFilter, EntryStore, ScanStep};
pub use render::{MimeResolver, RenderMode};
pub use response::ResponseHead;
pub use source::{DirectoryHandle, DirectorySource, EntryMetadata, InMemorySource, LocalDirectorySource};
