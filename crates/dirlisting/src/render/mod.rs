//! Listing renderer.
//!
//! Two strategies, chosen once per request by [`RenderMode::select`]:
//!
//! - **Buffered**: entries are collected, sorted, and rendered in one go once the scan
//!   finishes. Large listings are written through a spilling row buffer.
//! - **Streamed**: the document head goes out immediately and each entry is rendered
//!   as the scanner produces it. Output is handed to the transport in blocks of about
//!   15 KiB. Used for JSON and for unsorted HTML.

use std::path::PathBuf;
use std::sync::Arc;

use crate::body::{ResponseBody, RowBuffer};
use crate::config::DirListingConfig;
use crate::listing::{DirEntry, EntrySink, EntryStore};

pub mod escape;
pub mod html;
pub mod include;
pub mod json;
pub mod mime;
pub mod sizefmt;

pub use mime::MimeResolver;

/// Streamed output is handed over once this much is buffered.
pub const STREAM_FLUSH_THRESHOLD: usize = 16 * 1024 - 1024;

/// Buffered listings with more entries than this are rendered through the spill file.
pub const IN_MEMORY_ENTRY_LIMIT: usize = 256;

/// How a listing is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    BufferedHtml,
    StreamedHtml,
    StreamedJson,
}

impl RenderMode {
    pub fn select(json: bool, sort: bool) -> Self {
        if json {
            Self::StreamedJson
        } else if sort {
            Self::BufferedHtml
        } else {
            Self::StreamedHtml
        }
    }

    pub fn is_streaming(self) -> bool {
        !matches!(self, Self::BufferedHtml)
    }

    pub fn is_json(self) -> bool {
        matches!(self, Self::StreamedJson)
    }

    /// File name of the cache entry for this mode.
    pub fn cache_file_name(self) -> &'static str {
        if self.is_json() { "dirlist.json" } else { "dirlist.html" }
    }

    pub fn content_type(self, config: &DirListingConfig) -> String {
        if self.is_json() {
            json::CONTENT_TYPE.to_string()
        } else {
            html::content_type(config)
        }
    }
}

/// Everything the renderer needs to know about the page being produced.
#[derive(Debug, Clone)]
pub struct PageContext {
    /// Decoded request path, ending with `/`
    pub uri_path: String,
    /// Directory on disk being listed
    pub physical_dir: PathBuf,
    pub config: Arc<DirListingConfig>,
    pub auto_layout: bool,
    pub server_tag: String,
}

/// Renders a complete sorted listing into `body`.
pub fn render_buffered(body: &mut ResponseBody, page: &PageContext, store: &EntryStore, mime: &MimeResolver) {
    html::render_header(body, page);
    {
        let mut rows = if store.len() > IN_MEMORY_ENTRY_LIMIT {
            RowBuffer::spilling(body)
        } else {
            RowBuffer::in_memory(body)
        };
        let mut row = Vec::with_capacity(512);
        for entry in store.directories() {
            row.clear();
            html::directory_row(&mut row, entry);
            rows.write_row(&row);
        }
        for entry in store.files() {
            row.clear();
            let content_type = mime.content_type(&page.physical_dir, &entry.name);
            html::file_row(&mut row, entry, &content_type);
            rows.write_row(&row);
        }
    }
    html::render_footer(body, page);
}

/// Renders entries as they arrive, for the streamed modes.
///
/// The document opening is written by the caller; the renderer produces rows and
/// collects them in blocks for [`take_ready`](Self::take_ready).
pub struct StreamRenderer {
    json: bool,
    physical_dir: PathBuf,
    mime: Arc<MimeResolver>,
    pending: Vec<u8>,
    ready: Vec<Vec<u8>>,
    entries: usize,
}

impl StreamRenderer {
    pub fn new(mode: RenderMode, physical_dir: PathBuf, mime: Arc<MimeResolver>) -> Self {
        Self {
            json: mode.is_json(),
            physical_dir,
            mime,
            pending: Vec::with_capacity(STREAM_FLUSH_THRESHOLD + 1024),
            ready: Vec::new(),
            entries: 0,
        }
    }

    /// Returns the blocks completed since the last call.
    pub fn take_ready(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.ready)
    }

    /// Moves whatever is pending into the ready blocks.
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            let block = std::mem::take(&mut self.pending);
            self.ready.push(block);
        }
    }

    pub fn entries(&self) -> usize {
        self.entries
    }
}

impl EntrySink for StreamRenderer {
    fn accept(&mut self, entry: DirEntry) {
        if self.json {
            json::entry_object(&mut self.pending, &entry, self.entries == 0);
        } else if entry.is_dir {
            html::directory_row(&mut self.pending, &entry);
        } else {
            let content_type = self.mime.content_type(&self.physical_dir, &entry.name);
            html::file_row(&mut self.pending, &entry, &content_type);
        }
        self.entries += 1;
        if self.pending.len() >= STREAM_FLUSH_THRESHOLD {
            let block = std::mem::replace(&mut self.pending, Vec::with_capacity(STREAM_FLUSH_THRESHOLD + 1024));
            self.ready.push(block);
        }
    }
}
