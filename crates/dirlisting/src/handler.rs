//! Request orchestration.
//!
//! [`dispatch`] decides what a request gets: nothing (declined), an immediate
//! response (cache hit, 503, 403), or a [`ListingTask`] that the host drives one
//! scan turn at a time until the listing is complete.
//!
//! Everything a task holds is released when it is dropped, finished or not: the
//! directory handle, buffered entries, any cache temp file, and its limiter slot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::body::{BodyChunk, ResponseBody};
use crate::cache::{self, CacheLookup, StatCache, StreamingCacheWriter};
use crate::config::DirListingConfig;
use crate::error::DirListingError;
use crate::limiter::{AdmissionPermit, ConcurrencyLimiter};
use crate::listing::{DirScanner, EntryFilter, EntryStore, ScanStep};
use crate::render::{self, MimeResolver, PageContext, RenderMode, StreamRenderer, html};
use crate::response::ResponseHead;
use crate::source::{DirectorySource, LocalDirectorySource};

/// Queued bytes above which a non-writable transport pauses scanning.
pub const BACKPRESSURE_LIMIT: usize = 64 * 1024 - 4 * 1024;

/// Seconds a client is asked to wait when all scan slots are taken.
const RETRY_AFTER_SECONDS: &str = "2";

/// Per-worker state shared by all listing requests of that worker.
#[derive(Clone)]
pub struct WorkerContext {
    pub limiter: Arc<ConcurrencyLimiter>,
    pub stat_cache: Arc<StatCache>,
    pub mime: Arc<MimeResolver>,
    pub source: Arc<dyn DirectorySource>,
    pub server_tag: String,
    /// Where large bodies spill to
    pub spill_dir: PathBuf,
}

impl WorkerContext {
    pub fn new(max_connections: usize) -> Self {
        Self {
            limiter: Arc::new(ConcurrencyLimiter::for_max_connections(max_connections)),
            stat_cache: Arc::new(StatCache::default()),
            mime: Arc::new(MimeResolver::default()),
            source: Arc::new(LocalDirectorySource),
            server_tag: format!("dirlisting/{}", env!("CARGO_PKG_VERSION")),
            spill_dir: std::env::temp_dir(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn DirectorySource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_stat_cache(mut self, stat_cache: StatCache) -> Self {
        self.stat_cache = Arc::new(stat_cache);
        self
    }

    pub fn with_mime(mut self, mime: MimeResolver) -> Self {
        self.mime = Arc::new(mime);
        self
    }

    pub fn with_server_tag(mut self, server_tag: impl Into<String>) -> Self {
        self.server_tag = server_tag.into();
        self
    }

    pub fn with_spill_dir(mut self, spill_dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = spill_dir.into();
        self
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("limiter", &self.limiter)
            .field("server_tag", &self.server_tag)
            .field("spill_dir", &self.spill_dir)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Head,
    Other,
}

impl RequestMethod {
    pub fn from_name(name: &str) -> Self {
        match name {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            _ => Self::Other,
        }
    }
}

/// The parts of a request the listing handler looks at.
#[derive(Debug, Clone)]
pub struct ListingRequest {
    pub method: RequestMethod,
    /// Decoded URL path
    pub uri_path: String,
    pub query: Option<String>,
    /// Directory on disk the path maps to
    pub physical_path: PathBuf,
}

/// A complete response. The host drops the body for HEAD requests.
#[derive(Debug)]
pub struct ListingResponse {
    pub head: ResponseHead,
    pub body: ResponseBody,
}

#[derive(Debug)]
pub enum Dispatch {
    /// Not a listing request; the host handles it some other way.
    Declined,
    Respond(ListingResponse),
    Scan(ListingTask),
}

/// How the transport frames bytes handed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Bytes go out as handed over
    #[default]
    Identity,
    /// The transport queue carries chunk framing inline, so it cannot be mirrored
    Chunked,
}

/// What the transport reports before each scan turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportState {
    pub queued_bytes: usize,
    pub writable: bool,
    pub framing: Framing,
    /// The client is gone
    pub closed: bool,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            queued_bytes: 0,
            writable: true,
            framing: Framing::Identity,
            closed: false,
        }
    }
}

impl TransportState {
    pub fn is_congested(&self) -> bool {
        self.queued_bytes > BACKPRESSURE_LIMIT && !self.writable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStep {
    /// The transport is backed up; try again once it drains.
    Deferred,
    MoreWork,
    Finished,
}

/// Routes one request. `now` is the current Unix time in seconds.
pub fn dispatch(ctx: &WorkerContext, config: &Arc<DirListingConfig>, req: &ListingRequest, now: i64) -> Dispatch {
    if req.method == RequestMethod::Other || !req.uri_path.ends_with('/') || !config.activate {
        return Dispatch::Declined;
    }

    let json = req.query.as_deref() == Some("json");
    let auto_layout = config.auto_layout && !json;
    let mode = RenderMode::select(json, config.sort);

    if let Some(cache_config) = &config.cache
        && let CacheLookup::Fresh(cached) =
            cache::lookup(cache_config, &ctx.stat_cache, &req.physical_path, mode, now)
    {
        log::debug!("Serving listing of {} from {}", req.uri_path, cached.path.display());
        let mut head = ResponseHead::new(200);
        head.set("Content-Type", mode.content_type(config));
        head.set_if_absent("Cache-Control", format!("max-age={}", cached.max_age));
        if let Some(etag) = cached.etag {
            head.set("ETag", etag);
        }
        add_preload_links(&mut head, config, mode, auto_layout);
        let mut body = ResponseBody::new(&ctx.spill_dir);
        body.append_file(cached.file, 0, cached.len);
        return Dispatch::Respond(ListingResponse { head, body });
    }

    let Some(permit) = ctx.limiter.try_admit() else {
        log::debug!(
            "Too many listings in progress ({}), asking client to retry {}",
            ctx.limiter.max_in_progress(),
            req.uri_path
        );
        let mut head = ResponseHead::new(503);
        head.set("Retry-After", RETRY_AFTER_SECONDS);
        return Dispatch::Respond(ListingResponse {
            head,
            body: ResponseBody::new(&ctx.spill_dir),
        });
    };

    let filter = EntryFilter::from_config(config);
    let mut scanner = DirScanner::new(Arc::clone(&ctx.source), req.physical_path.clone(), filter);
    if let Err(source) = scanner.open() {
        let err = DirListingError::OpenDirectory {
            path: req.physical_path.clone(),
            source,
        };
        log::error!("Listing {} failed: {}", req.uri_path, err);
        return Dispatch::Respond(ListingResponse {
            head: ResponseHead::new(err.status()),
            body: ResponseBody::new(&ctx.spill_dir),
        });
    }

    log::debug!("Listing {} ({:?})", req.physical_path.display(), mode);
    let page = PageContext {
        uri_path: req.uri_path.clone(),
        physical_dir: req.physical_path.clone(),
        config: Arc::clone(config),
        auto_layout,
        server_tag: ctx.server_tag.clone(),
    };
    Dispatch::Scan(ListingTask::start(ctx, page, mode, scanner, permit))
}

fn add_preload_links(head: &mut ResponseHead, config: &DirListingConfig, mode: RenderMode, auto_layout: bool) {
    if mode.is_json() {
        return;
    }
    for link in html::preload_links(config, auto_layout) {
        head.append("Link", link);
    }
}

enum Output {
    Buffered(EntryStore),
    Streamed(StreamRenderer),
}

/// One listing in progress.
pub struct ListingTask {
    page: PageContext,
    mode: RenderMode,
    scanner: DirScanner,
    output: Output,
    head: ResponseHead,
    body: ResponseBody,
    cache_entry: Option<PathBuf>,
    cache_stream: Option<StreamingCacheWriter>,
    stat_cache: Arc<StatCache>,
    mime: Arc<MimeResolver>,
    permit: Option<AdmissionPermit>,
    head_sent: bool,
    finished: bool,
    started: Instant,
}

impl ListingTask {
    fn start(
        ctx: &WorkerContext,
        page: PageContext,
        mode: RenderMode,
        scanner: DirScanner,
        permit: AdmissionPermit,
    ) -> Self {
        let mut head = ResponseHead::new(200);
        head.set("Content-Type", mode.content_type(&page.config));
        add_preload_links(&mut head, &page.config, mode, page.auto_layout);

        let cache_entry = page
            .config
            .cache
            .as_ref()
            .map(|cache_config| cache::cache_entry_path(cache_config, &page.physical_dir, mode));

        let output = if mode.is_streaming() {
            Output::Streamed(StreamRenderer::new(mode, page.physical_dir.clone(), Arc::clone(&ctx.mime)))
        } else {
            Output::Buffered(EntryStore::new())
        };

        let mut task = Self {
            page,
            mode,
            scanner,
            output,
            head,
            body: ResponseBody::new(&ctx.spill_dir),
            cache_entry,
            cache_stream: None,
            stat_cache: Arc::clone(&ctx.stat_cache),
            mime: Arc::clone(&ctx.mime),
            permit: Some(permit),
            head_sent: false,
            finished: false,
            started: Instant::now(),
        };

        if mode.is_streaming() {
            task.open_cache_stream();
            let mut opening = ResponseBody::new(task.body.spill_dir());
            if mode.is_json() {
                opening.append_mem(b"[");
            } else {
                html::render_header(&mut opening, &task.page);
            }
            task.emit(opening);
        }
        task
    }

    fn open_cache_stream(&mut self) {
        let Some(entry) = &self.cache_entry else {
            return;
        };
        match StreamingCacheWriter::create(entry) {
            Ok(writer) => self.cache_stream = Some(writer),
            Err(err) => log::warn!("Not caching listing of {}: {}", self.page.uri_path, err),
        }
    }

    /// Runs one scan turn. Returns [`TaskStep::Finished`] once the whole body is queued.
    pub fn advance(&mut self, transport: &TransportState) -> Result<TaskStep, DirListingError> {
        if self.finished {
            return Ok(TaskStep::Finished);
        }
        if transport.closed {
            return Err(DirListingError::Transport(format!(
                "client went away while listing {}",
                self.page.uri_path
            )));
        }
        if transport.is_congested() {
            return Ok(TaskStep::Deferred);
        }
        if transport.framing == Framing::Chunked && self.cache_stream.take().is_some() {
            log::debug!("Chunked transfer for {}, not caching this listing", self.page.uri_path);
        }

        let step = match &mut self.output {
            Output::Buffered(store) => self.scanner.advance(store),
            Output::Streamed(renderer) => self.scanner.advance(renderer),
        };
        if let Output::Streamed(renderer) = &mut self.output {
            let blocks = renderer.take_ready();
            for block in blocks {
                self.emit_block(block);
            }
        }

        match step {
            ScanStep::MoreWork => Ok(TaskStep::MoreWork),
            ScanStep::Finished => {
                self.finalize();
                Ok(TaskStep::Finished)
            }
        }
    }

    fn finalize(&mut self) {
        match &mut self.output {
            Output::Buffered(store) => {
                store.sort();
                render::render_buffered(&mut self.body, &self.page, store, &self.mime);
                self.publish_buffered();
            }
            Output::Streamed(renderer) => {
                renderer.finish();
                let blocks = renderer.take_ready();
                for block in blocks {
                    self.emit_block(block);
                }
                let mut closing = ResponseBody::new(self.body.spill_dir());
                if self.mode.is_json() {
                    closing.append_mem(b"]");
                } else {
                    html::render_footer(&mut closing, &self.page);
                }
                self.emit(closing);
                self.publish_stream();
            }
        }

        self.finished = true;
        self.permit = None;
        log::debug!(
            "Listed {} entries of {} in {}ms",
            self.scanner.accepted(),
            self.page.physical_dir.display(),
            self.started.elapsed().as_millis()
        );
    }

    fn publish_buffered(&mut self) {
        let (Some(entry), Some(cache_config)) = (&self.cache_entry, &self.page.config.cache) else {
            return;
        };
        match cache::publish_whole(entry, &self.body, &self.stat_cache) {
            Ok(etag) => {
                if let Some(etag) = etag {
                    self.head.set("ETag", etag);
                }
                self.head
                    .set_if_absent("Cache-Control", format!("max-age={}", cache_config.max_age));
            }
            Err(err) => log::warn!("Caching listing of {} failed: {}", self.page.uri_path, err),
        }
    }

    fn publish_stream(&mut self) {
        let (Some(writer), Some(entry), Some(cache_config)) =
            (self.cache_stream.take(), &self.cache_entry, &self.page.config.cache)
        else {
            return;
        };
        match writer.publish(&self.stat_cache) {
            // Headers already on the wire stay as they were
            Ok(_) if self.head_sent => {}
            Ok(etag) => {
                if let Some(etag) = etag {
                    self.head.set("ETag", etag);
                }
                self.head
                    .set_if_absent("Cache-Control", format!("max-age={}", cache_config.max_age));
            }
            Err(err) => log::warn!("Caching listing into {} failed: {}", entry.display(), err),
        }
    }

    /// Queues a rendered block, mirroring it to the cache temp file.
    fn emit_block(&mut self, block: Vec<u8>) {
        self.mirror(&block);
        self.body.append_vec(block);
    }

    /// Queues every chunk of `part`, mirroring each to the cache temp file.
    fn emit(&mut self, mut part: ResponseBody) {
        for chunk in part.drain() {
            if self.cache_stream.is_some() {
                match chunk.read_to_vec() {
                    Ok(bytes) => self.mirror(&bytes),
                    Err(err) => {
                        log::warn!("Not caching listing of {}: {}", self.page.uri_path, err);
                        self.cache_stream = None;
                    }
                }
            }
            self.body.push_chunk(chunk);
        }
    }

    fn mirror(&mut self, bytes: &[u8]) {
        let Some(writer) = &mut self.cache_stream else {
            return;
        };
        if let Err(err) = writer.mirror(bytes) {
            log::warn!("Not caching listing of {}: {}", self.page.uri_path, err);
            self.cache_stream = None;
        }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// Records that the head went out; later header changes are not sent.
    pub fn mark_head_sent(&mut self) {
        self.head_sent = true;
    }

    /// Takes the body chunks queued so far, for streamed delivery.
    pub fn drain_output(&mut self) -> Vec<BodyChunk> {
        self.body.drain()
    }

    /// Takes the finished response. The task is left empty.
    pub fn take_response(&mut self) -> ListingResponse {
        let spill_dir = self.body.spill_dir().to_path_buf();
        ListingResponse {
            head: std::mem::replace(&mut self.head, ResponseHead::new(200)),
            body: std::mem::replace(&mut self.body, ResponseBody::new(spill_dir)),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.mode.is_streaming()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn scan_turns(&self) -> usize {
        self.scanner.turns()
    }
}

impl Drop for ListingTask {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!(
                "Listing of {} aborted after {} scan turns",
                self.page.uri_path,
                self.scanner.turns()
            );
        }
    }
}

impl std::fmt::Debug for ListingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingTask")
            .field("uri_path", &self.page.uri_path)
            .field("mode", &self.mode)
            .field("scanner", &self.scanner)
            .field("finished", &self.finished)
            .finish()
    }
}
