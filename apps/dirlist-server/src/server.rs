//! HTTP front end: static files plus directory listings.

use std::io;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio_util::io::ReaderStream;
use dirlisting::{
    BodyChunk, Dispatch, DirListingConfig, ListingRequest, ListingResponse, ListingTask, RequestMethod, ResponseBody, TaskStep,
    TransportState, WorkerContext, dispatch,
};

use crate::config::ServerConfig;

/// Shared state for request handlers.
pub struct AppState {
    pub ctx: WorkerContext,
    pub listing: Arc<DirListingConfig>,
    pub docroot: PathBuf,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().fallback(serve_path).with_state(state)
}

/// Binds the listener and serves until the process is stopped.
pub async fn run(config: ServerConfig, state: Arc<AppState>) -> io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Serving {} on http://{}", state.docroot.display(), addr);
    axum::serve(listener, router(state)).await
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Maps a decoded URL path onto the document root. Returns `None` for paths that
/// try to climb out of it.
fn resolve_path(docroot: &Path, decoded: &str) -> Option<PathBuf> {
    let mut physical = docroot.to_path_buf();
    for component in Path::new(decoded).components() {
        match component {
            Component::Normal(part) => physical.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(physical)
}

fn status_only(status: StatusCode) -> Response {
    status.into_response()
}

async fn serve_path(State(state): State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    let decoded = match urlencoding::decode(uri.path()) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => return status_only(StatusCode::BAD_REQUEST),
    };
    let Some(physical) = resolve_path(&state.docroot, &decoded) else {
        return status_only(StatusCode::FORBIDDEN);
    };
    let metadata = match tokio::fs::metadata(&physical).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return status_only(StatusCode::NOT_FOUND),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => return status_only(StatusCode::FORBIDDEN),
        Err(err) => {
            log::warn!("Cannot stat {}: {}", physical.display(), err);
            return status_only(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if !metadata.is_dir() {
        return serve_file(&state, &method, &physical).await;
    }
    if !decoded.ends_with('/') {
        let location = match uri.query() {
            Some(query) => format!("{}/?{}", uri.path(), query),
            None => format!("{}/", uri.path()),
        };
        return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
    }
    let index = physical.join("index.html");
    if tokio::fs::metadata(&index).await.is_ok_and(|m| m.is_file()) {
        return serve_file(&state, &method, &index).await;
    }

    let request = ListingRequest {
        method: RequestMethod::from_name(method.as_str()),
        uri_path: decoded,
        query: uri.query().map(str::to_string),
        physical_path: physical,
    };
    let is_head = request.method == RequestMethod::Head;
    match dispatch(&state.ctx, &state.listing, &request, unix_now()) {
        Dispatch::Declined => status_only(StatusCode::FORBIDDEN),
        Dispatch::Respond(response) => finished_response(response, is_head).await,
        Dispatch::Scan(task) if task.is_streaming() => streamed_response(task, is_head),
        Dispatch::Scan(task) => buffered_response(task, is_head).await,
    }
}

async fn serve_file(state: &AppState, method: &Method, path: &Path) -> Response {
    let content_type = match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) => state.ctx.mime.content_type(dir, name),
        _ => dirlisting::render::mime::DEFAULT_CONTENT_TYPE.to_string(),
    };
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            log::debug!("Cannot read {}: {}", path.display(), err);
            return status_only(StatusCode::FORBIDDEN);
        }
    };
    let len = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(err) => {
            log::debug!("Cannot stat {}: {}", path.display(), err);
            return status_only(StatusCode::FORBIDDEN);
        }
    };
    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(file))
    };
    (
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_LENGTH, len.to_string())],
        body,
    )
        .into_response()
}

/// Builds the status line and headers of a listing response.
fn response_builder(head: &dirlisting::ResponseHead) -> axum::http::response::Builder {
    let mut builder = Response::builder().status(head.status);
    for (name, value) in head.headers() {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => log::warn!("Dropping invalid header {}: {}", name, value),
        }
    }
    builder
}

fn build(builder: axum::http::response::Builder, body: Body) -> Response {
    builder
        .body(body)
        .unwrap_or_else(|_| status_only(StatusCode::INTERNAL_SERVER_ERROR))
}

/// Reads a finished body off the async threads.
async fn collect_body(body: ResponseBody) -> io::Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || body.to_vec())
        .await
        .map_err(io::Error::other)?
}

async fn finished_response(response: ListingResponse, is_head: bool) -> Response {
    let builder = response_builder(&response.head);
    if is_head {
        return build(builder, Body::empty());
    }
    match collect_body(response.body).await {
        Ok(bytes) => build(builder, Body::from(bytes)),
        Err(err) => {
            log::warn!("Reading listing body failed: {}", err);
            status_only(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Runs a sorted listing to completion, yielding to other requests between turns.
async fn buffered_response(mut task: ListingTask, is_head: bool) -> Response {
    let transport = TransportState::default();
    loop {
        match task.advance(&transport) {
            Ok(TaskStep::Finished) => break,
            Ok(TaskStep::MoreWork | TaskStep::Deferred) => tokio::task::yield_now().await,
            Err(err) => {
                log::warn!("Listing failed: {}", err);
                return status_only(StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
            }
        }
    }
    finished_response(task.take_response(), is_head).await
}

fn join_chunks(chunks: &[BodyChunk]) -> io::Result<Vec<u8>> {
    let mut block = Vec::new();
    for chunk in chunks {
        match chunk {
            BodyChunk::Memory(bytes) => block.extend_from_slice(bytes),
            BodyChunk::File { .. } => block.extend(chunk.read_to_vec()?),
        }
    }
    Ok(block)
}

/// Joins queued chunks. File-backed chunks are read on the blocking pool.
async fn read_chunks(chunks: Vec<BodyChunk>) -> io::Result<Vec<u8>> {
    if chunks.iter().all(|chunk| matches!(chunk, BodyChunk::Memory(_))) {
        return join_chunks(&chunks);
    }
    tokio::task::spawn_blocking(move || join_chunks(&chunks))
        .await
        .map_err(io::Error::other)?
}

/// Sends the head at once and the listing as it is produced. The body stream owns
/// the task, so a client disconnect drops it and tears the scan down.
fn streamed_response(mut task: ListingTask, is_head: bool) -> Response {
    let builder = response_builder(task.head());
    task.mark_head_sent();
    if is_head {
        return build(builder, Body::empty());
    }

    let stream = futures_util::stream::unfold(Some(task), |state| async move {
        let mut task = state?;
        let transport = TransportState::default();
        loop {
            let step = match task.advance(&transport) {
                Ok(step) => step,
                Err(err) => return Some((Err(io::Error::other(err.to_string())), None)),
            };
            let block = match read_chunks(task.drain_output()).await {
                Ok(block) => block,
                Err(err) => return Some((Err(err), None)),
            };
            let finished = step == TaskStep::Finished;
            if !block.is_empty() || finished {
                let next = if finished { None } else { Some(task) };
                return Some((Ok::<Bytes, io::Error>(Bytes::from(block)), next));
            }
            tokio::task::yield_now().await;
        }
    });
    build(builder, Body::from_stream(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path_stays_under_docroot() {
        let root = Path::new("/srv/www");
        assert_eq!(resolve_path(root, "/"), Some(PathBuf::from("/srv/www")));
        assert_eq!(resolve_path(root, "/pub/a b/"), Some(PathBuf::from("/srv/www/pub/a b")));
        assert_eq!(resolve_path(root, "/pub/../../etc/"), None);
    }

    #[test]
    fn test_response_builder_copies_headers() {
        let mut head = dirlisting::ResponseHead::new(503);
        head.set("Retry-After", "2");
        let response = build(response_builder(&head), Body::empty());
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get("retry-after").unwrap(), "2");
    }

    #[tokio::test]
    async fn test_listing_redirect_and_missing() {
        use axum::body::to_bytes;

        let docroot = tempfile::tempdir().unwrap();
        std::fs::create_dir(docroot.path().join("pub")).unwrap();
        std::fs::write(docroot.path().join("pub/readme.txt"), b"hello").unwrap();

        let state = Arc::new(AppState {
            ctx: WorkerContext::new(1024).with_spill_dir(docroot.path()),
            listing: Arc::new(DirListingConfig {
                activate: true,
                ..Default::default()
            }),
            docroot: docroot.path().to_path_buf(),
        });

        let get = |uri: &'static str| serve_path(State(state.clone()), Method::GET, Uri::from_static(uri));

        let redirect = get("/pub").await;
        assert_eq!(redirect.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(redirect.headers().get("location").unwrap(), "/pub/");

        let listing = get("/pub/").await;
        assert_eq!(listing.status(), StatusCode::OK);
        let html = to_bytes(listing.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(html.to_vec()).unwrap();
        assert!(html.contains("href=\"readme.txt\""));

        let json = get("/pub/?json").await;
        assert_eq!(json.headers().get("content-type").unwrap(), "application/json");
        let body = to_bytes(json.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed[0]["name"], "readme.txt");

        assert_eq!(get("/absent/").await.status(), StatusCode::NOT_FOUND);

        let file = get("/pub/readme.txt").await;
        assert_eq!(file.status(), StatusCode::OK);
        assert_eq!(file.headers().get("content-length").unwrap(), "5");
        assert_eq!(&to_bytes(file.into_body(), usize::MAX).await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_chunks_joins_spilled_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = ResponseBody::new(dir.path());
        body.append_mem(b"<head>");
        body.append_to_spill(b"rows");
        body.append_mem(b"</tail>");
        let chunks = body.drain();
        assert!(chunks.iter().any(|c| matches!(c, BodyChunk::File { .. })));
        assert_eq!(read_chunks(chunks).await.unwrap(), b"<head>rows</tail>");
    }
}
