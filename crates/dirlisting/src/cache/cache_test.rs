//! Tests for the listing cache read and write paths.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use filetime::FileTime;

use super::{CacheLookup, EtagFlags, StatCache, StreamingCacheWriter, cache_entry_path, lookup, publish_whole};
use crate::body::ResponseBody;
use crate::config::CacheConfig;
use crate::render::RenderMode;

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

fn cache_config(root: &Path, max_age: i64) -> CacheConfig {
    CacheConfig {
        path: root.to_path_buf(),
        max_age,
    }
}

fn body_with(dir: &Path, text: &str) -> ResponseBody {
    let mut body = ResponseBody::new(dir);
    body.append_mem(text.as_bytes());
    body
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn set_mtime(path: &Path, mtime: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
}

#[test]
fn test_entry_path_mirrors_physical_dir() {
    let cache = cache_config(Path::new("/var/cache/lists"), 15);
    assert_eq!(
        cache_entry_path(&cache, Path::new("/srv/www/pub/"), RenderMode::BufferedHtml),
        Path::new("/var/cache/lists/srv/www/pub/dirlist.html")
    );
    assert_eq!(
        cache_entry_path(&cache, Path::new("/srv/www/pub"), RenderMode::StreamedJson),
        Path::new("/var/cache/lists/srv/www/pub/dirlist.json")
    );
    assert_eq!(
        cache_entry_path(&cache, Path::new("/srv/../etc"), RenderMode::BufferedHtml),
        Path::new("/var/cache/lists/srv/etc/dirlist.html")
    );
}

#[test]
fn test_publish_then_lookup_hits() {
    let root = tempfile::tempdir().unwrap();
    let cache = cache_config(root.path(), 60);
    let stat = StatCache::new(EtagFlags::default());
    let entry = cache_entry_path(&cache, Path::new("/data/music"), RenderMode::BufferedHtml);

    let etag = publish_whole(&entry, &body_with(root.path(), "<html>cached</html>"), &stat).unwrap();
    assert!(etag.is_some());
    assert_eq!(fs::read_to_string(&entry).unwrap(), "<html>cached</html>");
    assert_eq!(dir_entries(entry.parent().unwrap()), vec!["dirlist.html"]);

    match lookup(&cache, &stat, Path::new("/data/music"), RenderMode::BufferedHtml, now()) {
        CacheLookup::Fresh(listing) => {
            assert_eq!(listing.len, 19);
            assert!(listing.max_age > 0 && listing.max_age <= 60);
            assert_eq!(listing.etag, etag);
        }
        CacheLookup::Miss => panic!("expected a fresh entry"),
    }
    // JSON requests use their own entry
    assert!(matches!(
        lookup(&cache, &stat, Path::new("/data/music"), RenderMode::StreamedJson, now()),
        CacheLookup::Miss
    ));
}

#[test]
fn test_cache_dir_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempfile::tempdir().unwrap();
    let cache = cache_config(root.path(), 60);
    let entry = cache_entry_path(&cache, Path::new("/a/b"), RenderMode::BufferedHtml);
    publish_whole(&entry, &body_with(root.path(), "x"), &StatCache::default()).unwrap();

    let mode = fs::metadata(root.path().join("a")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
}

#[test]
fn test_freshness_boundary() {
    let root = tempfile::tempdir().unwrap();
    let cache = cache_config(root.path(), 30);
    let stat = StatCache::default();
    let entry = cache_entry_path(&cache, Path::new("/d"), RenderMode::BufferedHtml);
    publish_whole(&entry, &body_with(root.path(), "x"), &stat).unwrap();

    let mtime = 1_700_000_000;
    set_mtime(&entry, mtime);

    match lookup(&cache, &stat, Path::new("/d"), RenderMode::BufferedHtml, mtime + 29) {
        CacheLookup::Fresh(listing) => assert_eq!(listing.max_age, 1),
        CacheLookup::Miss => panic!("one second left should hit"),
    }
    assert!(matches!(
        lookup(&cache, &stat, Path::new("/d"), RenderMode::BufferedHtml, mtime + 30),
        CacheLookup::Miss
    ));
    assert!(matches!(
        lookup(&cache, &stat, Path::new("/d"), RenderMode::BufferedHtml, mtime + 3600),
        CacheLookup::Miss
    ));
}

#[test]
fn test_missing_entry_is_miss() {
    let root = tempfile::tempdir().unwrap();
    let cache = cache_config(root.path(), 30);
    assert!(matches!(
        lookup(&cache, &StatCache::default(), Path::new("/nothing"), RenderMode::BufferedHtml, now()),
        CacheLookup::Miss
    ));
}

#[test]
fn test_failed_publish_leaves_no_files() {
    let root = tempfile::tempdir().unwrap();
    let cache = cache_config(root.path(), 30);
    let entry = cache_entry_path(&cache, Path::new("/d"), RenderMode::BufferedHtml);
    // A directory squatting on the final name makes the rename fail
    fs::create_dir_all(entry.join("occupied")).unwrap();

    let result = publish_whole(&entry, &body_with(root.path(), "x"), &StatCache::default());
    assert!(result.is_err());
    assert!(entry.is_dir());
    assert_eq!(dir_entries(entry.parent().unwrap()), vec!["dirlist.html"]);
}

#[test]
fn test_failed_body_write_leaves_no_files() {
    let root = tempfile::tempdir().unwrap();
    let cache = cache_config(root.path(), 30);
    let entry = cache_entry_path(&cache, Path::new("/d"), RenderMode::BufferedHtml);

    let short = root.path().join("short.txt");
    fs::write(&short, b"abc").unwrap();
    let mut body = body_with(root.path(), "<head>");
    // Claims more bytes than the file holds
    body.append_file(Arc::new(fs::File::open(&short).unwrap()), 0, 100);

    assert!(publish_whole(&entry, &body, &StatCache::default()).is_err());
    assert!(!entry.exists());
    assert!(dir_entries(entry.parent().unwrap()).is_empty());
}

#[test]
fn test_huge_max_age_saturates() {
    let root = tempfile::tempdir().unwrap();
    let cache = cache_config(root.path(), i64::MAX);
    let stat = StatCache::default();
    let entry = cache_entry_path(&cache, Path::new("/d"), RenderMode::BufferedHtml);
    publish_whole(&entry, &body_with(root.path(), "x"), &stat).unwrap();

    match lookup(&cache, &stat, Path::new("/d"), RenderMode::BufferedHtml, now()) {
        CacheLookup::Fresh(listing) => assert!(listing.max_age > 0),
        CacheLookup::Miss => panic!("entry within its lifetime should hit"),
    }
}

#[test]
fn test_republish_replaces_entry_atomically() {
    let root = tempfile::tempdir().unwrap();
    let cache = cache_config(root.path(), 30);
    let stat = StatCache::default();
    let entry = cache_entry_path(&cache, Path::new("/d"), RenderMode::BufferedHtml);

    publish_whole(&entry, &body_with(root.path(), "first"), &stat).unwrap();
    let first = stat.open_entry(&entry).unwrap().etag;
    publish_whole(&entry, &body_with(root.path(), "second!"), &stat).unwrap();
    assert!(!stat.is_memoised(&entry));
    assert_eq!(fs::read_to_string(&entry).unwrap(), "second!");
    assert_ne!(stat.open_entry(&entry).unwrap().etag, first);
}

#[test]
fn test_streaming_writer_publishes_mirrored_blocks() {
    let root = tempfile::tempdir().unwrap();
    let cache = cache_config(root.path(), 30);
    let stat = StatCache::default();
    let entry = cache_entry_path(&cache, Path::new("/s"), RenderMode::StreamedJson);

    let mut writer = StreamingCacheWriter::create(&entry).unwrap();
    let temp_name = writer.temp_path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(temp_name.starts_with("dirlist.json."));
    assert_eq!(temp_name.len(), "dirlist.json.".len() + 6);
    assert!(!entry.exists());

    writer.mirror(b"[").unwrap();
    writer.mirror(b"]").unwrap();
    assert_eq!(writer.written(), 2);
    writer.publish(&stat).unwrap();

    assert_eq!(fs::read_to_string(&entry).unwrap(), "[]");
    assert_eq!(dir_entries(entry.parent().unwrap()), vec!["dirlist.json"]);
}

#[test]
fn test_dropped_streaming_writer_removes_temp_file() {
    let root = tempfile::tempdir().unwrap();
    let cache = cache_config(root.path(), 30);
    let entry = cache_entry_path(&cache, Path::new("/s"), RenderMode::StreamedHtml);

    let mut writer = StreamingCacheWriter::create(&entry).unwrap();
    writer.mirror(b"<html>partial").unwrap();
    drop(writer);

    assert!(dir_entries(entry.parent().unwrap()).is_empty());
}
