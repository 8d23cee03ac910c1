//! JSON listing: an array of `{"name","type","size","mtime"}` objects.

use crate::listing::DirEntry;
use crate::render::escape::json_escape_into;

pub const CONTENT_TYPE: &str = "application/json";

/// Appends one entry object, preceded by a comma unless it is the first.
pub fn entry_object(out: &mut Vec<u8>, entry: &DirEntry, first: bool) {
    if !first {
        out.push(b',');
    }
    out.extend_from_slice(b"{\"name\":\"");
    json_escape_into(out, entry.name_bytes());
    out.extend_from_slice(b"\",\"type\":\"");
    out.extend_from_slice(if entry.is_dir { "dir" } else { "file" }.as_bytes());
    out.extend_from_slice(format!("\",\"size\":{},\"mtime\":{}}}", entry.size, entry.mtime).as_bytes());
}
