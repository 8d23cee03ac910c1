//! Header and readme documents included around the listing table.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::body::ResponseBody;
use crate::render::escape::html_escape_into;

/// Documents up to this size are encoded in memory; larger ones go to the spill file.
pub const INLINE_ENCODE_LIMIT: u64 = 32 * 1024;

/// Read size when encoding a large document.
const ENCODE_CHUNK: usize = 8 * 1024;

/// Which include a document is; names the `<pre>` class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Header,
    Readme,
}

impl IncludeKind {
    fn css_class(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Readme => "readme",
        }
    }
}

/// Resolves an include name. Relative names are taken from the listed directory.
pub fn resolve_document(physical_dir: &Path, name: &str) -> PathBuf {
    let name = Path::new(name);
    if name.is_absolute() { name.to_path_buf() } else { physical_dir.join(name) }
}

/// Appends a document to the body, HTML-encoded inside `<pre>` or as-is.
/// A missing, unreadable, or empty document adds nothing.
pub fn append_document(body: &mut ResponseBody, path: &Path, kind: IncludeKind, encode: bool) {
    let Ok(file) = File::open(path) else {
        return;
    };
    let len = match file.metadata() {
        Ok(meta) if meta.is_file() && meta.len() > 0 => meta.len(),
        _ => return,
    };

    if !encode {
        body.append_file(Arc::new(file), 0, len);
        return;
    }

    body.append_mem(format!("<pre class=\"{}\">", kind.css_class()).as_bytes());
    if let Err(err) = append_encoded(body, file, len) {
        log::warn!("Reading {} for the listing failed: {}", path.display(), err);
    }
    body.append_mem(b"</pre>");
}

fn append_encoded(body: &mut ResponseBody, mut file: File, len: u64) -> std::io::Result<()> {
    let mut buf = vec![0u8; ENCODE_CHUNK];
    let mut encoded = Vec::with_capacity(ENCODE_CHUNK);
    let spill = len > INLINE_ENCODE_LIMIT;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        html_escape_into(&mut encoded, &buf[..n]);
        if spill {
            body.append_to_spill(&encoded);
            encoded.clear();
        }
    }
    body.append_mem(&encoded);
    Ok(())
}
