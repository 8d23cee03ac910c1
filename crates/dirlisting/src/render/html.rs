//! HTML document: header, rows, footer.

use chrono::{Local, TimeZone};

use crate::body::ResponseBody;
use crate::config::DirListingConfig;
use crate::listing::DirEntry;
use crate::render::PageContext;
use crate::render::escape::{html_escape_into, url_escape_into};
use crate::render::include::{IncludeKind, append_document, resolve_document};
use crate::render::sizefmt::format_size;

const INLINE_STYLE: &str = include_str!("assets/inline_style.html");
const TABLE_RESORT_JS: &str = include_str!("assets/table_resort.js");
const INIT_SORT_JS: &str = include_str!("assets/init_sort.js");

const TABLE_HEAD: &str = "<div class=\"list\">\n\
<table summary=\"Directory Listing\" cellpadding=\"0\" cellspacing=\"0\">\n\
<thead><tr><th class=\"n\">Name</th><th class=\"m\">Last Modified</th><th class=\"s\">Size</th><th class=\"t\">Type</th></tr></thead>\n\
<tbody>\n";

const PARENT_ROW: &str = "<tr class=\"d\"><td class=\"n\"><a href=\"../\">..</a>/</td>\
<td class=\"m\" data-value=\"-1\">&nbsp;</td><td class=\"s\" data-value=\"-1\">- &nbsp;</td>\
<td class=\"t\">Directory</td></tr>\n";

/// Formats an mtime in local time, like `2024-Mar-05 14:03:09`.
pub fn format_mtime(mtime: i64) -> String {
    Local
        .timestamp_opt(mtime, 0)
        .single()
        .map(|t| t.format("%Y-%b-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// `Content-Type` of an HTML listing.
pub fn content_type(config: &DirListingConfig) -> String {
    match &config.encoding {
        Some(charset) => format!("text/html;charset={}", charset),
        None => "text/html".to_string(),
    }
}

/// `Link` preload header values for the external stylesheet and script.
pub fn preload_links(config: &DirListingConfig, auto_layout: bool) -> Vec<String> {
    if !auto_layout {
        return Vec::new();
    }
    let mut links = Vec::new();
    if let Some(css) = &config.external_css {
        links.push(format!("<{}>; rel=\"preload\"; as=\"style\"", css));
    }
    if let Some(js) = &config.external_js {
        links.push(format!("<{}>; rel=\"preload\"; as=\"script\"", js));
    }
    links
}

/// Appends everything up to and including the parent row.
pub fn render_header(body: &mut ResponseBody, page: &PageContext) {
    let config = &page.config;
    let mut out = Vec::with_capacity(2048);

    if page.auto_layout {
        out.extend_from_slice(b"<!DOCTYPE html>\n<html>\n<head>\n");
        if let Some(charset) = &config.encoding {
            out.extend_from_slice(format!("<meta charset=\"{}\">\n", charset).as_bytes());
        }
        out.extend_from_slice(b"<title>Index of ");
        html_escape_into(&mut out, page.uri_path.as_bytes());
        out.extend_from_slice(b"</title>\n");
        match &config.external_css {
            Some(css) => {
                out.extend_from_slice(
                    b"<meta name=\"viewport\" content=\"initial-scale=1\">\
<link rel=\"stylesheet\" type=\"text/css\" href=\"",
                );
                out.extend_from_slice(css.as_bytes());
                out.extend_from_slice(b"\">\n");
            }
            None => out.extend_from_slice(INLINE_STYLE.as_bytes()),
        }
        out.extend_from_slice(b"</head>\n<body>\n");
    }
    body.append_vec(out);

    if let Some(name) = config.header_name() {
        let path = resolve_document(&page.physical_dir, name);
        append_document(body, &path, IncludeKind::Header, config.encode_header);
    }

    let mut out = Vec::with_capacity(TABLE_HEAD.len() + PARENT_ROW.len() + 64);
    out.extend_from_slice(b"<h2>Index of ");
    html_escape_into(&mut out, page.uri_path.as_bytes());
    out.extend_from_slice(b"</h2>\n");
    out.extend_from_slice(TABLE_HEAD.as_bytes());
    if page.uri_path != "/" {
        out.extend_from_slice(PARENT_ROW.as_bytes());
    }
    body.append_vec(out);
}

/// Appends the table end, the readme document, and the page footer.
pub fn render_footer(body: &mut ResponseBody, page: &PageContext) {
    let config = &page.config;
    body.append_mem(b"</tbody>\n</table>\n</div>\n");

    if let Some(name) = config.readme_name() {
        let path = resolve_document(&page.physical_dir, name);
        append_document(body, &path, IncludeKind::Readme, config.encode_readme);
    }

    if !page.auto_layout {
        return;
    }
    let mut out = Vec::with_capacity(INLINE_STYLE.len() + TABLE_RESORT_JS.len() + INIT_SORT_JS.len());
    // Verbatim markup
    let footer = config.set_footer.as_deref().unwrap_or(&page.server_tag);
    if !footer.is_empty() {
        out.extend_from_slice(b"<div class=\"foot\">");
        out.extend_from_slice(footer.as_bytes());
        out.extend_from_slice(b"</div>\n");
    }
    match &config.external_js {
        Some(js) => {
            out.extend_from_slice(b"<script type=\"text/javascript\" src=\"");
            out.extend_from_slice(js.as_bytes());
            out.extend_from_slice(b"\"></script>\n");
        }
        None => {
            out.extend_from_slice(b"\n<script type=\"text/javascript\">\n// <!--\n\n");
            out.extend_from_slice(TABLE_RESORT_JS.as_bytes());
            out.extend_from_slice(INIT_SORT_JS.as_bytes());
            out.extend_from_slice(b"\n// -->\n</script>\n\n");
        }
    }
    out.extend_from_slice(b"</body>\n</html>\n");
    body.append_vec(out);
}

/// Appends one directory row.
pub fn directory_row(out: &mut Vec<u8>, entry: &DirEntry) {
    let name = entry.name_bytes();
    out.extend_from_slice(b"<tr class=\"d\"><td class=\"n\"><a href=\"");
    url_escape_into(out, name);
    out.extend_from_slice(b"/\">");
    html_escape_into(out, name);
    out.extend_from_slice(b"</a>/</td><td class=\"m\">");
    out.extend_from_slice(format_mtime(entry.mtime).as_bytes());
    out.extend_from_slice(
        b"</td><td class=\"s\" data-value=\"-1\">- &nbsp;</td><td class=\"t\">Directory</td></tr>\n",
    );
}

/// Appends one file row.
pub fn file_row(out: &mut Vec<u8>, entry: &DirEntry, content_type: &str) {
    let name = entry.name_bytes();
    out.extend_from_slice(b"<tr><td class=\"n\"><a href=\"");
    url_escape_into(out, name);
    out.extend_from_slice(b"\">");
    html_escape_into(out, name);
    out.extend_from_slice(b"</a></td><td class=\"m\">");
    out.extend_from_slice(format_mtime(entry.mtime).as_bytes());
    out.extend_from_slice(format!("</td><td class=\"s\" data-value=\"{}\">", entry.size).as_bytes());
    out.extend_from_slice(format_size(entry.size).as_bytes());
    out.extend_from_slice(b"</td><td class=\"t\">");
    out.extend_from_slice(content_type.as_bytes());
    out.extend_from_slice(b"</td></tr>\n");
}
