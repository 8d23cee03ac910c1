//! Escaping for entry names in HTML, URLs, and JSON.

/// Appends `bytes` with the minimal XML escapes: markup characters and control bytes.
/// Other bytes, including non-ASCII, pass through unchanged.
pub fn html_escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        match b {
            b'&' => out.extend_from_slice(b"&amp;"),
            b'<' => out.extend_from_slice(b"&lt;"),
            b'>' => out.extend_from_slice(b"&gt;"),
            b'"' => out.extend_from_slice(b"&quot;"),
            b'\'' => out.extend_from_slice(b"&#39;"),
            b if b < 0x20 || b == 0x7f => {
                out.extend_from_slice(format!("&#x{:x};", b).as_bytes());
            }
            _ => out.push(b),
        }
    }
}

pub fn html_escape(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    html_escape_into(&mut out, bytes);
    out
}

/// Appends `bytes` percent-encoded for use as one relative URL path segment.
pub fn url_escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(urlencoding::encode_binary(bytes).as_bytes());
}

/// Appends the body of a JSON string literal (without the surrounding quotes).
/// Names that are not valid UTF-8 are converted lossily.
pub fn json_escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    let text = String::from_utf8_lossy(bytes);
    match serde_json::to_string(text.as_ref()) {
        Ok(quoted) => out.extend_from_slice(&quoted.as_bytes()[1..quoted.len() - 1]),
        Err(err) => log::warn!("Cannot JSON-encode entry name {:?}: {}", text, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape_markup_and_controls() {
        assert_eq!(html_escape(b"a<b>&\"c'"), b"a&lt;b&gt;&amp;&quot;c&#39;");
        assert_eq!(html_escape(b"tab\there"), b"tab&#x9;here");
        assert_eq!(html_escape("caf\u{e9}".as_bytes()), "caf\u{e9}".as_bytes());
    }

    #[test]
    fn test_url_escape_reserved_characters() {
        let mut out = Vec::new();
        url_escape_into(&mut out, b"my file#1?.txt");
        assert_eq!(out, b"my%20file%231%3F.txt");

        let mut out = Vec::new();
        url_escape_into(&mut out, b"\xff");
        assert_eq!(out, b"%FF");
    }

    #[test]
    fn test_json_escape() {
        let mut out = Vec::new();
        json_escape_into(&mut out, b"say \"hi\"\\\n");
        assert_eq!(out, br#"say \"hi\"\\\n"#);
    }
}
