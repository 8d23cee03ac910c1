//! Content-Type lookup for file rows.

use std::ffi::OsStr;
use std::path::Path;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Default extended attribute holding a per-file Content-Type.
pub const DEFAULT_XATTR_NAME: &str = "user.Content-Type";

/// Resolves the Content-Type shown for a file: extended attribute first (when
/// enabled), then the file extension, then [`DEFAULT_CONTENT_TYPE`].
#[derive(Debug, Clone)]
pub struct MimeResolver {
    use_xattr: bool,
    xattr_name: String,
}

impl Default for MimeResolver {
    fn default() -> Self {
        Self {
            use_xattr: false,
            xattr_name: DEFAULT_XATTR_NAME.to_string(),
        }
    }
}

impl MimeResolver {
    pub fn new(use_xattr: bool, xattr_name: Option<String>) -> Self {
        Self {
            use_xattr,
            xattr_name: xattr_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_XATTR_NAME.to_string()),
        }
    }

    pub fn content_type(&self, dir: &Path, name: &OsStr) -> String {
        if self.use_xattr
            && let Some(from_xattr) = self.from_xattr(&dir.join(name))
        {
            return from_xattr;
        }
        mime_guess::from_path(name)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string()
    }

    fn from_xattr(&self, path: &Path) -> Option<String> {
        match xattr::get(path, &self.xattr_name) {
            Ok(Some(value)) => String::from_utf8(value).ok().filter(|v| !v.is_empty()),
            Ok(None) => None,
            Err(err) => {
                log::trace!("No {} on {}: {}", self.xattr_name, path.display(), err);
                None
            }
        }
    }
}
