//! Decides which directory entries are listed.
//!
//! Rules run in a fixed order and the first rule that applies wins:
//! 1. Names starting with `.`: hidden when dotfiles are hidden, and `.`/`..` always.
//! 2. The readme document, when it is shown and its file is hidden.
//! 3. The header document, same rule.
//! 4. Exclude patterns. A pattern that fails to evaluate excludes the entry.
//! 5. Names too long to form a valid path under the directory.

use std::sync::Arc;

use crate::config::DirListingConfig;

/// Why an entry was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Dotfile,
    Readme,
    Header,
    Pattern,
    NameTooLong,
}

/// Error raised while evaluating a name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchError(pub String);

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pattern match failed: {}", self.0)
    }
}

impl std::error::Error for MatchError {}

/// Matches raw entry names against exclude patterns.
pub trait NameMatcher: Send + Sync {
    fn try_match(&self, name: &[u8]) -> Result<bool, MatchError>;
}

/// Per-request entry filter built from the listing settings.
#[derive(Clone)]
pub struct EntryFilter {
    hide_dotfiles: bool,
    readme: Option<Vec<u8>>,
    header: Option<Vec<u8>>,
    matcher: Option<Arc<dyn NameMatcher>>,
}

impl EntryFilter {
    pub fn from_config(config: &DirListingConfig) -> Self {
        let readme = config
            .readme_name()
            .filter(|_| config.hide_readme_file)
            .map(|name| name.as_bytes().to_vec());
        let header = config
            .header_name()
            .filter(|_| config.hide_header_file)
            .map(|name| name.as_bytes().to_vec());
        let matcher: Option<Arc<dyn NameMatcher>> = if config.exclude.is_empty() {
            None
        } else {
            Some(Arc::new(config.exclude.clone()))
        };
        Self {
            hide_dotfiles: config.hide_dotfiles,
            readme,
            header,
            matcher,
        }
    }

    /// Replaces the exclude matcher.
    pub fn with_matcher(mut self, matcher: Arc<dyn NameMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Returns why `name` must not be listed, or `None` to list it.
    pub fn check(&self, name: &[u8], name_max: usize) -> Option<Exclusion> {
        if name.first() == Some(&b'.') && (self.hide_dotfiles || name == b"." || name == b"..") {
            return Some(Exclusion::Dotfile);
        }
        if self.readme.as_deref() == Some(name) {
            return Some(Exclusion::Readme);
        }
        if self.header.as_deref() == Some(name) {
            return Some(Exclusion::Header);
        }
        if let Some(matcher) = &self.matcher {
            match matcher.try_match(name) {
                Ok(false) => {}
                Ok(true) => return Some(Exclusion::Pattern),
                Err(err) => {
                    log::error!("dir-listing.exclude: {}, hiding {}", err, String::from_utf8_lossy(name));
                    return Some(Exclusion::Pattern);
                }
            }
        }
        if name.len() > name_max {
            return Some(Exclusion::NameTooLong);
        }
        None
    }
}

impl std::fmt::Debug for EntryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryFilter")
            .field("hide_dotfiles", &self.hide_dotfiles)
            .field("readme", &self.readme.as_deref().map(String::from_utf8_lossy))
            .field("header", &self.header.as_deref().map(String::from_utf8_lossy))
            .field("has_matcher", &self.matcher.is_some())
            .finish()
    }
}
