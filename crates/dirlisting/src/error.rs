//! Error types surfaced by the listing engine.
//!
//! Per-entry failures and disk-cache failures never show up here: they are contained
//! by the scanner and the cache writer. Only errors that change the response status
//! or abort the transfer reach the caller.

use std::path::PathBuf;

/// Error that reaches the orchestrator and maps onto the HTTP status surface.
#[derive(Debug)]
pub enum DirListingError {
    /// The directory could not be opened (permission, raced into a non-directory).
    OpenDirectory { path: PathBuf, source: std::io::Error },
    /// The response transport failed while the listing was being produced.
    Transport(String),
    /// Generic I/O error while assembling the response body
    Io(std::io::Error),
}

impl DirListingError {
    /// HTTP status this error maps to.
    pub fn status(&self) -> u16 {
        match self {
            Self::OpenDirectory { .. } => 403,
            Self::Transport(_) | Self::Io(_) => 500,
        }
    }
}

impl std::fmt::Display for DirListingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenDirectory { path, source } => {
                write!(f, "Cannot open directory {}: {}", path.display(), source)
            }
            Self::Transport(msg) => write!(f, "Transport error: {}", msg),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for DirListingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::OpenDirectory { source, .. } => Some(source),
            Self::Io(err) => Some(err),
            Self::Transport(_) => None,
        }
    }
}

impl From<std::io::Error> for DirListingError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Error loading or validating listing configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Settings file could not be parsed
    Parse(serde_json::Error),
    /// Settings file could not be read
    Io { path: PathBuf, source: std::io::Error },
    /// An exclude pattern failed to compile
    InvalidExclude { message: String },
    /// `cache.path` exists but is not a directory
    CacheNotDirectory(PathBuf),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "Invalid dir-listing settings: {}", err),
            Self::Io { path, source } => write!(f, "Cannot read {}: {}", path.display(), source),
            Self::InvalidExclude { message } => write!(f, "dir-listing.exclude: {}", message),
            Self::CacheNotDirectory(path) => {
                write!(f, "dir-listing.cache \"path\" => \"{}\" is not a dir", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}
