//! Server configuration.

use std::env;
use std::path::{Path, PathBuf};

use dirlisting::{ConfigError, DirListingConfig, EtagFlags};
use serde::Deserialize;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Contents of the JSON settings file named by `DIRLIST_CONFIG`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SettingsFile {
    pub server: ServerSettings,
    pub dir_listing: DirListingConfig,
}

/// The `server` section of the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerSettings {
    pub port: Option<u16>,
    pub docroot: Option<PathBuf>,
    pub max_connections: Option<usize>,
    pub server_tag: Option<String>,
    pub etag: EtagFlags,
    /// Read file Content-Types from an extended attribute first
    pub mime_use_xattr: bool,
    pub mime_xattr_name: Option<String>,
}

impl SettingsFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.dir_listing.validate()?;
        Ok(settings)
    }
}

/// Configuration for the HTTP server.
/// Priority: environment variables > settings file > defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Directory served at `/`
    pub docroot: PathBuf,
    /// Connection limit; one listing may run per 16 connections
    pub max_connections: usize,
    /// Shown in listing footers when no footer is configured
    pub server_tag: String,
}

impl ServerConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Self {
        Self::from_settings_and_env(None)
    }

    /// Load configuration with priority: env vars > settings file > defaults.
    pub fn from_settings_and_env(settings: Option<&ServerSettings>) -> Self {
        let port = env::var("DIRLIST_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(settings.and_then(|s| s.port))
            .unwrap_or(DEFAULT_PORT);

        let docroot = env::var_os("DIRLIST_DOCROOT")
            .map(PathBuf::from)
            .or(settings.and_then(|s| s.docroot.clone()))
            .unwrap_or_else(|| PathBuf::from("."));

        let max_connections = env::var("DIRLIST_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(settings.and_then(|s| s.max_connections))
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let server_tag = env::var("DIRLIST_SERVER_TAG")
            .ok()
            .filter(|v| !v.is_empty())
            .or(settings.and_then(|s| s.server_tag.clone()))
            .unwrap_or_else(|| format!("dirlist-server/{}", env!("CARGO_PKG_VERSION")));

        Self {
            port,
            docroot,
            max_connections,
            server_tag,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
