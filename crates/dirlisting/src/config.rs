//! Listing configuration.
//!
//! Settings are read from a JSON document with kebab-case keys, one object per scope.
//! Every key is optional and falls back to the defaults in [`DirListingConfig::default`].
//! Settings are immutable once loaded; the handler shares them behind an `Arc`.

use std::path::{Path, PathBuf};

use regex::bytes::RegexSet;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::listing::filter::{MatchError, NameMatcher};

/// Default `Cache-Control: max-age` for cached listings, in seconds.
pub const DEFAULT_CACHE_MAX_AGE: i64 = 15;

/// Per-scope listing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DirListingConfig {
    /// Whether this scope produces listings at all
    pub activate: bool,
    /// Names matching any of these patterns are not listed
    pub exclude: ExcludePatterns,
    /// Hide entries whose name starts with `.`
    pub hide_dotfiles: bool,
    #[serde(deserialize_with = "blank_as_none")]
    pub external_css: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub external_js: Option<String>,
    /// Charset announced in the HTML `<meta>` and the `Content-Type`
    #[serde(deserialize_with = "blank_as_none")]
    pub encoding: Option<String>,
    /// Document appended after the table: "enable" means `README.txt`
    #[serde(deserialize_with = "include_document")]
    pub show_readme: Option<String>,
    pub hide_readme_file: bool,
    /// Document inserted before the table: "enable" means `HEADER.txt`
    #[serde(deserialize_with = "include_document")]
    pub show_header: Option<String>,
    pub hide_header_file: bool,
    #[serde(deserialize_with = "blank_as_none")]
    pub set_footer: Option<String>,
    pub encode_readme: bool,
    pub encode_header: bool,
    /// Emit the full HTML skeleton around the table
    pub auto_layout: bool,
    /// Sort entries; unsorted listings are streamed
    pub sort: bool,
    #[serde(deserialize_with = "cache_settings")]
    pub cache: Option<CacheConfig>,
}

impl Default for DirListingConfig {
    fn default() -> Self {
        Self {
            activate: false,
            exclude: ExcludePatterns::default(),
            hide_dotfiles: true,
            external_css: None,
            external_js: None,
            encoding: None,
            show_readme: None,
            hide_readme_file: false,
            show_header: None,
            hide_header_file: false,
            set_footer: None,
            encode_readme: true,
            encode_header: true,
            auto_layout: true,
            sort: true,
            cache: None,
        }
    }
}

impl DirListingConfig {
    /// Parses and validates settings from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Checks the cache directory. A cache path that exists but is not a directory is
    /// rejected; a missing one is created on first write.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        match std::fs::metadata(&cache.path) {
            Ok(meta) if !meta.is_dir() => Err(ConfigError::CacheNotDirectory(cache.path.clone())),
            Ok(_) => Ok(()),
            Err(err) => {
                log::warn!(
                    "dir-listing.cache path {} is not accessible yet: {}",
                    cache.path.display(),
                    err
                );
                Ok(())
            }
        }
    }
}

/// Where cached listings live and how long they stay fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub path: PathBuf,
    /// Seconds a cached listing stays fresh, and the `max-age` sent with it.
    pub max_age: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawCacheConfig {
    path: Option<String>,
    max_age: Option<i64>,
}

fn cache_settings<'de, D>(deserializer: D) -> Result<Option<CacheConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<RawCacheConfig>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let max_age = raw.max_age.unwrap_or(DEFAULT_CACHE_MAX_AGE);
    if max_age == 0 {
        return Ok(None);
    }
    if !(1..=i64::from(i32::MAX)).contains(&max_age) {
        return Err(serde::de::Error::custom(format!(
            "dir-listing.cache \"max-age\" must be between 0 and {}, got {}",
            i32::MAX,
            max_age
        )));
    }
    match raw.path.filter(|p| !p.is_empty()) {
        Some(path) => Ok(Some(CacheConfig {
            path: PathBuf::from(path),
            max_age,
        })),
        None => Err(serde::de::Error::custom(
            "dir-listing.cache must specify \"path\" when \"max-age\" is non-zero",
        )),
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

/// Maps the readme/header settings: "enable" picks the conventional file name,
/// "disable" or blank turns the include off, anything else is a file name.
fn include_document<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(blank_as_none(deserializer)?.filter(|v| v != "disable"))
}

impl DirListingConfig {
    /// File name of the readme document, if enabled.
    pub fn readme_name(&self) -> Option<&str> {
        match self.show_readme.as_deref() {
            Some("enable") => Some("README.txt"),
            other => other,
        }
    }

    /// File name of the header document, if enabled.
    pub fn header_name(&self) -> Option<&str> {
        match self.show_header.as_deref() {
            Some("enable") => Some("HEADER.txt"),
            other => other,
        }
    }
}

/// Compiled exclude patterns, matched against raw entry names.
#[derive(Debug, Clone, Default)]
pub struct ExcludePatterns {
    set: Option<RegexSet>,
    sources: Vec<String>,
}

impl ExcludePatterns {
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sources: Vec<String> = patterns.into_iter().map(|p| p.as_ref().to_string()).collect();
        if sources.is_empty() {
            return Ok(Self::default());
        }
        let set = RegexSet::new(&sources).map_err(|err| ConfigError::InvalidExclude {
            message: format!("invalid exclude pattern: {}", err),
        })?;
        Ok(Self { set: Some(set), sources })
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_none()
    }

    pub fn patterns(&self) -> &[String] {
        &self.sources
    }
}

impl<'de> Deserialize<'de> for ExcludePatterns {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let patterns = Vec::<String>::deserialize(deserializer)?;
        Self::new(patterns).map_err(serde::de::Error::custom)
    }
}

impl NameMatcher for ExcludePatterns {
    fn try_match(&self, name: &[u8]) -> Result<bool, MatchError> {
        Ok(self.set.as_ref().is_some_and(|set| set.is_match(name)))
    }
}
