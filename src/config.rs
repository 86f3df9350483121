//! Harvest configuration.
//!
//! Loaded from an explicit path, or from an `imgharvest` config file discovered
//! by `prefer` in the usual locations, then overridden by command-line flags.
//! Every field has a default tuned for the original target site.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::retry::RetryPolicy;

/// Application name `prefer` searches config locations for.
pub const CONFIG_NAME: &str = "imgharvest";

/// Environment variable holding the Dropbox access token.
pub const DROPBOX_TOKEN_ENV: &str = "DROPBOX_ACCESS_TOKEN";

const DEFAULT_SOURCE_URL: &str = "https://akibablog.blog.jp/";
const DEFAULT_DESTINATION_FOLDER: &str = "/akiba-images";

/// URL fragments marking decorative images on the target site.
const DEFAULT_EXCLUSION_PATTERNS: &[&str] = &[
    "counter",
    "banner",
    "bunner",
    "icon",
    "button",
    "small_parts",
];

/// Attributes carrying deferred image URLs on lazy-loading pages.
const DEFAULT_LAZY_ATTRIBUTES: &[&str] = &["data-src", "data-original", "data-lazy-src"];

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Destination store backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Dropbox, authenticated with a bearer token from the environment.
    #[default]
    Dropbox,
    /// A local directory; the destination folder is created beneath it.
    Local { local_dir: PathBuf },
}

/// Immutable configuration for one harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Page scanned for images.
    pub source_url: String,
    /// Folder in the destination store receiving uploads.
    pub destination_folder: String,
    /// Images smaller than this many bytes are rejected.
    pub min_bytes: u64,
    /// Minimum pixel width.
    pub min_width: u32,
    /// Minimum pixel height.
    pub min_height: u32,
    /// Case-insensitive substrings rejecting an image by filename or URL path.
    pub exclusion_patterns: Vec<String>,
    /// Delay between successive image fetches, in milliseconds.
    pub pacing_ms: u64,
    /// Date used for naming; today when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_date: Option<NaiveDate>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Retries for transient fetch failures.
    pub fetch_retries: u32,
    /// Retries for transient upload failures.
    pub upload_retries: u32,
    /// Initial retry backoff in milliseconds.
    pub retry_backoff_ms: u64,
    /// User agent sent with every request; a desktop browser string when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// `<img>` attributes read in addition to `src`.
    pub lazy_attributes: Vec<String>,
    /// When non-empty, only URLs whose path ends in one of these are considered.
    pub allowed_extensions: Vec<String>,
    pub store: StoreConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            destination_folder: DEFAULT_DESTINATION_FOLDER.to_string(),
            min_bytes: 1024,
            min_width: 10,
            min_height: 10,
            exclusion_patterns: DEFAULT_EXCLUSION_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            pacing_ms: 1000,
            run_date: None,
            request_timeout_secs: 30,
            fetch_retries: 2,
            upload_retries: 2,
            retry_backoff_ms: 500,
            user_agent: None,
            lazy_attributes: DEFAULT_LAZY_ATTRIBUTES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_extensions: Vec::new(),
            store: StoreConfig::default(),
        }
    }
}

impl HarvestConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `prefer` discovers an
    /// `imgharvest` config file; when none is found, defaults apply.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path).await;
        }

        match prefer::load(CONFIG_NAME).await {
            Ok(discovered) => match discovered.source_path() {
                Some(path) => {
                    debug!("using config file {}", path.display());
                    Self::from_file(path).await
                }
                None => Ok(Self::default()),
            },
            Err(_) => {
                debug!("no {} config file found, using defaults", CONFIG_NAME);
                Ok(Self::default())
            }
        }
    }

    /// Parse a config file. TOML unless the extension says JSON.
    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => toml::from_str(&content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Check values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.source_url).map_err(|e| {
            ConfigError::Invalid(format!("source_url {:?}: {}", self.source_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "source_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if !self.destination_folder.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "destination_folder must start with '/', got {:?}",
                self.destination_folder
            )));
        }
        if self.min_width == 0 || self.min_height == 0 {
            return Err(ConfigError::Invalid(
                "min_width and min_height must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Date stamp for this run.
    pub fn effective_run_date(&self) -> NaiveDate {
        self.run_date.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetch_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    pub fn upload_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.upload_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    /// Serialize as TOML for display.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarvestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.destination_folder, "/akiba-images");
        assert_eq!(config.pacing(), Duration::from_secs(1));
        assert!(config.exclusion_patterns.contains(&"banner".to_string()));
        assert_eq!(config.store, StoreConfig::Dropbox);
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
source_url = "https://example.com/gallery"
min_width = 200
min_height = 200
run_date = "2024-05-01"

[store]
backend = "local"
local_dir = "/tmp/harvest"
"#
        )
        .unwrap();

        let config = HarvestConfig::from_file(file.path()).await.unwrap();
        assert_eq!(config.source_url, "https://example.com/gallery");
        assert_eq!(config.min_width, 200);
        assert_eq!(config.min_bytes, 1024);
        assert_eq!(
            config.effective_run_date(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert_eq!(
            config.store,
            StoreConfig::Local {
                local_dir: PathBuf::from("/tmp/harvest")
            }
        );
    }

    #[tokio::test]
    async fn test_missing_explicit_file_is_error() {
        let err = HarvestConfig::load(Some(Path::new("/nonexistent/imgharvest.toml"))).await;
        assert!(matches!(err, Err(ConfigError::Read { .. })));
    }

    #[tokio::test]
    async fn test_malformed_file_is_parse_error() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "min_bytes = \"lots\"").unwrap();
        let err = HarvestConfig::from_file(file.path()).await;
        assert!(matches!(err, Err(ConfigError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_json_file_by_extension() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(
            file,
            r#"{{"destination_folder": "/json-images", "pacing_ms": 250}}"#
        )
        .unwrap();

        let config = HarvestConfig::from_file(file.path()).await.unwrap();
        assert_eq!(config.destination_folder, "/json-images");
        assert_eq!(config.pacing(), Duration::from_millis(250));
        assert_eq!(config.min_bytes, 1024);
    }

    #[tokio::test]
    async fn test_explicit_path_skips_discovery() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "source_url = \"https://example.com/explicit\"").unwrap();

        let config = HarvestConfig::load(Some(file.path())).await.unwrap();
        assert_eq!(config.source_url, "https://example.com/explicit");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = HarvestConfig {
            source_url: "ftp://example.com/".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HarvestConfig {
            destination_folder: "images".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HarvestConfig {
            min_height: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let text = HarvestConfig::default().to_toml().unwrap();
        let parsed: HarvestConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.source_url, DEFAULT_SOURCE_URL);
        assert_eq!(parsed.lazy_attributes.len(), 3);
    }
}
