//! Core configuration loaded from TOML.
//!
//! # Responsibility
//! - Describe where notes and blobs live and how media URLs are signed.
//! - Validate settings once, before any store is opened.
//!
//! # Invariants
//! - Unknown keys are rejected.
//! - A validated config always carries a signing secret of at least
//!   `MIN_SIGNING_SECRET_BYTES` and a bounded URL lifetime.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const MIN_SIGNING_SECRET_BYTES: usize = 16;
pub const DEFAULT_URL_TTL_SECS: u64 = 900;
pub const MAX_URL_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Top-level settings for one core instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// SQLite file holding note records.
    pub database_path: PathBuf,
    /// Directory under which `media/{owner}/{key}` blobs are stored.
    pub media_root: PathBuf,
    /// Public prefix of resolved media URLs.
    pub media_base_url: String,
    /// HMAC secret used to sign media URLs.
    pub url_signing_secret: String,
    /// Lifetime of a resolved URL in seconds.
    pub url_ttl_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("pennynote.sqlite3"),
            media_root: PathBuf::from("."),
            media_base_url: "http://localhost:8080".to_string(),
            url_signing_secret: String::new(),
            url_ttl_secs: DEFAULT_URL_TTL_SECS,
            logging: LoggingConfig::default(),
        }
    }
}

/// Rolling file log settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for log files; `None` means stderr.
    pub log_dir: Option<PathBuf>,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            max_file_size_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

impl CoreConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url_signing_secret.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(ConfigError::Invalid {
                field: "url_signing_secret",
                reason: format!("must be at least {MIN_SIGNING_SECRET_BYTES} bytes"),
            });
        }
        if self.url_ttl_secs == 0 || self.url_ttl_secs > MAX_URL_TTL_SECS {
            return Err(ConfigError::Invalid {
                field: "url_ttl_secs",
                reason: format!("must be within 1..={MAX_URL_TTL_SECS}"),
            });
        }
        let base = self.media_base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "media_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if base.contains(['?', '#']) {
            return Err(ConfigError::Invalid {
                field: "media_base_url",
                reason: "must not carry a query or fragment".to_string(),
            });
        }
        if let Some(dir) = &self.logging.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid {
                    field: "logging.log_dir",
                    reason: format!("must be an absolute path, got `{}`", dir.display()),
                });
            }
        }
        if self.logging.max_files == 0 {
            return Err(ConfigError::Invalid {
                field: "logging.max_files",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_secs)
    }
}
