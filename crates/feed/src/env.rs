use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CachedFeed;
use crate::error::SourceError;
use crate::source::{FolderFeed, HttpFeed, NUGET_ORG_FLAT_CONTAINER, PackageSource};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 100;

/// Environment-driven configuration for package retrieval.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub kind: FeedKind,
    pub feed_url: String,
    pub feed_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub http_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            kind: FeedKind::Http,
            feed_url: NUGET_ORG_FLAT_CONTAINER.to_string(),
            feed_dir: None,
            cache_dir: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl FeedConfig {
    /// Build a [`FeedConfig`] by reading the documented NUPEEK_* variables.
    pub fn from_env() -> Result<Self, SourceError> {
        let defaults = Self::default();
        let kind = env::var("NUPEEK_SOURCE")
            .ok()
            .map(|value| FeedKind::from_str(&value))
            .transpose()?
            .unwrap_or(defaults.kind);
        let feed_url = env::var("NUPEEK_FEED_URL").unwrap_or(defaults.feed_url);
        let feed_dir = env::var("NUPEEK_FEED_DIR").ok().map(PathBuf::from);
        let cache_dir = env::var("NUPEEK_CACHE_DIR").ok().map(PathBuf::from);
        let http_timeout = match env::var("NUPEEK_HTTP_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    SourceError::Config(format!(
                        "NUPEEK_HTTP_TIMEOUT_SECS must be a whole number of seconds, got `{raw}`"
                    ))
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => defaults.http_timeout,
        };

        Ok(Self {
            kind,
            feed_url,
            feed_dir,
            cache_dir,
            http_timeout,
        })
    }

    /// Construct the configured source, wrapped in the archive cache when a
    /// cache directory is set.
    pub fn build(&self) -> Result<Box<dyn PackageSource>, SourceError> {
        let source: Box<dyn PackageSource> = match self.kind {
            FeedKind::Http => Box::new(HttpFeed::new(&self.feed_url, self.http_timeout)?),
            FeedKind::Folder => {
                let dir = self.feed_dir.clone().ok_or_else(|| {
                    SourceError::Config(
                        "NUPEEK_FEED_DIR is required when NUPEEK_SOURCE=fs".to_string(),
                    )
                })?;
                Box::new(FolderFeed::new(dir))
            }
        };
        Ok(match &self.cache_dir {
            Some(dir) => Box::new(CachedFeed::new(dir.clone(), source)),
            None => source,
        })
    }
}

/// Supported package source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Http,
    Folder,
}

impl FeedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Folder => "fs",
        }
    }
}

impl FromStr for FeedKind {
    type Err = SourceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" | "https" | "nuget" => Ok(Self::Http),
            "fs" | "folder" | "local" => Ok(Self::Folder),
            other => Err(SourceError::Config(format!(
                "unsupported NUPEEK_SOURCE `{other}`"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "NUPEEK_SOURCE",
        "NUPEEK_FEED_URL",
        "NUPEEK_FEED_DIR",
        "NUPEEK_CACHE_DIR",
        "NUPEEK_HTTP_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_to_nuget_org() {
        clear_env();
        let config = FeedConfig::from_env().expect("config");
        assert_eq!(config.kind, FeedKind::Http);
        assert_eq!(config.feed_url, NUGET_ORG_FLAT_CONTAINER);
        assert!(config.cache_dir.is_none());
        assert_eq!(config.http_timeout, Duration::from_secs(100));
    }

    #[test]
    #[serial]
    fn reads_folder_configuration() {
        clear_env();
        unsafe {
            env::set_var("NUPEEK_SOURCE", "fs");
            env::set_var("NUPEEK_FEED_DIR", "/srv/packages");
            env::set_var("NUPEEK_HTTP_TIMEOUT_SECS", "7");
        }
        let config = FeedConfig::from_env().expect("config");
        clear_env();
        assert_eq!(config.kind, FeedKind::Folder);
        assert_eq!(config.feed_dir, Some(PathBuf::from("/srv/packages")));
        assert_eq!(config.http_timeout, Duration::from_secs(7));
    }

    #[test]
    #[serial]
    fn rejects_unknown_source() {
        clear_env();
        unsafe {
            env::set_var("NUPEEK_SOURCE", "ftp");
        }
        let err = FeedConfig::from_env().expect_err("ftp is unsupported");
        clear_env();
        assert!(matches!(err, SourceError::Config(_)));
    }

    #[test]
    fn folder_source_requires_directory() {
        let config = FeedConfig {
            kind: FeedKind::Folder,
            ..FeedConfig::default()
        };
        assert!(matches!(config.build(), Err(SourceError::Config(_))));
    }
}
