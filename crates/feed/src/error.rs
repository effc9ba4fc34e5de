//! Errors surfaced by package sources.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("package `{package}` was not found in {feed}")]
    NotFound { package: String, feed: String },
    #[error("package `{package}` version `{version}` was not found in {feed}")]
    VersionNotFound {
        package: String,
        version: String,
        feed: String,
    },
    #[error("package `{package}` has no published versions in {feed}")]
    NoVersions { package: String, feed: String },
    #[error("failed to retrieve {url}")]
    Retrieval {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("feed returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("invalid response from {url}")]
    InvalidResponse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error while accessing {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid feed configuration: {0}")]
    Config(String),
}

impl SourceError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the "package or version does not exist" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::VersionNotFound { .. } | Self::NoVersions { .. }
        )
    }
}
