use std::io;

use nupeek_feed::SourceError;
use thiserror::Error;
use zip::result::ZipError;

/// Failures of the introspection operations.
#[derive(Debug, Error)]
pub enum IntrospectError {
    #[error("invalid {argument}: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl IntrospectError {
    pub fn invalid_argument(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }

    /// Stable discriminator for logs and scripted callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Source(err) if err.is_not_found() => "package_not_found",
            Self::Source(_) => "retrieval_failed",
            Self::Archive(_) => "invalid_archive",
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("package archive is not a readable zip file")]
    Open(#[source] ZipError),
    #[error("failed to read archive entry #{index}: {source}")]
    Entry {
        index: usize,
        #[source]
        source: ZipError,
    },
    #[error("failed to read archive entry {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
}
