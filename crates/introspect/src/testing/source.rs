use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use nupeek_feed::{FetchedArchive, PackageReference, PackageSource, SourceError, select_latest};

const FEED: &str = "in-memory feed";

/// Package source serving archives held in memory, counting retrievals.
#[derive(Debug, Default)]
pub struct InMemorySource {
    packages: HashMap<String, Vec<(String, Vec<u8>)>>,
    resolves: AtomicUsize,
    fetches: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, id: &str, version: &str, archive: Vec<u8>) -> Self {
        self.packages
            .entry(id.to_ascii_lowercase())
            .or_default()
            .push((version.to_string(), archive));
        self
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl PackageSource for InMemorySource {
    fn describe(&self) -> String {
        FEED.to_string()
    }

    fn resolve_latest_version(&self, package_id: &str) -> Result<String, SourceError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        let versions = self
            .packages
            .get(&package_id.to_ascii_lowercase())
            .ok_or_else(|| SourceError::NotFound {
                package: package_id.to_string(),
                feed: FEED.to_string(),
            })?;
        let listed: Vec<&str> = versions.iter().map(|(version, _)| version.as_str()).collect();
        select_latest(&listed).ok_or_else(|| SourceError::NoVersions {
            package: package_id.to_string(),
            feed: FEED.to_string(),
        })
    }

    fn fetch_archive(&self, package: &PackageReference) -> Result<FetchedArchive, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.packages
            .get(&package.id.to_ascii_lowercase())
            .and_then(|versions| {
                versions
                    .iter()
                    .find(|(version, _)| version.eq_ignore_ascii_case(&package.version))
            })
            .map(|(_, archive)| FetchedArchive::from_bytes(archive.clone()))
            .ok_or_else(|| SourceError::VersionNotFound {
                package: package.id.clone(),
                version: package.version.clone(),
                feed: FEED.to_string(),
            })
    }
}
