use std::io::copy;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use tempfile::NamedTempFile;
use url::Url;

use super::{FetchedArchive, PackageReference, PackageSource};
use crate::error::SourceError;
use crate::version::select_latest;

pub const NUGET_ORG_FLAT_CONTAINER: &str = "https://api.nuget.org/v3-flatcontainer";

/// NuGet v3 "flat container" feed (`PackageBaseAddress` resource).
pub struct HttpFeed {
    base: String,
    client: Client,
}

#[derive(Deserialize)]
struct VersionIndex {
    #[serde(default)]
    versions: Vec<String>,
}

impl HttpFeed {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, SourceError> {
        let parsed = Url::parse(base)
            .map_err(|err| SourceError::Config(format!("feed url `{base}` is invalid: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SourceError::Config(format!(
                "feed url `{base}` must use http or https"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nupeek/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| SourceError::Retrieval {
                url: base.to_string(),
                source,
            })?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn nuget_org(timeout: Duration) -> Result<Self, SourceError> {
        Self::new(NUGET_ORG_FLAT_CONTAINER, timeout)
    }

    fn versions_url(&self, package_id: &str) -> String {
        format!("{}/{}/index.json", self.base, package_id.to_ascii_lowercase())
    }

    fn archive_url(&self, package: &PackageReference) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base,
            package.id.to_ascii_lowercase(),
            package.version.to_ascii_lowercase(),
            package.archive_file_name()
        )
    }

    fn get(&self, url: &str) -> Result<Response, SourceError> {
        self.client
            .get(url)
            .send()
            .map_err(|source| SourceError::Retrieval {
                url: url.to_string(),
                source,
            })
    }
}

impl PackageSource for HttpFeed {
    fn describe(&self) -> String {
        self.base.clone()
    }

    fn resolve_latest_version(&self, package_id: &str) -> Result<String, SourceError> {
        let url = self.versions_url(package_id);
        let response = self.get(&url)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                package: package_id.to_string(),
                feed: self.describe(),
            });
        }
        if !response.status().is_success() {
            return Err(SourceError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        let body = response.bytes().map_err(|source| SourceError::Retrieval {
            url: url.clone(),
            source,
        })?;
        let index: VersionIndex = serde_json::from_slice(&body)
            .map_err(|source| SourceError::InvalidResponse { url, source })?;
        let version = select_latest(&index.versions).ok_or_else(|| SourceError::NoVersions {
            package: package_id.to_string(),
            feed: self.describe(),
        })?;
        tracing::debug!(package = %package_id, %version, feed = %self.base, "resolved latest version");
        Ok(version)
    }

    fn fetch_archive(&self, package: &PackageReference) -> Result<FetchedArchive, SourceError> {
        let url = self.archive_url(package);
        let mut response = self.get(&url)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SourceError::VersionNotFound {
                package: package.id.clone(),
                version: package.version.clone(),
                feed: self.describe(),
            });
        }
        if !response.status().is_success() {
            return Err(SourceError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let mut temp =
            NamedTempFile::new().map_err(|err| SourceError::io(std::env::temp_dir(), err))?;
        let temp_path = temp.path().to_path_buf();
        let written = copy(&mut response, temp.as_file_mut())
            .map_err(|err| SourceError::io(&temp_path, err))?;
        tracing::info!(package = %package, bytes = written, %url, "downloaded package archive");
        Ok(FetchedArchive::from_temp(temp.into_temp_path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> HttpFeed {
        HttpFeed::new("https://feed.example.test/v3/", Duration::from_secs(5)).expect("feed")
    }

    #[test]
    fn builds_flat_container_urls() {
        let feed = feed();
        assert_eq!(
            feed.versions_url("Serilog.Sinks.Console"),
            "https://feed.example.test/v3/serilog.sinks.console/index.json"
        );
        let reference = PackageReference::new("Serilog", "3.1.0-RC.1");
        assert_eq!(
            feed.archive_url(&reference),
            "https://feed.example.test/v3/serilog/3.1.0-rc.1/serilog.3.1.0-rc.1.nupkg"
        );
    }

    #[test]
    fn rejects_non_http_feed_urls() {
        let err = HttpFeed::new("ftp://feed.example.test", Duration::from_secs(1))
            .err()
            .expect("ftp must be rejected");
        assert!(matches!(err, SourceError::Config(_)));
    }
}
