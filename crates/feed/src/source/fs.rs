use std::fs;
use std::path::{Path, PathBuf};

use super::{FetchedArchive, PackageReference, PackageSource};
use crate::error::SourceError;
use crate::version::select_latest;

/// Local folder feed.
///
/// Both layouts NuGet writes are understood: hierarchical
/// (`{root}/{id}/{version}/{id}.{version}.nupkg`) and flat
/// (`{root}/{id}.{version}.nupkg`). Package ids compare case-insensitively.
#[derive(Debug, Clone)]
pub struct FolderFeed {
    root: PathBuf,
}

impl FolderFeed {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, package_id: &str) -> Result<Option<PathBuf>, SourceError> {
        for entry in self.read_root()? {
            if entry.is_dir()
                && entry
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.eq_ignore_ascii_case(package_id))
            {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn read_root(&self) -> Result<Vec<PathBuf>, SourceError> {
        let entries =
            fs::read_dir(&self.root).map_err(|err| SourceError::io(&self.root, err))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SourceError::io(&self.root, err))?;
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn hierarchical_versions(&self, package_id: &str) -> Result<Vec<String>, SourceError> {
        let Some(dir) = self.package_dir(package_id)? else {
            return Ok(Vec::new());
        };
        let entries = fs::read_dir(&dir).map_err(|err| SourceError::io(&dir, err))?;
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SourceError::io(&dir, err))?;
            let path = entry.path();
            let Some(version) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let reference = PackageReference::new(package_id, version);
            if path.is_dir() && find_archive_in(&path, &reference)?.is_some() {
                versions.push(version.to_string());
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn flat_versions(&self, package_id: &str) -> Result<Vec<String>, SourceError> {
        let prefix = format!("{}.", package_id.to_ascii_lowercase());
        let mut versions = Vec::new();
        for path in self.read_root()? {
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let lower = name.to_ascii_lowercase();
            if let Some(rest) = lower.strip_prefix(&prefix)
                && let Some(version) = rest.strip_suffix(".nupkg")
                && version.starts_with(|ch: char| ch.is_ascii_digit())
            {
                // Keep the on-disk spelling of the version.
                let start = prefix.len();
                versions.push(name[start..start + version.len()].to_string());
            }
        }
        Ok(versions)
    }

    fn locate(&self, package: &PackageReference) -> Result<Option<PathBuf>, SourceError> {
        if let Some(dir) = self.package_dir(&package.id)? {
            let entries = fs::read_dir(&dir).map_err(|err| SourceError::io(&dir, err))?;
            for entry in entries {
                let entry = entry.map_err(|err| SourceError::io(&dir, err))?;
                let path = entry.path();
                let matches_version = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.eq_ignore_ascii_case(&package.version));
                if path.is_dir()
                    && matches_version
                    && let Some(found) = find_archive_in(&path, package)?
                {
                    return Ok(Some(found));
                }
            }
        }
        find_archive_in(&self.root, package)
    }
}

fn find_archive_in(dir: &Path, package: &PackageReference) -> Result<Option<PathBuf>, SourceError> {
    let wanted = package.archive_file_name();
    let entries = fs::read_dir(dir).map_err(|err| SourceError::io(dir, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| SourceError::io(dir, err))?;
        let path = entry.path();
        if path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.eq_ignore_ascii_case(&wanted))
        {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

impl PackageSource for FolderFeed {
    fn describe(&self) -> String {
        format!("folder {}", self.root.display())
    }

    fn resolve_latest_version(&self, package_id: &str) -> Result<String, SourceError> {
        let mut versions = self.hierarchical_versions(package_id)?;
        versions.extend(self.flat_versions(package_id)?);
        if versions.is_empty() {
            return Err(SourceError::NotFound {
                package: package_id.to_string(),
                feed: self.describe(),
            });
        }
        select_latest(&versions).ok_or_else(|| SourceError::NoVersions {
            package: package_id.to_string(),
            feed: self.describe(),
        })
    }

    fn fetch_archive(&self, package: &PackageReference) -> Result<FetchedArchive, SourceError> {
        match self.locate(package)? {
            Some(path) => {
                tracing::debug!(package = %package, path = %path.display(), "using folder feed archive");
                Ok(FetchedArchive::from_path(path))
            }
            None => Err(SourceError::VersionNotFound {
                package: package.id.clone(),
                version: package.version.clone(),
                feed: self.describe(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, b"PK").expect("write");
    }

    #[test]
    fn resolves_hierarchical_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        touch(&temp.path().join("demo.lib/1.0.0/demo.lib.1.0.0.nupkg"));
        touch(&temp.path().join("demo.lib/1.10.0/demo.lib.1.10.0.nupkg"));
        // A version folder without an archive is ignored.
        fs::create_dir_all(temp.path().join("demo.lib/9.9.9")).expect("mkdir");

        let feed = FolderFeed::new(temp.path());
        let version = feed.resolve_latest_version("Demo.Lib").expect("resolve");
        assert_eq!(version, "1.10.0");

        let archive = feed
            .fetch_archive(&PackageReference::new("Demo.Lib", &version))
            .expect("fetch");
        assert!(archive.path().expect("path").ends_with("demo.lib.1.10.0.nupkg"));
    }

    #[test]
    fn resolves_flat_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        touch(&temp.path().join("Demo.Lib.2.0.0.nupkg"));
        touch(&temp.path().join("Demo.Lib.Extras.3.0.0.nupkg"));

        let feed = FolderFeed::new(temp.path());
        assert_eq!(feed.resolve_latest_version("demo.lib").expect("resolve"), "2.0.0");
        let archive = feed
            .fetch_archive(&PackageReference::new("demo.lib", "2.0.0"))
            .expect("fetch");
        assert!(archive.path().is_some());
    }

    #[test]
    fn unknown_package_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let feed = FolderFeed::new(temp.path());
        let err = feed.resolve_latest_version("missing").expect_err("missing");
        assert!(err.is_not_found());
        let err = feed
            .fetch_archive(&PackageReference::new("missing", "1.0.0"))
            .expect_err("missing");
        assert!(matches!(err, SourceError::VersionNotFound { .. }));
    }
}
