use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tempfile::TempPath;

use crate::error::SourceError;

mod fs;
mod http;

pub use fs::FolderFeed;
pub use http::{HttpFeed, NUGET_ORG_FLAT_CONTAINER};

/// A package identifier paired with a concrete, resolved version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageReference {
    pub id: String,
    pub version: String,
}

impl PackageReference {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Conventional archive file name, `{id}.{version}.nupkg` in lower case.
    pub fn archive_file_name(&self) -> String {
        format!(
            "{}.{}.nupkg",
            self.id.to_ascii_lowercase(),
            self.version.to_ascii_lowercase()
        )
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Resolves package versions and hands out package archives.
pub trait PackageSource: Send + Sync {
    /// Human readable label used in logs and error messages.
    fn describe(&self) -> String;
    fn resolve_latest_version(&self, package_id: &str) -> Result<String, SourceError>;
    fn fetch_archive(&self, package: &PackageReference) -> Result<FetchedArchive, SourceError>;
}

impl<S: PackageSource + ?Sized> PackageSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn resolve_latest_version(&self, package_id: &str) -> Result<String, SourceError> {
        (**self).resolve_latest_version(package_id)
    }

    fn fetch_archive(&self, package: &PackageReference) -> Result<FetchedArchive, SourceError> {
        (**self).fetch_archive(package)
    }
}

impl<S: PackageSource + ?Sized> PackageSource for Arc<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn resolve_latest_version(&self, package_id: &str) -> Result<String, SourceError> {
        (**self).resolve_latest_version(package_id)
    }

    fn fetch_archive(&self, package: &PackageReference) -> Result<FetchedArchive, SourceError> {
        (**self).fetch_archive(package)
    }
}

/// Where a fetched archive lives until it is opened.
pub struct FetchedArchive {
    location: ArchiveLocation,
}

enum ArchiveLocation {
    Permanent(PathBuf),
    Temporary(TempPath),
    Memory(Vec<u8>),
}

impl FetchedArchive {
    pub fn from_path(path: PathBuf) -> Self {
        Self {
            location: ArchiveLocation::Permanent(path),
        }
    }

    pub fn from_temp(path: TempPath) -> Self {
        Self {
            location: ArchiveLocation::Temporary(path),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            location: ArchiveLocation::Memory(bytes),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            ArchiveLocation::Permanent(path) => Some(path),
            ArchiveLocation::Temporary(path) => Some(path.as_ref()),
            ArchiveLocation::Memory(_) => None,
        }
    }

    /// Open the archive for random access. A temporary download is deleted
    /// once the returned stream is dropped.
    pub fn open(self) -> Result<ArchiveStream, SourceError> {
        match self.location {
            ArchiveLocation::Permanent(path) => {
                let file = File::open(&path).map_err(|err| SourceError::io(&path, err))?;
                Ok(ArchiveStream {
                    inner: StreamInner::File(BufReader::new(file)),
                    _temp: None,
                })
            }
            ArchiveLocation::Temporary(temp) => {
                let file = File::open(&temp).map_err(|err| SourceError::io(&*temp, err))?;
                Ok(ArchiveStream {
                    inner: StreamInner::File(BufReader::new(file)),
                    _temp: Some(temp),
                })
            }
            ArchiveLocation::Memory(bytes) => Ok(ArchiveStream {
                inner: StreamInner::Memory(Cursor::new(bytes)),
                _temp: None,
            }),
        }
    }
}

impl fmt::Debug for FetchedArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            ArchiveLocation::Permanent(path) => write!(f, "FetchedArchive({})", path.display()),
            ArchiveLocation::Temporary(path) => {
                write!(f, "FetchedArchive(temp {})", path.display())
            }
            ArchiveLocation::Memory(bytes) => write!(f, "FetchedArchive({} bytes)", bytes.len()),
        }
    }
}

/// Readable, seekable view over a fetched archive.
pub struct ArchiveStream {
    inner: StreamInner,
    _temp: Option<TempPath>,
}

enum StreamInner {
    File(BufReader<File>),
    Memory(Cursor<Vec<u8>>),
}

impl Read for ArchiveStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            StreamInner::File(file) => file.read(buf),
            StreamInner::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for ArchiveStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.inner {
            StreamInner::File(file) => file.seek(pos),
            StreamInner::Memory(cursor) => cursor.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn archive_file_name_is_lower_case() {
        let reference = PackageReference::new("Newtonsoft.Json", "13.0.3-Beta");
        assert_eq!(
            reference.archive_file_name(),
            "newtonsoft.json.13.0.3-beta.nupkg"
        );
    }

    #[test]
    fn temporary_archive_is_removed_after_stream_drops() {
        let mut temp = tempfile::NamedTempFile::new().expect("temp");
        temp.write_all(b"zip bytes").expect("write");
        let temp_path = temp.into_temp_path();
        let on_disk = temp_path.to_path_buf();

        let mut stream = FetchedArchive::from_temp(temp_path).open().expect("open");
        let mut buf = String::new();
        stream.read_to_string(&mut buf).expect("read");
        assert_eq!(buf, "zip bytes");
        assert!(on_disk.exists());
        drop(stream);
        assert!(!on_disk.exists());
    }

    #[test]
    fn memory_archive_supports_seeking() {
        let mut stream = FetchedArchive::from_bytes(b"abcdef".to_vec())
            .open()
            .expect("open");
        stream.seek(SeekFrom::Start(3)).expect("seek");
        let mut buf = String::new();
        stream.read_to_string(&mut buf).expect("read");
        assert_eq!(buf, "def");
    }
}
