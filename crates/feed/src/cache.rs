use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::SourceError;
use crate::source::{FetchedArchive, PackageReference, PackageSource};

const DIGEST_SUFFIX: &str = "sha256";

/// On-disk archive cache layered over another [`PackageSource`].
///
/// Version resolution always goes to the inner source. Archives are stored as
/// `{root}/{id}/{version}/{id}.{version}.nupkg` next to a `.sha256` sidecar; an
/// entry whose bytes no longer match the sidecar is fetched again.
pub struct CachedFeed<S> {
    root: PathBuf,
    inner: S,
}

impl<S: PackageSource> CachedFeed<S> {
    pub fn new(root: impl Into<PathBuf>, inner: S) -> Self {
        Self {
            root: root.into(),
            inner,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn path_for(&self, package: &PackageReference) -> PathBuf {
        self.root
            .join(sanitize_segment(&package.id.to_ascii_lowercase()))
            .join(sanitize_segment(&package.version.to_ascii_lowercase()))
            .join(sanitize_segment(&package.archive_file_name()))
    }

    fn cached(&self, path: &Path) -> Result<bool, SourceError> {
        if !path.exists() {
            return Ok(false);
        }
        let sidecar = digest_path(path);
        let expected = match fs::read_to_string(&sidecar) {
            Ok(value) => value,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(SourceError::io(&sidecar, err)),
        };
        let file = File::open(path).map_err(|err| SourceError::io(path, err))?;
        let actual = hash_reader(file).map_err(|err| SourceError::io(path, err))?;
        Ok(expected.trim().eq_ignore_ascii_case(&actual))
    }

    fn store(&self, fetched: FetchedArchive, dest: &Path) -> Result<(), SourceError> {
        let dir = dest
            .parent()
            .ok_or_else(|| SourceError::Config(format!("invalid cache path {}", dest.display())))?;
        fs::create_dir_all(dir).map_err(|err| SourceError::io(dir, err))?;

        let tmp = dest.with_extension(format!(
            "tmp-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|dur| dur.as_nanos())
                .unwrap_or(0)
        ));
        let mut reader = fetched.open()?;
        let digest = {
            let mut out = File::create(&tmp).map_err(|err| SourceError::io(&tmp, err))?;
            copy_hashing(&mut reader, &mut out).map_err(|err| SourceError::io(&tmp, err))?
        };
        drop(reader);
        fs::rename(&tmp, dest).map_err(|err| SourceError::io(dest, err))?;
        let sidecar = digest_path(dest);
        fs::write(&sidecar, &digest).map_err(|err| SourceError::io(&sidecar, err))?;
        Ok(())
    }
}

impl<S: PackageSource> PackageSource for CachedFeed<S> {
    fn describe(&self) -> String {
        format!("{} (cached in {})", self.inner.describe(), self.root.display())
    }

    fn resolve_latest_version(&self, package_id: &str) -> Result<String, SourceError> {
        self.inner.resolve_latest_version(package_id)
    }

    fn fetch_archive(&self, package: &PackageReference) -> Result<FetchedArchive, SourceError> {
        let dest = self.path_for(package);
        if self.cached(&dest)? {
            tracing::debug!(package = %package, path = %dest.display(), "archive cache hit");
            return Ok(FetchedArchive::from_path(dest));
        }
        if dest.exists() {
            tracing::warn!(path = %dest.display(), "cached archive failed digest check; refetching");
        }
        let fetched = self.inner.fetch_archive(package)?;
        self.store(fetched, &dest)?;
        tracing::info!(package = %package, path = %dest.display(), "cached package archive");
        Ok(FetchedArchive::from_path(dest))
    }
}

fn digest_path(archive: &Path) -> PathBuf {
    let mut name = archive
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(DIGEST_SUFFIX);
    archive.with_file_name(name)
}

fn copy_hashing(reader: &mut impl Read, writer: &mut impl Write) -> io::Result<String> {
    const BUF_SIZE: usize = 64 * 1024;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        writer.write_all(&buf[..read])?;
    }
    writer.flush()?;
    Ok(hex::encode(hasher.finalize()))
}

fn hash_reader(mut reader: impl Read) -> io::Result<String> {
    copy_hashing(&mut reader, &mut io::sink())
}

/// Make `value` a single normal path component. Separators become `_`, and
/// an empty, `.` or `..` value becomes underscores.
fn sanitize_segment(value: &str) -> String {
    if value.chars().all(|ch| ch == '.') {
        return "_".repeat(value.len().max(1));
    }
    value
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}
