//! Enumerating candidate modules inside a package archive.

use std::io::{Read, Seek};

use zip::ZipArchive;

use crate::error::ArchiveError;

/// Entries ending in this suffix (compared case-insensitively) are modules.
pub const MODULE_SUFFIX: &str = ".dll";

/// Upper bound for the up-front buffer reservation of one entry.
const MAX_RESERVE: u64 = 16 * 1024 * 1024;

/// A module-shaped entry pulled out of an archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path inside the archive, e.g. `lib/net8.0/Demo.Mazes.dll`.
    pub path: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }
}

pub fn is_module_path(path: &str) -> bool {
    path.len() >= MODULE_SUFFIX.len()
        && path.is_char_boundary(path.len() - MODULE_SUFFIX.len())
        && path[path.len() - MODULE_SUFFIX.len()..].eq_ignore_ascii_case(MODULE_SUFFIX)
}

/// Opens a package archive and hands out its module entries.
pub struct ArchiveScanner<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> ArchiveScanner<R> {
    pub fn open(reader: R) -> Result<Self, ArchiveError> {
        let archive = ZipArchive::new(reader).map_err(ArchiveError::Open)?;
        Ok(Self { archive })
    }

    /// Total number of entries, modules or not.
    pub fn entry_count(&self) -> usize {
        self.archive.len()
    }

    /// Lazily yield module entries in archive order. Each entry is read only
    /// when the iterator reaches it; the scanner is consumed.
    pub fn modules(self) -> ModuleEntries<R> {
        ModuleEntries {
            archive: self.archive,
            next: 0,
        }
    }
}

/// Iterator over the module entries of an archive. A failed entry is
/// reported as an `Err` item and iteration continues with the next one.
pub struct ModuleEntries<R: Read + Seek> {
    archive: ZipArchive<R>,
    next: usize,
}

impl<R: Read + Seek> Iterator for ModuleEntries<R> {
    type Item = Result<ArchiveEntry, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.archive.len() {
            let index = self.next;
            self.next += 1;
            let mut file = match self.archive.by_index(index) {
                Ok(file) => file,
                Err(source) => return Some(Err(ArchiveError::Entry { index, source })),
            };
            if file.is_dir() || !is_module_path(file.name()) {
                continue;
            }
            let path = file.name().to_string();
            let mut bytes = Vec::with_capacity(file.size().min(MAX_RESERVE) as usize);
            if let Err(source) = file.read_to_end(&mut bytes) {
                return Some(Err(ArchiveError::Read { path, source }));
            }
            tracing::trace!(entry = %path, size = bytes.len(), "read module entry");
            return Some(Ok(ArchiveEntry { path, bytes }));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NupkgBuilder;
    use std::io::Cursor;

    #[test]
    fn yields_only_module_entries_in_order() {
        let archive = NupkgBuilder::new("Demo.Mazes", "1.0.0")
            .directory("lib/net8.0.dll/")
            .entry("lib/net8.0/Demo.Mazes.dll", b"first".to_vec())
            .entry("lib/net8.0/Demo.Mazes.xml", b"docs".to_vec())
            .entry("runtimes/win-x64/native/NATIVE.DLL", b"second".to_vec())
            .entry("content/readme.txt", b"text".to_vec())
            .build();

        let scanner = ArchiveScanner::open(Cursor::new(archive)).expect("open");
        assert_eq!(scanner.entry_count(), 6);
        let entries: Vec<ArchiveEntry> = scanner
            .modules()
            .collect::<Result<_, _>>()
            .expect("entries");
        let paths: Vec<&str> = entries.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "lib/net8.0/Demo.Mazes.dll",
                "runtimes/win-x64/native/NATIVE.DLL"
            ]
        );
        assert_eq!(entries[0].bytes, b"first");
        assert_eq!(entries[1].file_name(), "NATIVE.DLL");
    }

    #[test]
    fn undecompressable_entry_is_reported_and_scanning_continues() {
        let archive = NupkgBuilder::new("Demo", "1.0.0")
            .entry("lib/a/Bad.dll", vec![0x42; 4096])
            .entry("lib/b/Good.dll", b"good".to_vec())
            .corrupt("lib/a/Bad.dll")
            .build();

        let mut modules = ArchiveScanner::open(Cursor::new(archive))
            .expect("open")
            .modules();
        match modules.next() {
            Some(Err(ArchiveError::Read { path, .. })) => assert_eq!(path, "lib/a/Bad.dll"),
            other => panic!("expected a read failure, got {other:?}"),
        }
        let good = modules.next().expect("second entry").expect("readable");
        assert_eq!(good.path, "lib/b/Good.dll");
        assert_eq!(good.bytes, b"good");
        assert!(modules.next().is_none());
    }

    #[test]
    fn rejects_non_zip_archives() {
        let err = ArchiveScanner::open(Cursor::new(b"not a zip".to_vec()))
            .err()
            .expect("invalid archive");
        assert!(matches!(err, ArchiveError::Open(_)));
        assert_eq!(err.to_string(), "package archive is not a readable zip file");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn suffix_match_is_case_insensitive() {
        assert!(is_module_path("lib/A.dll"));
        assert!(is_module_path("lib/A.DlL"));
        assert!(!is_module_path("lib/A.dll.config"));
        assert!(!is_module_path("dll"));
        assert!(!is_module_path("lib/é"));
    }
}
