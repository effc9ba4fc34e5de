use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const LOCAL_HEADER_SIGNATURE: &[u8] = b"PK\x03\x04";
const LOCAL_HEADER_LEN: usize = 30;

/// Builds `.nupkg` archives in memory.
#[derive(Debug, Clone)]
pub struct NupkgBuilder {
    id: String,
    version: String,
    entries: Vec<(String, Vec<u8>)>,
    directories: Vec<String>,
    corrupted: Vec<String>,
}

impl NupkgBuilder {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            entries: Vec::new(),
            directories: Vec::new(),
            corrupted: Vec::new(),
        }
    }

    pub fn entry(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.entries.push((path.to_string(), bytes));
        self
    }

    pub fn directory(mut self, path: &str) -> Self {
        self.directories.push(path.to_string());
        self
    }

    /// Scramble the compressed bytes of an entry added with [`Self::entry`].
    /// The entry still opens but fails to decompress.
    pub fn corrupt(mut self, path: &str) -> Self {
        self.corrupted.push(path.to_string());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        writer
            .start_file(format!("{}.nuspec", self.id), options)
            .expect("start nuspec");
        writer
            .write_all(self.nuspec().as_bytes())
            .expect("write nuspec");
        for directory in &self.directories {
            writer
                .add_directory(directory.as_str(), options)
                .expect("add directory");
        }
        for (path, bytes) in &self.entries {
            writer.start_file(path.as_str(), options).expect("start entry");
            writer.write_all(bytes).expect("write entry");
        }
        let mut archive = writer.finish().expect("finish archive").into_inner();
        for path in &self.corrupted {
            scramble(&mut archive, path);
        }
        archive
    }

    fn nuspec(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{}</id>
    <version>{}</version>
    <authors>nupeek</authors>
    <description>test package</description>
  </metadata>
</package>
"#,
            self.id, self.version
        )
    }
}

fn scramble(archive: &mut [u8], path: &str) {
    let name = path.as_bytes();
    let header = archive
        .windows(LOCAL_HEADER_LEN + name.len())
        .position(|window| {
            window.starts_with(LOCAL_HEADER_SIGNATURE) && &window[LOCAL_HEADER_LEN..] == name
        })
        .expect("local header of corrupted entry");
    let compressed = u32::from_le_bytes(
        archive[header + 18..header + 22]
            .try_into()
            .expect("compressed size"),
    ) as usize;
    let extra = u16::from_le_bytes([archive[header + 28], archive[header + 29]]) as usize;
    let start = header + LOCAL_HEADER_LEN + name.len() + extra;
    for byte in &mut archive[start..start + compressed] {
        *byte ^= 0xA5;
    }
}
