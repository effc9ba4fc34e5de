use super::MetadataError;
use super::reader::ByteReader;

/// The `#Strings` heap: NUL-terminated UTF-8 identifiers.
#[derive(Clone, Copy)]
pub(crate) struct StringHeap<'a>(&'a [u8]);

impl<'a> StringHeap<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self(data)
    }

    pub(crate) fn get(&self, index: u32) -> Result<&'a str, MetadataError> {
        let start = index as usize;
        let tail = self.0.get(start..).ok_or(MetadataError::HeapIndex {
            heap: "#Strings",
            index,
        })?;
        let len = tail.iter().position(|byte| *byte == 0).unwrap_or(tail.len());
        std::str::from_utf8(&tail[..len]).map_err(|_| MetadataError::InvalidName { offset: start })
    }
}

/// The `#Blob` heap: length-prefixed byte runs holding signatures.
#[derive(Clone, Copy)]
pub(crate) struct BlobHeap<'a>(&'a [u8]);

impl<'a> BlobHeap<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self(data)
    }

    pub(crate) fn get(&self, index: u32) -> Result<&'a [u8], MetadataError> {
        if index as usize >= self.0.len() {
            return Err(MetadataError::HeapIndex {
                heap: "#Blob",
                index,
            });
        }
        let mut reader = ByteReader::at(self.0, index as usize)?;
        let len = reader.read_compressed_u32()? as usize;
        reader.read_slice(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_nul_terminated() {
        let heap = StringHeap::new(b"\0IMaze`1\0Demo.Mazes\0");
        assert_eq!(heap.get(0).unwrap(), "");
        assert_eq!(heap.get(1).unwrap(), "IMaze`1");
        assert_eq!(heap.get(9).unwrap(), "Demo.Mazes");
        assert!(heap.get(64).is_err());
    }

    #[test]
    fn blobs_are_length_prefixed() {
        let heap = BlobHeap::new(&[0, 3, 0x20, 0x00, 0x01, 1, 0x08]);
        assert_eq!(heap.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(heap.get(1).unwrap(), &[0x20, 0x00, 0x01]);
        assert_eq!(heap.get(5).unwrap(), &[0x08]);
        assert!(heap.get(6).is_err());
    }
}
