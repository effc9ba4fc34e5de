use super::MetadataError;

/// Little-endian cursor over a byte slice.
#[derive(Clone)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn at(data: &'a [u8], pos: usize) -> Result<Self, MetadataError> {
        if pos > data.len() {
            return Err(MetadataError::UnexpectedEof { offset: pos });
        }
        Ok(Self { data, pos })
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, MetadataError> {
        let value = *self
            .data
            .get(self.pos)
            .ok_or(MetadataError::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(value)
    }

    pub(crate) fn peek_u8(&self) -> Result<u8, MetadataError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(MetadataError::UnexpectedEof { offset: self.pos })
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, MetadataError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, MetadataError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, MetadataError> {
        let low = self.read_u32()? as u64;
        let high = self.read_u32()? as u64;
        Ok(low | (high << 32))
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8], MetadataError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(MetadataError::UnexpectedEof { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), MetadataError> {
        self.read_slice(len).map(|_| ())
    }

    /// Read a NUL-terminated string, then skip padding up to the next 4-byte
    /// boundary relative to the start of the underlying slice.
    pub(crate) fn read_padded_cstr(&mut self) -> Result<&'a str, MetadataError> {
        let start = self.pos;
        let len = self.data[start..]
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(MetadataError::UnexpectedEof { offset: start })?;
        let raw = &self.data[start..start + len];
        self.pos = start + len + 1;
        let aligned = (self.pos + 3) & !3;
        self.pos = aligned.min(self.data.len());
        std::str::from_utf8(raw).map_err(|_| MetadataError::InvalidName { offset: start })
    }

    /// ECMA-335 II.23.2 compressed unsigned integer.
    pub(crate) fn read_compressed_u32(&mut self) -> Result<u32, MetadataError> {
        let offset = self.pos;
        let first = self.read_u8()? as u32;
        if first & 0x80 == 0 {
            return Ok(first);
        }
        if first & 0xC0 == 0x80 {
            let second = self.read_u8()? as u32;
            return Ok(((first & 0x3F) << 8) | second);
        }
        if first & 0xE0 == 0xC0 {
            let rest = self.read_slice(3)?;
            return Ok(((first & 0x1F) << 24)
                | ((rest[0] as u32) << 16)
                | ((rest[1] as u32) << 8)
                | rest[2] as u32);
        }
        Err(MetadataError::BadCompressedInt { offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_compressed_integers() {
        let samples: [(&[u8], u32); 6] = [
            (&[0x03], 0x03),
            (&[0x7F], 0x7F),
            (&[0x80, 0x80], 0x80),
            (&[0xAE, 0x57], 0x2E57),
            (&[0xBF, 0xFF], 0x3FFF),
            (&[0xC0, 0x00, 0x40, 0x00], 0x4000),
        ];
        for (bytes, expected) in samples {
            let mut reader = ByteReader::new(bytes);
            assert_eq!(reader.read_compressed_u32().unwrap(), expected);
            assert_eq!(reader.position(), bytes.len());
        }
    }

    #[test]
    fn rejects_invalid_compressed_prefix() {
        let mut reader = ByteReader::new(&[0xFF, 0, 0, 0]);
        assert!(matches!(
            reader.read_compressed_u32(),
            Err(MetadataError::BadCompressedInt { offset: 0 })
        ));
    }

    #[test]
    fn padded_strings_align_to_four_bytes() {
        let data = b"#~\0\0#Strings\0\0\0\0X";
        let mut reader = ByteReader::new(data);
        assert_eq!(reader.read_padded_cstr().unwrap(), "#~");
        assert_eq!(reader.position(), 4);
        assert_eq!(reader.read_padded_cstr().unwrap(), "#Strings");
        assert_eq!(reader.position(), 16);
        assert_eq!(reader.read_u8().unwrap(), b'X');
    }

    #[test]
    fn reads_past_end_fail() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        assert!(reader.read_u32().is_err());
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
    }
}
