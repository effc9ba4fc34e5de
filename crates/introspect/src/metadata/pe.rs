use super::MetadataError;
use super::reader::ByteReader;

const DOS_MAGIC: &[u8; 2] = b"MZ";
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;
const CLI_DIRECTORY: u32 = 14;
const SECTION_HEADER_SIZE: usize = 40;

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_offset: u32,
    raw_size: u32,
}

/// Just enough of a PE/COFF image to reach the CLI metadata block.
pub(crate) struct PeImage<'a> {
    data: &'a [u8],
    sections: Vec<Section>,
    cli_rva: u32,
    cli_size: u32,
}

impl<'a> PeImage<'a> {
    pub(crate) fn parse(data: &'a [u8]) -> Result<Self, MetadataError> {
        if data.len() < 0x40 || &data[..2] != DOS_MAGIC {
            return Err(MetadataError::NotPe("missing MZ header"));
        }
        let mut reader = ByteReader::at(data, 0x3C)?;
        let pe_offset = reader.read_u32()? as usize;

        let mut reader = ByteReader::at(data, pe_offset)?;
        if reader.read_slice(4)? != PE_SIGNATURE {
            return Err(MetadataError::NotPe("missing PE signature"));
        }
        // COFF file header
        reader.skip(2)?;
        let section_count = reader.read_u16()? as usize;
        reader.skip(12)?;
        let optional_size = reader.read_u16()? as usize;
        reader.skip(2)?;

        let optional_start = reader.position();
        let magic = reader.read_u16()?;
        let (count_offset, directories_offset) = match magic {
            PE32_MAGIC => (92, 96),
            PE32_PLUS_MAGIC => (108, 112),
            _ => return Err(MetadataError::NotPe("unknown optional header magic")),
        };
        let directory_count = ByteReader::at(data, optional_start + count_offset)?.read_u32()?;
        let (cli_rva, cli_size) = if directory_count > CLI_DIRECTORY {
            let mut dir = ByteReader::at(
                data,
                optional_start + directories_offset + CLI_DIRECTORY as usize * 8,
            )?;
            (dir.read_u32()?, dir.read_u32()?)
        } else {
            (0, 0)
        };
        if cli_rva == 0 || cli_size == 0 {
            return Err(MetadataError::NotManaged);
        }

        let mut reader = ByteReader::at(data, optional_start + optional_size)?;
        let mut sections = Vec::with_capacity(section_count);
        for _ in 0..section_count {
            let header = reader.read_slice(SECTION_HEADER_SIZE)?;
            let mut fields = ByteReader::at(header, 8)?;
            let virtual_size = fields.read_u32()?;
            let virtual_address = fields.read_u32()?;
            let raw_size = fields.read_u32()?;
            let raw_offset = fields.read_u32()?;
            sections.push(Section {
                virtual_address,
                virtual_size,
                raw_offset,
                raw_size,
            });
        }

        Ok(Self {
            data,
            sections,
            cli_rva,
            cli_size,
        })
    }

    /// The metadata block referenced by the CLI header.
    pub(crate) fn metadata(&self) -> Result<&'a [u8], MetadataError> {
        let cli = self.slice_at_rva(self.cli_rva, self.cli_size)?;
        let mut reader = ByteReader::at(cli, 8)?;
        let rva = reader.read_u32()?;
        let size = reader.read_u32()?;
        self.slice_at_rva(rva, size)
    }

    fn slice_at_rva(&self, rva: u32, size: u32) -> Result<&'a [u8], MetadataError> {
        let section = self
            .sections
            .iter()
            .find(|section| {
                let extent = section.virtual_size.max(section.raw_size);
                rva >= section.virtual_address
                    && (rva - section.virtual_address) < extent
            })
            .ok_or(MetadataError::UnmappedRva { rva })?;
        let start = (rva - section.virtual_address) as usize + section.raw_offset as usize;
        let end = start
            .checked_add(size as usize)
            .filter(|end| *end <= self.data.len())
            .ok_or(MetadataError::UnexpectedEof { offset: start })?;
        Ok(&self.data[start..end])
    }
}
