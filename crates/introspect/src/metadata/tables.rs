use std::ops::Range;

use super::MetadataError;
use super::reader::ByteReader;

pub(crate) const MODULE: usize = 0x00;
pub(crate) const TYPE_REF: usize = 0x01;
pub(crate) const TYPE_DEF: usize = 0x02;
pub(crate) const FIELD_PTR: usize = 0x03;
pub(crate) const FIELD: usize = 0x04;
pub(crate) const METHOD_PTR: usize = 0x05;
pub(crate) const METHOD_DEF: usize = 0x06;
pub(crate) const PARAM_PTR: usize = 0x07;
pub(crate) const PARAM: usize = 0x08;
pub(crate) const INTERFACE_IMPL: usize = 0x09;
pub(crate) const MEMBER_REF: usize = 0x0A;
pub(crate) const CONSTANT: usize = 0x0B;
pub(crate) const CUSTOM_ATTRIBUTE: usize = 0x0C;
pub(crate) const FIELD_MARSHAL: usize = 0x0D;
pub(crate) const DECL_SECURITY: usize = 0x0E;
pub(crate) const CLASS_LAYOUT: usize = 0x0F;
pub(crate) const FIELD_LAYOUT: usize = 0x10;
pub(crate) const STAND_ALONE_SIG: usize = 0x11;
pub(crate) const EVENT_MAP: usize = 0x12;
pub(crate) const EVENT_PTR: usize = 0x13;
pub(crate) const EVENT: usize = 0x14;
pub(crate) const PROPERTY_MAP: usize = 0x15;
pub(crate) const PROPERTY_PTR: usize = 0x16;
pub(crate) const PROPERTY: usize = 0x17;
pub(crate) const METHOD_SEMANTICS: usize = 0x18;
pub(crate) const METHOD_IMPL: usize = 0x19;
pub(crate) const MODULE_REF: usize = 0x1A;
pub(crate) const TYPE_SPEC: usize = 0x1B;
pub(crate) const IMPL_MAP: usize = 0x1C;
pub(crate) const FIELD_RVA: usize = 0x1D;
pub(crate) const ENC_LOG: usize = 0x1E;
pub(crate) const ENC_MAP: usize = 0x1F;
pub(crate) const ASSEMBLY: usize = 0x20;
pub(crate) const ASSEMBLY_PROCESSOR: usize = 0x21;
pub(crate) const ASSEMBLY_OS: usize = 0x22;
pub(crate) const ASSEMBLY_REF: usize = 0x23;
pub(crate) const ASSEMBLY_REF_PROCESSOR: usize = 0x24;
pub(crate) const ASSEMBLY_REF_OS: usize = 0x25;
pub(crate) const FILE: usize = 0x26;
pub(crate) const EXPORTED_TYPE: usize = 0x27;
pub(crate) const MANIFEST_RESOURCE: usize = 0x28;
pub(crate) const NESTED_CLASS: usize = 0x29;
pub(crate) const GENERIC_PARAM: usize = 0x2A;
pub(crate) const METHOD_SPEC: usize = 0x2B;
pub(crate) const GENERIC_PARAM_CONSTRAINT: usize = 0x2C;

pub(crate) const TABLE_COUNT: usize = 0x2D;

const HEAP_STRINGS_WIDE: u8 = 0x01;
const HEAP_GUID_WIDE: u8 = 0x02;
const HEAP_BLOB_WIDE: u8 = 0x04;
const HEAP_EXTRA_DATA: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodedIndex {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndex {
    fn tag_bits(self) -> u32 {
        match self {
            Self::HasFieldMarshal
            | Self::HasSemantics
            | Self::MethodDefOrRef
            | Self::MemberForwarded
            | Self::TypeOrMethodDef => 1,
            Self::TypeDefOrRef
            | Self::HasConstant
            | Self::HasDeclSecurity
            | Self::Implementation
            | Self::ResolutionScope => 2,
            Self::MemberRefParent | Self::CustomAttributeType => 3,
            Self::HasCustomAttribute => 5,
        }
    }

    /// Tables addressed by each tag value. `CustomAttributeType` lists only
    /// the tables that count towards its width; its tags are never decoded.
    fn tables(self) -> &'static [usize] {
        match self {
            Self::TypeDefOrRef => &[TYPE_DEF, TYPE_REF, TYPE_SPEC],
            Self::HasConstant => &[FIELD, PARAM, PROPERTY],
            Self::HasCustomAttribute => &[
                METHOD_DEF,
                FIELD,
                TYPE_REF,
                TYPE_DEF,
                PARAM,
                INTERFACE_IMPL,
                MEMBER_REF,
                MODULE,
                DECL_SECURITY,
                PROPERTY,
                EVENT,
                STAND_ALONE_SIG,
                MODULE_REF,
                TYPE_SPEC,
                ASSEMBLY,
                ASSEMBLY_REF,
                FILE,
                EXPORTED_TYPE,
                MANIFEST_RESOURCE,
                GENERIC_PARAM,
                GENERIC_PARAM_CONSTRAINT,
                METHOD_SPEC,
            ],
            Self::HasFieldMarshal => &[FIELD, PARAM],
            Self::HasDeclSecurity => &[TYPE_DEF, METHOD_DEF, ASSEMBLY],
            Self::MemberRefParent => &[TYPE_DEF, TYPE_REF, MODULE_REF, METHOD_DEF, TYPE_SPEC],
            Self::HasSemantics => &[EVENT, PROPERTY],
            Self::MethodDefOrRef => &[METHOD_DEF, MEMBER_REF],
            Self::MemberForwarded => &[FIELD, METHOD_DEF],
            Self::Implementation => &[FILE, ASSEMBLY_REF, EXPORTED_TYPE],
            Self::CustomAttributeType => &[METHOD_DEF, MEMBER_REF],
            Self::ResolutionScope => &[MODULE, MODULE_REF, ASSEMBLY_REF, TYPE_REF],
            Self::TypeOrMethodDef => &[TYPE_DEF, METHOD_DEF],
        }
    }

    /// Split a coded value into `(table, row)`. Row 0 means null.
    pub(crate) fn decode(self, value: u32) -> Result<(usize, u32), MetadataError> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let table = self
            .tables()
            .get(tag)
            .copied()
            .filter(|_| self != Self::CustomAttributeType)
            .ok_or(MetadataError::BadCodedIndex { value })?;
        Ok((table, value >> bits))
    }
}

#[derive(Debug, Clone, Copy)]
enum Column {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Index(usize),
    Coded(CodedIndex),
}

fn schema(table: usize) -> &'static [Column] {
    use CodedIndex as C;
    use Column::*;
    match table {
        MODULE => &[U16, Str, Guid, Guid, Guid],
        TYPE_REF => &[Coded(C::ResolutionScope), Str, Str],
        TYPE_DEF => &[
            U32,
            Str,
            Str,
            Coded(C::TypeDefOrRef),
            Index(FIELD),
            Index(METHOD_DEF),
        ],
        FIELD_PTR => &[Index(FIELD)],
        FIELD => &[U16, Str, Blob],
        METHOD_PTR => &[Index(METHOD_DEF)],
        METHOD_DEF => &[U32, U16, U16, Str, Blob, Index(PARAM)],
        PARAM_PTR => &[Index(PARAM)],
        PARAM => &[U16, U16, Str],
        INTERFACE_IMPL => &[Index(TYPE_DEF), Coded(C::TypeDefOrRef)],
        MEMBER_REF => &[Coded(C::MemberRefParent), Str, Blob],
        // the one-byte type is followed by a padding byte
        CONSTANT => &[U16, Coded(C::HasConstant), Blob],
        CUSTOM_ATTRIBUTE => &[
            Coded(C::HasCustomAttribute),
            Coded(C::CustomAttributeType),
            Blob,
        ],
        FIELD_MARSHAL => &[Coded(C::HasFieldMarshal), Blob],
        DECL_SECURITY => &[U16, Coded(C::HasDeclSecurity), Blob],
        CLASS_LAYOUT => &[U16, U32, Index(TYPE_DEF)],
        FIELD_LAYOUT => &[U32, Index(FIELD)],
        STAND_ALONE_SIG => &[Blob],
        EVENT_MAP => &[Index(TYPE_DEF), Index(EVENT)],
        EVENT_PTR => &[Index(EVENT)],
        EVENT => &[U16, Str, Coded(C::TypeDefOrRef)],
        PROPERTY_MAP => &[Index(TYPE_DEF), Index(PROPERTY)],
        PROPERTY_PTR => &[Index(PROPERTY)],
        PROPERTY => &[U16, Str, Blob],
        METHOD_SEMANTICS => &[U16, Index(METHOD_DEF), Coded(C::HasSemantics)],
        METHOD_IMPL => &[
            Index(TYPE_DEF),
            Coded(C::MethodDefOrRef),
            Coded(C::MethodDefOrRef),
        ],
        MODULE_REF => &[Str],
        TYPE_SPEC => &[Blob],
        IMPL_MAP => &[U16, Coded(C::MemberForwarded), Str, Index(MODULE_REF)],
        FIELD_RVA => &[U32, Index(FIELD)],
        ENC_LOG => &[U32, U32],
        ENC_MAP => &[U32],
        ASSEMBLY => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
        ASSEMBLY_PROCESSOR => &[U32],
        ASSEMBLY_OS => &[U32, U32, U32],
        ASSEMBLY_REF => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
        ASSEMBLY_REF_PROCESSOR => &[U32, Index(ASSEMBLY_REF)],
        ASSEMBLY_REF_OS => &[U32, U32, U32, Index(ASSEMBLY_REF)],
        FILE => &[U32, Str, Blob],
        EXPORTED_TYPE => &[U32, U32, Str, Str, Coded(C::Implementation)],
        MANIFEST_RESOURCE => &[U32, U32, Str, Coded(C::Implementation)],
        NESTED_CLASS => &[Index(TYPE_DEF), Index(TYPE_DEF)],
        GENERIC_PARAM => &[U16, U16, Coded(C::TypeOrMethodDef), Str],
        METHOD_SPEC => &[Coded(C::MethodDefOrRef), Blob],
        GENERIC_PARAM_CONSTRAINT => &[Index(GENERIC_PARAM), Coded(C::TypeDefOrRef)],
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ColumnLayout {
    offset: usize,
    width: usize,
}

#[derive(Debug, Clone, Default)]
struct TableLayout {
    rows: u32,
    start: usize,
    row_size: usize,
    columns: Vec<ColumnLayout>,
}

/// The `#~` (or uncompressed `#-`) tables stream.
pub(crate) struct TableStream<'a> {
    data: &'a [u8],
    tables: Vec<TableLayout>,
}

impl<'a> TableStream<'a> {
    pub(crate) fn parse(data: &'a [u8]) -> Result<Self, MetadataError> {
        let mut reader = ByteReader::new(data);
        reader.skip(6)?; // reserved, major, minor
        let heap_sizes = reader.read_u8()?;
        reader.skip(1)?;
        let valid = reader.read_u64()?;
        reader.skip(8)?; // sorted

        let mut rows = [0u32; TABLE_COUNT];
        for bit in 0..64u32 {
            if valid & (1u64 << bit) == 0 {
                continue;
            }
            if bit as usize >= TABLE_COUNT {
                return Err(MetadataError::UnsupportedTable(bit));
            }
            rows[bit as usize] = reader.read_u32()?;
        }
        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            reader.skip(4)?;
        }

        let widths = Widths {
            rows: &rows,
            strings: if heap_sizes & HEAP_STRINGS_WIDE != 0 { 4 } else { 2 },
            guid: if heap_sizes & HEAP_GUID_WIDE != 0 { 4 } else { 2 },
            blob: if heap_sizes & HEAP_BLOB_WIDE != 0 { 4 } else { 2 },
        };

        let mut cursor = reader.position();
        let mut tables = Vec::with_capacity(TABLE_COUNT);
        for (table, row_count) in rows.iter().enumerate() {
            let mut columns = Vec::new();
            let mut row_size = 0;
            for column in schema(table) {
                let width = widths.of(*column);
                columns.push(ColumnLayout {
                    offset: row_size,
                    width,
                });
                row_size += width;
            }
            let size = row_size
                .checked_mul(*row_count as usize)
                .ok_or(MetadataError::UnexpectedEof { offset: cursor })?;
            tables.push(TableLayout {
                rows: *row_count,
                start: cursor,
                row_size,
                columns,
            });
            cursor = cursor
                .checked_add(size)
                .ok_or(MetadataError::UnexpectedEof { offset: cursor })?;
        }
        if cursor > data.len() {
            return Err(MetadataError::UnexpectedEof { offset: data.len() });
        }

        Ok(Self { data, tables })
    }

    pub(crate) fn row_count(&self, table: usize) -> u32 {
        self.tables.get(table).map(|layout| layout.rows).unwrap_or(0)
    }

    /// Read column `column` of 1-based `row`.
    pub(crate) fn read(&self, table: usize, row: u32, column: usize) -> Result<u32, MetadataError> {
        let layout = self
            .tables
            .get(table)
            .filter(|layout| row >= 1 && row <= layout.rows)
            .ok_or(MetadataError::RowOutOfRange { table, row })?;
        let cell = layout
            .columns
            .get(column)
            .ok_or(MetadataError::RowOutOfRange { table, row })?;
        let offset = layout.start + (row as usize - 1) * layout.row_size + cell.offset;
        let mut reader = ByteReader::at(self.data, offset)?;
        match cell.width {
            2 => reader.read_u16().map(u32::from),
            _ => reader.read_u32(),
        }
    }

    /// Resolve a logical row through an optional `*Ptr` indirection table.
    pub(crate) fn indirect(&self, ptr_table: usize, row: u32) -> Result<u32, MetadataError> {
        if self.row_count(ptr_table) == 0 {
            return Ok(row);
        }
        self.read(ptr_table, row, 0)
    }

    /// Rows of `target` owned by `owner_row`, where `column` holds the first
    /// index of a run that ends where the next owner's run starts.
    pub(crate) fn list(
        &self,
        owner: usize,
        owner_row: u32,
        column: usize,
        target: usize,
        ptr_table: usize,
    ) -> Result<Vec<u32>, MetadataError> {
        let range = self.list_range(owner, owner_row, column, target, ptr_table)?;
        range.map(|row| self.indirect(ptr_table, row)).collect()
    }

    fn list_range(
        &self,
        owner: usize,
        owner_row: u32,
        column: usize,
        target: usize,
        ptr_table: usize,
    ) -> Result<Range<u32>, MetadataError> {
        let limit = match self.row_count(ptr_table) {
            0 => self.row_count(target),
            rows => rows,
        } + 1;
        let start = self.read(owner, owner_row, column)?.min(limit);
        let end = if owner_row < self.row_count(owner) {
            self.read(owner, owner_row + 1, column)?.min(limit)
        } else {
            limit
        };
        Ok(start.max(1)..end.max(start.max(1)))
    }
}

struct Widths<'r> {
    rows: &'r [u32; TABLE_COUNT],
    strings: usize,
    guid: usize,
    blob: usize,
}

impl Widths<'_> {
    fn of(&self, column: Column) -> usize {
        match column {
            Column::U16 => 2,
            Column::U32 => 4,
            Column::Str => self.strings,
            Column::Guid => self.guid,
            Column::Blob => self.blob,
            Column::Index(table) => {
                if self.rows[table] < 0x1_0000 {
                    2
                } else {
                    4
                }
            }
            Column::Coded(coded) => {
                let max_rows = coded
                    .tables()
                    .iter()
                    .map(|table| self.rows[*table])
                    .max()
                    .unwrap_or(0);
                if max_rows < (1u32 << (16 - coded.tag_bits())) {
                    2
                } else {
                    4
                }
            }
        }
    }
}
