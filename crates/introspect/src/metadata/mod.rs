//! Reading type definitions out of managed (ECMA-335) modules.
//!
//! The reader walks the PE image to the CLI header, locates the metadata
//! root and its streams, and decodes the tables and signature blobs that
//! describe types and their members. Native images and anything malformed
//! come back as [`MetadataError`] so callers can skip them.

mod cli;
mod heaps;
mod model;
mod pe;
mod reader;
mod signature;
mod tables;

use thiserror::Error;

pub use cli::CliMetadataReader;
pub use model::{
    Access, Decoded, EventInfo, GenericParam, Member, MethodInfo, MethodSig, ModuleMetadata,
    ParamInfo, ParamMode, Primitive, PropertyInfo, PropertySig, TypeInfo, TypeKind, TypeSig,
    Variance,
};

/// Turns raw module bytes into [`ModuleMetadata`].
pub trait MetadataReader: Send + Sync {
    /// Short label for logs.
    fn format(&self) -> &'static str;

    fn read(&self, bytes: &[u8]) -> Result<ModuleMetadata, MetadataError>;
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("not a PE image: {0}")]
    NotPe(&'static str),
    #[error("image has no CLI header")]
    NotManaged,
    #[error("RVA {rva:#x} is not mapped by any section")]
    UnmappedRva { rva: u32 },
    #[error("invalid metadata signature {0:#010x}")]
    BadSignature(u32),
    #[error("metadata stream {0} is missing")]
    MissingStream(&'static str),
    #[error("metadata stream {name} exceeds the metadata block")]
    StreamOutOfBounds { name: String },
    #[error("unsupported metadata table {0:#04x}")]
    UnsupportedTable(u32),
    #[error("row {row} is out of range for table {table:#04x}")]
    RowOutOfRange { table: usize, row: u32 },
    #[error("index {index} is out of range for the {heap} heap")]
    HeapIndex { heap: &'static str, index: u32 },
    #[error("invalid compressed integer at offset {offset}")]
    BadCompressedInt { offset: usize },
    #[error("invalid coded index {value:#x}")]
    BadCodedIndex { value: u32 },
    #[error("invalid UTF-8 name at offset {offset}")]
    InvalidName { offset: usize },
    #[error("unsupported element type {0:#04x} in signature")]
    UnsupportedElementType(u8),
    #[error("malformed signature: {0}")]
    MalformedSignature(&'static str),
}
