use serde::Serialize;

use crate::archive::ArchiveEntry;
use crate::metadata::{CliMetadataReader, MetadataReader, ModuleMetadata, TypeInfo};

/// Identity of one declared type, as matched against queries and returned
/// by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    /// Raw metadata name, e.g. ``IMaze`1``.
    pub name: String,
    /// Namespace-qualified name, empty for types outside any namespace.
    pub full_name: String,
    pub generic_arity: usize,
    /// File name of the module that declares the type.
    pub origin_module_file_name: String,
}

impl TypeDescriptor {
    pub fn new(ty: &TypeInfo, entry: &ArchiveEntry) -> Self {
        let full_name = if ty.namespace.is_empty() && !ty.is_nested {
            String::new()
        } else {
            ty.full_name.clone()
        };
        Self {
            name: ty.name.clone(),
            full_name,
            generic_arity: ty.generic_arity,
            origin_module_file_name: entry.file_name().to_string(),
        }
    }

    pub fn is_generic(&self) -> bool {
        self.generic_arity > 0
    }
}

/// Turns archive entries into module metadata, skipping anything that does
/// not load.
pub struct ModuleLoader {
    reader: Box<dyn MetadataReader>,
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new(CliMetadataReader)
    }
}

impl ModuleLoader {
    pub fn new(reader: impl MetadataReader + 'static) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }

    /// `None` for native images, corrupt files and malformed metadata.
    pub fn load(&self, entry: &ArchiveEntry) -> Option<ModuleMetadata> {
        match self.reader.read(&entry.bytes) {
            Ok(module) => {
                tracing::debug!(
                    entry = %entry.path,
                    format = self.reader.format(),
                    types = module.types.len(),
                    "loaded module"
                );
                Some(module)
            }
            Err(err) => {
                tracing::debug!(entry = %entry.path, error = %err, "skipping unloadable module");
                None
            }
        }
    }
}
