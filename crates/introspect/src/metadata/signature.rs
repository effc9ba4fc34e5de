use super::MetadataError;
use super::model::{Primitive, TypeSig};
use super::reader::ByteReader;
use super::tables::{CodedIndex, TYPE_SPEC};

const ELEMENT_VOID: u8 = 0x01;
const ELEMENT_TYPEDBYREF: u8 = 0x16;
const ELEMENT_PTR: u8 = 0x0F;
const ELEMENT_BYREF: u8 = 0x10;
const ELEMENT_VALUETYPE: u8 = 0x11;
const ELEMENT_CLASS: u8 = 0x12;
const ELEMENT_VAR: u8 = 0x13;
const ELEMENT_ARRAY: u8 = 0x14;
const ELEMENT_GENERICINST: u8 = 0x15;
const ELEMENT_FNPTR: u8 = 0x1B;
const ELEMENT_SZARRAY: u8 = 0x1D;
const ELEMENT_MVAR: u8 = 0x1E;
const ELEMENT_CMOD_REQD: u8 = 0x1F;
const ELEMENT_CMOD_OPT: u8 = 0x20;
const ELEMENT_SENTINEL: u8 = 0x41;
const ELEMENT_PINNED: u8 = 0x45;

const CALLCONV_GENERIC: u8 = 0x10;
const CALLCONV_MASK: u8 = 0x0F;
const CALLCONV_PROPERTY: u8 = 0x08;

const MAX_DEPTH: usize = 64;

/// Lookups a signature needs from the surrounding module.
pub(crate) trait SignatureEnv {
    /// Name a `TypeDef` or `TypeRef` row.
    fn named_type(&self, table: usize, row: u32) -> Result<TypeSig, MetadataError>;

    /// Signature blob of a `TypeSpec` row.
    fn type_spec(&self, row: u32) -> Result<&[u8], MetadataError>;
}

/// Generic parameter names visible while decoding a signature.
#[derive(Clone, Copy, Default)]
pub(crate) struct GenericScope<'s> {
    pub(crate) type_params: &'s [String],
    pub(crate) method_params: &'s [String],
}

#[derive(Debug)]
pub(crate) struct RawMethodSig {
    pub(crate) return_type: TypeSig,
    pub(crate) params: Vec<TypeSig>,
}

pub(crate) struct SigDecoder<'e, E: ?Sized> {
    env: &'e E,
    scope: GenericScope<'e>,
}

impl<'e, E: SignatureEnv + ?Sized> SigDecoder<'e, E> {
    pub(crate) fn new(env: &'e E, scope: GenericScope<'e>) -> Self {
        Self { env, scope }
    }

    pub(crate) fn method(&self, blob: &[u8]) -> Result<RawMethodSig, MetadataError> {
        let mut reader = ByteReader::new(blob);
        let conv = reader.read_u8()?;
        if conv & CALLCONV_MASK == CALLCONV_PROPERTY {
            return Err(MetadataError::MalformedSignature(
                "expected a method signature",
            ));
        }
        if conv & CALLCONV_GENERIC != 0 {
            reader.read_compressed_u32()?;
        }
        let param_count = reader.read_compressed_u32()?;
        let return_type = self.ty(&mut reader, 0)?;
        let params = self.params(&mut reader, param_count, 0)?;
        Ok(RawMethodSig { return_type, params })
    }

    /// Decode a property signature into its type and indexer parameters.
    pub(crate) fn property(&self, blob: &[u8]) -> Result<(TypeSig, Vec<TypeSig>), MetadataError> {
        let mut reader = ByteReader::new(blob);
        let conv = reader.read_u8()?;
        if conv & CALLCONV_MASK != CALLCONV_PROPERTY {
            return Err(MetadataError::MalformedSignature(
                "expected a property signature",
            ));
        }
        let param_count = reader.read_compressed_u32()?;
        let ty = self.ty(&mut reader, 0)?;
        let params = self.params(&mut reader, param_count, 0)?;
        Ok((ty, params))
    }

    /// Decode a `TypeDefOrRef` coded index from a table column.
    pub(crate) fn type_def_or_ref(&self, coded: u32) -> Result<TypeSig, MetadataError> {
        self.coded_type(coded, 0)
    }

    fn coded_type(&self, coded: u32, depth: usize) -> Result<TypeSig, MetadataError> {
        let (table, row) = CodedIndex::TypeDefOrRef.decode(coded)?;
        if table == TYPE_SPEC {
            if depth >= MAX_DEPTH {
                return Err(MetadataError::MalformedSignature("type nesting too deep"));
            }
            let blob = self.env.type_spec(row)?;
            let mut reader = ByteReader::new(blob);
            return self.ty(&mut reader, depth + 1);
        }
        self.env.named_type(table, row)
    }

    fn params(
        &self,
        reader: &mut ByteReader<'_>,
        count: u32,
        depth: usize,
    ) -> Result<Vec<TypeSig>, MetadataError> {
        let mut params = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            if reader.peek_u8()? == ELEMENT_SENTINEL {
                reader.skip(1)?;
            }
            params.push(self.ty(reader, depth)?);
        }
        Ok(params)
    }

    fn ty(&self, reader: &mut ByteReader<'_>, depth: usize) -> Result<TypeSig, MetadataError> {
        if depth >= MAX_DEPTH {
            return Err(MetadataError::MalformedSignature("type nesting too deep"));
        }
        let next = depth + 1;
        let code = reader.read_u8()?;
        if let Some(primitive) = primitive(code) {
            return Ok(TypeSig::Primitive(primitive));
        }
        Ok(match code {
            ELEMENT_CMOD_REQD | ELEMENT_CMOD_OPT => {
                reader.read_compressed_u32()?;
                return self.ty(reader, next);
            }
            ELEMENT_PINNED => return self.ty(reader, next),
            ELEMENT_PTR => TypeSig::Pointer(Box::new(self.ty(reader, next)?)),
            ELEMENT_BYREF => TypeSig::ByRef(Box::new(self.ty(reader, next)?)),
            ELEMENT_VALUETYPE | ELEMENT_CLASS => {
                let coded = reader.read_compressed_u32()?;
                let mut ty = self.coded_type(coded, next)?;
                if let TypeSig::Named { value_type, .. } = &mut ty {
                    *value_type = code == ELEMENT_VALUETYPE;
                }
                ty
            }
            ELEMENT_VAR => {
                let index = reader.read_compressed_u32()?;
                TypeSig::TypeParam(param_name(self.scope.type_params, index, "T"))
            }
            ELEMENT_MVAR => {
                let index = reader.read_compressed_u32()?;
                TypeSig::MethodParam(param_name(self.scope.method_params, index, "TMethod"))
            }
            ELEMENT_SZARRAY => TypeSig::SzArray(Box::new(self.ty(reader, next)?)),
            ELEMENT_ARRAY => {
                let element = self.ty(reader, next)?;
                let rank = reader.read_compressed_u32()?;
                let sizes = reader.read_compressed_u32()?;
                for _ in 0..sizes {
                    reader.read_compressed_u32()?;
                }
                let lower_bounds = reader.read_compressed_u32()?;
                for _ in 0..lower_bounds {
                    reader.read_compressed_u32()?;
                }
                TypeSig::Array {
                    element: Box::new(element),
                    rank,
                }
            }
            ELEMENT_GENERICINST => {
                let kind = reader.read_u8()?;
                if kind != ELEMENT_CLASS && kind != ELEMENT_VALUETYPE {
                    return Err(MetadataError::MalformedSignature(
                        "generic instantiation of a non-type",
                    ));
                }
                let coded = reader.read_compressed_u32()?;
                let mut generic = self.coded_type(coded, next)?;
                let count = reader.read_compressed_u32()?;
                let mut instantiation = Vec::with_capacity(count.min(64) as usize);
                for _ in 0..count {
                    instantiation.push(self.ty(reader, next)?);
                }
                match &mut generic {
                    TypeSig::Named {
                        args, value_type, ..
                    } => {
                        *args = instantiation;
                        *value_type = kind == ELEMENT_VALUETYPE;
                    }
                    _ => {
                        return Err(MetadataError::MalformedSignature(
                            "generic instantiation of an unnamed type",
                        ));
                    }
                }
                generic
            }
            ELEMENT_FNPTR => {
                let nested = self.fn_ptr(reader, next)?;
                TypeSig::FnPtr {
                    return_type: Box::new(nested.return_type),
                    params: nested.params,
                }
            }
            other => return Err(MetadataError::UnsupportedElementType(other)),
        })
    }

    fn fn_ptr(&self, reader: &mut ByteReader<'_>, depth: usize) -> Result<RawMethodSig, MetadataError> {
        let conv = reader.read_u8()?;
        if conv & CALLCONV_GENERIC != 0 {
            reader.read_compressed_u32()?;
        }
        let param_count = reader.read_compressed_u32()?;
        let return_type = self.ty(reader, depth)?;
        let params = self.params(reader, param_count, depth)?;
        Ok(RawMethodSig { return_type, params })
    }
}

fn primitive(code: u8) -> Option<Primitive> {
    Some(match code {
        ELEMENT_VOID => Primitive::Void,
        0x02 => Primitive::Bool,
        0x03 => Primitive::Char,
        0x04 => Primitive::SByte,
        0x05 => Primitive::Byte,
        0x06 => Primitive::Int16,
        0x07 => Primitive::UInt16,
        0x08 => Primitive::Int32,
        0x09 => Primitive::UInt32,
        0x0A => Primitive::Int64,
        0x0B => Primitive::UInt64,
        0x0C => Primitive::Single,
        0x0D => Primitive::Double,
        0x0E => Primitive::String,
        ELEMENT_TYPEDBYREF => Primitive::TypedReference,
        0x18 => Primitive::IntPtr,
        0x19 => Primitive::UIntPtr,
        0x1C => Primitive::Object,
        _ => return None,
    })
}

fn param_name(names: &[String], index: u32, prefix: &str) -> String {
    names
        .get(index as usize)
        .cloned()
        .unwrap_or_else(|| format!("{prefix}{}", index + 1))
}
