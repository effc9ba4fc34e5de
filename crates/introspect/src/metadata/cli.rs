use std::collections::{HashMap, HashSet};

use super::heaps::{BlobHeap, StringHeap};
use super::model::{
    Access, EventInfo, GenericParam, Member, MethodInfo, MethodSig, ModuleMetadata, ParamInfo,
    ParamMode, PropertyInfo, PropertySig, TypeInfo, TypeKind, TypeSig, Variance,
};
use super::pe::PeImage;
use super::reader::ByteReader;
use super::signature::{GenericScope, SigDecoder, SignatureEnv};
use super::tables::{
    CUSTOM_ATTRIBUTE, CodedIndex, EVENT, EVENT_MAP, EVENT_PTR, GENERIC_PARAM,
    GENERIC_PARAM_CONSTRAINT, INTERFACE_IMPL, MEMBER_REF, METHOD_DEF, METHOD_PTR,
    METHOD_SEMANTICS, MODULE, NESTED_CLASS, PARAM, PARAM_PTR, PROPERTY, PROPERTY_MAP,
    PROPERTY_PTR, TYPE_DEF, TYPE_REF, TYPE_SPEC, TableStream,
};
use super::{MetadataError, MetadataReader};

const METADATA_SIGNATURE: u32 = 0x424A_5342;

const TYPE_VISIBILITY_MASK: u32 = 0x07;
const TYPE_PUBLIC: u32 = 0x01;
const TYPE_NESTED_PUBLIC: u32 = 0x02;
const TYPE_INTERFACE: u32 = 0x20;

const METHOD_ACCESS_MASK: u32 = 0x07;
const METHOD_FAMILY: u32 = 0x04;
const METHOD_FAM_OR_ASSEM: u32 = 0x05;
const METHOD_PUBLIC: u32 = 0x06;
const METHOD_STATIC: u32 = 0x10;
const METHOD_ABSTRACT: u32 = 0x400;
const METHOD_RT_SPECIAL_NAME: u32 = 0x1000;

const PARAM_IN: u32 = 0x01;
const PARAM_OUT: u32 = 0x02;

const SEMANTICS_SETTER: u32 = 0x01;
const SEMANTICS_GETTER: u32 = 0x02;
const SEMANTICS_ADD_ON: u32 = 0x08;

const GENERIC_VARIANCE_MASK: u32 = 0x03;
const GENERIC_COVARIANT: u32 = 0x01;
const GENERIC_CONTRAVARIANT: u32 = 0x02;
const GENERIC_REFERENCE_TYPE: u32 = 0x04;
const GENERIC_VALUE_TYPE: u32 = 0x08;
const GENERIC_DEFAULT_CTOR: u32 = 0x10;

const MAX_NESTING: usize = 64;

/// [`MetadataReader`] for PE images carrying ECMA-335 CLI metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliMetadataReader;

impl MetadataReader for CliMetadataReader {
    fn format(&self) -> &'static str {
        "ecma-335"
    }

    fn read(&self, bytes: &[u8]) -> Result<ModuleMetadata, MetadataError> {
        let image = PeImage::parse(bytes)?;
        let streams = Streams::parse(image.metadata()?)?;
        let module = Module {
            tables: TableStream::parse(streams.tables)?,
            strings: StringHeap::new(streams.strings),
            blobs: BlobHeap::new(streams.blobs),
        };
        module.build()
    }
}

struct Streams<'a> {
    tables: &'a [u8],
    strings: &'a [u8],
    blobs: &'a [u8],
}

impl<'a> Streams<'a> {
    fn parse(root: &'a [u8]) -> Result<Self, MetadataError> {
        let mut reader = ByteReader::new(root);
        let signature = reader.read_u32()?;
        if signature != METADATA_SIGNATURE {
            return Err(MetadataError::BadSignature(signature));
        }
        reader.skip(8)?; // major, minor, reserved
        let version_len = reader.read_u32()? as usize;
        reader.skip(version_len)?;
        reader.skip(2)?; // flags
        let count = reader.read_u16()?;

        let mut tables = None;
        let mut strings = None;
        let mut blobs: &[u8] = &[];
        for _ in 0..count {
            let offset = reader.read_u32()? as usize;
            let size = reader.read_u32()? as usize;
            let name = reader.read_padded_cstr()?;
            let data = offset
                .checked_add(size)
                .and_then(|end| root.get(offset..end))
                .ok_or_else(|| MetadataError::StreamOutOfBounds {
                    name: name.to_string(),
                })?;
            match name {
                "#~" | "#-" => tables = Some(data),
                "#Strings" => strings = Some(data),
                "#Blob" => blobs = data,
                _ => {}
            }
        }

        Ok(Self {
            tables: tables.ok_or(MetadataError::MissingStream("#~"))?,
            strings: strings.ok_or(MetadataError::MissingStream("#Strings"))?,
            blobs,
        })
    }
}

struct Module<'a> {
    tables: TableStream<'a>,
    strings: StringHeap<'a>,
    blobs: BlobHeap<'a>,
}

impl SignatureEnv for Module<'_> {
    fn named_type(&self, table: usize, row: u32) -> Result<TypeSig, MetadataError> {
        if table != TYPE_DEF && table != TYPE_REF {
            return Err(MetadataError::RowOutOfRange { table, row });
        }
        let name = self.string(table, row, 1)?;
        let namespace = self.string(table, row, 2)?;
        Ok(TypeSig::named(namespace, name))
    }

    fn type_spec(&self, row: u32) -> Result<&[u8], MetadataError> {
        self.blobs.get(self.tables.read(TYPE_SPEC, row, 0)?)
    }
}

/// Owner lookups gathered once per module from the sorted auxiliary tables.
#[derive(Default)]
struct ModuleIndex {
    enclosing: HashMap<u32, u32>,
    generic_params: HashMap<(usize, u32), Vec<u32>>,
    constraints: HashMap<u32, Vec<u32>>,
    interfaces: HashMap<u32, Vec<u32>>,
    properties: HashMap<u32, Vec<u32>>,
    events: HashMap<u32, Vec<u32>>,
    /// method row -> (semantics, associated table, associated row)
    semantics: HashMap<u32, (u32, usize, u32)>,
    /// (associated table, row) -> [(semantics, method row)]
    accessors: HashMap<(usize, u32), Vec<(u32, u32)>>,
    params_arrays: HashSet<u32>,
}

impl Module<'_> {
    fn string(&self, table: usize, row: u32, column: usize) -> Result<String, MetadataError> {
        let index = self.tables.read(table, row, column)?;
        self.strings.get(index).map(str::to_owned)
    }

    fn build(&self) -> Result<ModuleMetadata, MetadataError> {
        let name = if self.tables.row_count(MODULE) > 0 {
            self.string(MODULE, 1, 1)?
        } else {
            String::new()
        };
        let index = self.index()?;
        let mut types = Vec::new();
        for row in 1..=self.tables.row_count(TYPE_DEF) {
            if row == 1 && self.string(TYPE_DEF, row, 1)? == "<Module>" {
                continue;
            }
            types.push(self.type_info(row, &index)?);
        }
        Ok(ModuleMetadata { name, types })
    }

    fn index(&self) -> Result<ModuleIndex, MetadataError> {
        let tables = &self.tables;
        let mut index = ModuleIndex::default();

        for row in 1..=tables.row_count(NESTED_CLASS) {
            let nested = tables.read(NESTED_CLASS, row, 0)?;
            let enclosing = tables.read(NESTED_CLASS, row, 1)?;
            index.enclosing.insert(nested, enclosing);
        }

        let mut generic: HashMap<(usize, u32), Vec<(u32, u32)>> = HashMap::new();
        for row in 1..=tables.row_count(GENERIC_PARAM) {
            let number = tables.read(GENERIC_PARAM, row, 0)?;
            let owner = CodedIndex::TypeOrMethodDef.decode(tables.read(GENERIC_PARAM, row, 2)?)?;
            generic.entry(owner).or_default().push((number, row));
        }
        for (owner, mut params) in generic {
            params.sort_unstable();
            index
                .generic_params
                .insert(owner, params.into_iter().map(|(_, row)| row).collect());
        }

        for row in 1..=tables.row_count(GENERIC_PARAM_CONSTRAINT) {
            let owner = tables.read(GENERIC_PARAM_CONSTRAINT, row, 0)?;
            let constraint = tables.read(GENERIC_PARAM_CONSTRAINT, row, 1)?;
            index.constraints.entry(owner).or_default().push(constraint);
        }

        for row in 1..=tables.row_count(INTERFACE_IMPL) {
            let class = tables.read(INTERFACE_IMPL, row, 0)?;
            let interface = tables.read(INTERFACE_IMPL, row, 1)?;
            index.interfaces.entry(class).or_default().push(interface);
        }

        for row in 1..=tables.row_count(PROPERTY_MAP) {
            let parent = tables.read(PROPERTY_MAP, row, 0)?;
            let properties = tables.list(PROPERTY_MAP, row, 1, PROPERTY, PROPERTY_PTR)?;
            index.properties.entry(parent).or_default().extend(properties);
        }

        for row in 1..=tables.row_count(EVENT_MAP) {
            let parent = tables.read(EVENT_MAP, row, 0)?;
            let events = tables.list(EVENT_MAP, row, 1, EVENT, EVENT_PTR)?;
            index.events.entry(parent).or_default().extend(events);
        }

        for row in 1..=tables.row_count(METHOD_SEMANTICS) {
            let semantics = tables.read(METHOD_SEMANTICS, row, 0)?;
            let method = tables.read(METHOD_SEMANTICS, row, 1)?;
            let association =
                CodedIndex::HasSemantics.decode(tables.read(METHOD_SEMANTICS, row, 2)?)?;
            index
                .semantics
                .insert(method, (semantics, association.0, association.1));
            index
                .accessors
                .entry(association)
                .or_default()
                .push((semantics, method));
        }

        for row in 1..=tables.row_count(CUSTOM_ATTRIBUTE) {
            let (parent_table, parent_row) =
                CodedIndex::HasCustomAttribute.decode(tables.read(CUSTOM_ATTRIBUTE, row, 0)?)?;
            if parent_table != PARAM {
                continue;
            }
            if self.is_params_array_ctor(tables.read(CUSTOM_ATTRIBUTE, row, 1)?)? {
                index.params_arrays.insert(parent_row);
            }
        }

        Ok(index)
    }

    /// `CustomAttributeType` tags: 2 = MethodDef, 3 = MemberRef.
    fn is_params_array_ctor(&self, coded: u32) -> Result<bool, MetadataError> {
        if coded & 0x7 != 3 {
            return Ok(false);
        }
        let member = coded >> 3;
        let (table, row) = CodedIndex::MemberRefParent.decode(self.tables.read(MEMBER_REF, member, 0)?)?;
        if table != TYPE_REF {
            return Ok(false);
        }
        Ok(self.string(TYPE_REF, row, 1)? == "ParamArrayAttribute"
            && self.string(TYPE_REF, row, 2)? == "System")
    }

    fn type_info(&self, row: u32, index: &ModuleIndex) -> Result<TypeInfo, MetadataError> {
        let flags = self.tables.read(TYPE_DEF, row, 0)?;
        let name = self.string(TYPE_DEF, row, 1)?;
        let own_namespace = self.string(TYPE_DEF, row, 2)?;
        let kind = self.kind(flags, self.tables.read(TYPE_DEF, row, 3)?)?;
        let chain = enclosing_chain(row, index);

        let (namespace, full_name, is_public) = match chain.first() {
            None => {
                let full_name = if own_namespace.is_empty() {
                    name.clone()
                } else {
                    format!("{own_namespace}.{name}")
                };
                let is_public = flags & TYPE_VISIBILITY_MASK == TYPE_PUBLIC;
                (own_namespace, full_name, is_public)
            }
            Some(outermost) => {
                let outer_flags = self.tables.read(TYPE_DEF, *outermost, 0)?;
                let outer_namespace = self.string(TYPE_DEF, *outermost, 2)?;
                let mut full_name = outer_namespace.clone();
                let mut is_public = outer_flags & TYPE_VISIBILITY_MASK == TYPE_PUBLIC;
                for (position, outer) in chain.iter().enumerate() {
                    if position > 0 {
                        let nested_flags = self.tables.read(TYPE_DEF, *outer, 0)?;
                        is_public &= nested_flags & TYPE_VISIBILITY_MASK == TYPE_NESTED_PUBLIC;
                    }
                    let segment = self.string(TYPE_DEF, *outer, 1)?;
                    match position {
                        0 if full_name.is_empty() => full_name = segment,
                        0 => full_name = format!("{full_name}.{segment}"),
                        _ => full_name = format!("{full_name}+{segment}"),
                    }
                }
                full_name = format!("{full_name}+{name}");
                is_public &= flags & TYPE_VISIBILITY_MASK == TYPE_NESTED_PUBLIC;
                (outer_namespace, full_name, is_public)
            }
        };

        let param_names = self.generic_param_names((TYPE_DEF, row), index)?;
        let scope = GenericScope {
            type_params: &param_names,
            method_params: &[],
        };
        let decoder = SigDecoder::new(self, scope);
        let generic_params = self.generic_params((TYPE_DEF, row), index, &decoder)?;

        let inherited = match chain.last() {
            Some(outer) => index
                .generic_params
                .get(&(TYPE_DEF, *outer))
                .map_or(0, Vec::len),
            None => 0,
        };
        let generic_arity = arity_suffix(&name)
            .unwrap_or_else(|| generic_params.len().saturating_sub(inherited));

        let (interfaces, members) = if kind == TypeKind::Interface {
            let interfaces = index
                .interfaces
                .get(&row)
                .into_iter()
                .flatten()
                .map(|coded| decoder.type_def_or_ref(*coded).map_err(|err| err.to_string()))
                .collect();
            (interfaces, self.members(row, index, &param_names)?)
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(TypeInfo {
            name,
            namespace,
            full_name,
            kind,
            is_public,
            is_nested: !chain.is_empty(),
            generic_params,
            generic_arity,
            interfaces,
            members,
        })
    }

    fn kind(&self, flags: u32, extends: u32) -> Result<TypeKind, MetadataError> {
        if flags & TYPE_INTERFACE != 0 {
            return Ok(TypeKind::Interface);
        }
        let (table, row) = CodedIndex::TypeDefOrRef.decode(extends)?;
        if row == 0 || table == TYPE_SPEC {
            return Ok(TypeKind::Class);
        }
        let Ok(base) = self.named_type(table, row) else {
            return Ok(TypeKind::Class);
        };
        Ok(if base.is_named("System", "Enum") {
            TypeKind::Enum
        } else if base.is_named("System", "ValueType") {
            TypeKind::Struct
        } else if base.is_named("System", "MulticastDelegate") {
            TypeKind::Delegate
        } else {
            TypeKind::Class
        })
    }

    fn generic_param_names(
        &self,
        owner: (usize, u32),
        index: &ModuleIndex,
    ) -> Result<Vec<String>, MetadataError> {
        index
            .generic_params
            .get(&owner)
            .map(|rows| {
                rows.iter()
                    .map(|row| self.string(GENERIC_PARAM, *row, 3))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn generic_params(
        &self,
        owner: (usize, u32),
        index: &ModuleIndex,
        decoder: &SigDecoder<'_, Self>,
    ) -> Result<Vec<GenericParam>, MetadataError> {
        let Some(rows) = index.generic_params.get(&owner) else {
            return Ok(Vec::new());
        };
        let mut params = Vec::with_capacity(rows.len());
        for row in rows {
            let flags = self.tables.read(GENERIC_PARAM, *row, 1)?;
            let constraints = index
                .constraints
                .get(row)
                .into_iter()
                .flatten()
                .map(|coded| decoder.type_def_or_ref(*coded).map_err(|err| err.to_string()))
                .collect();
            params.push(GenericParam {
                name: self.string(GENERIC_PARAM, *row, 3)?,
                variance: match flags & GENERIC_VARIANCE_MASK {
                    GENERIC_COVARIANT => Variance::Covariant,
                    GENERIC_CONTRAVARIANT => Variance::Contravariant,
                    _ => Variance::Invariant,
                },
                reference_type: flags & GENERIC_REFERENCE_TYPE != 0,
                value_type: flags & GENERIC_VALUE_TYPE != 0,
                default_constructor: flags & GENERIC_DEFAULT_CTOR != 0,
                constraints,
            });
        }
        Ok(params)
    }

    /// Members in method-table order; properties and events appear at their
    /// first accessor, accessor-less ones after all methods.
    fn members(
        &self,
        row: u32,
        index: &ModuleIndex,
        type_params: &[String],
    ) -> Result<Vec<Member>, MetadataError> {
        let methods = self
            .tables
            .list(TYPE_DEF, row, 5, METHOD_DEF, METHOD_PTR)?;
        let mut members = Vec::new();
        let mut emitted: HashSet<(usize, u32)> = HashSet::new();

        for method in methods {
            if let Some((_, table, association)) = index.semantics.get(&method) {
                let key = (*table, *association);
                if emitted.insert(key)
                    && let Some(member) = self.associated_member(key, index, type_params)?
                {
                    members.push(member);
                }
                continue;
            }
            let flags = self.tables.read(METHOD_DEF, method, 2)?;
            if flags & METHOD_RT_SPECIAL_NAME != 0 {
                continue;
            }
            let Some(access) = method_access(flags) else {
                continue;
            };
            members.push(Member::Method(self.method_info(
                method,
                flags,
                access,
                index,
                type_params,
            )?));
        }

        let leftovers = index
            .properties
            .get(&row)
            .into_iter()
            .flatten()
            .map(|property| (PROPERTY, *property))
            .chain(
                index
                    .events
                    .get(&row)
                    .into_iter()
                    .flatten()
                    .map(|event| (EVENT, *event)),
            );
        for key in leftovers.collect::<Vec<_>>() {
            if emitted.insert(key)
                && let Some(member) = self.associated_member(key, index, type_params)?
            {
                members.push(member);
            }
        }
        Ok(members)
    }

    fn method_info(
        &self,
        method: u32,
        flags: u32,
        access: Access,
        index: &ModuleIndex,
        type_params: &[String],
    ) -> Result<MethodInfo, MetadataError> {
        let name = self.string(METHOD_DEF, method, 3)?;
        let method_params = self.generic_param_names((METHOD_DEF, method), index)?;
        let decoder = SigDecoder::new(
            self,
            GenericScope {
                type_params,
                method_params: &method_params,
            },
        );
        let generic_params = self.generic_params((METHOD_DEF, method), index, &decoder)?;
        let signature = self
            .method_signature(method, index, &decoder)
            .map_err(|err| err.to_string());
        Ok(MethodInfo {
            name,
            access,
            is_static: flags & METHOD_STATIC != 0,
            is_abstract: flags & METHOD_ABSTRACT != 0,
            generic_params,
            signature,
        })
    }

    fn method_signature(
        &self,
        method: u32,
        index: &ModuleIndex,
        decoder: &SigDecoder<'_, Self>,
    ) -> Result<MethodSig, MetadataError> {
        let blob = self.blobs.get(self.tables.read(METHOD_DEF, method, 4)?)?;
        let raw = decoder.method(blob)?;
        let declared = self.param_rows(method)?;
        let params = raw
            .params
            .into_iter()
            .enumerate()
            .map(|(position, ty)| {
                let sequence = position as u32 + 1;
                let (flags, name, row) = declared
                    .get(&sequence)
                    .cloned()
                    .unwrap_or_else(|| (0, format!("arg{sequence}"), 0));
                let mut param = param_info(name, flags, ty);
                param.is_params_array = row != 0 && index.params_arrays.contains(&row);
                param
            })
            .collect();
        Ok(MethodSig {
            return_type: raw.return_type,
            params,
        })
    }

    /// Param rows of a method keyed by sequence: `(flags, name, row)`.
    fn param_rows(&self, method: u32) -> Result<HashMap<u32, (u32, String, u32)>, MetadataError> {
        let mut rows = HashMap::new();
        for row in self.tables.list(METHOD_DEF, method, 5, PARAM, PARAM_PTR)? {
            let flags = self.tables.read(PARAM, row, 0)?;
            let sequence = self.tables.read(PARAM, row, 1)?;
            let name = self.string(PARAM, row, 2)?;
            rows.insert(sequence, (flags, name, row));
        }
        Ok(rows)
    }

    fn associated_member(
        &self,
        (table, row): (usize, u32),
        index: &ModuleIndex,
        type_params: &[String],
    ) -> Result<Option<Member>, MetadataError> {
        let accessors: Vec<(u32, u32, u32)> = index
            .accessors
            .get(&(table, row))
            .into_iter()
            .flatten()
            .map(|(semantics, method)| {
                self.tables
                    .read(METHOD_DEF, *method, 2)
                    .map(|flags| (*semantics, *method, flags))
            })
            .collect::<Result<_, _>>()?;
        let visible: Vec<(u32, u32, u32, Access)> = accessors
            .iter()
            .filter_map(|(semantics, method, flags)| {
                method_access(*flags).map(|access| (*semantics, *method, *flags, access))
            })
            .collect();
        if !accessors.is_empty() && visible.is_empty() {
            return Ok(None);
        }
        let access = if visible.is_empty()
            || visible
                .iter()
                .any(|(_, _, _, access)| *access == Access::Public)
        {
            Access::Public
        } else {
            Access::Protected
        };
        let is_static = visible
            .iter()
            .any(|(_, _, flags, _)| flags & METHOD_STATIC != 0);
        let has = |wanted: u32| {
            visible
                .iter()
                .find(|(semantics, ..)| semantics & wanted != 0)
                .map(|(_, method, ..)| *method)
        };
        let decoder = SigDecoder::new(
            self,
            GenericScope {
                type_params,
                method_params: &[],
            },
        );

        if table == PROPERTY {
            let name = self.string(PROPERTY, row, 1)?;
            let getter = has(SEMANTICS_GETTER);
            let setter = has(SEMANTICS_SETTER);
            let signature = self
                .property_signature(row, getter.or(setter), &decoder)
                .map_err(|err| err.to_string());
            return Ok(Some(Member::Property(PropertyInfo {
                name,
                access,
                is_static,
                has_getter: getter.is_some(),
                has_setter: setter.is_some(),
                signature,
            })));
        }

        let name = self.string(EVENT, row, 1)?;
        let handler = self
            .tables
            .read(EVENT, row, 2)
            .and_then(|coded| decoder.type_def_or_ref(coded))
            .map_err(|err| err.to_string());
        let is_static = has(SEMANTICS_ADD_ON)
            .map(|method| {
                visible
                    .iter()
                    .any(|(_, m, flags, _)| *m == method && flags & METHOD_STATIC != 0)
            })
            .unwrap_or(is_static);
        Ok(Some(Member::Event(EventInfo {
            name,
            access,
            is_static,
            handler,
        })))
    }

    fn property_signature(
        &self,
        property: u32,
        accessor: Option<u32>,
        decoder: &SigDecoder<'_, Self>,
    ) -> Result<PropertySig, MetadataError> {
        let blob = self.blobs.get(self.tables.read(PROPERTY, property, 2)?)?;
        let (ty, raw_params) = decoder.property(blob)?;
        let declared = match accessor {
            Some(method) => self.param_rows(method)?,
            None => HashMap::new(),
        };
        let params = raw_params
            .into_iter()
            .enumerate()
            .map(|(position, ty)| {
                let sequence = position as u32 + 1;
                let (flags, name, _) = declared
                    .get(&sequence)
                    .cloned()
                    .unwrap_or_else(|| (0, format!("index{sequence}"), 0));
                param_info(name, flags, ty)
            })
            .collect();
        Ok(PropertySig { ty, params })
    }
}

fn method_access(flags: u32) -> Option<Access> {
    match flags & METHOD_ACCESS_MASK {
        METHOD_PUBLIC => Some(Access::Public),
        METHOD_FAMILY | METHOD_FAM_OR_ASSEM => Some(Access::Protected),
        _ => None,
    }
}

fn param_info(name: String, flags: u32, ty: TypeSig) -> ParamInfo {
    let (mode, ty) = match ty {
        TypeSig::ByRef(inner) => {
            let mode = match (flags & PARAM_IN != 0, flags & PARAM_OUT != 0) {
                (false, true) => ParamMode::Out,
                (true, false) => ParamMode::In,
                _ => ParamMode::Ref,
            };
            (mode, *inner)
        }
        other => (ParamMode::Value, other),
    };
    ParamInfo {
        name,
        mode,
        is_params_array: false,
        ty,
    }
}

/// Enclosing types of `row`, outermost first.
fn enclosing_chain(row: u32, index: &ModuleIndex) -> Vec<u32> {
    let mut chain = Vec::new();
    let mut current = row;
    while let Some(outer) = index.enclosing.get(&current).copied() {
        if outer == row || chain.contains(&outer) || chain.len() >= MAX_NESTING {
            break;
        }
        chain.push(outer);
        current = outer;
    }
    chain.reverse();
    chain
}

fn arity_suffix(name: &str) -> Option<usize> {
    name.rsplit_once('`')
        .and_then(|(_, digits)| digits.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Primitive;
    use crate::testing::{AssemblyBuilder, Ty, TypeDecl};

    fn read(image: &[u8]) -> ModuleMetadata {
        CliMetadataReader.read(image).expect("metadata")
    }

    fn find<'m>(module: &'m ModuleMetadata, full_name: &str) -> &'m TypeInfo {
        module
            .types
            .iter()
            .find(|ty| ty.full_name == full_name)
            .unwrap_or_else(|| panic!("{full_name} missing"))
    }

    #[test]
    fn reads_interfaces_with_generics_and_members() {
        let image = AssemblyBuilder::new("Demo.Mazes.dll")
            .ty(TypeDecl::interface("Demo.Mazes", "IMaze`1")
                .generic_param("T")
                .covariant()
                .implements(Ty::generic(
                    Ty::class("System.Collections.Generic", "IEnumerable`1"),
                    vec![Ty::Var(0)],
                ))
                .property("Width", Ty::Int32, true, false)
                .method("GetCell", Ty::Var(0), vec![("x", Ty::Int32), ("y", Ty::Int32)])
                .event("Changed", Ty::class("System", "EventHandler")))
            .build();
        let module = read(&image);
        assert_eq!(module.name, "Demo.Mazes.dll");

        let maze = find(&module, "Demo.Mazes.IMaze`1");
        assert!(maze.is_interface());
        assert!(maze.is_public);
        assert_eq!(maze.generic_arity, 1);
        assert_eq!(maze.generic_params[0].name, "T");
        assert_eq!(maze.generic_params[0].variance, Variance::Covariant);
        assert_eq!(
            maze.interfaces,
            vec![Ok(TypeSig::Named {
                namespace: "System.Collections.Generic".into(),
                name: "IEnumerable`1".into(),
                args: vec![TypeSig::TypeParam("T".into())],
                value_type: false,
            })]
        );

        let names: Vec<&str> = maze.members.iter().map(Member::name).collect();
        assert_eq!(names, ["Width", "GetCell", "Changed"]);
        let Member::Property(width) = &maze.members[0] else {
            panic!("expected property");
        };
        assert!(width.has_getter && !width.has_setter);
        assert_eq!(
            width.signature.as_ref().expect("sig").ty,
            TypeSig::Primitive(Primitive::Int32)
        );
        let Member::Method(get_cell) = &maze.members[1] else {
            panic!("expected method");
        };
        let sig = get_cell.signature.as_ref().expect("sig");
        assert_eq!(sig.return_type, TypeSig::TypeParam("T".into()));
        assert_eq!(sig.params[1].name, "y");
    }

    #[test]
    fn nested_types_use_plus_and_inherit_visibility() {
        let image = AssemblyBuilder::new("Nested.dll")
            .ty(TypeDecl::class("Demo", "Outer"))
            .ty(TypeDecl::interface("", "IInner").nested_in("Outer"))
            .ty(TypeDecl::class("Demo", "Hidden").internal())
            .ty(TypeDecl::interface("", "IShadow").nested_in("Hidden"))
            .build();
        let module = read(&image);

        let inner = find(&module, "Demo.Outer+IInner");
        assert!(inner.is_nested);
        assert!(inner.is_public);
        assert_eq!(inner.namespace, "Demo");
        assert_eq!(inner.name, "IInner");

        let shadow = find(&module, "Demo.Hidden+IShadow");
        assert!(!shadow.is_public);
    }

    #[test]
    fn params_modes_and_method_generics() {
        let image = AssemblyBuilder::new("Modes.dll")
            .ty(TypeDecl::interface("Demo", "IStore")
                .generic_method(
                    "TryGet",
                    vec!["TValue"],
                    Ty::Bool,
                    vec![
                        ("key", Ty::String),
                        ("value", Ty::Out(Box::new(Ty::MVar(0)))),
                    ],
                )
                .static_method("Create", Ty::local("IStore"), vec![]))
            .build();
        let module = read(&image);
        let store = find(&module, "Demo.IStore");

        let Member::Method(try_get) = &store.members[0] else {
            panic!("expected method");
        };
        assert_eq!(try_get.generic_params[0].name, "TValue");
        let sig = try_get.signature.as_ref().expect("sig");
        assert_eq!(sig.params[1].mode, ParamMode::Out);
        assert_eq!(sig.params[1].ty, TypeSig::MethodParam("TValue".into()));

        let Member::Method(create) = &store.members[1] else {
            panic!("expected method");
        };
        assert!(create.is_static);
        assert_eq!(
            create.signature.as_ref().expect("sig").return_type,
            TypeSig::named("Demo", "IStore")
        );
    }

    #[test]
    fn classes_and_structs_are_not_interfaces() {
        let image = AssemblyBuilder::new("Kinds.dll")
            .ty(TypeDecl::class("Demo", "Maze"))
            .ty(TypeDecl::structure("Demo", "Cell"))
            .build();
        let module = read(&image);
        assert_eq!(find(&module, "Demo.Maze").kind, TypeKind::Class);
        assert_eq!(find(&module, "Demo.Cell").kind, TypeKind::Struct);
        assert_eq!(module.interfaces().count(), 0);
    }

    #[test]
    fn unreadable_signatures_do_not_fail_the_module() {
        let image = AssemblyBuilder::new("Broken.dll")
            .ty(TypeDecl::interface("Demo", "IBroken").raw_method("Mystery", vec![0x20, 0x00, 0x42]))
            .build();
        let module = read(&image);
        let broken = find(&module, "Demo.IBroken");
        let Member::Method(mystery) = &broken.members[0] else {
            panic!("expected method");
        };
        assert!(mystery.signature.is_err());
    }

    #[test]
    fn undecodable_type_references_stay_local() {
        let unsupported = || Ty::Raw(vec![0x21, 0x00]);
        let image = AssemblyBuilder::new("Odd.dll")
            .ty(TypeDecl::interface("Demo", "IFoo"))
            .ty(TypeDecl::class("Demo", "Weird").implements(unsupported()))
            .ty(TypeDecl::interface("Demo", "IBox`1")
                .generic_param("T")
                .constraint(unsupported())
                .implements(unsupported())
                .implements(Ty::class("System", "IDisposable")))
            .build();
        let module = read(&image);

        assert!(find(&module, "Demo.IFoo").is_interface());
        let weird = find(&module, "Demo.Weird");
        assert!(weird.interfaces.is_empty() && weird.members.is_empty());

        let boxed = find(&module, "Demo.IBox`1");
        assert!(boxed.generic_params[0].constraints[0].is_err());
        assert!(boxed.interfaces[0].is_err());
        assert_eq!(
            boxed.interfaces[1],
            Ok(TypeSig::named("System", "IDisposable"))
        );
    }

    #[test]
    fn arity_suffix_parses_trailing_digits() {
        assert_eq!(arity_suffix("IMaze`1"), Some(1));
        assert_eq!(arity_suffix("IMap`2"), Some(2));
        assert_eq!(arity_suffix("IMaze"), None);
        assert_eq!(arity_suffix("Odd`x"), None);
    }
}
