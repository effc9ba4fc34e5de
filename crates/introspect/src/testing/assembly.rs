use std::collections::{BTreeMap, HashMap};

const FILE_ALIGNMENT: usize = 0x200;
const SECTION_RVA: u32 = 0x2000;
const CLI_HEADER_SIZE: usize = 72;
const PE_OFFSET: usize = 0x80;

const TYPE_PUBLIC: u32 = 0x01;
const TYPE_NESTED_PUBLIC: u32 = 0x02;
const TYPE_NESTED_ASSEMBLY: u32 = 0x05;
const TYPE_INTERFACE: u32 = 0x20;
const TYPE_ABSTRACT: u32 = 0x80;
const TYPE_SEALED: u32 = 0x100;
const TYPE_BEFORE_FIELD_INIT: u32 = 0x0010_0000;

const METHOD_PUBLIC: u32 = 0x06;
const METHOD_STATIC: u32 = 0x10;
const METHOD_VIRTUAL: u32 = 0x40;
const METHOD_HIDE_BY_SIG: u32 = 0x80;
const METHOD_NEW_SLOT: u32 = 0x100;
const METHOD_ABSTRACT: u32 = 0x400;
const METHOD_SPECIAL_NAME: u32 = 0x800;

const PARAM_IN: u32 = 0x01;
const PARAM_OUT: u32 = 0x02;

/// Signature types understood by [`AssemblyBuilder`].
#[derive(Debug, Clone)]
pub enum Ty {
    Void,
    Bool,
    Int32,
    Int64,
    String,
    Object,
    /// Type generic parameter by position.
    Var(u32),
    /// Method generic parameter by position.
    MVar(u32),
    SzArray(Box<Ty>),
    Ref(Box<Ty>),
    Out(Box<Ty>),
    In(Box<Ty>),
    /// Trailing `params` array of the given element type.
    ParamArray(Box<Ty>),
    Class {
        namespace: String,
        name: String,
    },
    ValueType {
        namespace: String,
        name: String,
    },
    /// A type declared in the same assembly, looked up by name.
    Local(String),
    Generic(Box<Ty>, Vec<Ty>),
    /// Pre-encoded signature bytes, emitted verbatim.
    Raw(Vec<u8>),
}

impl Ty {
    pub fn class(namespace: &str, name: &str) -> Self {
        Self::Class {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn value_type(namespace: &str, name: &str) -> Self {
        Self::ValueType {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn local(name: &str) -> Self {
        Self::Local(name.to_string())
    }

    pub fn generic(base: Ty, args: Vec<Ty>) -> Self {
        Self::Generic(Box::new(base), args)
    }

    pub fn array(element: Ty) -> Self {
        Self::SzArray(Box::new(element))
    }

    pub fn out(inner: Ty) -> Self {
        Self::Out(Box::new(inner))
    }

    fn param_flags(&self) -> u32 {
        match self {
            Self::Out(_) => PARAM_OUT,
            Self::In(_) => PARAM_IN,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclKind {
    Interface,
    Class,
    Struct,
}

#[derive(Debug, Clone)]
struct GenericParamDecl {
    name: String,
    flags: u32,
    constraints: Vec<Ty>,
}

#[derive(Debug, Clone)]
enum MemberDecl {
    Method {
        name: String,
        is_static: bool,
        generics: Vec<GenericParamDecl>,
        ret: Ty,
        params: Vec<(String, Ty)>,
        raw: Option<Vec<u8>>,
    },
    Property {
        name: String,
        ty: Ty,
        params: Vec<(String, Ty)>,
        getter: bool,
        setter: bool,
    },
    Event {
        name: String,
        handler: Ty,
    },
}

/// One type definition to emit.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    namespace: String,
    name: String,
    kind: DeclKind,
    public: bool,
    nested_in: Option<String>,
    generic_params: Vec<GenericParamDecl>,
    interfaces: Vec<Ty>,
    members: Vec<MemberDecl>,
}

impl TypeDecl {
    fn new(kind: DeclKind, namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            public: true,
            nested_in: None,
            generic_params: Vec::new(),
            interfaces: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn interface(namespace: &str, name: &str) -> Self {
        Self::new(DeclKind::Interface, namespace, name)
    }

    pub fn class(namespace: &str, name: &str) -> Self {
        Self::new(DeclKind::Class, namespace, name)
    }

    pub fn structure(namespace: &str, name: &str) -> Self {
        Self::new(DeclKind::Struct, namespace, name)
    }

    pub fn internal(mut self) -> Self {
        self.public = false;
        self
    }

    /// Nest inside a previously declared type with the given name.
    pub fn nested_in(mut self, enclosing: &str) -> Self {
        self.nested_in = Some(enclosing.to_string());
        self
    }

    pub fn generic_param(mut self, name: &str) -> Self {
        self.generic_params.push(GenericParamDecl {
            name: name.to_string(),
            flags: 0,
            constraints: Vec::new(),
        });
        self
    }

    /// Mark the last generic parameter `out`.
    pub fn covariant(self) -> Self {
        self.with_last_param(|param| param.flags |= 0x01)
    }

    /// Mark the last generic parameter `in`.
    pub fn contravariant(self) -> Self {
        self.with_last_param(|param| param.flags |= 0x02)
    }

    /// Add `class` to the last generic parameter's constraints.
    pub fn class_constraint(self) -> Self {
        self.with_last_param(|param| param.flags |= 0x04)
    }

    pub fn struct_constraint(self) -> Self {
        self.with_last_param(|param| {
            param.flags |= 0x08 | 0x10;
            param.constraints.push(Ty::class("System", "ValueType"));
        })
    }

    pub fn new_constraint(self) -> Self {
        self.with_last_param(|param| param.flags |= 0x10)
    }

    pub fn constraint(self, ty: Ty) -> Self {
        self.with_last_param(|param| param.constraints.push(ty))
    }

    fn with_last_param(mut self, update: impl FnOnce(&mut GenericParamDecl)) -> Self {
        if let Some(param) = self.generic_params.last_mut() {
            update(param);
        }
        self
    }

    pub fn implements(mut self, ty: Ty) -> Self {
        self.interfaces.push(ty);
        self
    }

    pub fn method(self, name: &str, ret: Ty, params: Vec<(&str, Ty)>) -> Self {
        self.push_method(name, false, Vec::new(), ret, params, None)
    }

    pub fn static_method(self, name: &str, ret: Ty, params: Vec<(&str, Ty)>) -> Self {
        self.push_method(name, true, Vec::new(), ret, params, None)
    }

    pub fn generic_method(
        self,
        name: &str,
        generics: Vec<&str>,
        ret: Ty,
        params: Vec<(&str, Ty)>,
    ) -> Self {
        let generics = generics
            .into_iter()
            .map(|name| GenericParamDecl {
                name: name.to_string(),
                flags: 0,
                constraints: Vec::new(),
            })
            .collect();
        self.push_method(name, false, generics, ret, params, None)
    }

    /// A method whose signature blob is written as given.
    pub fn raw_method(self, name: &str, signature: Vec<u8>) -> Self {
        self.push_method(name, false, Vec::new(), Ty::Void, Vec::new(), Some(signature))
    }

    fn push_method(
        mut self,
        name: &str,
        is_static: bool,
        generics: Vec<GenericParamDecl>,
        ret: Ty,
        params: Vec<(&str, Ty)>,
        raw: Option<Vec<u8>>,
    ) -> Self {
        self.members.push(MemberDecl::Method {
            name: name.to_string(),
            is_static,
            generics,
            ret,
            params: owned_params(params),
            raw,
        });
        self
    }

    pub fn property(mut self, name: &str, ty: Ty, getter: bool, setter: bool) -> Self {
        self.members.push(MemberDecl::Property {
            name: name.to_string(),
            ty,
            params: Vec::new(),
            getter,
            setter,
        });
        self
    }

    pub fn indexer(mut self, ty: Ty, params: Vec<(&str, Ty)>, getter: bool, setter: bool) -> Self {
        self.members.push(MemberDecl::Property {
            name: "Item".to_string(),
            ty,
            params: owned_params(params),
            getter,
            setter,
        });
        self
    }

    pub fn event(mut self, name: &str, handler: Ty) -> Self {
        self.members.push(MemberDecl::Event {
            name: name.to_string(),
            handler,
        });
        self
    }
}

fn owned_params(params: Vec<(&str, Ty)>) -> Vec<(String, Ty)> {
    params
        .into_iter()
        .map(|(name, ty)| (name.to_string(), ty))
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Cell {
    U16(u32),
    U32(u32),
    Str(u32),
    Guid(u32),
    Blob(u32),
    /// Simple or coded table index; always two bytes for the small images built here.
    Idx(u32),
}

/// Writes minimal PE32 images with ECMA-335 metadata describing the
/// declared types.
#[derive(Debug, Clone)]
pub struct AssemblyBuilder {
    module_name: String,
    types: Vec<TypeDecl>,
}

impl AssemblyBuilder {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            types: Vec::new(),
        }
    }

    pub fn ty(mut self, decl: TypeDecl) -> Self {
        self.types.push(decl);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let metadata = Emitter::new(&self.types).emit(&self.module_name);
        write_image(Some(&metadata))
    }

    /// A PE image without a CLI header, like a native library.
    pub fn native_image() -> Vec<u8> {
        write_image(None)
    }
}

struct Emitter<'d> {
    decls: &'d [TypeDecl],
    strings: Vec<u8>,
    string_index: HashMap<String, u32>,
    blobs: Vec<u8>,
    blob_index: HashMap<Vec<u8>, u32>,
    type_refs: Vec<(String, String)>,
    type_ref_index: HashMap<(String, String), u32>,
    type_specs: Vec<u32>,
    type_spec_index: HashMap<Vec<u8>, u32>,
    member_refs: Vec<Vec<Cell>>,
    tables: BTreeMap<usize, Vec<Vec<Cell>>>,
}

impl<'d> Emitter<'d> {
    fn new(decls: &'d [TypeDecl]) -> Self {
        Self {
            decls,
            strings: vec![0],
            string_index: HashMap::new(),
            blobs: vec![0],
            blob_index: HashMap::new(),
            type_refs: Vec::new(),
            type_ref_index: HashMap::new(),
            type_specs: Vec::new(),
            type_spec_index: HashMap::new(),
            member_refs: Vec::new(),
            tables: BTreeMap::new(),
        }
    }

    fn string(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(index) = self.string_index.get(value) {
            return *index;
        }
        let index = self.strings.len() as u32;
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        self.string_index.insert(value.to_string(), index);
        index
    }

    fn blob(&mut self, value: Vec<u8>) -> u32 {
        if let Some(index) = self.blob_index.get(&value) {
            return *index;
        }
        let index = self.blobs.len() as u32;
        compress(value.len() as u32, &mut self.blobs);
        self.blobs.extend_from_slice(&value);
        self.blob_index.insert(value, index);
        index
    }

    fn push(&mut self, table: usize, row: Vec<Cell>) -> u32 {
        let rows = self.tables.entry(table).or_default();
        rows.push(row);
        rows.len() as u32
    }

    fn type_row(&self, name: &str) -> Option<(u32, DeclKind)> {
        self.decls.iter().enumerate().find_map(|(position, decl)| {
            let full = if decl.namespace.is_empty() {
                decl.name.clone()
            } else {
                format!("{}.{}", decl.namespace, decl.name)
            };
            (decl.name == name || full == name).then_some((position as u32 + 2, decl.kind))
        })
    }

    fn type_ref(&mut self, namespace: &str, name: &str) -> u32 {
        let key = (namespace.to_string(), name.to_string());
        if let Some(row) = self.type_ref_index.get(&key) {
            return *row;
        }
        self.type_refs.push(key.clone());
        let row = self.type_refs.len() as u32;
        self.type_ref_index.insert(key, row);
        row
    }

    /// `TypeDefOrRef` coded value for a named type, or a TypeSpec otherwise.
    fn type_def_or_ref(&mut self, ty: &Ty) -> u32 {
        match ty {
            Ty::Class { namespace, name } | Ty::ValueType { namespace, name } => {
                (self.type_ref(namespace, name) << 2) | 1
            }
            Ty::Local(name) => match self.type_row(name) {
                Some((row, _)) => row << 2,
                None => (self.type_ref("", name) << 2) | 1,
            },
            other => {
                let mut signature = Vec::new();
                self.encode(other, &mut signature);
                let row = match self.type_spec_index.get(&signature) {
                    Some(row) => *row,
                    None => {
                        let blob = self.blob(signature.clone());
                        self.type_specs.push(blob);
                        let row = self.type_specs.len() as u32;
                        self.type_spec_index.insert(signature, row);
                        row
                    }
                };
                (row << 2) | 2
            }
        }
    }

    fn encode(&mut self, ty: &Ty, out: &mut Vec<u8>) {
        match ty {
            Ty::Void => out.push(0x01),
            Ty::Bool => out.push(0x02),
            Ty::Int32 => out.push(0x08),
            Ty::Int64 => out.push(0x0A),
            Ty::String => out.push(0x0E),
            Ty::Object => out.push(0x1C),
            Ty::Var(index) => {
                out.push(0x13);
                compress(*index, out);
            }
            Ty::MVar(index) => {
                out.push(0x1E);
                compress(*index, out);
            }
            Ty::SzArray(element) | Ty::ParamArray(element) => {
                out.push(0x1D);
                self.encode(element, out);
            }
            Ty::Ref(inner) | Ty::Out(inner) | Ty::In(inner) => {
                out.push(0x10);
                self.encode(inner, out);
            }
            Ty::Class { .. } => {
                out.push(0x12);
                let coded = self.type_def_or_ref(ty);
                compress(coded, out);
            }
            Ty::ValueType { .. } => {
                out.push(0x11);
                let coded = self.type_def_or_ref(ty);
                compress(coded, out);
            }
            Ty::Local(name) => {
                let is_struct = matches!(self.type_row(name), Some((_, DeclKind::Struct)));
                out.push(if is_struct { 0x11 } else { 0x12 });
                let coded = self.type_def_or_ref(ty);
                compress(coded, out);
            }
            Ty::Generic(base, args) => {
                out.push(0x15);
                let is_struct = match base.as_ref() {
                    Ty::ValueType { .. } => true,
                    Ty::Local(name) => matches!(self.type_row(name), Some((_, DeclKind::Struct))),
                    _ => false,
                };
                out.push(if is_struct { 0x11 } else { 0x12 });
                let coded = self.type_def_or_ref(base);
                compress(coded, out);
                compress(args.len() as u32, out);
                for arg in args {
                    self.encode(arg, out);
                }
            }
            Ty::Raw(bytes) => out.extend_from_slice(bytes),
        }
    }

    fn method_signature(&mut self, is_static: bool, generics: usize, ret: &Ty, params: &[&Ty]) -> u32 {
        let mut signature = Vec::new();
        let mut conv = if is_static { 0x00 } else { 0x20 };
        if generics > 0 {
            conv |= 0x10;
        }
        signature.push(conv);
        if generics > 0 {
            compress(generics as u32, &mut signature);
        }
        compress(params.len() as u32, &mut signature);
        self.encode(ret, &mut signature);
        for param in params {
            self.encode(param, &mut signature);
        }
        self.blob(signature)
    }

    fn params_array_ctor(&mut self) -> u32 {
        if self.member_refs.is_empty() {
            let parent = (self.type_ref("System", "ParamArrayAttribute") << 3) | 1;
            let name = self.string(".ctor");
            let signature = self.blob(vec![0x20, 0x00, 0x01]);
            self.member_refs
                .push(vec![Cell::Idx(parent), Cell::Str(name), Cell::Blob(signature)]);
        }
        1
    }

    /// Emit one method with its params; returns the MethodDef row.
    fn emit_method(
        &mut self,
        name: &str,
        flags: u32,
        signature: u32,
        params: &[(String, Ty)],
    ) -> u32 {
        let first_param = self.tables.get(&0x08).map_or(0, Vec::len) as u32 + 1;
        for (position, (param_name, ty)) in params.iter().enumerate() {
            let name_index = self.string(param_name);
            let param_row = self.push(
                0x08,
                vec![
                    Cell::U16(ty.param_flags()),
                    Cell::U16(position as u32 + 1),
                    Cell::Str(name_index),
                ],
            );
            if matches!(ty, Ty::ParamArray(_)) {
                let ctor = self.params_array_ctor();
                let value = self.blob(vec![0x01, 0x00, 0x00, 0x00]);
                self.push(
                    0x0C,
                    vec![
                        Cell::Idx((param_row << 5) | 4),
                        Cell::Idx((ctor << 3) | 3),
                        Cell::Blob(value),
                    ],
                );
            }
        }
        let name_index = self.string(name);
        self.push(
            0x06,
            vec![
                Cell::U32(0),
                Cell::U16(0),
                Cell::U16(flags),
                Cell::Str(name_index),
                Cell::Blob(signature),
                Cell::Idx(first_param),
            ],
        )
    }

    fn emit(mut self, module_name: &str) -> Vec<u8> {
        let module_name_index = self.string(module_name);
        self.push(
            0x00,
            vec![
                Cell::U16(0),
                Cell::Str(module_name_index),
                Cell::Guid(1),
                Cell::Guid(0),
                Cell::Guid(0),
            ],
        );
        let module_type = self.string("<Module>");
        self.push(
            0x02,
            vec![
                Cell::U32(0),
                Cell::Str(module_type),
                Cell::Str(0),
                Cell::Idx(0),
                Cell::Idx(1),
                Cell::Idx(1),
            ],
        );

        let mut generic_params: Vec<(u32, u32, GenericParamDecl)> = Vec::new();
        let mut property_rows = 0u32;
        let mut event_rows = 0u32;
        let decls = self.decls;

        for (position, decl) in decls.iter().enumerate() {
            let row = position as u32 + 2;
            let nested = decl.nested_in.is_some();
            let visibility = match (nested, decl.public) {
                (false, true) => TYPE_PUBLIC,
                (false, false) => 0,
                (true, true) => TYPE_NESTED_PUBLIC,
                (true, false) => TYPE_NESTED_ASSEMBLY,
            };
            let (flags, extends) = match decl.kind {
                DeclKind::Interface => (visibility | TYPE_INTERFACE | TYPE_ABSTRACT, 0),
                DeclKind::Class => (
                    visibility | TYPE_BEFORE_FIELD_INIT,
                    (self.type_ref("System", "Object") << 2) | 1,
                ),
                DeclKind::Struct => (
                    visibility | TYPE_SEALED | TYPE_BEFORE_FIELD_INIT,
                    (self.type_ref("System", "ValueType") << 2) | 1,
                ),
            };
            let interface = decl.kind == DeclKind::Interface;
            let method_list = self.tables.get(&0x06).map_or(0, Vec::len) as u32 + 1;
            let name = self.string(&decl.name);
            let namespace = self.string(&decl.namespace);
            self.push(
                0x02,
                vec![
                    Cell::U32(flags),
                    Cell::Str(name),
                    Cell::Str(namespace),
                    Cell::Idx(extends),
                    Cell::Idx(1),
                    Cell::Idx(method_list),
                ],
            );

            if let Some(enclosing) = &decl.nested_in {
                let outer = self.type_row(enclosing).map_or(0, |(outer, _)| outer);
                self.push(0x29, vec![Cell::Idx(row), Cell::Idx(outer)]);
            }
            for (number, param) in decl.generic_params.iter().enumerate() {
                generic_params.push((row << 1, number as u32, param.clone()));
            }
            for ty in &decl.interfaces {
                let coded = self.type_def_or_ref(ty);
                self.push(0x09, vec![Cell::Idx(row), Cell::Idx(coded)]);
            }

            let instance_flags = if interface {
                METHOD_PUBLIC | METHOD_VIRTUAL | METHOD_HIDE_BY_SIG | METHOD_NEW_SLOT | METHOD_ABSTRACT
            } else {
                METHOD_PUBLIC | METHOD_HIDE_BY_SIG
            };
            let mut opened_property_map = false;
            let mut opened_event_map = false;

            for member in &decl.members {
                match member {
                    MemberDecl::Method {
                        name,
                        is_static,
                        generics,
                        ret,
                        params,
                        raw,
                    } => {
                        let signature = match raw {
                            Some(bytes) => self.blob(bytes.clone()),
                            None => {
                                let types: Vec<&Ty> = params.iter().map(|(_, ty)| ty).collect();
                                self.method_signature(*is_static, generics.len(), ret, &types)
                            }
                        };
                        let flags = if *is_static {
                            METHOD_PUBLIC | METHOD_STATIC | METHOD_HIDE_BY_SIG
                        } else {
                            instance_flags
                        };
                        let method = self.emit_method(name, flags, signature, params);
                        for (number, param) in generics.iter().enumerate() {
                            generic_params.push(((method << 1) | 1, number as u32, param.clone()));
                        }
                    }
                    MemberDecl::Property {
                        name,
                        ty,
                        params,
                        getter,
                        setter,
                    } => {
                        if !opened_property_map {
                            opened_property_map = true;
                            self.push(0x15, vec![Cell::Idx(row), Cell::Idx(property_rows + 1)]);
                        }
                        let mut signature = vec![0x28];
                        compress(params.len() as u32, &mut signature);
                        self.encode(ty, &mut signature);
                        for (_, param) in params {
                            self.encode(param, &mut signature);
                        }
                        let signature = self.blob(signature);
                        let name_index = self.string(name);
                        property_rows = self.push(
                            0x17,
                            vec![Cell::U16(0), Cell::Str(name_index), Cell::Blob(signature)],
                        );
                        let association = (property_rows << 1) | 1;
                        let accessor_flags = instance_flags | METHOD_SPECIAL_NAME;
                        let param_types: Vec<&Ty> = params.iter().map(|(_, ty)| ty).collect();
                        if *getter {
                            let sig = self.method_signature(false, 0, ty, &param_types);
                            let method =
                                self.emit_method(&format!("get_{name}"), accessor_flags, sig, params);
                            self.push(
                                0x18,
                                vec![Cell::U16(0x02), Cell::Idx(method), Cell::Idx(association)],
                            );
                        }
                        if *setter {
                            let mut setter_params = params.clone();
                            setter_params.push(("value".to_string(), ty.clone()));
                            let types: Vec<&Ty> = setter_params.iter().map(|(_, ty)| ty).collect();
                            let sig = self.method_signature(false, 0, &Ty::Void, &types);
                            let method = self.emit_method(
                                &format!("set_{name}"),
                                accessor_flags,
                                sig,
                                &setter_params,
                            );
                            self.push(
                                0x18,
                                vec![Cell::U16(0x01), Cell::Idx(method), Cell::Idx(association)],
                            );
                        }
                    }
                    MemberDecl::Event { name, handler } => {
                        if !opened_event_map {
                            opened_event_map = true;
                            self.push(0x12, vec![Cell::Idx(row), Cell::Idx(event_rows + 1)]);
                        }
                        let handler_coded = self.type_def_or_ref(handler);
                        let name_index = self.string(name);
                        event_rows = self.push(
                            0x14,
                            vec![Cell::U16(0), Cell::Str(name_index), Cell::Idx(handler_coded)],
                        );
                        let association = event_rows << 1;
                        let accessor_flags = instance_flags | METHOD_SPECIAL_NAME;
                        let params = vec![("value".to_string(), handler.clone())];
                        for (prefix, semantics) in [("add_", 0x08), ("remove_", 0x10)] {
                            let sig = self.method_signature(false, 0, &Ty::Void, &[handler]);
                            let method = self.emit_method(
                                &format!("{prefix}{name}"),
                                accessor_flags,
                                sig,
                                &params,
                            );
                            self.push(
                                0x18,
                                vec![Cell::U16(semantics), Cell::Idx(method), Cell::Idx(association)],
                            );
                        }
                    }
                }
            }
        }

        generic_params.sort_by_key(|(owner, number, _)| (*owner, *number));
        for (owner, number, param) in generic_params {
            let name = self.string(&param.name);
            let param_row = self.push(
                0x2A,
                vec![
                    Cell::U16(number),
                    Cell::U16(param.flags),
                    Cell::Idx(owner),
                    Cell::Str(name),
                ],
            );
            for constraint in &param.constraints {
                let coded = self.type_def_or_ref(constraint);
                self.push(0x2C, vec![Cell::Idx(param_row), Cell::Idx(coded)]);
            }
        }

        for (namespace, name) in self.type_refs.clone() {
            let name = self.string(&name);
            let namespace = self.string(&namespace);
            // resolution scope: Module row 1
            self.push(0x01, vec![Cell::Idx(1 << 2), Cell::Str(name), Cell::Str(namespace)]);
        }
        for blob in self.type_specs.clone() {
            self.push(0x1B, vec![Cell::Blob(blob)]);
        }
        for row in std::mem::take(&mut self.member_refs) {
            self.push(0x0A, row);
        }
        let assembly_name = module_name.trim_end_matches(".dll").to_string();
        let assembly_name = self.string(&assembly_name);
        self.push(
            0x20,
            vec![
                Cell::U32(0x8004),
                Cell::U16(1),
                Cell::U16(0),
                Cell::U16(0),
                Cell::U16(0),
                Cell::U32(0),
                Cell::Blob(0),
                Cell::Str(assembly_name),
                Cell::Str(0),
            ],
        );

        self.metadata_root()
    }

    fn metadata_root(self) -> Vec<u8> {
        let wide_strings = self.strings.len() >= 0x1_0000;
        let wide_blobs = self.blobs.len() >= 0x1_0000;

        let mut tables = vec![0, 0, 0, 0, 2, 0];
        tables.push(u8::from(wide_strings) | (u8::from(wide_blobs) << 2));
        tables.push(1);
        let valid = self
            .tables
            .keys()
            .fold(0u64, |mask, table| mask | (1u64 << table));
        tables.extend_from_slice(&valid.to_le_bytes());
        tables.extend_from_slice(&0u64.to_le_bytes());
        for rows in self.tables.values() {
            tables.extend_from_slice(&(rows.len() as u32).to_le_bytes());
        }
        for rows in self.tables.values() {
            for row in rows {
                for cell in row {
                    match *cell {
                        Cell::U32(value) => tables.extend_from_slice(&value.to_le_bytes()),
                        Cell::Str(value) if wide_strings => {
                            tables.extend_from_slice(&value.to_le_bytes())
                        }
                        Cell::Blob(value) if wide_blobs => {
                            tables.extend_from_slice(&value.to_le_bytes())
                        }
                        Cell::U16(value)
                        | Cell::Str(value)
                        | Cell::Guid(value)
                        | Cell::Blob(value)
                        | Cell::Idx(value) => {
                            tables.extend_from_slice(&(value as u16).to_le_bytes())
                        }
                    }
                }
            }
        }

        let guids = [0x5Au8; 16].to_vec();
        let streams: [(&str, Vec<u8>); 4] = [
            ("#~", pad4(tables)),
            ("#Strings", pad4(self.strings)),
            ("#Blob", pad4(self.blobs)),
            ("#GUID", guids),
        ];

        let version = b"v4.0.30319\0\0";
        let header_len = 16
            + version.len()
            + 4
            + streams
                .iter()
                .map(|(name, _)| 8 + ((name.len() + 4) & !3))
                .sum::<usize>();

        let mut root = Vec::new();
        root.extend_from_slice(&0x424A_5342u32.to_le_bytes());
        root.extend_from_slice(&1u16.to_le_bytes());
        root.extend_from_slice(&1u16.to_le_bytes());
        root.extend_from_slice(&0u32.to_le_bytes());
        root.extend_from_slice(&(version.len() as u32).to_le_bytes());
        root.extend_from_slice(version);
        root.extend_from_slice(&0u16.to_le_bytes());
        root.extend_from_slice(&(streams.len() as u16).to_le_bytes());
        let mut offset = header_len;
        for (name, data) in &streams {
            root.extend_from_slice(&(offset as u32).to_le_bytes());
            root.extend_from_slice(&(data.len() as u32).to_le_bytes());
            let mut padded = name.as_bytes().to_vec();
            padded.resize((name.len() + 4) & !3, 0);
            root.extend_from_slice(&padded);
            offset += data.len();
        }
        for (_, data) in streams {
            root.extend_from_slice(&data);
        }
        root
    }
}

fn pad4(mut data: Vec<u8>) -> Vec<u8> {
    data.resize((data.len() + 3) & !3, 0);
    data
}

fn compress(value: u32, out: &mut Vec<u8>) {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 0x4000 {
        out.push(0x80 | (value >> 8) as u8);
        out.push(value as u8);
    } else {
        out.push(0xC0 | (value >> 24) as u8);
        out.push((value >> 16) as u8);
        out.push((value >> 8) as u8);
        out.push(value as u8);
    }
}

fn put_u16(image: &mut [u8], offset: usize, value: u16) {
    image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Lay out a single-section PE32 image. With `metadata`, the section starts
/// with a CLI header pointing at the metadata that follows it.
fn write_image(metadata: Option<&[u8]>) -> Vec<u8> {
    let mut section = Vec::new();
    if let Some(metadata) = metadata {
        let mut cli = vec![0u8; CLI_HEADER_SIZE];
        put_u32(&mut cli, 0, CLI_HEADER_SIZE as u32);
        put_u16(&mut cli, 4, 2);
        put_u16(&mut cli, 6, 5);
        put_u32(&mut cli, 8, SECTION_RVA + CLI_HEADER_SIZE as u32);
        put_u32(&mut cli, 12, metadata.len() as u32);
        put_u32(&mut cli, 16, 0x01); // ILONLY
        section.extend_from_slice(&cli);
        section.extend_from_slice(metadata);
    } else {
        section.extend_from_slice(&[0xC3; 16]);
    }
    let raw_size = section.len().div_ceil(FILE_ALIGNMENT) * FILE_ALIGNMENT;
    section.resize(raw_size, 0);

    let mut image = vec![0u8; FILE_ALIGNMENT];
    image[..2].copy_from_slice(b"MZ");
    put_u32(&mut image, 0x3C, PE_OFFSET as u32);
    image[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");

    let coff = PE_OFFSET + 4;
    put_u16(&mut image, coff, 0x014C);
    put_u16(&mut image, coff + 2, 1);
    put_u16(&mut image, coff + 16, 0xE0);
    put_u16(&mut image, coff + 18, 0x2102);

    let optional = coff + 20;
    put_u16(&mut image, optional, 0x10B);
    put_u32(&mut image, optional + 28, 0x0040_0000);
    put_u32(&mut image, optional + 32, 0x2000);
    put_u32(&mut image, optional + 36, FILE_ALIGNMENT as u32);
    put_u32(&mut image, optional + 56, SECTION_RVA + 0x2000);
    put_u32(&mut image, optional + 60, FILE_ALIGNMENT as u32);
    put_u16(&mut image, optional + 68, 3);
    put_u32(&mut image, optional + 92, 16);
    if metadata.is_some() {
        let cli_directory = optional + 96 + 14 * 8;
        put_u32(&mut image, cli_directory, SECTION_RVA);
        put_u32(&mut image, cli_directory + 4, CLI_HEADER_SIZE as u32);
    }

    let header = optional + 0xE0;
    image[header..header + 8].copy_from_slice(b".text\0\0\0");
    put_u32(&mut image, header + 8, raw_size as u32);
    put_u32(&mut image, header + 12, SECTION_RVA);
    put_u32(&mut image, header + 16, raw_size as u32);
    put_u32(&mut image, header + 20, FILE_ALIGNMENT as u32);
    put_u32(&mut image, header + 36, 0x6000_0020);

    image.extend_from_slice(&section);
    image
}
