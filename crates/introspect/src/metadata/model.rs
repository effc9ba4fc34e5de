/// Everything the introspector needs from one managed module.
#[derive(Debug, Clone, Default)]
pub struct ModuleMetadata {
    /// Module name recorded in the metadata (usually the file name).
    pub name: String,
    /// Type definitions in declaration order, `<Module>` excluded.
    pub types: Vec<TypeInfo>,
}

impl ModuleMetadata {
    pub fn interfaces(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types.iter().filter(|ty| ty.is_interface())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Interface,
    Class,
    Struct,
    Enum,
    Delegate,
}

impl TypeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Interface => "interface",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Delegate => "delegate",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Raw metadata name, including any arity suffix such as ``IMaze`1``.
    pub name: String,
    /// Namespace; nested types report the namespace of their outermost type.
    pub namespace: String,
    /// Namespace-qualified name, nested types joined with `+`.
    pub full_name: String,
    pub kind: TypeKind,
    /// Public, or nested public inside a visible type.
    pub is_public: bool,
    pub is_nested: bool,
    /// All generic parameters, including those re-declared from enclosing types.
    pub generic_params: Vec<GenericParam>,
    /// Number of trailing generic parameters the type introduces itself.
    pub generic_arity: usize,
    /// Implemented interfaces; left empty for types other than interfaces.
    pub interfaces: Vec<Decoded<TypeSig>>,
    /// Declared members; left empty for types other than interfaces.
    pub members: Vec<Member>,
}

impl TypeInfo {
    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    pub fn is_generic(&self) -> bool {
        self.generic_arity > 0
    }

    /// Generic parameters declared by this type rather than its enclosing types.
    pub fn own_generic_params(&self) -> &[GenericParam] {
        let skip = self.generic_params.len().saturating_sub(self.generic_arity);
        &self.generic_params[skip..]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variance {
    #[default]
    Invariant,
    Covariant,
    Contravariant,
}

#[derive(Debug, Clone, Default)]
pub struct GenericParam {
    pub name: String,
    pub variance: Variance,
    pub reference_type: bool,
    pub value_type: bool,
    pub default_constructor: bool,
    pub constraints: Vec<Decoded<TypeSig>>,
}

impl GenericParam {
    pub fn has_constraints(&self) -> bool {
        self.reference_type
            || self.value_type
            || self.default_constructor
            || !self.constraints.is_empty()
    }
}

/// A decoded signature, or the reason it could not be decoded.
pub type Decoded<T> = Result<T, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected,
}

#[derive(Debug, Clone)]
pub enum Member {
    Method(MethodInfo),
    Property(PropertyInfo),
    Event(EventInfo),
}

impl Member {
    pub fn name(&self) -> &str {
        match self {
            Self::Method(method) => &method.name,
            Self::Property(property) => &property.name,
            Self::Event(event) => &event.name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub access: Access,
    pub is_static: bool,
    pub is_abstract: bool,
    pub generic_params: Vec<GenericParam>,
    pub signature: Decoded<MethodSig>,
}

#[derive(Debug, Clone)]
pub struct MethodSig {
    pub return_type: TypeSig,
    pub params: Vec<ParamInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    Value,
    Ref,
    Out,
    In,
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub mode: ParamMode,
    pub is_params_array: bool,
    /// Parameter type with any by-ref wrapper removed; `mode` carries it.
    pub ty: TypeSig,
}

#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub access: Access,
    pub is_static: bool,
    pub has_getter: bool,
    pub has_setter: bool,
    pub signature: Decoded<PropertySig>,
}

impl PropertyInfo {
    pub fn is_indexer(&self) -> bool {
        matches!(&self.signature, Ok(sig) if !sig.params.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct PropertySig {
    pub ty: TypeSig,
    pub params: Vec<ParamInfo>,
}

#[derive(Debug, Clone)]
pub struct EventInfo {
    pub name: String,
    pub access: Access,
    pub is_static: bool,
    pub handler: Decoded<TypeSig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Void,
    Bool,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    String,
    Object,
    IntPtr,
    UIntPtr,
    TypedReference,
}

impl Primitive {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::SByte => "sbyte",
            Self::Byte => "byte",
            Self::Int16 => "short",
            Self::UInt16 => "ushort",
            Self::Int32 => "int",
            Self::UInt32 => "uint",
            Self::Int64 => "long",
            Self::UInt64 => "ulong",
            Self::Single => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Object => "object",
            Self::IntPtr => "nint",
            Self::UIntPtr => "nuint",
            Self::TypedReference => "TypedReference",
        }
    }

    /// Map a `System` type name to its primitive, when it has one.
    pub fn from_system_name(name: &str) -> Option<Self> {
        Some(match name {
            "Void" => Self::Void,
            "Boolean" => Self::Bool,
            "Char" => Self::Char,
            "SByte" => Self::SByte,
            "Byte" => Self::Byte,
            "Int16" => Self::Int16,
            "UInt16" => Self::UInt16,
            "Int32" => Self::Int32,
            "UInt32" => Self::UInt32,
            "Int64" => Self::Int64,
            "UInt64" => Self::UInt64,
            "Single" => Self::Single,
            "Double" => Self::Double,
            "String" => Self::String,
            "Object" => Self::Object,
            "IntPtr" => Self::IntPtr,
            "UIntPtr" => Self::UIntPtr,
            "TypedReference" => Self::TypedReference,
            _ => return None,
        })
    }
}

/// Type shape as it appears in signatures, interface lists and constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSig {
    Primitive(Primitive),
    Named {
        namespace: String,
        /// Raw metadata name; nested types carry only their own segment.
        name: String,
        args: Vec<TypeSig>,
        value_type: bool,
    },
    TypeParam(String),
    MethodParam(String),
    SzArray(Box<TypeSig>),
    Array {
        element: Box<TypeSig>,
        rank: u32,
    },
    Pointer(Box<TypeSig>),
    ByRef(Box<TypeSig>),
    FnPtr {
        return_type: Box<TypeSig>,
        params: Vec<TypeSig>,
    },
}

impl TypeSig {
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Named {
            namespace: namespace.into(),
            name: name.into(),
            args: Vec::new(),
            value_type: false,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Primitive(Primitive::Void))
    }

    pub(crate) fn is_named(&self, expected_namespace: &str, expected_name: &str) -> bool {
        matches!(self, Self::Named { namespace, name, .. }
            if namespace == expected_namespace && name == expected_name)
    }
}
