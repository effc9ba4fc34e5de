//! Rendering type definitions as C#-style declarations.

use crate::matcher::strip_arity;
use crate::metadata::{
    Access, Decoded, EventInfo, GenericParam, Member, MethodInfo, ParamInfo, ParamMode, Primitive,
    PropertyInfo, TypeInfo, TypeSig, Variance,
};

const DEFAULT_INDENT: &str = "    ";

/// Renders a [`TypeInfo`] as a declaration block.
///
/// ```text
/// interface IMaze<out T> : IEnumerable<T>
///     where T : class
/// {
///     int Width { get; }
///     T GetCell(int x, int y);
/// }
/// // Namespace: Demo.Mazes
/// // Module: Demo.Mazes.dll
/// ```
#[derive(Debug, Clone)]
pub struct DeclarationFormatter {
    indent: String,
}

impl Default for DeclarationFormatter {
    fn default() -> Self {
        Self {
            indent: DEFAULT_INDENT.to_string(),
        }
    }
}

impl DeclarationFormatter {
    pub fn with_indent(indent: impl Into<String>) -> Self {
        Self {
            indent: indent.into(),
        }
    }

    pub fn format(&self, ty: &TypeInfo, module_file_name: &str) -> String {
        let mut out = header(ty);
        out.push('\n');
        for clause in ty.own_generic_params().iter().filter_map(where_clause) {
            out.push_str(&self.indent);
            out.push_str(&clause);
            out.push('\n');
        }
        out.push_str("{\n");
        for member in &ty.members {
            out.push_str(&self.indent);
            out.push_str(&render_member(member));
            out.push('\n');
        }
        out.push_str("}\n");
        if !ty.namespace.is_empty() {
            out.push_str(&format!("// Namespace: {}\n", ty.namespace));
        }
        out.push_str(&format!("// Module: {module_file_name}\n"));
        out
    }
}

fn header(ty: &TypeInfo) -> String {
    let mut line = format!("{} {}", ty.kind.keyword(), display_name(ty));
    if !ty.interfaces.is_empty() {
        line.push_str(" : ");
        line.push_str(&join(ty.interfaces.iter().map(render_decoded)));
    }
    line
}

/// Short name without arity suffix, followed by its own generic parameters.
pub fn display_name(ty: &TypeInfo) -> String {
    let base = strip_arity(&ty.name);
    if ty.generic_arity == 0 {
        return base.to_string();
    }
    let own = ty.own_generic_params();
    let params: Vec<String> = if own.len() < ty.generic_arity {
        (1..=ty.generic_arity).map(|n| format!("T{n}")).collect()
    } else {
        own.iter()
            .enumerate()
            .map(|(position, param)| {
                let name = if param.name.is_empty() {
                    format!("T{}", position + 1)
                } else {
                    param.name.clone()
                };
                match param.variance {
                    Variance::Covariant => format!("out {name}"),
                    Variance::Contravariant => format!("in {name}"),
                    Variance::Invariant => name,
                }
            })
            .collect()
    };
    format!("{base}<{}>", params.join(", "))
}

fn where_clause(param: &GenericParam) -> Option<String> {
    if !param.has_constraints() {
        return None;
    }
    let mut parts = Vec::new();
    if param.reference_type {
        parts.push("class".to_string());
    }
    if param.value_type {
        parts.push("struct".to_string());
    }
    parts.extend(
        param
            .constraints
            .iter()
            .filter(|constraint| {
                !matches!(constraint, Ok(sig) if param.value_type && sig.is_named("System", "ValueType"))
            })
            .map(render_decoded),
    );
    if param.default_constructor && !param.value_type {
        parts.push("new()".to_string());
    }
    Some(format!("where {} : {}", param.name, parts.join(", ")))
}

fn render_member(member: &Member) -> String {
    match member {
        Member::Method(method) => render_method(method),
        Member::Property(property) => render_property(property),
        Member::Event(event) => render_event(event),
    }
}

fn modifiers(access: Access, is_static: bool, is_abstract: bool) -> String {
    let mut prefix = String::new();
    if access == Access::Protected {
        prefix.push_str("protected ");
    }
    if is_static {
        prefix.push_str("static ");
        if is_abstract {
            prefix.push_str("abstract ");
        }
    }
    prefix
}

fn render_method(method: &MethodInfo) -> String {
    let prefix = modifiers(method.access, method.is_static, method.is_abstract);
    let generics = if method.generic_params.is_empty() {
        String::new()
    } else {
        let names: Vec<&str> = method
            .generic_params
            .iter()
            .map(|param| param.name.as_str())
            .collect();
        format!("<{}>", names.join(", "))
    };
    let clauses: String = method
        .generic_params
        .iter()
        .filter_map(where_clause)
        .map(|clause| format!(" {clause}"))
        .collect();
    match &method.signature {
        Ok(sig) => format!(
            "{prefix}{} {}{generics}({}){clauses};",
            render_type(&sig.return_type),
            method.name,
            render_params(&sig.params),
        ),
        Err(reason) => format!("{prefix}{} {}{generics}(...);", unreadable(reason), method.name),
    }
}

fn render_property(property: &PropertyInfo) -> String {
    let prefix = modifiers(property.access, property.is_static, false);
    let mut accessors = String::from("{ ");
    if property.has_getter {
        accessors.push_str("get; ");
    }
    if property.has_setter {
        accessors.push_str("set; ");
    }
    accessors.push('}');
    match &property.signature {
        Ok(sig) if property.is_indexer() => format!(
            "{prefix}{} this[{}] {accessors}",
            render_type(&sig.ty),
            render_params(&sig.params)
        ),
        Ok(sig) => format!("{prefix}{} {} {accessors}", render_type(&sig.ty), property.name),
        Err(reason) => format!("{prefix}{} {} {accessors}", unreadable(reason), property.name),
    }
}

fn render_event(event: &EventInfo) -> String {
    let prefix = modifiers(event.access, event.is_static, false);
    let handler = render_decoded(&event.handler);
    format!("{prefix}event {handler} {};", event.name)
}

fn render_decoded(ty: &Decoded<TypeSig>) -> String {
    match ty {
        Ok(ty) => render_type(ty),
        Err(reason) => unreadable(reason),
    }
}

fn unreadable(reason: &str) -> String {
    format!("/* unreadable signature: {reason} */")
}

fn render_params(params: &[ParamInfo]) -> String {
    join(params.iter().map(|param| {
        let mode = match param.mode {
            ParamMode::Value if param.is_params_array => "params ",
            ParamMode::Value => "",
            ParamMode::Ref => "ref ",
            ParamMode::Out => "out ",
            ParamMode::In => "in ",
        };
        format!("{mode}{} {}", render_type(&param.ty), param.name)
    }))
}

/// Render a signature type in C# syntax, with keywords for primitives and
/// no arity suffixes.
pub fn render_type(ty: &TypeSig) -> String {
    match ty {
        TypeSig::Primitive(primitive) => primitive.keyword().to_string(),
        TypeSig::Named {
            namespace,
            name,
            args,
            ..
        } => render_named(namespace, name, args),
        TypeSig::TypeParam(name) | TypeSig::MethodParam(name) => name.clone(),
        TypeSig::SzArray(element) => format!("{}[]", render_type(element)),
        TypeSig::Array { element, rank } => format!(
            "{}[{}]",
            render_type(element),
            ",".repeat(rank.saturating_sub(1) as usize)
        ),
        TypeSig::Pointer(element) => format!("{}*", render_type(element)),
        TypeSig::ByRef(element) => format!("ref {}", render_type(element)),
        TypeSig::FnPtr {
            return_type,
            params,
        } => {
            let mut parts: Vec<String> = params.iter().map(render_type).collect();
            parts.push(render_type(return_type));
            format!("delegate*<{}>", parts.join(", "))
        }
    }
}

fn render_named(namespace: &str, name: &str, args: &[TypeSig]) -> String {
    if namespace == "System" {
        if args.is_empty()
            && let Some(primitive) = Primitive::from_system_name(name)
        {
            return primitive.keyword().to_string();
        }
        if name == "Nullable`1" && args.len() == 1 {
            return format!("{}?", render_type(&args[0]));
        }
        if name.starts_with("ValueTuple`") && (2..=7).contains(&args.len()) {
            return format!("({})", join(args.iter().map(render_type)));
        }
    }
    let base = strip_arity(name);
    if args.is_empty() {
        return base.to_string();
    }
    format!("{base}<{}>", join(args.iter().map(render_type)))
}

fn join(parts: impl Iterator<Item = String>) -> String {
    parts.collect::<Vec<_>>().join(", ")
}
