#![allow(dead_code)]

use nupeek_introspect::testing::{AssemblyBuilder, InMemorySource, NupkgBuilder, Ty, TypeDecl};

pub const PACKAGE_ID: &str = "Demo.Mazes";
pub const LATEST: &str = "2.0.0";

/// The main module: a generic interface, a plain one with every member
/// kind, a nested interface, an internal interface and a class.
pub fn mazes_module() -> Vec<u8> {
    AssemblyBuilder::new("Demo.Mazes.dll")
        .ty(TypeDecl::interface("Demo.Mazes", "IMaze`1")
            .generic_param("T")
            .covariant()
            .class_constraint()
            .implements(Ty::generic(
                Ty::class("System.Collections.Generic", "IEnumerable`1"),
                vec![Ty::Var(0)],
            ))
            .property("Width", Ty::Int32, true, false)
            .property("Height", Ty::Int32, true, false)
            .method("GetCell", Ty::Var(0), vec![("x", Ty::Int32), ("y", Ty::Int32)])
            .generic_method(
                "Project",
                vec!["TResult"],
                Ty::generic(Ty::local("IMaze`1"), vec![Ty::MVar(0)]),
                vec![("selector", Ty::Object)],
            ))
        .ty(TypeDecl::interface("Demo.Mazes", "IRoom")
            .property("Name", Ty::String, true, true)
            .indexer(Ty::local("IRoom"), vec![("direction", Ty::Int32)], true, false)
            .event("Entered", Ty::class("System", "EventHandler"))
            .method(
                "TryExit",
                Ty::Bool,
                vec![("direction", Ty::Int32), ("next", Ty::out(Ty::local("IRoom")))],
            )
            .static_method("Create", Ty::local("IRoom"), vec![("name", Ty::String)]))
        .ty(TypeDecl::class("Demo.Mazes", "Maze"))
        .ty(TypeDecl::interface("", "IVisitor").nested_in("Maze"))
        .ty(TypeDecl::interface("Demo.Mazes", "ISecret").internal())
        .build()
}

/// A second module in another target-framework folder declaring the same
/// interface again.
pub fn legacy_module() -> Vec<u8> {
    AssemblyBuilder::new("Demo.Mazes.dll")
        .ty(TypeDecl::interface("Demo.Mazes", "IRoom"))
        .build()
}

/// A single public interface.
pub fn foo_module() -> Vec<u8> {
    AssemblyBuilder::new("Lib.dll")
        .ty(TypeDecl::interface("Demo", "IFoo"))
        .build()
}

/// A module whose class and generic interface reference a type spec that
/// cannot be decoded.
pub fn odd_module() -> Vec<u8> {
    let undecodable = || Ty::Raw(vec![0x21, 0x00]);
    AssemblyBuilder::new("Odd.dll")
        .ty(TypeDecl::interface("Demo", "IFoo"))
        .ty(TypeDecl::class("Demo", "Weird").implements(undecodable()))
        .ty(TypeDecl::interface("Demo", "IBox`1")
            .generic_param("T")
            .constraint(undecodable())
            .implements(undecodable()))
        .build()
}

pub fn odd_source() -> InMemorySource {
    let package = NupkgBuilder::new("Demo", "1.0.0")
        .entry("lib/net8.0/Odd.dll", odd_module())
        .build();
    InMemorySource::new().with_package("Demo", "1.0.0", package)
}

pub fn mazes_package(version: &str) -> Vec<u8> {
    NupkgBuilder::new(PACKAGE_ID, version)
        .directory("lib/")
        .entry("runtimes/win-x64/native/maze_native.dll", AssemblyBuilder::native_image())
        .entry("lib/net8.0/Corrupt.dll", vec![0x4D, 0x5A, 0x00, 0x01, 0x02])
        .entry("lib/net8.0/Demo.Mazes.dll", mazes_module())
        .entry("lib/net8.0/Demo.Mazes.xml", b"<doc />".to_vec())
        .entry("lib/netstandard2.0/Demo.Mazes.dll", legacy_module())
        .build()
}

pub fn source() -> InMemorySource {
    InMemorySource::new()
        .with_package(PACKAGE_ID, "1.0.0", mazes_package("1.0.0"))
        .with_package(PACKAGE_ID, "3.0.0-preview.1", mazes_package("3.0.0-preview.1"))
        .with_package(PACKAGE_ID, LATEST, mazes_package(LATEST))
}
