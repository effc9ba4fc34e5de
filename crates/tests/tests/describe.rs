mod common;

use anyhow::{Result, bail};
use nupeek_introspect::testing::{InMemorySource, NupkgBuilder};
use nupeek_introspect::{Introspector, TypeDescription};

use common::{LATEST, PACKAGE_ID};

fn declaration(description: TypeDescription) -> Result<String> {
    match description {
        TypeDescription::Found { declaration, .. } => Ok(declaration),
        TypeDescription::NotFound { query, .. } => bail!("expected a match for {query}"),
    }
}

#[test]
fn generic_interface_renders_without_arity_suffix() -> Result<()> {
    let introspector = Introspector::new(common::source());
    let text = declaration(introspector.describe_type(PACKAGE_ID, "IMaze", None)?)?;

    assert!(
        text.starts_with("interface IMaze<out T> : IEnumerable<T>\n    where T : class\n{\n"),
        "unexpected header:\n{text}"
    );
    assert!(text.contains("IMaze<"));
    assert!(!text.contains('`'), "arity suffix leaked:\n{text}");
    for member in [
        "    int Width { get; }\n",
        "    int Height { get; }\n",
        "    T GetCell(int x, int y);\n",
        "    IMaze<TResult> Project<TResult>(object selector);\n",
    ] {
        assert!(text.contains(member), "missing {member:?} in:\n{text}");
    }
    assert!(text.ends_with("}\n// Namespace: Demo.Mazes\n// Module: Demo.Mazes.dll\n"));
    Ok(())
}

#[test]
fn every_spelling_of_a_generic_name_finds_the_same_type() -> Result<()> {
    let introspector = Introspector::new(common::source());
    let expected = declaration(introspector.describe_type(PACKAGE_ID, "IMaze", None)?)?;
    for query in ["IMaze`1", "Demo.Mazes.IMaze", "Demo.Mazes.IMaze`1"] {
        let text = declaration(introspector.describe_type(PACKAGE_ID, query, None)?)?;
        assert_eq!(text, expected, "query {query}");
    }
    Ok(())
}

#[test]
fn plain_interface_members_render_in_declaration_order() -> Result<()> {
    let introspector = Introspector::new(common::source());
    let text = declaration(introspector.describe_type(PACKAGE_ID, "Demo.Mazes.IRoom", None)?)?;
    let expected = "interface IRoom\n{\n    \
        string Name { get; set; }\n    \
        IRoom this[int direction] { get; }\n    \
        event EventHandler Entered;\n    \
        bool TryExit(int direction, out IRoom next);\n    \
        static IRoom Create(string name);\n\
        }\n// Namespace: Demo.Mazes\n// Module: Demo.Mazes.dll\n";
    assert_eq!(text, expected);
    Ok(())
}

#[test]
fn first_module_in_archive_order_wins() -> Result<()> {
    let introspector = Introspector::new(common::source());
    let TypeDescription::Found {
        descriptor,
        declaration,
        ..
    } = introspector.describe_type(PACKAGE_ID, "IRoom", None)?
    else {
        bail!("IRoom should be found");
    };
    assert_eq!(descriptor.full_name, "Demo.Mazes.IRoom");
    assert_eq!(descriptor.origin_module_file_name, "Demo.Mazes.dll");
    // Only the net8.0 IRoom declares members; the netstandard2.0 one is empty.
    assert!(
        declaration.contains("    string Name { get; set; }\n"),
        "later module won:\n{declaration}"
    );
    Ok(())
}

#[test]
fn nested_interfaces_match_by_short_and_plus_joined_name() -> Result<()> {
    let introspector = Introspector::new(common::source());
    for query in ["IVisitor", "Demo.Mazes.Maze+IVisitor"] {
        let text = declaration(introspector.describe_type(PACKAGE_ID, query, None)?)?;
        assert!(text.starts_with("interface IVisitor\n"), "query {query}:\n{text}");
    }
    Ok(())
}

#[test]
fn misses_report_query_and_package() -> Result<()> {
    let introspector = Introspector::new(common::source());
    for query in ["Maze", "IMissing", "imaze", "Mazes.IMaze"] {
        let description = introspector.describe_type(PACKAGE_ID, query, None)?;
        assert!(!description.is_found(), "{query} should not match");
        let text = description.text();
        assert!(text.contains("not found"), "{text}");
        assert!(text.contains(PACKAGE_ID), "{text}");
        assert!(text.contains(query), "{text}");
    }
    Ok(())
}

#[test]
fn corrupt_and_native_modules_are_skipped() -> Result<()> {
    // The archive lists a native image and a truncated module ahead of the
    // real one.
    let introspector = Introspector::new(common::source());
    let description = introspector.describe_type(PACKAGE_ID, "IMaze", Some("1.0.0"))?;
    assert!(description.is_found());
    assert_eq!(description.package().version, "1.0.0");
    Ok(())
}

#[test]
fn undecompressable_entry_is_skipped() -> Result<()> {
    let package = NupkgBuilder::new("Demo", "1.0.0")
        .entry("lib/a/Bad.dll", common::mazes_module())
        .entry("lib/b/Lib.dll", common::foo_module())
        .corrupt("lib/a/Bad.dll")
        .build();
    let introspector =
        Introspector::new(InMemorySource::new().with_package("Demo", "1.0.0", package));

    let TypeDescription::Found { descriptor, .. } =
        introspector.describe_type("Demo", "IFoo", None)?
    else {
        bail!("IFoo should be found past the corrupt entry");
    };
    assert_eq!(descriptor.origin_module_file_name, "Lib.dll");
    Ok(())
}

#[test]
fn undecodable_references_do_not_hide_other_types() -> Result<()> {
    let introspector = Introspector::new(common::odd_source());

    let text = declaration(introspector.describe_type("Demo", "IFoo", None)?)?;
    assert!(text.starts_with("interface IFoo\n"), "{text}");

    let text = declaration(introspector.describe_type("Demo", "IBox", None)?)?;
    assert!(
        text.starts_with("interface IBox<T> : /* unreadable signature: "),
        "{text}"
    );
    assert!(text.contains("    where T : /* unreadable signature: "), "{text}");
    Ok(())
}

#[test]
fn repeated_lookups_are_identical() -> Result<()> {
    let introspector = Introspector::new(common::source());
    let first = introspector.describe_type(PACKAGE_ID, "IMaze", None)?.text();
    let second = introspector.describe_type(PACKAGE_ID, "IMaze", None)?.text();
    assert_eq!(first, second);
    assert_eq!(introspector.source().fetch_count(), 2);
    Ok(())
}

#[test]
fn latest_stable_version_is_resolved() -> Result<()> {
    let introspector = Introspector::new(common::source());
    let description = introspector.describe_type(PACKAGE_ID, "IRoom", None)?;
    assert_eq!(description.package().version, LATEST);
    assert_eq!(introspector.source().resolve_count(), 1);
    Ok(())
}

#[test]
fn blank_arguments_are_rejected_without_retrieval() {
    let introspector = Introspector::new(common::source());
    for (package, query) in [("", "IMaze"), ("   ", "IMaze"), (PACKAGE_ID, ""), (PACKAGE_ID, " \n")] {
        let err = introspector
            .describe_type(package, query, None)
            .expect_err("blank argument");
        assert_eq!(err.kind(), "invalid_argument");
    }
    assert_eq!(introspector.source().resolve_count(), 0);
    assert_eq!(introspector.source().fetch_count(), 0);
}

#[test]
fn unknown_package_and_version_surface_source_errors() {
    let introspector = Introspector::new(common::source());
    let err = introspector
        .describe_type("Demo.Unknown", "IMaze", None)
        .expect_err("unknown package");
    assert_eq!(err.kind(), "package_not_found");
    let err = introspector
        .describe_type(PACKAGE_ID, "IMaze", Some("9.9.9"))
        .expect_err("unknown version");
    assert_eq!(err.kind(), "package_not_found");
}
