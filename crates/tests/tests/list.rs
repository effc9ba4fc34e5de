mod common;

use anyhow::Result;
use nupeek_introspect::Introspector;
use serde_json::json;

use common::{LATEST, PACKAGE_ID};

#[test]
fn lists_public_interfaces_of_every_module_in_order() -> Result<()> {
    let introspector = Introspector::new(common::source());
    let listing = introspector.list_types(PACKAGE_ID, None)?;

    assert_eq!(listing.package_id, PACKAGE_ID);
    assert_eq!(listing.version, LATEST);
    let names: Vec<&str> = listing
        .types
        .iter()
        .map(|ty| ty.full_name.as_str())
        .collect();
    assert_eq!(
        names,
        [
            "Demo.Mazes.IMaze`1",
            "Demo.Mazes.IRoom",
            "Demo.Mazes.Maze+IVisitor",
            "Demo.Mazes.IRoom",
        ]
    );
    assert!(listing.types.iter().all(|ty| ty.origin_module_file_name == "Demo.Mazes.dll"));
    Ok(())
}

#[test]
fn listing_serializes_with_camel_case_fields() -> Result<()> {
    let introspector = Introspector::new(common::source());
    let listing = introspector.list_types(PACKAGE_ID, Some("1.0.0"))?;
    let value = serde_json::to_value(&listing)?;

    assert_eq!(value["packageId"], PACKAGE_ID);
    assert_eq!(value["version"], "1.0.0");
    assert_eq!(
        value["types"][0],
        json!({
            "name": "IMaze`1",
            "fullName": "Demo.Mazes.IMaze`1",
            "genericArity": 1,
            "originModuleFileName": "Demo.Mazes.dll",
        })
    );
    Ok(())
}

#[test]
fn every_listed_type_describes_back() -> Result<()> {
    let introspector = Introspector::new(common::source());
    let listing = introspector.list_types(PACKAGE_ID, None)?;
    for ty in &listing.types {
        let query = if ty.full_name.is_empty() {
            &ty.name
        } else {
            &ty.full_name
        };
        let description = introspector.describe_type(PACKAGE_ID, query, Some(&listing.version))?;
        assert!(description.is_found(), "{query} did not describe back");
        assert!(!description.text().contains('`'));
    }
    Ok(())
}

#[test]
fn undecodable_references_do_not_empty_the_listing() -> Result<()> {
    let introspector = Introspector::new(common::odd_source());
    let listing = introspector.list_types("Demo", None)?;
    let names: Vec<&str> = listing
        .types
        .iter()
        .map(|ty| ty.full_name.as_str())
        .collect();
    assert_eq!(names, ["Demo.IFoo", "Demo.IBox`1"]);
    Ok(())
}

#[test]
fn listing_is_idempotent() -> Result<()> {
    let introspector = Introspector::new(common::source());
    let first = serde_json::to_string(&introspector.list_types(PACKAGE_ID, None)?)?;
    let second = serde_json::to_string(&introspector.list_types(PACKAGE_ID, None)?)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn blank_package_id_is_rejected() {
    let introspector = Introspector::new(common::source());
    let err = introspector
        .list_types(" ", None)
        .expect_err("blank package id");
    assert_eq!(err.kind(), "invalid_argument");
    assert_eq!(introspector.source().fetch_count(), 0);
}
