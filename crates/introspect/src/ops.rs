//! `describe_type` and `list_types`.

use std::fmt;

use nupeek_feed::{ArchiveStream, PackageReference, PackageSource};
use serde::Serialize;

use crate::archive::{ArchiveEntry, ArchiveScanner, ModuleEntries};
use crate::error::{ArchiveError, IntrospectError};
use crate::format::DeclarationFormatter;
use crate::loader::{ModuleLoader, TypeDescriptor};
use crate::matcher::TypeMatcher;

/// Outcome of a type lookup. A miss is a regular result, not an error.
#[derive(Debug, Clone)]
pub enum TypeDescription {
    Found {
        package: PackageReference,
        descriptor: TypeDescriptor,
        declaration: String,
    },
    NotFound {
        package: PackageReference,
        query: String,
    },
}

impl TypeDescription {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    pub fn package(&self) -> &PackageReference {
        match self {
            Self::Found { package, .. } | Self::NotFound { package, .. } => package,
        }
    }

    /// The declaration, or the not-found message.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found { declaration, .. } => f.write_str(declaration),
            Self::NotFound { package, query } => write!(
                f,
                "Type '{query}' not found in package '{}' (version {}).",
                package.id, package.version
            ),
        }
    }
}

/// Every public interface of one package version.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeListing {
    pub package_id: String,
    pub version: String,
    pub types: Vec<TypeDescriptor>,
}

/// Runs lookups and listings against a package source.
pub struct Introspector<S> {
    source: S,
    loader: ModuleLoader,
    formatter: DeclarationFormatter,
}

impl<S: PackageSource> Introspector<S> {
    pub fn new(source: S) -> Self {
        Self::with_loader(source, ModuleLoader::default())
    }

    pub fn with_loader(source: S, loader: ModuleLoader) -> Self {
        Self {
            source,
            loader,
            formatter: DeclarationFormatter::default(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Find the first interface named by `query` and render its declaration.
    pub fn describe_type(
        &self,
        package_id: &str,
        query: &str,
        version: Option<&str>,
    ) -> Result<TypeDescription, IntrospectError> {
        let package_id = required("package id", package_id)?;
        let query = required("type name", query)?;
        let package = self.resolve(package_id, version)?;
        let matcher = TypeMatcher::new(query);

        for entry in self.modules(&package)?.filter_map(readable) {
            let Some(module) = self.loader.load(&entry) else {
                continue;
            };
            for ty in module.interfaces() {
                let descriptor = TypeDescriptor::new(ty, &entry);
                if let Some(rule) = matcher.match_rule(&descriptor) {
                    tracing::info!(
                        package = %package,
                        query,
                        entry = %entry.path,
                        ?rule,
                        "type found"
                    );
                    let declaration = self.formatter.format(ty, entry.file_name());
                    return Ok(TypeDescription::Found {
                        package,
                        descriptor,
                        declaration,
                    });
                }
            }
        }

        tracing::info!(package = %package, query, "type not found");
        Ok(TypeDescription::NotFound {
            package,
            query: query.to_string(),
        })
    }

    /// Enumerate the public interfaces of every module in the package.
    pub fn list_types(
        &self,
        package_id: &str,
        version: Option<&str>,
    ) -> Result<TypeListing, IntrospectError> {
        let package_id = required("package id", package_id)?;
        let package = self.resolve(package_id, version)?;

        let mut types = Vec::new();
        for entry in self.modules(&package)?.filter_map(readable) {
            if let Some(module) = self.loader.load(&entry) {
                types.extend(
                    module
                        .interfaces()
                        .filter(|ty| ty.is_public)
                        .map(|ty| TypeDescriptor::new(ty, &entry)),
                );
            }
        }

        tracing::info!(package = %package, count = types.len(), "listed interfaces");
        Ok(TypeListing {
            package_id: package.id,
            version: package.version,
            types,
        })
    }

    fn resolve(
        &self,
        package_id: &str,
        version: Option<&str>,
    ) -> Result<PackageReference, IntrospectError> {
        let version = match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(version) => version.to_string(),
            None => {
                let latest = self.source.resolve_latest_version(package_id)?;
                tracing::info!(
                    package = package_id,
                    version = %latest,
                    source = %self.source.describe(),
                    "resolved latest version"
                );
                latest
            }
        };
        Ok(PackageReference::new(package_id, version))
    }

    /// Fetch and open the archive for scanning.
    fn modules(
        &self,
        package: &PackageReference,
    ) -> Result<ModuleEntries<ArchiveStream>, IntrospectError> {
        let fetched = self.source.fetch_archive(package)?;
        tracing::info!(package = %package, archive = ?fetched, "fetched archive");
        let scanner = ArchiveScanner::open(fetched.open()?)?;
        tracing::debug!(package = %package, entries = scanner.entry_count(), "opened archive");
        Ok(scanner.modules())
    }
}

/// Entries that fail to decompress are logged and skipped.
fn readable(entry: Result<ArchiveEntry, ArchiveError>) -> Option<ArchiveEntry> {
    match entry {
        Ok(entry) => Some(entry),
        Err(err) => {
            tracing::warn!(error = %err, "skipping unreadable archive entry");
            None
        }
    }
}

fn required<'a>(argument: &'static str, value: &'a str) -> Result<&'a str, IntrospectError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IntrospectError::invalid_argument(argument, "must not be empty"));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AssemblyBuilder, InMemorySource, NupkgBuilder, Ty, TypeDecl};

    fn maze_package() -> Vec<u8> {
        let module = AssemblyBuilder::new("Demo.Mazes.dll")
            .ty(TypeDecl::interface("Demo.Mazes", "IMaze`1")
                .generic_param("T")
                .covariant()
                .method("GetCell", Ty::Var(0), vec![("x", Ty::Int32), ("y", Ty::Int32)]))
            .ty(TypeDecl::interface("Demo.Mazes", "IRoom"))
            .ty(TypeDecl::interface("Demo.Mazes", "IHidden").internal())
            .ty(TypeDecl::class("Demo.Mazes", "Maze"))
            .build();
        NupkgBuilder::new("Demo.Mazes", "1.2.0")
            .entry("lib/net8.0/Demo.Mazes.dll", module)
            .build()
    }

    fn introspector() -> Introspector<InMemorySource> {
        Introspector::new(
            InMemorySource::new()
                .with_package("Demo.Mazes", "1.0.0", maze_package())
                .with_package("Demo.Mazes", "1.2.0", maze_package()),
        )
    }

    #[test]
    fn describes_generic_interface_by_short_name() {
        let introspector = introspector();
        let description = introspector
            .describe_type("Demo.Mazes", "IMaze", None)
            .expect("describe");
        let TypeDescription::Found {
            package,
            descriptor,
            declaration,
        } = description
        else {
            panic!("expected a match");
        };
        assert_eq!(package.version, "1.2.0");
        assert_eq!(descriptor.full_name, "Demo.Mazes.IMaze`1");
        assert!(declaration.starts_with("interface IMaze<out T>\n"));
        assert!(declaration.contains("T GetCell(int x, int y);"));
        assert!(declaration.contains("// Module: Demo.Mazes.dll"));
        assert!(!declaration.contains('`'));
    }

    #[test]
    fn explicit_version_skips_resolution() {
        let introspector = introspector();
        let description = introspector
            .describe_type(" Demo.Mazes ", "Demo.Mazes.IRoom", Some(" 1.0.0 "))
            .expect("describe");
        assert!(description.is_found());
        assert_eq!(description.package().version, "1.0.0");
        assert_eq!(introspector.source().resolve_count(), 0);
    }

    #[test]
    fn miss_is_reported_as_text() {
        let description = introspector()
            .describe_type("Demo.Mazes", "Maze", Some(""))
            .expect("describe");
        assert!(!description.is_found());
        assert_eq!(
            description.text(),
            "Type 'Maze' not found in package 'Demo.Mazes' (version 1.2.0)."
        );
    }

    #[test]
    fn blank_arguments_fail_before_any_retrieval() {
        let introspector = introspector();
        let err = introspector
            .describe_type("  ", "IMaze", None)
            .expect_err("blank id");
        assert_eq!(err.kind(), "invalid_argument");
        let err = introspector
            .describe_type("Demo.Mazes", "\t", None)
            .expect_err("blank query");
        assert!(matches!(
            err,
            IntrospectError::InvalidArgument {
                argument: "type name",
                ..
            }
        ));
        assert!(introspector.list_types("", None).is_err());
        assert_eq!(introspector.source().resolve_count(), 0);
        assert_eq!(introspector.source().fetch_count(), 0);
    }

    #[test]
    fn unknown_package_propagates_source_error() {
        let err = introspector()
            .list_types("Nope", None)
            .expect_err("unknown package");
        assert_eq!(err.kind(), "package_not_found");
    }

    #[test]
    fn invalid_archive_is_an_error() {
        let introspector =
            Introspector::new(InMemorySource::new().with_package("Broken", "1.0.0", b"junk".to_vec()));
        let err = introspector
            .describe_type("Broken", "IMaze", None)
            .expect_err("not a zip");
        assert_eq!(err.kind(), "invalid_archive");
    }

    #[test]
    fn lists_public_interfaces_only() {
        let listing = introspector()
            .list_types("Demo.Mazes", None)
            .expect("list");
        assert_eq!(listing.package_id, "Demo.Mazes");
        assert_eq!(listing.version, "1.2.0");
        let names: Vec<&str> = listing.types.iter().map(|ty| ty.name.as_str()).collect();
        assert_eq!(names, ["IMaze`1", "IRoom"]);

        let json = serde_json::to_value(&listing).expect("json");
        assert_eq!(json["packageId"], "Demo.Mazes");
        assert_eq!(json["types"][0]["fullName"], "Demo.Mazes.IMaze`1");
        assert_eq!(json["types"][0]["genericArity"], 1);
        assert_eq!(json["types"][0]["originModuleFileName"], "Demo.Mazes.dll");
    }
}
