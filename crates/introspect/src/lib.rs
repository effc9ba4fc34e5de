//! Type introspection for NuGet packages.
//!
//! A package archive is scanned for `.dll` entries, each entry is read as
//! ECMA-335 CLI metadata, and the interfaces it declares are matched against
//! a query or listed. Matches are rendered as C#-style declarations.
//!
//! ```no_run
//! use nupeek_feed::FeedConfig;
//! use nupeek_introspect::Introspector;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = FeedConfig::from_env()?.build()?;
//! let introspector = Introspector::new(source);
//! println!("{}", introspector.describe_type("Demo.Mazes", "IMaze", None)?);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod error;
pub mod format;
pub mod loader;
pub mod matcher;
pub mod metadata;
pub mod ops;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use archive::{ArchiveEntry, ArchiveScanner, MODULE_SUFFIX, ModuleEntries};
pub use error::{ArchiveError, IntrospectError};
pub use format::DeclarationFormatter;
pub use loader::{ModuleLoader, TypeDescriptor};
pub use matcher::{MatchRule, TypeMatcher};
pub use metadata::{CliMetadataReader, MetadataError, MetadataReader, ModuleMetadata, TypeInfo};
pub use ops::{Introspector, TypeDescription, TypeListing};
