//! Fixture builders for tests: managed assemblies, `.nupkg` archives and an
//! in-memory package source.

mod assembly;
mod nupkg;
mod source;

pub use assembly::{AssemblyBuilder, Ty, TypeDecl};
pub use nupkg::NupkgBuilder;
pub use source::InMemorySource;
