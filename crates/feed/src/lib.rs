//! Package sources for nupeek.
//!
//! This crate resolves package versions and retrieves `.nupkg` archives from
//! NuGet v3 flat-container feeds or local folder feeds, optionally through an
//! on-disk cache that re-validates archives by digest before reuse.

pub mod cache;
pub mod env;
pub mod error;
pub mod source;
pub mod version;

pub use cache::CachedFeed;
pub use env::{FeedConfig, FeedKind};
pub use error::SourceError;
pub use source::{
    ArchiveStream, FetchedArchive, FolderFeed, HttpFeed, NUGET_ORG_FLAT_CONTAINER,
    PackageReference, PackageSource,
};
pub use version::{NuGetVersion, select_latest};
