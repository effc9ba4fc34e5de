mod common;

use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use nupeek_feed::{CachedFeed, FeedConfig, FolderFeed, PackageSource};
use nupeek_introspect::Introspector;
use serial_test::serial;
use tempfile::TempDir;

use common::{LATEST, PACKAGE_ID};

fn write_package(root: &Path, relative: &str, version: &str) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, common::mazes_package(version))?;
    Ok(())
}

fn folder_feed() -> Result<TempDir> {
    let feed = TempDir::new()?;
    write_package(feed.path(), "demo.mazes/1.0.0/demo.mazes.1.0.0.nupkg", "1.0.0")?;
    write_package(feed.path(), "Demo.Mazes.2.0.0.nupkg", LATEST)?;
    Ok(feed)
}

#[test]
fn describes_types_from_a_folder_feed() -> Result<()> {
    let feed = folder_feed()?;
    let introspector = Introspector::new(FolderFeed::new(feed.path()));

    let description = introspector.describe_type(PACKAGE_ID, "IMaze", None)?;
    assert!(description.is_found());
    assert_eq!(description.package().version, LATEST);

    let listing = introspector.list_types("demo.mazes", Some("1.0.0"))?;
    assert_eq!(listing.types.len(), 4);
    Ok(())
}

#[test]
fn cached_feed_serves_repeat_lookups_from_disk() -> Result<()> {
    let feed = folder_feed()?;
    let cache = TempDir::new()?;
    let introspector = Introspector::new(CachedFeed::new(cache.path(), FolderFeed::new(feed.path())));

    let first = introspector.describe_type(PACKAGE_ID, "IRoom", None)?.text();
    fs::remove_file(feed.path().join("Demo.Mazes.2.0.0.nupkg"))?;
    let second = introspector.describe_type(PACKAGE_ID, "IRoom", Some(LATEST))?.text();
    assert_eq!(first, second);
    assert!(
        cache
            .path()
            .join("demo.mazes/2.0.0/demo.mazes.2.0.0.nupkg")
            .exists()
    );
    Ok(())
}

#[test]
#[serial]
fn environment_selects_folder_feed_with_cache() -> Result<()> {
    let feed = folder_feed()?;
    let cache = TempDir::new()?;
    let _source = EnvGuard::set("NUPEEK_SOURCE", "fs");
    let _dir = EnvGuard::set("NUPEEK_FEED_DIR", feed.path().to_string_lossy());
    let _cache = EnvGuard::set("NUPEEK_CACHE_DIR", cache.path().to_string_lossy());

    let source = FeedConfig::from_env()?.build()?;
    assert!(source.describe().contains("cached in"));
    let introspector = Introspector::new(source);
    let listing = introspector.list_types(PACKAGE_ID, None)?;
    assert_eq!(listing.version, LATEST);
    assert!(
        listing
            .types
            .iter()
            .any(|ty| ty.full_name == "Demo.Mazes.Maze+IVisitor")
    );
    Ok(())
}

struct EnvGuard {
    key: &'static str,
    previous: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: impl AsRef<str>) -> Self {
        let previous = env::var(key).ok();
        unsafe {
            env::set_var(key, value.as_ref());
        }
        Self { key, previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            match &self.previous {
                Some(value) => env::set_var(self.key, value),
                None => env::remove_var(self.key),
            }
        }
    }
}
