//! NuGet version ordering and latest-version selection.

use std::cmp::Ordering;
use std::fmt;

use semver::{Prerelease, Version};

/// A NuGet version: up to four numeric components plus an optional
/// prerelease label. Build metadata is ignored for ordering.
#[derive(Debug, Clone)]
pub struct NuGetVersion {
    release: Version,
    revision: u64,
    raw: String,
}

impl NuGetVersion {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let without_meta = trimmed.split('+').next().unwrap_or_default();
        let (core, pre) = match without_meta.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (without_meta, None),
        };
        let parts = core
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() || parts.len() > 4 {
            return None;
        }
        let mut release = Version::new(
            parts[0],
            parts.get(1).copied().unwrap_or(0),
            parts.get(2).copied().unwrap_or(0),
        );
        if let Some(pre) = pre {
            release.pre = Prerelease::new(pre).ok()?;
        }
        Some(Self {
            release,
            revision: parts.get(3).copied().unwrap_or(0),
            raw: trimmed.to_string(),
        })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.release.pre.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn numeric(&self) -> (u64, u64, u64, u64) {
        (
            self.release.major,
            self.release.minor,
            self.release.patch,
            self.revision,
        )
    }
}

impl Ord for NuGetVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric()
            .cmp(&other.numeric())
            .then_with(|| self.release.pre.cmp(&other.release.pre))
    }
}

impl PartialOrd for NuGetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NuGetVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NuGetVersion {}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Pick the version a caller means by "latest".
///
/// The highest stable version wins; when only prereleases exist the highest
/// prerelease is used. Feeds that publish nothing parseable fall back to
/// listing order.
pub fn select_latest<S: AsRef<str>>(versions: &[S]) -> Option<String> {
    let parsed: Vec<NuGetVersion> = versions
        .iter()
        .filter_map(|raw| NuGetVersion::parse(raw.as_ref()))
        .collect();
    if let Some(stable) = parsed.iter().filter(|v| !v.is_prerelease()).max() {
        return Some(stable.as_str().to_string());
    }
    if let Some(pre) = parsed.iter().max() {
        return Some(pre.as_str().to_string());
    }
    versions.last().map(|raw| raw.as_ref().to_string())
}
