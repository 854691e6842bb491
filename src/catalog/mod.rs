//! Mod catalog model.
//!
//! Types decoded from the mod portal and the derived in-memory indexes built
//! from them on every poll.

pub mod snapshot;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::version::normalize_runtime_version;

pub use snapshot::{Author, CatalogSnapshot, SnapshotCell, ALL_BUCKET};

/// Mods shipped with the game itself. They never count as dependencies and
/// are never added to a tracked list.
pub const VANILLA_MODS: [&str; 4] = ["base", "space-age", "quality", "elevated-rail"];

/// Category tag of portal-internal mods, which sort after everything else.
pub const INTERNAL_CATEGORY: &str = "internal";

/// Thumbnail path the portal uses when a mod has no thumbnail.
const PLACEHOLDER_THUMBNAIL: &str = "/assets/.thumb.png";

/// Metadata embedded in a release archive.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct InfoJson {
    /// Minimum compatible runtime (game) version
    #[serde(default)]
    pub factorio_version: String,
    /// Dependency specifiers, e.g. `"? other-mod >= 1.2"`
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// One versioned publication of a mod.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Release {
    pub version: String,
    pub released_at: String,
    #[serde(default)]
    pub info_json: InfoJson,
}

/// A mod as listed by the bulk catalog endpoint.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Item {
    /// Unique, stable key
    pub name: String,
    pub title: String,
    /// Owning author name
    pub owner: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub downloads_count: u64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub latest_release: Option<Release>,
    /// Only present on detail responses
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Item {
    /// Normalized runtime version of the latest release, if it has a valid one.
    pub fn runtime_version(&self) -> Option<String> {
        self.latest_release
            .as_ref()
            .and_then(|r| normalize_runtime_version(&r.info_json.factorio_version))
    }

    /// Timestamp of the latest release, if any.
    pub fn latest_released_at(&self) -> Option<&str> {
        self.latest_release.as_ref().map(|r| r.released_at.as_str())
    }

    /// Whether this mod belongs to the portal-internal category.
    pub fn is_internal(&self) -> bool {
        self.category.as_deref() == Some(INTERNAL_CATEGORY)
    }

    /// Names of the mods the latest release hard-requires.
    ///
    /// Optional, hidden-optional and incompatible specifiers are ignored, as
    /// are the game's own mods.
    pub fn dependencies(&self) -> Vec<String> {
        let Some(release) = &self.latest_release else {
            return Vec::new();
        };
        release
            .info_json
            .dependencies
            .iter()
            .filter_map(|spec| Dependency::parse(spec))
            .filter(|dep| dep.kind.is_required() && !VANILLA_MODS.contains(&dep.name.as_str()))
            .map(|dep| dep.name)
            .collect()
    }
}

/// A mod with its release history and long-form metadata.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: Item,
    /// Release history, oldest first
    #[serde(default)]
    pub releases: Vec<Release>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl ItemDetail {
    /// Find the release with the given version.
    pub fn release(&self, version: &str) -> Option<&Release> {
        self.releases.iter().find(|r| r.version == version)
    }
}

/// How a dependency specifier relates two mods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Required,
    Optional,
    HiddenOptional,
    Incompatible,
    /// Required, but does not affect load order (`~`)
    Unordered,
}

impl DependencyKind {
    fn is_required(self) -> bool {
        matches!(self, Self::Required | Self::Unordered)
    }
}

/// A parsed dependency specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub name: String,
    /// Version constraint such as `">= 1.2.0"`
    pub constraint: Option<String>,
}

impl Dependency {
    /// Parse a specifier like `"? other mod >= 1.2"`.
    ///
    /// Returns `None` for a blank specifier.
    pub fn parse(spec: &str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            Regex::new(r"^(?:(\(\?\)|\?|!|~)\s*)?(.+?)(?:\s*(<=|>=|<|>|=)\s*(\S+))?$")
                .expect("dependency pattern is valid")
        });

        let caps = re.captures(spec.trim())?;
        let kind = match caps.get(1).map(|m| m.as_str()) {
            Some("!") => DependencyKind::Incompatible,
            Some("?") => DependencyKind::Optional,
            Some("(?)") => DependencyKind::HiddenOptional,
            Some("~") => DependencyKind::Unordered,
            _ => DependencyKind::Required,
        };
        let name = caps.get(2)?.as_str().trim().to_string();
        let constraint = match (caps.get(3), caps.get(4)) {
            (Some(op), Some(version)) => Some(format!("{} {}", op.as_str(), version.as_str())),
            _ => None,
        };

        Some(Self { kind, name, constraint })
    }
}

/// Builds user-facing links into the portal.
#[derive(Debug, Clone)]
pub struct PortalLinks {
    /// Base URL of the portal website, without trailing slash
    pub portal_url: String,
    /// Base URL of the asset host, without trailing slash
    pub assets_url: String,
}

impl PortalLinks {
    pub fn new(portal_url: &str, assets_url: &str) -> Self {
        Self {
            portal_url: portal_url.trim_end_matches('/').to_string(),
            assets_url: assets_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn item_url(&self, name: &str) -> String {
        format!("{}/mod/{}", self.portal_url, name.replace(' ', "%20"))
    }

    pub fn author_url(&self, author: &str) -> String {
        format!("{}/user/{}", self.portal_url, author)
    }

    /// Absolute thumbnail URL, or `None` when the mod uses the placeholder.
    pub fn thumbnail_url(&self, path: Option<&str>) -> Option<String> {
        match path {
            None | Some("") | Some(PLACEHOLDER_THUMBNAIL) => None,
            Some(p) => Some(format!("{}{}", self.assets_url, p)),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn release(version: &str, released_at: &str) -> Release {
        Release {
            version: version.to_string(),
            released_at: released_at.to_string(),
            info_json: InfoJson {
                factorio_version: "2.0".to_string(),
                dependencies: Vec::new(),
            },
        }
    }

    pub fn item(name: &str, owner: &str, downloads: u64, runtime: &str, released_at: &str) -> Item {
        let mut latest = release("1.0.0", released_at);
        latest.info_json.factorio_version = runtime.to_string();
        Item {
            name: name.to_string(),
            title: name.to_uppercase(),
            owner: owner.to_string(),
            summary: String::new(),
            downloads_count: downloads,
            category: None,
            latest_release: Some(latest),
            created_at: None,
        }
    }

    pub fn detail(item: Item, created_at: &str, releases: Vec<Release>) -> ItemDetail {
        let mut item = item;
        item.created_at = Some(created_at.to_string());
        ItemDetail {
            item,
            releases,
            thumbnail: None,
            changelog: None,
            source_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_parse() {
        let dep = Dependency::parse("? bobs mods >= 1.2.0").unwrap();
        assert_eq!(dep.kind, DependencyKind::Optional);
        assert_eq!(dep.name, "bobs mods");
        assert_eq!(dep.constraint.as_deref(), Some(">= 1.2.0"));

        let dep = Dependency::parse("(?) hidden").unwrap();
        assert_eq!(dep.kind, DependencyKind::HiddenOptional);
        assert_eq!(dep.name, "hidden");

        let dep = Dependency::parse("!conflicting").unwrap();
        assert_eq!(dep.kind, DependencyKind::Incompatible);

        let dep = Dependency::parse("~ flib>=0.12").unwrap();
        assert_eq!(dep.kind, DependencyKind::Unordered);
        assert_eq!(dep.name, "flib");
        assert_eq!(dep.constraint.as_deref(), Some(">= 0.12"));

        let dep = Dependency::parse("base").unwrap();
        assert_eq!(dep.kind, DependencyKind::Required);
        assert_eq!(dep.constraint, None);

        assert!(Dependency::parse("   ").is_none());
    }

    #[test]
    fn test_item_dependencies_keep_required_only() {
        let mut item = test_support::item("a", "acme", 0, "2.0", "2024-01-01T00:00:00.000000Z");
        if let Some(release) = item.latest_release.as_mut() {
            release.info_json.dependencies = vec![
                "base >= 2.0".to_string(),
                "flib >= 0.14".to_string(),
                "? optional-thing".to_string(),
                "! enemy".to_string(),
                "~ unordered".to_string(),
            ];
        }
        assert_eq!(item.dependencies(), vec!["flib".to_string(), "unordered".to_string()]);
    }

    #[test]
    fn test_decode_portal_item() {
        let json = r#"{
            "name": "Krastorio2",
            "title": "Krastorio 2",
            "owner": "raiguard",
            "summary": "Overhaul",
            "downloads_count": 12345,
            "category": "overhaul",
            "latest_release": {
                "download_url": "/download/Krastorio2/1",
                "file_name": "Krastorio2_1.3.24.zip",
                "info_json": {"factorio_version": "1.1"},
                "released_at": "2023-11-21T14:08:46.391000Z",
                "version": "1.3.24",
                "sha1": "abc"
            },
            "score": 10.5
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.name, "Krastorio2");
        assert_eq!(item.runtime_version().as_deref(), Some("1.1"));
        assert_eq!(item.latest_released_at(), Some("2023-11-21T14:08:46.391000Z"));
        assert!(item.created_at.is_none());
    }

    #[test]
    fn test_decode_item_without_release() {
        let json = r#"{"name": "empty", "title": "Empty", "owner": "nobody"}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.runtime_version(), None);
        assert_eq!(item.downloads_count, 0);
    }

    #[test]
    fn test_portal_links() {
        let links = PortalLinks::new("https://mods.factorio.com/", "https://assets-mod.factorio.com");
        assert_eq!(links.item_url("Bob Mods"), "https://mods.factorio.com/mod/Bob%20Mods");
        assert_eq!(links.author_url("acme"), "https://mods.factorio.com/user/acme");
        assert_eq!(links.thumbnail_url(Some("/assets/.thumb.png")), None);
        assert_eq!(links.thumbnail_url(None), None);
        assert_eq!(
            links.thumbnail_url(Some("/assets/abc.thumb.png")).as_deref(),
            Some("https://assets-mod.factorio.com/assets/abc.thumb.png")
        );
    }
}
