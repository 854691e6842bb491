//! In-memory catalog indexes.
//!
//! A [`CatalogSnapshot`] is built from scratch on every poll and published
//! through a [`SnapshotCell`]. Readers hold an `Arc` to one snapshot for the
//! whole request, so they never see a half-built index.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use super::Item;

/// Bucket key that holds every item regardless of runtime version.
pub const ALL_BUCKET: &str = "all";

/// Maximum number of results returned by the search helpers.
pub const SEARCH_LIMIT: usize = 25;

/// An author and the mods they own.
#[derive(Debug, Clone)]
pub struct Author {
    pub name: String,
    /// Owned items, in catalog order
    pub items: Vec<Arc<Item>>,
    /// Sum of the downloads of every owned item
    pub downloads: u64,
}

/// Immutable index over one fetched catalog.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    items: HashMap<String, Arc<Item>>,
    authors: HashMap<String, Author>,
    authors_by_downloads: Vec<String>,
    buckets: BTreeMap<String, Vec<Arc<Item>>>,
    dependents: HashMap<String, Vec<String>>,
}

impl CatalogSnapshot {
    /// Build every index from a freshly fetched catalog.
    ///
    /// Items without a valid runtime version only land in the [`ALL_BUCKET`].
    /// When `known_versions` is given, runtime versions outside it are treated
    /// the same way.
    pub fn rebuild(items: Vec<Item>, known_versions: Option<&BTreeSet<String>>) -> Self {
        let mut by_name = HashMap::with_capacity(items.len());
        let mut authors: HashMap<String, Author> = HashMap::new();
        let mut author_order = Vec::new();
        let mut buckets: BTreeMap<String, Vec<Arc<Item>>> = BTreeMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for item in items {
            let item = Arc::new(item);

            let author = authors.entry(item.owner.clone()).or_insert_with(|| {
                author_order.push(item.owner.clone());
                Author {
                    name: item.owner.clone(),
                    items: Vec::new(),
                    downloads: 0,
                }
            });
            author.items.push(Arc::clone(&item));
            author.downloads += item.downloads_count;

            let version = item
                .runtime_version()
                .filter(|v| known_versions.map_or(true, |known| known.contains(v)));
            if let Some(version) = version {
                buckets.entry(version).or_default().push(Arc::clone(&item));
            }
            buckets.entry(ALL_BUCKET.to_string()).or_default().push(Arc::clone(&item));

            for dependency in item.dependencies() {
                dependents.entry(dependency).or_default().push(item.name.clone());
            }

            by_name.insert(item.name.clone(), item);
        }

        // Stable sorts keep catalog order among equals
        for bucket in buckets.values_mut() {
            bucket.sort_by(|a, b| {
                a.is_internal()
                    .cmp(&b.is_internal())
                    .then_with(|| b.downloads_count.cmp(&a.downloads_count))
            });
        }
        author_order.sort_by(|a, b| authors[b].downloads.cmp(&authors[a].downloads));

        Self {
            items: by_name,
            authors,
            authors_by_downloads: author_order,
            buckets,
            dependents,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, name: &str) -> Option<&Arc<Item>> {
        self.items.get(name)
    }

    pub fn author(&self, name: &str) -> Option<&Author> {
        self.authors.get(name)
    }

    /// Items compatible with a runtime version, in display order.
    pub fn bucket(&self, version: &str) -> Option<&[Arc<Item>]> {
        self.buckets.get(version).map(Vec::as_slice)
    }

    /// Runtime versions that have at least one item, plus [`ALL_BUCKET`].
    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Names of the items that hard-require `name`.
    pub fn dependents(&self, name: &str) -> &[String] {
        self.dependents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Search a bucket by title, then by name; prefix matches first.
    pub fn search_items(&self, version: &str, query: &str) -> Vec<Arc<Item>> {
        let Some(bucket) = self.bucket(version) else {
            return Vec::new();
        };
        if query.is_empty() {
            return bucket.iter().take(SEARCH_LIMIT).cloned().collect();
        }

        let query = query.to_lowercase();
        let mut title_prefix = Vec::new();
        let mut title_infix = Vec::new();
        let mut name_prefix = Vec::new();
        let mut name_infix = Vec::new();
        for item in bucket {
            if title_prefix.len() == SEARCH_LIMIT {
                break;
            }
            let title = item.title.to_lowercase();
            let name = item.name.to_lowercase();
            match (title.find(&query), name.find(&query)) {
                (Some(0), _) => title_prefix.push(Arc::clone(item)),
                (Some(_), _) => title_infix.push(Arc::clone(item)),
                (None, Some(0)) => name_prefix.push(Arc::clone(item)),
                (None, Some(_)) => name_infix.push(Arc::clone(item)),
                (None, None) => {}
            }
        }

        title_prefix
            .into_iter()
            .chain(title_infix)
            .chain(name_prefix)
            .chain(name_infix)
            .take(SEARCH_LIMIT)
            .collect()
    }

    /// Search authors by name, prefix matches first, most downloaded first.
    pub fn search_authors(&self, query: &str) -> Vec<&Author> {
        let query = query.to_lowercase();
        let mut prefix = Vec::new();
        let mut infix = Vec::new();
        for name in &self.authors_by_downloads {
            if prefix.len() == SEARCH_LIMIT {
                break;
            }
            match name.to_lowercase().find(&query) {
                Some(0) => prefix.push(&self.authors[name]),
                Some(_) => infix.push(&self.authors[name]),
                None => {}
            }
        }
        prefix.into_iter().chain(infix).take(SEARCH_LIMIT).collect()
    }
}

/// Shared slot holding the current snapshot.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently published snapshot.
    pub fn load(&self) -> Arc<CatalogSnapshot> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the current snapshot. Readers holding the old one keep it.
    pub fn publish(&self, snapshot: CatalogSnapshot) {
        let snapshot = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::item;

    const T: &str = "2024-01-01T00:00:00.000000Z";

    fn catalog() -> Vec<Item> {
        let mut internal = item("core-lib", "wube", 1_000_000, "2.0", T);
        internal.category = Some("internal".to_string());
        let mut broken = item("broken", "acme", 50, "2.x", T);
        broken.title = "Broken Thing".to_string();
        let mut dependent = item("uses-lib", "acme", 30, "2.0", T);
        if let Some(r) = dependent.latest_release.as_mut() {
            r.info_json.dependencies = vec!["lib >= 1.0".to_string(), "? extra".to_string()];
        }
        vec![
            internal,
            item("lib", "acme", 500, "2.0", T),
            broken,
            item("old", "retro", 900, "0.18", T),
            dependent,
            item("tie", "retro", 500, "2.0", T),
        ]
    }

    fn names(items: &[Arc<Item>]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_buckets_order_internal_last_then_downloads() {
        let snapshot = CatalogSnapshot::rebuild(catalog(), None);
        assert_eq!(names(snapshot.bucket("2.0").unwrap()), vec!["lib", "tie", "uses-lib", "core-lib"]);
        assert_eq!(names(snapshot.bucket("0.18").unwrap()), vec!["old"]);
    }

    #[test]
    fn test_versionless_items_only_in_all_bucket() {
        let snapshot = CatalogSnapshot::rebuild(catalog(), None);
        let all = names(snapshot.bucket(ALL_BUCKET).unwrap());
        assert!(all.contains(&"broken"));
        assert_eq!(all.len(), 6);
        assert_eq!(all.last(), Some(&"core-lib"));
        assert!(snapshot.bucket("2.x").is_none());
        let buckets: Vec<&str> = snapshot.bucket_names().collect();
        assert_eq!(buckets, vec!["0.18", "2.0", "all"]);
    }

    #[test]
    fn test_known_versions_allowlist() {
        let known: BTreeSet<String> = ["2.0".to_string()].into_iter().collect();
        let snapshot = CatalogSnapshot::rebuild(catalog(), Some(&known));
        assert!(snapshot.bucket("0.18").is_none());
        assert!(names(snapshot.bucket(ALL_BUCKET).unwrap()).contains(&"old"));
    }

    #[test]
    fn test_authors_aggregate() {
        let snapshot = CatalogSnapshot::rebuild(catalog(), None);
        let acme = snapshot.author("acme").unwrap();
        assert_eq!(acme.downloads, 580);
        assert_eq!(names(&acme.items), vec!["lib", "broken", "uses-lib"]);
        let authors: Vec<&str> = snapshot.search_authors("").iter().map(|a| a.name.as_str()).collect();
        assert_eq!(authors, vec!["wube", "retro", "acme"]);
    }

    #[test]
    fn test_dependents_index() {
        let snapshot = CatalogSnapshot::rebuild(catalog(), None);
        assert_eq!(snapshot.dependents("lib"), &["uses-lib".to_string()]);
        assert!(snapshot.dependents("extra").is_empty());
    }

    #[test]
    fn test_search_items_prefers_title_prefix() {
        let snapshot = CatalogSnapshot::rebuild(catalog(), None);
        let found = snapshot.search_items(ALL_BUCKET, "li");
        // "LIB" title prefix before "USES-LIB" and "CORE-LIB" infix matches
        assert_eq!(names(&found), vec!["lib", "uses-lib", "core-lib"]);
        assert!(snapshot.search_items("9.9", "li").is_empty());
    }

    #[test]
    fn test_snapshot_cell_swap_keeps_old_readers() {
        let cell = SnapshotCell::new();
        assert!(cell.load().is_empty());

        cell.publish(CatalogSnapshot::rebuild(catalog(), None));
        let held = cell.load();
        assert_eq!(held.len(), 6);

        cell.publish(CatalogSnapshot::rebuild(Vec::new(), None));
        assert_eq!(held.len(), 6);
        assert!(cell.load().is_empty());
    }
}
