//! Per-destination subscription state.
//!
//! Each destination (a guild) decides where update messages go and which mods
//! it cares about. The full map is persisted as one document; every mutation
//! is a load → mutate → save sequence under a single lock, so two commands
//! racing on the same destination can never lose each other's changes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::catalog::{Author, VANILLA_MODS};
use crate::error::{ModwatchError, Result};
use crate::state::{read_json, write_json, StateStore};
use crate::utils::retry::RetryPolicy;

pub const SUBSCRIPTIONS_KEY: &str = "subscriptions";

/// Destination identifier (a guild ID).
pub type DestinationId = String;

/// Every destination's subscription, keyed by destination.
pub type SubscriptionMap = BTreeMap<DestinationId, Subscription>;

/// Notification settings of one destination.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Subscription {
    /// Channel update messages go to
    pub channel: Option<String>,
    /// Whether update messages are sent at all
    pub notifications_enabled: bool,
    /// Announce every mod, superseding the tracked sets
    pub track_all: bool,
    /// Include changelog text in update messages
    pub changelogs: bool,
    pub tracked_items: BTreeSet<String>,
    pub tracked_authors: BTreeSet<String>,
}

impl Subscription {
    /// Whether this destination should receive messages at all.
    pub fn is_deliverable(&self) -> bool {
        self.notifications_enabled && self.channel.as_deref().is_some_and(|c| !c.is_empty())
    }

    pub fn tracks_item(&self, name: &str) -> bool {
        self.track_all || self.tracked_items.contains(name)
    }

    pub fn tracks_author(&self, author: &str) -> bool {
        self.track_all || self.tracked_authors.contains(author)
    }

    /// Track one mod. Explicit tracking turns off track-all.
    pub fn track_item(&mut self, name: &str) -> bool {
        self.track_all = false;
        self.tracked_items.insert(name.to_string())
    }

    pub fn untrack_item(&mut self, name: &str) -> bool {
        self.tracked_items.remove(name)
    }

    /// Track an author: their current mods now, and their new mods as they appear.
    pub fn track_author(&mut self, author: &Author) {
        self.track_all = false;
        self.tracked_authors.insert(author.name.clone());
        for item in &author.items {
            self.tracked_items.insert(item.name.clone());
        }
    }

    /// Stop tracking an author and every mod they currently own.
    pub fn untrack_author(&mut self, author: &Author) -> bool {
        for item in &author.items {
            self.tracked_items.remove(&item.name);
        }
        self.tracked_authors.remove(&author.name)
    }

    /// Track the enabled mods of a game `mod-list.json`, skipping the game's own.
    ///
    /// Returns how many mods were newly added.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the document is not a mod list.
    pub fn track_mod_list(&mut self, mod_list_json: &[u8]) -> Result<usize> {
        let list: ModList = serde_json::from_slice(mod_list_json)
            .map_err(|e| ModwatchError::Validation(format!("Not a valid mod-list.json: {}", e)))?;
        let added = list
            .mods
            .into_iter()
            .filter(|m| m.enabled && !VANILLA_MODS.contains(&m.name.as_str()))
            .filter(|m| self.tracked_items.insert(m.name.clone()))
            .count();
        Ok(added)
    }

    pub fn clear_tracked(&mut self) {
        self.tracked_items.clear();
        self.tracked_authors.clear();
    }

    pub fn set_channel(&mut self, channel: &str) {
        self.channel = Some(channel.to_string());
    }

    /// Turn update messages on or off.
    ///
    /// # Errors
    ///
    /// Enabling fails while no channel is configured.
    pub fn set_notifications(&mut self, enabled: bool) -> Result<()> {
        if enabled && self.channel.as_deref().map_or(true, str::is_empty) {
            return Err(ModwatchError::Validation(
                "Set an update channel before enabling update messages".to_string(),
            ));
        }
        self.notifications_enabled = enabled;
        Ok(())
    }

    pub fn set_track_all(&mut self, enabled: bool) {
        self.track_all = enabled;
    }

    pub fn set_changelogs(&mut self, enabled: bool) {
        self.changelogs = enabled;
    }
}

#[derive(Deserialize)]
struct ModList {
    mods: Vec<ModListEntry>,
}

#[derive(Deserialize)]
struct ModListEntry {
    name: String,
    #[serde(default)]
    enabled: bool,
}

/// Persisted subscription map with linearized mutations.
pub struct SubscriptionStore {
    state: Arc<dyn StateStore>,
    read_policy: RetryPolicy,
    lock: Mutex<()>,
}

impl SubscriptionStore {
    pub fn new(state: Arc<dyn StateStore>, read_policy: RetryPolicy) -> Self {
        Self {
            state,
            read_policy,
            lock: Mutex::new(()),
        }
    }

    /// Read the current map. The result is a copy; mutate through [`Self::update`].
    ///
    /// # Errors
    ///
    /// Fails with `CorruptState` if the document never decodes.
    pub async fn load(&self) -> Result<SubscriptionMap> {
        let map: Option<SubscriptionMap> =
            read_json(self.state.as_ref(), SUBSCRIPTIONS_KEY, &self.read_policy).await?;
        Ok(map.unwrap_or_default())
    }

    /// Overwrite the whole map.
    pub async fn save(&self, map: &SubscriptionMap) -> Result<()> {
        let _guard = self.lock.lock().await;
        write_json(self.state.as_ref(), SUBSCRIPTIONS_KEY, map).await
    }

    /// Load the freshest map, apply `mutate` and write it back, all under the store lock.
    ///
    /// Nothing is written if loading fails.
    pub async fn update<T>(&self, mutate: impl FnOnce(&mut SubscriptionMap) -> T) -> Result<T> {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await?;
        let result = mutate(&mut map);
        write_json(self.state.as_ref(), SUBSCRIPTIONS_KEY, &map).await?;
        Ok(result)
    }

    /// Like [`Self::update`] for a single destination, creating its entry if missing.
    pub async fn update_destination<T>(
        &self,
        destination: &str,
        mutate: impl FnOnce(&mut Subscription) -> T,
    ) -> Result<T> {
        self.update(|map| mutate(map.entry(destination.to_string()).or_default()))
            .await
    }

    /// Read one destination's subscription, defaulting when it has none yet.
    pub async fn get(&self, destination: &str) -> Result<Subscription> {
        Ok(self.load().await?.remove(destination).unwrap_or_default())
    }

    /// Make sure a destination has an entry. Existing entries are left alone.
    pub async fn ensure_destination(&self, destination: &str) -> Result<()> {
        if self.load().await?.contains_key(destination) {
            return Ok(());
        }
        self.update_destination(destination, |_| ()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::item;
    use crate::state::memory::MemoryStore;
    use std::time::Duration;

    const T: &str = "2024-01-01T00:00:00.000000Z";

    fn acme() -> Author {
        Author {
            name: "acme".to_string(),
            items: vec![
                Arc::new(item("rockets", "acme", 10, "2.0", T)),
                Arc::new(item("trains", "acme", 5, "2.0", T)),
            ],
            downloads: 15,
        }
    }

    fn store() -> (Arc<MemoryStore>, Arc<SubscriptionStore>) {
        let memory = Arc::new(MemoryStore::default());
        let policy = RetryPolicy {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        (memory.clone(), Arc::new(SubscriptionStore::new(memory, policy)))
    }

    #[test]
    fn test_notifications_require_channel() {
        let mut sub = Subscription::default();
        assert!(sub.set_notifications(true).is_err());
        assert!(!sub.notifications_enabled);

        sub.set_channel("123");
        sub.set_notifications(true).unwrap();
        assert!(sub.is_deliverable());

        // Disabling never needs a channel
        let mut other = Subscription::default();
        other.set_notifications(false).unwrap();
    }

    #[test]
    fn test_track_item_disables_track_all() {
        let mut sub = Subscription::default();
        sub.set_track_all(true);
        assert!(sub.tracks_item("anything"));

        assert!(sub.track_item("rockets"));
        assert!(!sub.track_item("rockets"));
        assert!(!sub.track_all);
        assert!(sub.tracks_item("rockets"));
        assert!(!sub.tracks_item("anything"));
    }

    #[test]
    fn test_track_and_untrack_author() {
        let mut sub = Subscription::default();
        sub.track_item("other");
        sub.track_author(&acme());
        assert!(sub.tracks_author("acme"));
        assert_eq!(
            sub.tracked_items.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["other", "rockets", "trains"]
        );

        assert!(sub.untrack_author(&acme()));
        assert!(!sub.tracks_author("acme"));
        assert_eq!(sub.tracked_items.len(), 1);
    }

    #[test]
    fn test_track_mod_list_skips_disabled_and_vanilla() {
        let mut sub = Subscription::default();
        sub.track_item("rockets");
        let json = br#"{"mods": [
            {"name": "base", "enabled": true},
            {"name": "space-age", "enabled": true},
            {"name": "rockets", "enabled": true},
            {"name": "trains", "enabled": true},
            {"name": "disabled-thing", "enabled": false}
        ]}"#;
        assert_eq!(sub.track_mod_list(json).unwrap(), 1);
        assert!(sub.tracks_item("trains"));
        assert!(!sub.tracks_item("base"));
        assert!(!sub.tracks_item("disabled-thing"));

        assert!(sub.track_mod_list(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_update_destination_creates_and_persists() {
        let (memory, store) = store();
        store
            .update_destination("guild-1", |sub| sub.track_item("rockets"))
            .await
            .unwrap();

        assert!(memory.get(SUBSCRIPTIONS_KEY).is_some());
        let sub = store.get("guild-1").await.unwrap();
        assert!(sub.tracks_item("rockets"));
        assert_eq!(store.get("unknown").await.unwrap(), Subscription::default());
    }

    #[tokio::test]
    async fn test_ensure_destination_keeps_existing() {
        let (_memory, store) = store();
        store.update_destination("g", |sub| sub.set_channel("42")).await.unwrap();
        store.ensure_destination("g").await.unwrap();
        store.ensure_destination("h").await.unwrap();

        let map = store.load().await.unwrap();
        assert_eq!(map["g"].channel.as_deref(), Some("42"));
        assert_eq!(map["h"], Subscription::default());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let (_memory, store) = store();
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .update_destination("guild", |sub| sub.track_item(&format!("mod-{}", i)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.get("guild").await.unwrap().tracked_items.len(), 20);
    }

    #[tokio::test]
    async fn test_corrupt_document_aborts_update() {
        let (memory, store) = store();
        memory.put(SUBSCRIPTIONS_KEY, "{\"guild\": ");
        let err = store.update_destination("guild", |sub| sub.track_item("x")).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(memory.get(SUBSCRIPTIONS_KEY).as_deref(), Some("{\"guild\": "));
    }

    #[test]
    fn test_decodes_partial_records() {
        let map: SubscriptionMap = serde_json::from_str(r#"{"1": {"channel": "9", "track_all": true}}"#).unwrap();
        assert!(map["1"].track_all);
        assert!(map["1"].tracked_items.is_empty());
        assert!(!map["1"].is_deliverable());
    }
}
