//! Notification planning.
//!
//! Decides, per destination, which change events become notifications. The
//! plan is computed without side effects; tracking changes it implies are
//! returned alongside so the caller can persist them before sending.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::catalog::PortalLinks;
use crate::changelog::extract_section;
use crate::changes::ChangeEvent;
use crate::subscriptions::{DestinationId, SubscriptionMap};

/// One message to deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub item_name: String,
    pub title: String,
    pub url: String,
    pub author: String,
    pub version: String,
    pub released_at: String,
    pub is_new: bool,
    pub changelog: Option<String>,
    pub thumbnail: Option<String>,
}

/// Notifications for one destination, in the order they must be sent.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub destination: DestinationId,
    pub channel: String,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Default)]
pub struct DispatchPlan {
    pub deliveries: Vec<Delivery>,
    /// Items to add to each destination's tracked set
    pub implicit_tracks: BTreeMap<DestinationId, BTreeSet<String>>,
}

impl DispatchPlan {
    pub fn notification_count(&self) -> usize {
        self.deliveries.iter().map(|d| d.notifications.len()).sum()
    }
}

/// Plan the notifications for `events` across all `subscriptions`.
///
/// New mods are announced to destinations tracking everything or tracking
/// the mod's author; in the latter case the mod becomes tracked, so its later
/// updates in this and future cycles are announced as well. Updates are
/// announced to destinations tracking everything or tracking the mod.
///
/// # Examples
///
/// ```
/// use modwatch::catalog::PortalLinks;
/// use modwatch::dispatch::plan_dispatch;
/// use modwatch::subscriptions::SubscriptionMap;
///
/// let links = PortalLinks::new("https://mods.factorio.com", "https://assets-mod.factorio.com");
/// let plan = plan_dispatch(&[], &SubscriptionMap::new(), &links);
/// assert!(plan.deliveries.is_empty());
/// ```
pub fn plan_dispatch(events: &[ChangeEvent], subscriptions: &SubscriptionMap, links: &PortalLinks) -> DispatchPlan {
    let mut plan = DispatchPlan::default();

    for (destination, subscription) in subscriptions {
        if !subscription.is_deliverable() {
            continue;
        }
        let Some(channel) = subscription.channel.clone() else {
            continue;
        };

        let mut tracked = subscription.tracked_items.clone();
        let mut sent: HashSet<(String, String)> = HashSet::new();
        let mut notifications = Vec::new();

        for event in events {
            let name = event.item_name();
            let author = event.item.item.owner.as_str();

            let include = if event.is_new {
                if subscription.track_all {
                    true
                } else if subscription.tracks_author(author) {
                    if tracked.insert(name.to_string()) {
                        plan.implicit_tracks
                            .entry(destination.clone())
                            .or_default()
                            .insert(name.to_string());
                    }
                    true
                } else {
                    false
                }
            } else {
                subscription.track_all || tracked.contains(name)
            };

            if include && sent.insert((name.to_string(), event.release.version.clone())) {
                notifications.push(build_notification(event, subscription.changelogs, links));
            }
        }

        if !notifications.is_empty() {
            plan.deliveries.push(Delivery {
                destination: destination.clone(),
                channel,
                notifications,
            });
        }
    }
    plan
}

fn build_notification(event: &ChangeEvent, with_changelog: bool, links: &PortalLinks) -> Notification {
    let detail = &event.item;
    let changelog = if with_changelog {
        detail
            .changelog
            .as_deref()
            .map(|text| extract_section(text, &event.release.version, detail.source_url.as_deref()))
            .filter(|section| !section.is_empty())
    } else {
        None
    };

    Notification {
        item_name: detail.item.name.clone(),
        title: detail.item.title.clone(),
        url: links.item_url(&detail.item.name),
        author: detail.item.owner.clone(),
        version: event.release.version.clone(),
        released_at: event.release.released_at.clone(),
        is_new: event.is_new,
        changelog,
        thumbnail: links.thumbnail_url(detail.thumbnail.as_deref()),
    }
}
