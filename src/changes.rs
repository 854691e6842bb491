//! Change detection.
//!
//! Compares a freshly fetched catalog against the watermark and turns every
//! release inside the window into a [`ChangeEvent`], oldest first. The window
//! ends at the cycle start, so releases published while a cycle runs are left
//! for the next one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::catalog::{Item, ItemDetail, Release};
use crate::error::Result;
use crate::portal::CatalogSource;
use crate::version::{is_release_newer, parse_timestamp};
use crate::watermark::PendingRetries;

/// One release to announce.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub item: Arc<ItemDetail>,
    pub release: Release,
    /// Whether this announces a brand-new mod rather than an update
    pub is_new: bool,
}

impl ChangeEvent {
    pub fn item_name(&self) -> &str {
        &self.item.item.name
    }
}

/// Result of one detection pass.
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Events in ascending release time
    pub events: Vec<ChangeEvent>,
    /// Items whose detail fetch failed, with the window start to retry from
    pub failed: Vec<(String, String)>,
}

struct Candidate {
    name: String,
    since: String,
}

/// Detect the releases published since `watermark` and before `until`.
///
/// Only items whose latest release is at or after the watermark are fetched,
/// plus every pending retry, which keeps its own (older) window start.
///
/// # Errors
///
/// Returns `InvalidTimestamp` if `watermark` is not a valid timestamp. Failures
/// of single items never fail the pass.
pub async fn detect_changes(
    source: &dyn CatalogSource,
    catalog: &[Arc<Item>],
    watermark: &str,
    until: DateTime<Utc>,
    pending: &PendingRetries,
) -> Result<ChangeSet> {
    parse_timestamp(watermark)?;

    let candidates = select_candidates(catalog, watermark, pending);
    tracing::debug!("{} candidate(s) since {}", candidates.len(), watermark);

    let mut set = ChangeSet::default();
    let mut timed: Vec<(DateTime<Utc>, ChangeEvent)> = Vec::new();
    let mut window_starts: HashMap<String, DateTime<Utc>> = HashMap::new();

    for candidate in candidates {
        let detail = match source.fetch_item_detail(&candidate.name, true).await {
            Ok(detail) => Arc::new(detail),
            Err(e) => {
                tracing::warn!("Failed to fetch details of '{}': {}", candidate.name, e);
                set.failed.push((candidate.name, candidate.since));
                continue;
            }
        };

        match releases_between(&detail, &candidate.since, until) {
            Ok(releases) => {
                for (time, release) in releases {
                    timed.push((
                        time,
                        ChangeEvent {
                            item: Arc::clone(&detail),
                            release,
                            is_new: false,
                        },
                    ));
                }
                // Already validated by releases_between
                if let Ok(since) = parse_timestamp(&candidate.since) {
                    window_starts.insert(candidate.name, since);
                }
            }
            Err(e) => tracing::warn!("Skipping '{}': {}", candidate.name, e),
        }
    }

    timed.sort_by_key(|(time, _)| *time);
    set.events = timed.into_iter().map(|(_, event)| event).collect();
    tag_new_items(&mut set.events, &window_starts);
    Ok(set)
}

fn select_candidates(catalog: &[Arc<Item>], watermark: &str, pending: &PendingRetries) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for item in catalog {
        if pending.contains_key(&item.name) || item.runtime_version().is_none() {
            continue;
        }
        let Some(released_at) = item.latest_released_at() else {
            continue;
        };
        match is_release_newer(released_at, watermark) {
            Ok(true) => {
                if seen.insert(item.name.clone()) {
                    candidates.push(Candidate {
                        name: item.name.clone(),
                        since: watermark.to_string(),
                    });
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Ignoring '{}' with bad release time: {}", item.name, e),
        }
    }

    for (name, since) in pending {
        if seen.insert(name.clone()) {
            candidates.push(Candidate {
                name: name.clone(),
                since: since.clone(),
            });
        }
    }
    candidates
}

/// Releases at or after `since` and strictly before `until`, walking back from the newest.
fn releases_between(detail: &ItemDetail, since: &str, until: DateTime<Utc>) -> Result<Vec<(DateTime<Utc>, Release)>> {
    let mut found = Vec::new();
    for release in detail.releases.iter().rev() {
        let time = parse_timestamp(&release.released_at)?;
        if time >= until {
            continue;
        }
        if !is_release_newer(&release.released_at, since)? {
            break;
        }
        found.push((time, release.clone()));
    }
    Ok(found)
}

/// Tag the first event of each item created inside its window as new.
///
/// Later releases of the same item in the same pass stay updates, so a mod
/// is announced as new at most once.
fn tag_new_items(events: &mut [ChangeEvent], window_starts: &HashMap<String, DateTime<Utc>>) {
    let mut seen: HashSet<String> = HashSet::new();
    for event in events.iter_mut() {
        let first = seen.insert(event.item_name().to_string());
        let created_inside = match (&event.item.item.created_at, window_starts.get(event.item_name())) {
            (Some(created), Some(since)) => parse_timestamp(created).is_ok_and(|c| c >= *since),
            _ => false,
        };
        event.is_new = first && created_inside;
    }
}
