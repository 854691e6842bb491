//! Autocomplete callbacks.
//!
//! Plain substring matching over the current catalog snapshot or the
//! guild's tracked sets.

use crate::catalog::{CatalogSnapshot, ALL_BUCKET, snapshot::SEARCH_LIMIT};
use crate::commands::destination;
use crate::types::Context;

/// The bucket to search: `requested` if it has mods, else the default version, else everything.
pub fn resolve_bucket<'a>(snapshot: &'a CatalogSnapshot, requested: Option<&'a str>, default: &'a str) -> &'a str {
    [requested, Some(default)]
        .into_iter()
        .flatten()
        .find(|v| snapshot.bucket(v).is_some())
        .unwrap_or(ALL_BUCKET)
}

pub async fn mod_name(context: Context<'_>, partial: &str) -> Vec<String> {
    let data = context.data();
    let snapshot = data.catalog.load();
    let bucket = resolve_bucket(&snapshot, None, &data.default_version);
    snapshot
        .search_items(bucket, partial)
        .into_iter()
        .map(|item| item.name.clone())
        .collect()
}

pub async fn author_name(context: Context<'_>, partial: &str) -> Vec<String> {
    let snapshot = context.data().catalog.load();
    snapshot
        .search_authors(partial)
        .into_iter()
        .map(|author| author.name.clone())
        .collect()
}

pub async fn runtime_version(context: Context<'_>, partial: &str) -> Vec<String> {
    let snapshot = context.data().catalog.load();
    snapshot
        .bucket_names()
        .filter(|name| *name != ALL_BUCKET && name.starts_with(partial))
        .map(str::to_string)
        .collect()
}

pub async fn tracked_mod(context: Context<'_>, partial: &str) -> Vec<String> {
    tracked(context, partial, |sub| sub.tracked_items.iter().cloned().collect()).await
}

pub async fn tracked_author(context: Context<'_>, partial: &str) -> Vec<String> {
    tracked(context, partial, |sub| sub.tracked_authors.iter().cloned().collect()).await
}

async fn tracked(
    context: Context<'_>,
    partial: &str,
    pick: impl FnOnce(&crate::subscriptions::Subscription) -> Vec<String>,
) -> Vec<String> {
    let Some(destination) = destination(context) else {
        return Vec::new();
    };
    let subscription = match context.data().subscriptions.get(&destination).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!("Autocomplete could not read subscriptions: {}", e);
            return Vec::new();
        }
    };
    let partial = partial.to_lowercase();
    pick(&subscription)
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&partial))
        .take(SEARCH_LIMIT)
        .collect()
}
