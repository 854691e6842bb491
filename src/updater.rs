//! Background update poller.
//!
//! Each cycle refreshes the catalog snapshot, detects releases since the
//! watermark, persists the tracking changes those releases imply, sends the
//! notifications and finally moves the watermark forward. Cycles run with a
//! fixed delay between them until shutdown is requested.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::catalog::{CatalogSnapshot, PortalLinks, SnapshotCell, ALL_BUCKET};
use crate::changes::detect_changes;
use crate::dispatch::{plan_dispatch, DispatchPlan};
use crate::error::Result;
use crate::notify::NotificationSink;
use crate::portal::CatalogSource;
use crate::subscriptions::SubscriptionStore;
use crate::version::format_timestamp;
use crate::watermark::{prune_pending, PendingRetries, WatermarkStore};

/// Poller tuning.
#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    /// Delay between the end of one cycle and the start of the next
    pub interval: Duration,
    /// How long a failed detail fetch keeps being retried
    pub lookback: chrono::Duration,
    /// Runtime versions that get their own bucket; `None` accepts any
    pub known_versions: Option<BTreeSet<String>>,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// The catalog could not be fetched; nothing else happened
    pub skipped: bool,
    pub events: usize,
    pub sent: usize,
    pub send_failures: usize,
    /// Items whose details will be fetched again next cycle
    pub pending: usize,
    /// Watermark in effect after the cycle
    pub watermark: String,
}

pub struct Updater {
    source: Arc<dyn CatalogSource>,
    sink: Arc<dyn NotificationSink>,
    catalog: Arc<SnapshotCell>,
    subscriptions: Arc<SubscriptionStore>,
    watermark: WatermarkStore,
    links: PortalLinks,
    settings: UpdaterSettings,
}

impl Updater {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        sink: Arc<dyn NotificationSink>,
        catalog: Arc<SnapshotCell>,
        subscriptions: Arc<SubscriptionStore>,
        watermark: WatermarkStore,
        links: PortalLinks,
        settings: UpdaterSettings,
    ) -> Self {
        Self {
            source,
            sink,
            catalog,
            subscriptions,
            watermark,
            links,
            settings,
        }
    }

    /// Run cycles until `shutdown` flips to `true` or its sender goes away.
    ///
    /// An in-flight cycle always completes before the poller stops.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error (corrupt persisted state). Any other
    /// failure is logged and the next cycle runs as scheduled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!("Update poller started, interval {:?}", self.settings.interval);
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) if report.skipped => {}
                Ok(report) => tracing::info!(
                    "Update cycle done: {} event(s), {} sent, {} failed, {} pending, watermark {}",
                    report.events,
                    report.sent,
                    report.send_failures,
                    report.pending,
                    report.watermark
                ),
                Err(e) if e.is_fatal() => {
                    tracing::error!("Stopping update poller: {}", e);
                    return Err(e);
                }
                Err(e) => tracing::warn!("Update cycle failed: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Update poller stopped");
        Ok(())
    }

    /// Run one cycle starting now.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as if it started at `cycle_start`.
    ///
    /// Only releases before `cycle_start` are announced. The watermark only
    /// moves, to `cycle_start`, once implicit tracking is persisted and every
    /// notification was attempted.
    pub async fn run_cycle_at(&self, cycle_start: DateTime<Utc>) -> Result<CycleReport> {
        let watermark = self.watermark.load_or_init(cycle_start).await?;

        let items = match self.source.fetch_catalog().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("Skipping update cycle, catalog fetch failed: {}", e);
                return Ok(CycleReport {
                    skipped: true,
                    watermark,
                    ..CycleReport::default()
                });
            }
        };

        let snapshot = CatalogSnapshot::rebuild(items, self.settings.known_versions.as_ref());
        tracing::debug!("Catalog refreshed with {} mod(s)", snapshot.len());
        self.catalog.publish(snapshot);
        let snapshot = self.catalog.load();

        let stored_pending = self.watermark.pending().await?;
        let mut pending = stored_pending.clone();
        for name in prune_pending(&mut pending, cycle_start, self.settings.lookback) {
            tracing::warn!("Giving up on details of '{}', outside the lookback window", name);
        }

        let catalog = snapshot.bucket(ALL_BUCKET).unwrap_or(&[]);
        let changes = detect_changes(self.source.as_ref(), catalog, &watermark, cycle_start, &pending).await?;

        let subscriptions = self.subscriptions.load().await?;
        let plan = plan_dispatch(&changes.events, &subscriptions, &self.links);
        self.persist_implicit_tracks(&plan).await?;

        let (sent, send_failures) = self.deliver(&plan).await;

        let retries: PendingRetries = changes.failed.into_iter().collect();
        if retries != stored_pending {
            self.watermark.save_pending(&retries).await?;
        }

        let watermark = self.watermark.advance(&format_timestamp(cycle_start)).await?;
        Ok(CycleReport {
            skipped: false,
            events: changes.events.len(),
            sent,
            send_failures,
            pending: retries.len(),
            watermark,
        })
    }

    async fn persist_implicit_tracks(&self, plan: &DispatchPlan) -> Result<()> {
        if plan.implicit_tracks.is_empty() {
            return Ok(());
        }
        self.subscriptions
            .update(|map| {
                for (destination, names) in &plan.implicit_tracks {
                    // A destination removed meanwhile stays removed
                    if let Some(subscription) = map.get_mut(destination) {
                        subscription.tracked_items.extend(names.iter().cloned());
                    }
                }
            })
            .await
    }

    async fn deliver(&self, plan: &DispatchPlan) -> (usize, usize) {
        let mut sent = 0;
        let mut failed = 0;
        for delivery in &plan.deliveries {
            for notification in &delivery.notifications {
                match self.sink.send(&delivery.channel, notification).await {
                    Ok(()) => sent += 1,
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(
                            "Failed to notify {} (channel {}) about {} {}: {}",
                            delivery.destination,
                            delivery.channel,
                            notification.item_name,
                            notification.version,
                            e
                        );
                    }
                }
            }
        }
        (sent, failed)
    }
}
