//! Poll watermark and pending detail retries.
//!
//! The watermark is the timestamp from which releases still need to be
//! announced. It only ever moves forward. Items whose detail fetch failed are
//! remembered with their own window start, so a later cycle can still announce
//! their releases after the watermark has moved past them.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::{ModwatchError, Result};
use crate::state::{read_json, write_json, StateStore};
use crate::utils::retry::RetryPolicy;
use crate::version::{format_timestamp, is_release_newer, parse_timestamp};

pub const WATERMARK_KEY: &str = "watermark";
pub const PENDING_KEY: &str = "pending_details";

/// Item name → window start of releases not yet announced.
pub type PendingRetries = BTreeMap<String, String>;

/// Reads and advances the persisted watermark.
///
/// Every read-modify-write of the watermark holds `lock`.
pub struct WatermarkStore {
    state: Arc<dyn StateStore>,
    read_policy: RetryPolicy,
    lock: Mutex<()>,
}

impl WatermarkStore {
    pub fn new(state: Arc<dyn StateStore>, read_policy: RetryPolicy) -> Self {
        Self {
            state,
            read_policy,
            lock: Mutex::new(()),
        }
    }

    /// The persisted watermark, if one was ever written.
    ///
    /// # Errors
    ///
    /// Fails with `CorruptState` if the stored value cannot be decoded or is
    /// not a valid timestamp.
    pub async fn load(&self) -> Result<Option<String>> {
        let value: Option<String> = read_json(self.state.as_ref(), WATERMARK_KEY, &self.read_policy).await?;
        if let Some(raw) = &value {
            parse_timestamp(raw).map_err(|e| ModwatchError::CorruptState {
                key: WATERMARK_KEY.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(value)
    }

    /// The persisted watermark, initialized to `now` on first start.
    ///
    /// A fresh install announces nothing from before it started.
    pub async fn load_or_init(&self, now: DateTime<Utc>) -> Result<String> {
        let _guard = self.lock.lock().await;
        if let Some(watermark) = self.load().await? {
            return Ok(watermark);
        }
        let initial = format_timestamp(now);
        tracing::info!("No watermark found, starting from {}", initial);
        write_json(self.state.as_ref(), WATERMARK_KEY, &initial).await?;
        Ok(initial)
    }

    /// Move the watermark to `candidate` unless that would move it backwards.
    ///
    /// Returns the watermark now in effect.
    pub async fn advance(&self, candidate: &str) -> Result<String> {
        let _guard = self.lock.lock().await;
        let current = self.load().await?;
        let next = match current {
            Some(current) if !is_release_newer(candidate, &current)? => current,
            _ => candidate.to_string(),
        };
        write_json(self.state.as_ref(), WATERMARK_KEY, &next).await?;
        Ok(next)
    }

    pub async fn pending(&self) -> Result<PendingRetries> {
        let pending: Option<PendingRetries> = read_json(self.state.as_ref(), PENDING_KEY, &self.read_policy).await?;
        Ok(pending.unwrap_or_default())
    }

    pub async fn save_pending(&self, pending: &PendingRetries) -> Result<()> {
        write_json(self.state.as_ref(), PENDING_KEY, pending).await
    }
}

/// Drop pending retries whose window start is older than `lookback` before `now`.
///
/// Returns the names that were dropped. Entries with an unreadable timestamp
/// are dropped too.
pub fn prune_pending(pending: &mut PendingRetries, now: DateTime<Utc>, lookback: Duration) -> Vec<String> {
    let cutoff = now - lookback;
    let mut dropped = Vec::new();
    pending.retain(|name, since| match parse_timestamp(since) {
        Ok(time) if time >= cutoff => true,
        _ => {
            dropped.push(name.clone());
            false
        }
    });
    dropped
}
