//! Type definitions and aliases for the bot.
//!
//! This module contains shared types used throughout the command handlers.

use std::sync::Arc;

use crate::catalog::{PortalLinks, SnapshotCell};
use crate::notify::NotificationSink;
use crate::portal::CatalogSource;
use crate::subscriptions::SubscriptionStore;

/// Bot application data shared across all commands.
///
/// This data is accessible in all command handlers through the context.
pub struct Data {
    /// Catalog snapshot refreshed by the update poller
    pub catalog: Arc<SnapshotCell>,
    /// Mod portal API client, for details the snapshot does not hold
    pub portal: Arc<dyn CatalogSource>,
    pub subscriptions: Arc<SubscriptionStore>,
    /// Used by `/track test`
    pub sink: Arc<dyn NotificationSink>,
    pub links: PortalLinks,
    /// Runtime version used when a command does not name one
    pub default_version: String,
}

/// Error type for bot commands (maintains compatibility with poise).
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Command context type alias for easier usage.
pub type Context<'a> = poise::Context<'a, Data, Error>;
