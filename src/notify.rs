//! Notification delivery.
//!
//! Renders a [`Notification`] as a Discord embed and posts it to a channel.

use std::sync::Arc;

use async_trait::async_trait;
use poise::serenity_prelude as serenity;

use crate::dispatch::Notification;
use crate::error::{ModwatchError, Result};
use crate::utils::text::truncate;

/// Embed colour of new-mod announcements.
pub const NEW_COLOUR: u32 = 0x57f287;
/// Embed colour of update announcements.
pub const UPDATE_COLOUR: u32 = 0x3498db;

/// Discord embed limits, in characters.
pub const EMBED_TITLE_LIMIT: usize = 256;
pub const EMBED_FIELD_LIMIT: usize = 1024;
pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;

/// Destination for rendered notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, channel: &str, notification: &Notification) -> Result<()>;
}

/// Sends notifications through the Discord HTTP API.
pub struct DiscordSink {
    http: Arc<serenity::Http>,
}

impl DiscordSink {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn send(&self, channel: &str, notification: &Notification) -> Result<()> {
        let channel_id = parse_channel_id(channel)?;
        let message = serenity::CreateMessage::new().embed(build_embed(notification));
        channel_id.send_message(&self.http, message).await?;
        Ok(())
    }
}

/// Parse a stored channel ID.
///
/// # Errors
///
/// Returns a validation error for anything but a non-zero integer.
pub fn parse_channel_id(channel: &str) -> Result<serenity::ChannelId> {
    match channel.trim().parse::<u64>() {
        Ok(id) if id != 0 => Ok(serenity::ChannelId::new(id)),
        _ => Err(ModwatchError::Validation(format!("Invalid channel ID: '{}'", channel))),
    }
}

/// Headline of a notification, e.g. `New mod: Rockets` or `Updated: Rockets 1.2.0`.
pub fn headline(notification: &Notification) -> String {
    if notification.is_new {
        format!("New mod: {}", notification.title)
    } else {
        format!("Updated: {} {}", notification.title, notification.version)
    }
}

/// [`headline`] cut to fit an embed title.
pub fn embed_title(notification: &Notification) -> String {
    truncate(&headline(notification), EMBED_TITLE_LIMIT)
}

fn build_embed(notification: &Notification) -> serenity::CreateEmbed {
    let colour = if notification.is_new { NEW_COLOUR } else { UPDATE_COLOUR };
    let mut embed = serenity::CreateEmbed::new()
        .title(embed_title(notification))
        .url(&notification.url)
        .colour(colour)
        .field("Author", truncate(&notification.author, EMBED_FIELD_LIMIT), true)
        .field("Version", truncate(&notification.version, EMBED_FIELD_LIMIT), true);

    if let Some(changelog) = &notification.changelog {
        embed = embed.description(truncate(changelog, EMBED_DESCRIPTION_LIMIT));
    }
    if let Some(thumbnail) = &notification.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    if let Ok(timestamp) = serenity::Timestamp::parse(&notification.released_at) {
        embed = embed.timestamp(timestamp);
    }
    embed
}


#[cfg(test)]
mod tests {
    use super::*;

    fn notification(is_new: bool) -> Notification {
        Notification {
            item_name: "rockets".to_string(),
            title: "Rockets".to_string(),
            url: "https://mods.example/mod/rockets".to_string(),
            author: "acme".to_string(),
            version: "1.2.0".to_string(),
            released_at: "2024-05-01T12:00:00.000000Z".to_string(),
            is_new,
            changelog: None,
            thumbnail: None,
        }
    }

    #[test]
    fn test_headline() {
        assert_eq!(headline(&notification(true)), "New mod: Rockets");
        assert_eq!(headline(&notification(false)), "Updated: Rockets 1.2.0");
    }

    #[test]
    fn test_long_title_fits_embed() {
        let mut long = notification(false);
        long.title = "R".repeat(300);
        let title = embed_title(&long);
        assert_eq!(title.chars().count(), EMBED_TITLE_LIMIT);
        assert!(title.starts_with("Updated: RRR"));
        assert!(title.ends_with("..."));

        assert_eq!(embed_title(&notification(true)), "New mod: Rockets");
    }

    #[test]
    fn test_parse_channel_id() {
        assert_eq!(parse_channel_id("1234").unwrap(), serenity::ChannelId::new(1234));
        assert!(parse_channel_id("0").is_err());
        assert!(parse_channel_id("general").is_err());
        assert!(parse_channel_id("").is_err());
    }
}
