//! `/track` command group.
//!
//! Configures what a guild gets notified about and where.

use chrono::Utc;
use poise::serenity_prelude as serenity;

use crate::commands::autocomplete;
use crate::commands::{destination, say, say_failed};
use crate::dispatch::Notification;
use crate::error::ModwatchError;
use crate::types::{Context, Error};
use crate::version::format_timestamp;

/// Largest accepted `mod-list.json` upload, in bytes.
const MAX_MOD_LIST_SIZE: u32 = 1024 * 1024;

/// Manage update notifications for this server.
#[poise::command(
    slash_command,
    guild_only,
    default_member_permissions = "MANAGE_GUILD",
    subcommands("track_mod", "track_author", "file", "all", "enabled", "changelogs", "set_channel", "list", "test")
)]
pub async fn track(_context: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Get notified about updates of a mod.
#[poise::command(slash_command, guild_only, rename = "mod")]
pub async fn track_mod(
    context: Context<'_>,
    #[description = "Mod name"]
    #[autocomplete = "autocomplete::mod_name"]
    name: String,
) -> Result<(), Error> {
    let Some(destination) = destination(context) else {
        return Ok(());
    };
    if context.data().catalog.load().item(&name).is_none() {
        return say(context, format!("❌ No mod named `{}`.", name)).await;
    }

    match context
        .data()
        .subscriptions
        .update_destination(&destination, |sub| sub.track_item(&name))
        .await
    {
        Ok(true) => say(context, format!("✅ Now tracking `{}`.", name)).await,
        Ok(false) => say(context, format!("`{}` is already tracked.", name)).await,
        Err(e) => say_failed(context, &destination, e).await,
    }
}

/// Get notified about an author's mods, including mods they publish later.
#[poise::command(slash_command, guild_only, rename = "author")]
pub async fn track_author(
    context: Context<'_>,
    #[description = "Author name"]
    #[autocomplete = "autocomplete::author_name"]
    name: String,
) -> Result<(), Error> {
    let Some(destination) = destination(context) else {
        return Ok(());
    };
    let Some(author) = context.data().catalog.load().author(&name).cloned() else {
        return say(context, format!("❌ No author named `{}`.", name)).await;
    };

    match context
        .data()
        .subscriptions
        .update_destination(&destination, |sub| sub.track_author(&author))
        .await
    {
        Ok(()) => {
            say(
                context,
                format!("✅ Now tracking `{}` and their {} mod(s).", author.name, author.items.len()),
            )
            .await
        }
        Err(e) => say_failed(context, &destination, e).await,
    }
}

/// Track every enabled mod of a `mod-list.json`.
#[poise::command(slash_command, guild_only)]
pub async fn file(
    context: Context<'_>,
    #[description = "Your mod-list.json"] mod_list: serenity::Attachment,
) -> Result<(), Error> {
    let Some(destination) = destination(context) else {
        return Ok(());
    };
    if mod_list.size > MAX_MOD_LIST_SIZE {
        return say(context, "❌ That file is too large to be a mod-list.json.").await;
    }

    context.defer().await?;
    let contents = match mod_list.download().await {
        Ok(contents) => contents,
        Err(e) => return say_failed(context, &mod_list.filename, e).await,
    };

    let result = context
        .data()
        .subscriptions
        .update_destination(&destination, |sub| sub.track_mod_list(&contents))
        .await;
    match result {
        Ok(Ok(added)) => say(context, format!("✅ Now tracking {} more mod(s).", added)).await,
        Ok(Err(ModwatchError::Validation(message))) | Err(ModwatchError::Validation(message)) => {
            say(context, format!("❌ {}", message)).await
        }
        Ok(Err(e)) | Err(e) => say_failed(context, &destination, e).await,
    }
}

/// Get notified about every mod on the portal.
#[poise::command(slash_command, guild_only)]
pub async fn all(
    context: Context<'_>,
    #[description = "Track every mod"] enabled: bool,
) -> Result<(), Error> {
    let reply = if enabled {
        "✅ Tracking every mod."
    } else {
        "✅ Tracking only the selected mods and authors."
    };
    update_flag(context, reply, |sub| sub.set_track_all(enabled)).await
}

/// Turn update messages on or off.
#[poise::command(slash_command, guild_only)]
pub async fn enabled(
    context: Context<'_>,
    #[description = "Send update messages"] on: bool,
) -> Result<(), Error> {
    let Some(destination) = destination(context) else {
        return Ok(());
    };
    let result = context
        .data()
        .subscriptions
        .update_destination(&destination, |sub| sub.set_notifications(on))
        .await;
    match result {
        Ok(Ok(())) if on => say(context, "✅ Update messages enabled.").await,
        Ok(Ok(())) => say(context, "✅ Update messages disabled.").await,
        Ok(Err(e)) => say(context, format!("❌ {}", validation_message(&e))).await,
        Err(e) => say_failed(context, &destination, e).await,
    }
}

/// Show or hide changelogs in update messages.
#[poise::command(slash_command, guild_only)]
pub async fn changelogs(
    context: Context<'_>,
    #[description = "Include changelogs"] enabled: bool,
) -> Result<(), Error> {
    let reply = if enabled {
        "✅ Update messages will include changelogs."
    } else {
        "✅ Update messages will not include changelogs."
    };
    update_flag(context, reply, |sub| sub.set_changelogs(enabled)).await
}

/// Choose the channel update messages go to.
#[poise::command(slash_command, guild_only)]
pub async fn set_channel(
    context: Context<'_>,
    #[description = "Channel for update messages (defaults to this one)"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| context.channel_id());
    let reply = format!("✅ Update messages will be sent to <#{}>.", channel_id);
    let channel = channel_id.to_string();
    update_flag(context, &reply, |sub| sub.set_channel(&channel)).await
}

/// Show this server's notification settings.
#[poise::command(slash_command, guild_only)]
pub async fn list(context: Context<'_>) -> Result<(), Error> {
    let Some(destination) = destination(context) else {
        return Ok(());
    };
    let sub = match context.data().subscriptions.get(&destination).await {
        Ok(sub) => sub,
        Err(e) => return say_failed(context, &destination, e).await,
    };

    let channel = sub
        .channel
        .as_deref()
        .map(|c| format!("<#{}>", c))
        .unwrap_or_else(|| "not set".to_string());
    let mut response = format!(
        "**Channel:** {}\n**Update messages:** {}\n**Changelogs:** {}\n",
        channel,
        on_off(sub.notifications_enabled),
        on_off(sub.changelogs)
    );
    if sub.track_all {
        response.push_str("**Tracking:** every mod\n");
    } else {
        response.push_str(&format!("**Authors ({}):** {}\n", sub.tracked_authors.len(), join(&sub.tracked_authors)));
        response.push_str(&format!("**Mods ({}):** {}\n", sub.tracked_items.len(), join(&sub.tracked_items)));
    }
    say(context, response).await
}

/// Send a test message to the update channel.
#[poise::command(slash_command, guild_only)]
pub async fn test(context: Context<'_>) -> Result<(), Error> {
    let Some(destination) = destination(context) else {
        return Ok(());
    };
    let data = context.data();
    let sub = match data.subscriptions.get(&destination).await {
        Ok(sub) => sub,
        Err(e) => return say_failed(context, &destination, e).await,
    };
    let Some(channel) = sub.channel.filter(|c| !c.is_empty()) else {
        return say(context, "❌ Set an update channel first with `/track set_channel`.").await;
    };

    let notification = Notification {
        item_name: "modwatch-test".to_string(),
        title: "Test message".to_string(),
        url: data.links.portal_url.clone(),
        author: context.author().name.clone(),
        version: "1.0.0".to_string(),
        released_at: format_timestamp(Utc::now()),
        is_new: false,
        changelog: Some("Update messages for this server will appear here.".to_string()),
        thumbnail: None,
    };
    match data.sink.send(&channel, &notification).await {
        Ok(()) => say(context, format!("✅ Test message sent to <#{}>.", channel)).await,
        Err(e) => {
            tracing::warn!("Test message to {} failed: {}", channel, e);
            say(context, format!("❌ Could not post in <#{}>. Check the bot's permissions there.", channel)).await
        }
    }
}

async fn update_flag(
    context: Context<'_>,
    reply: &str,
    mutate: impl FnOnce(&mut crate::subscriptions::Subscription),
) -> Result<(), Error> {
    let Some(destination) = destination(context) else {
        return Ok(());
    };
    match context.data().subscriptions.update_destination(&destination, mutate).await {
        Ok(()) => say(context, reply).await,
        Err(e) => say_failed(context, &destination, e).await,
    }
}

fn validation_message(error: &ModwatchError) -> String {
    match error {
        ModwatchError::Validation(message) => message.clone(),
        other => other.to_string(),
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn join(names: &std::collections::BTreeSet<String>) -> String {
    if names.is_empty() {
        return "none".to_string();
    }
    names.iter().map(|n| format!("`{}`", n)).collect::<Vec<_>>().join(", ")
}
