//! `/untrack` command group.

use crate::catalog::Author;
use crate::commands::autocomplete;
use crate::commands::{destination, say, say_failed};
use crate::types::{Context, Error};

/// Stop notifications about mods or authors.
#[poise::command(
    slash_command,
    guild_only,
    default_member_permissions = "MANAGE_GUILD",
    subcommands("untrack_mod", "untrack_author", "untrack_all")
)]
pub async fn untrack(_context: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Stop tracking a mod.
#[poise::command(slash_command, guild_only, rename = "mod")]
pub async fn untrack_mod(
    context: Context<'_>,
    #[description = "Mod name"]
    #[autocomplete = "autocomplete::tracked_mod"]
    name: String,
) -> Result<(), Error> {
    let Some(destination) = destination(context) else {
        return Ok(());
    };
    match context
        .data()
        .subscriptions
        .update_destination(&destination, |sub| sub.untrack_item(&name))
        .await
    {
        Ok(true) => say(context, format!("✅ No longer tracking `{}`.", name)).await,
        Ok(false) => say(context, format!("`{}` was not tracked.", name)).await,
        Err(e) => say_failed(context, &destination, e).await,
    }
}

/// Stop tracking an author and their mods.
#[poise::command(slash_command, guild_only, rename = "author")]
pub async fn untrack_author(
    context: Context<'_>,
    #[description = "Author name"]
    #[autocomplete = "autocomplete::tracked_author"]
    name: String,
) -> Result<(), Error> {
    let Some(destination) = destination(context) else {
        return Ok(());
    };
    // An author gone from the catalog still has to be removable
    let author = context
        .data()
        .catalog
        .load()
        .author(&name)
        .cloned()
        .unwrap_or_else(|| Author {
            name: name.clone(),
            items: Vec::new(),
            downloads: 0,
        });

    match context
        .data()
        .subscriptions
        .update_destination(&destination, |sub| sub.untrack_author(&author))
        .await
    {
        Ok(true) => say(context, format!("✅ No longer tracking `{}` or their mods.", name)).await,
        Ok(false) => say(context, format!("`{}` was not tracked.", name)).await,
        Err(e) => say_failed(context, &destination, e).await,
    }
}

/// Stop tracking every mod and author. Track-all and channel settings are kept.
#[poise::command(slash_command, guild_only, rename = "all")]
pub async fn untrack_all(context: Context<'_>) -> Result<(), Error> {
    let Some(destination) = destination(context) else {
        return Ok(());
    };
    match context
        .data()
        .subscriptions
        .update_destination(&destination, |sub| sub.clear_tracked())
        .await
    {
        Ok(()) => say(context, "✅ Cleared all tracked mods and authors.").await,
        Err(e) => say_failed(context, &destination, e).await,
    }
}
