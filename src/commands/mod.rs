//! Discord bot commands.
//!
//! This module contains all available bot commands organized by functionality.

pub mod autocomplete;
pub mod lookup;
pub mod ping;
pub mod track;
pub mod untrack;

use std::fmt::Display;

use crate::types::{Context, Error};
use crate::utils::text::truncate;

pub use lookup::{author, changelog, mod_};
pub use ping::ping;
pub use track::track;
pub use untrack::untrack;

/// Longest message Discord accepts, in characters.
pub const MESSAGE_LIMIT: usize = 2000;

/// Every command the bot registers.
pub fn all() -> Vec<poise::Command<crate::types::Data, Error>> {
    vec![ping(), mod_(), author(), changelog(), track(), untrack()]
}

/// Reply with `text`, cut to fit in one message.
pub(crate) async fn say(context: Context<'_>, text: impl Into<String>) -> Result<(), Error> {
    context.say(truncate(&text.into(), MESSAGE_LIMIT)).await?;
    Ok(())
}

/// Log a collaborator failure and tell the user to try again, without leaking details.
pub(crate) async fn say_failed(context: Context<'_>, what: &str, error: impl Display) -> Result<(), Error> {
    tracing::error!("/{} failed ({}): {}", context.command().qualified_name, what, error);
    say(context, "❌ Request failed, please try again later.").await
}

/// The destination ID of the guild the command runs in.
pub(crate) fn destination(context: Context<'_>) -> Option<String> {
    context.guild_id().map(|id| id.to_string())
}
