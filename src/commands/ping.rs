//! Ping command for bot health check.

use crate::types::{Context, Error};

/// Check that the bot is responsive and has a catalog loaded.
#[poise::command(slash_command)]
pub async fn ping(context: Context<'_>) -> Result<(), Error> {
    let mods = context.data().catalog.load().len();
    context.say(format!("Pong! 🏓 ({} mods indexed)", mods)).await?;
    Ok(())
}
