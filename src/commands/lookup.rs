//! Catalog lookup commands.
//!
//! Answer from the in-memory snapshot where possible; only `/changelog`
//! needs a round trip to the portal.

use crate::changelog::extract_section;
use crate::commands::autocomplete;
use crate::commands::{say, say_failed};
use crate::types::{Context, Error};

/// Mods listed per author reply.
const AUTHOR_LISTING: usize = 10;

/// Show a mod's latest release and links.
#[poise::command(slash_command, rename = "mod")]
pub async fn mod_(
    context: Context<'_>,
    #[description = "Mod name"]
    #[autocomplete = "autocomplete::mod_name"]
    name: String,
    #[description = "Game version to check compatibility against"]
    #[autocomplete = "autocomplete::runtime_version"]
    version: Option<String>,
) -> Result<(), Error> {
    let data = context.data();
    let snapshot = data.catalog.load();
    let Some(item) = snapshot.item(&name) else {
        say(context, format!("❌ No mod named `{}`.", name)).await?;
        return Ok(());
    };

    let mut response = format!(
        "**{}** by [{}](<{}>)\n{}\n",
        item.title,
        item.owner,
        data.links.author_url(&item.owner),
        item.summary
    );
    match &item.latest_release {
        Some(release) => response.push_str(&format!(
            "**Latest:** {} for game {} ({})\n",
            release.version,
            release.info_json.factorio_version,
            release.released_at
        )),
        None => response.push_str("**Latest:** no releases\n"),
    }
    response.push_str(&format!("**Downloads:** {}\n", item.downloads_count));

    let dependents = snapshot.dependents(&item.name);
    if !dependents.is_empty() {
        response.push_str(&format!("**Required by:** {} mod(s)\n", dependents.len()));
    }

    let wanted = version.as_deref().unwrap_or(&data.default_version);
    if item.runtime_version().as_deref() != Some(wanted) {
        response.push_str(&format!("⚠️ Latest release is not for game {}\n", wanted));
    }
    response.push_str(&data.links.item_url(&item.name));

    say(context, response).await
}

/// Show an author's mods, most downloaded first.
#[poise::command(slash_command)]
pub async fn author(
    context: Context<'_>,
    #[description = "Author name"]
    #[autocomplete = "autocomplete::author_name"]
    name: String,
) -> Result<(), Error> {
    let data = context.data();
    let snapshot = data.catalog.load();
    let Some(author) = snapshot.author(&name) else {
        say(context, format!("❌ No author named `{}`.", name)).await?;
        return Ok(());
    };

    let mut items = author.items.clone();
    items.sort_by(|a, b| b.downloads_count.cmp(&a.downloads_count));

    let mut response = format!(
        "**{}**: {} mod(s), {} downloads\n",
        author.name,
        author.items.len(),
        author.downloads
    );
    for item in items.iter().take(AUTHOR_LISTING) {
        response.push_str(&format!(
            "- [{}](<{}>) ({} downloads)\n",
            item.title,
            data.links.item_url(&item.name),
            item.downloads_count
        ));
    }
    if items.len() > AUTHOR_LISTING {
        response.push_str(&format!("…and {} more\n", items.len() - AUTHOR_LISTING));
    }
    response.push_str(&data.links.author_url(&author.name));

    say(context, response).await
}

/// Show the changelog of a mod release.
#[poise::command(slash_command)]
pub async fn changelog(
    context: Context<'_>,
    #[description = "Mod name"]
    #[autocomplete = "autocomplete::mod_name"]
    name: String,
    #[description = "Mod version (defaults to the latest)"]
    version: Option<String>,
) -> Result<(), Error> {
    context.defer().await?;

    let detail = match context.data().portal.fetch_item_detail(&name, true).await {
        Ok(detail) => detail,
        Err(e) => return say_failed(context, &name, e).await,
    };

    let Some(version) = version.or_else(|| detail.releases.last().map(|r| r.version.clone())) else {
        say(context, format!("❌ `{}` has no releases.", name)).await?;
        return Ok(());
    };

    let section = detail
        .changelog
        .as_deref()
        .map(|text| extract_section(text, &version, detail.source_url.as_deref()))
        .unwrap_or_default();
    if section.is_empty() {
        say(context, format!("No changelog for version {}.", version)).await?;
        return Ok(());
    }

    say(context, format!("**{}** {}\n{}", detail.item.title, version, section)).await
}
